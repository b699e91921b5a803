use super::{json_pretty, CliError, EXIT_SUCCESS};
use holdfast_component::Registry;

/// List the registered components and their declared dependencies.
/// Registry order is unspecified; output is sorted at this boundary.
pub fn run(registry: &Registry, json: bool) -> Result<u8, CliError> {
    let mut names = registry.list();
    names.sort();

    if json {
        let values: Vec<_> = names
            .iter()
            .map(|name| {
                let deps = registry.get(name).map(|c| c.dependencies()).unwrap_or_default();
                serde_json::json!({ "name": name, "dependencies": deps })
            })
            .collect();
        println!("{}", json_pretty(&values)?);
    } else if names.is_empty() {
        println!("no components registered");
    } else {
        println!("{:<16} DEPENDENCIES", "COMPONENT");
        for name in &names {
            let deps = registry.get(name).map(|c| c.dependencies()).unwrap_or_default();
            let deps_display = if deps.is_empty() {
                "-".to_owned()
            } else {
                deps.join(", ")
            };
            println!("{name:<16} {deps_display}");
        }
    }
    Ok(EXIT_SUCCESS)
}
