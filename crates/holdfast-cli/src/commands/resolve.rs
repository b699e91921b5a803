use super::{json_pretty, CliError, EXIT_SUCCESS};
use holdfast_component::{resolve_installation_order, Registry};

/// Print the install order for the requested components without touching
/// any target.
pub fn run(registry: &Registry, requested: &[String], json: bool) -> Result<u8, CliError> {
    let names: Vec<&str> = requested.iter().map(String::as_str).collect();
    let order = resolve_installation_order(registry, &names).map_err(CliError::Resolve)?;

    if json {
        println!("{}", json_pretty(&order)?);
    } else {
        for (i, name) in order.iter().enumerate() {
            println!("{:>3}. {name}", i + 1);
        }
    }
    Ok(EXIT_SUCCESS)
}
