use super::{colorize_health, json_pretty, CliError, EXIT_SUCCESS};
use holdfast_component::{ComponentStatus, Registry};

/// Status sweep across the fleet (or the named subset).
///
/// One component failing to report does not abort the sweep: its error is
/// folded into an unhealthy row and the rest still print.
pub fn run(registry: &Registry, requested: &[String], json: bool) -> Result<u8, CliError> {
    let mut names = if requested.is_empty() {
        registry.list()
    } else {
        requested.to_vec()
    };
    names.sort();

    let mut rows = Vec::new();
    for name in &names {
        let status = match registry.get(name) {
            Some(component) => component
                .status()
                .unwrap_or_else(|e| ComponentStatus::unhealthy(e.to_string())),
            None => ComponentStatus::unhealthy(format!("component '{name}' not found in registry")),
        };
        rows.push((name.clone(), status));
    }

    if json {
        let values: Vec<_> = rows
            .iter()
            .map(|(name, s)| {
                serde_json::json!({
                    "name": name,
                    "installed": s.installed,
                    "version": s.version,
                    "healthy": s.healthy,
                    "message": s.message,
                })
            })
            .collect();
        println!("{}", json_pretty(&values)?);
    } else {
        println!("{:<16} {:<12} {:<10} MESSAGE", "COMPONENT", "VERSION", "HEALTH");
        for (name, s) in &rows {
            let version = if s.version.is_empty() { "-" } else { &s.version };
            println!(
                "{:<16} {:<12} {:<10} {}",
                name,
                version,
                colorize_health(s.healthy, s.installed),
                s.message
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
