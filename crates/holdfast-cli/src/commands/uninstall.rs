use super::{spin_fail, spin_ok, spinner, CliError, EXIT_SUCCESS};
use holdfast_component::{resolve_installation_order, ComponentError, Registry};

/// Uninstall the named components, in reverse dependency order so nothing is
/// removed while something that needs it is still present. Only the names
/// given are removed; their dependencies stay installed.
pub fn run(registry: &Registry, requested: &[String]) -> Result<u8, CliError> {
    let names: Vec<&str> = requested.iter().map(String::as_str).collect();
    let order = resolve_installation_order(registry, &names).map_err(CliError::Resolve)?;

    for name in order.iter().rev().filter(|n| names.contains(&n.as_str())) {
        let component = registry
            .get(name)
            .ok_or_else(|| CliError::Resolve(ComponentError::NotFound(name.clone())))?;
        let pb = spinner(&format!("uninstalling {name}"));
        match component.uninstall() {
            Ok(()) => spin_ok(&pb, &format!("{name} removed")),
            Err(err) => {
                spin_fail(&pb, &format!("{name} failed"));
                return Err(CliError::Failure(format!("uninstalling '{name}': {err}")));
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
