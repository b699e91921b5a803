use super::{spin_fail, spin_ok, spinner, CliError, EXIT_SUCCESS};
use crate::fleet::FleetConfig;
use crate::signal::shutdown_requested;
use holdfast_component::{
    resolve_installation_order, validate_dependencies, ComponentError, Registry,
};

/// Install the requested components and everything they depend on, in
/// dependency order. The first failure aborts; components already converged
/// before it keep their state, and re-running after a fix picks up where the
/// run left off because every install is idempotent.
pub fn run(
    registry: &Registry,
    config: &FleetConfig,
    requested: &[String],
) -> Result<u8, CliError> {
    let names: Vec<&str> = requested.iter().map(String::as_str).collect();
    validate_dependencies(registry, &names).map_err(CliError::Resolve)?;
    let order = resolve_installation_order(registry, &names).map_err(CliError::Resolve)?;

    tracing::info!(?order, "resolved install order");
    for name in &order {
        if shutdown_requested() {
            return Err(CliError::Failure(
                "cancelled before installing remaining components".to_owned(),
            ));
        }
        let component = registry
            .get(name)
            .ok_or_else(|| CliError::Resolve(ComponentError::NotFound(name.clone())))?;
        let pb = spinner(&format!("installing {name}"));
        match component.install(&config.install_config(name)) {
            Ok(()) => spin_ok(&pb, &format!("{name} installed")),
            Err(err) => {
                spin_fail(&pb, &format!("{name} failed"));
                return Err(CliError::Failure(format!("installing '{name}': {err}")));
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
