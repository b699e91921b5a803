use crate::registry::Registry;
use crate::ComponentError;
use std::collections::HashSet;
use tracing::debug;

/// Compute a safe installation order for the requested components.
///
/// Two phases over the implicit dependency graph:
///
/// 1. **Closure** — recursively collect the requested names plus all
///    transitive dependencies; any name absent from the registry fails with
///    `NotFound`.
/// 2. **Order** — DFS topological sort with a "visiting" set for back-edge
///    (cycle) detection and a "visited" set to prevent reprocessing; nodes
///    append in post-order so every dependency precedes its dependents.
///
/// Independent branches may appear in either relative order; only the
/// partial order is guaranteed. A self-dependency is a length-1 cycle.
pub fn resolve_installation_order(
    registry: &Registry,
    requested: &[&str],
) -> Result<Vec<String>, ComponentError> {
    let mut closure = HashSet::new();
    for name in requested {
        collect_closure(registry, name, &mut closure)?;
    }

    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(closure.len());
    for name in requested {
        visit(registry, name, &mut visiting, &mut visited, &mut order)?;
    }

    debug!("installation order: {order:?}");
    Ok(order)
}

fn collect_closure(
    registry: &Registry,
    name: &str,
    closure: &mut HashSet<String>,
) -> Result<(), ComponentError> {
    if closure.contains(name) {
        return Ok(());
    }
    let component = registry
        .get(name)
        .ok_or_else(|| ComponentError::NotFound(name.to_owned()))?;
    closure.insert(name.to_owned());
    for dep in component.dependencies() {
        collect_closure(registry, &dep, closure)?;
    }
    Ok(())
}

fn visit(
    registry: &Registry,
    name: &str,
    visiting: &mut HashSet<String>,
    visited: &mut HashSet<String>,
    order: &mut Vec<String>,
) -> Result<(), ComponentError> {
    if visiting.contains(name) {
        return Err(ComponentError::CircularDependency(name.to_owned()));
    }
    if visited.contains(name) {
        return Ok(());
    }
    let component = registry
        .get(name)
        .ok_or_else(|| ComponentError::NotFound(name.to_owned()))?;

    visiting.insert(name.to_owned());
    for dep in component.dependencies() {
        visit(registry, &dep, visiting, visited, order)?;
    }
    visiting.remove(name);
    visited.insert(name.to_owned());
    order.push(name.to_owned());
    Ok(())
}

/// Check the direct (non-transitive) dependency lists of the requested
/// components and report *every* dependency name absent from the registry,
/// aggregated per component into one multi-line error — this does not stop
/// at the first miss.
pub fn validate_dependencies(
    registry: &Registry,
    requested: &[&str],
) -> Result<(), ComponentError> {
    let mut lines = Vec::new();
    for name in requested {
        let component = registry
            .get(name)
            .ok_or_else(|| ComponentError::NotFound((*name).to_owned()))?;
        let missing: Vec<String> = component
            .dependencies()
            .into_iter()
            .filter(|dep| !registry.has(dep))
            .collect();
        if !missing.is_empty() {
            lines.push(format!("component '{name}' requires: {}", missing.join(", ")));
        }
    }
    if lines.is_empty() {
        Ok(())
    } else {
        Err(ComponentError::MissingDependencies(lines.join("\n")))
    }
}

/// Run the resolver over every registered component. Returns `(true, err)`
/// on a cycle, `(false, None)` on success, and `(false, err)` for unrelated
/// failures such as a dangling dependency — callers must inspect both
/// values. Classification is by the typed variant, never by message text.
pub fn has_circular_dependencies(registry: &Registry) -> (bool, Option<ComponentError>) {
    let names = registry.list();
    let requested: Vec<&str> = names.iter().map(String::as_str).collect();
    match resolve_installation_order(registry, &requested) {
        Ok(_) => (false, None),
        Err(err @ ComponentError::CircularDependency(_)) => (true, Some(err)),
        Err(err) => (false, Some(err)),
    }
}
