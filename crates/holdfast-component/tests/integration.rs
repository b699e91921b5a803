//! End-to-end orchestration: registry, resolver, and lifecycle contract
//! driven together the way a fleet install drives them.

use std::sync::{Arc, Mutex};

use holdfast_component::{
    resolve_installation_order, validate_dependencies, Component, ComponentError, ComponentStatus,
    InstallConfig, Registry,
};

/// Component that records lifecycle calls into a shared journal, so tests
/// can assert the exact order a fleet operation touched its members.
struct JournaledComponent {
    name: String,
    deps: Vec<String>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl JournaledComponent {
    fn new(name: &str, deps: &[&str], journal: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            deps: deps.iter().map(|d| (*d).to_owned()).collect(),
            journal,
        })
    }
}

impl Component for JournaledComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<String> {
        self.deps.clone()
    }

    fn install(&self, _config: &InstallConfig) -> Result<(), ComponentError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("install {}", self.name));
        Ok(())
    }

    fn status(&self) -> Result<ComponentStatus, ComponentError> {
        let installed = self
            .journal
            .lock()
            .unwrap()
            .iter()
            .any(|entry| entry == &format!("install {}", self.name));
        Ok(ComponentStatus {
            installed,
            healthy: installed,
            ..ComponentStatus::default()
        })
    }

    fn uninstall(&self) -> Result<(), ComponentError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("uninstall {}", self.name));
        Ok(())
    }
}

/// A small fleet: `app` depends on `db` and `cache`, `db` on `storage`,
/// `storage` and `cache` on `base`.
fn fleet(journal: &Arc<Mutex<Vec<String>>>) -> Registry {
    let registry = Registry::new();
    for (name, deps) in [
        ("base", vec![]),
        ("storage", vec!["base"]),
        ("cache", vec!["base"]),
        ("db", vec!["storage"]),
        ("app", vec!["db", "cache"]),
    ] {
        registry
            .register(JournaledComponent::new(name, &deps, Arc::clone(journal)))
            .unwrap();
    }
    registry
}

#[test]
fn fleet_install_respects_every_dependency_edge() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = fleet(&journal);

    let order = resolve_installation_order(&registry, &["app"]).unwrap();
    for name in &order {
        let component = registry.get(name).unwrap();
        component.install(&InstallConfig::new()).unwrap();
    }

    let log = journal.lock().unwrap().clone();
    assert_eq!(log.len(), 5, "each component installs exactly once: {log:?}");
    let pos = |name: &str| {
        log.iter()
            .position(|e| e == &format!("install {name}"))
            .unwrap()
    };
    assert!(pos("base") < pos("storage"));
    assert!(pos("base") < pos("cache"));
    assert!(pos("storage") < pos("db"));
    assert!(pos("db") < pos("app"));
    assert!(pos("cache") < pos("app"));
}

#[test]
fn install_marks_components_installed_in_status() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = fleet(&journal);

    let db = registry.get("db").unwrap();
    assert!(!db.status().unwrap().installed);

    db.install(&InstallConfig::new()).unwrap();
    let status = db.status().unwrap();
    assert!(status.installed);
    assert!(status.healthy);
}

#[test]
fn uninstall_in_reverse_order_tears_down_dependents_first() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = fleet(&journal);

    let mut order = resolve_installation_order(&registry, &["app"]).unwrap();
    order.reverse();
    for name in &order {
        registry.get(name).unwrap().uninstall().unwrap();
    }

    let log = journal.lock().unwrap().clone();
    let pos = |name: &str| {
        log.iter()
            .position(|e| e == &format!("uninstall {name}"))
            .unwrap()
    };
    assert!(pos("app") < pos("db"));
    assert!(pos("db") < pos("storage"));
}

#[test]
fn validation_reports_missing_dependencies_before_any_install_runs() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();
    registry
        .register(JournaledComponent::new(
            "app",
            &["db", "cache"],
            Arc::clone(&journal),
        ))
        .unwrap();

    let err = validate_dependencies(&registry, &["app"]).unwrap_err();
    assert!(matches!(err, ComponentError::MissingDependencies(_)));
    let rendered = err.to_string();
    assert!(rendered.contains("missing dependencies"));
    assert!(rendered.contains("db"));
    assert!(rendered.contains("cache"));
    assert!(journal.lock().unwrap().is_empty());
}

#[test]
fn duplicate_registration_is_rejected() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();
    registry
        .register(JournaledComponent::new("base", &[], Arc::clone(&journal)))
        .unwrap();

    let err = registry
        .register(JournaledComponent::new("base", &[], journal))
        .unwrap_err();
    assert!(matches!(err, ComponentError::AlreadyRegistered(_)));
    assert!(err.to_string().contains("already registered"));
}

#[test]
fn resolution_refuses_cycles_and_unknown_names() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();
    registry
        .register(JournaledComponent::new("a", &["b"], Arc::clone(&journal)))
        .unwrap();
    registry
        .register(JournaledComponent::new("b", &["a"], journal))
        .unwrap();

    let err = resolve_installation_order(&registry, &["a"]).unwrap_err();
    assert!(matches!(err, ComponentError::CircularDependency(_)));
    assert!(err.to_string().contains("circular dependency"));

    let err = resolve_installation_order(&registry, &["ghost"]).unwrap_err();
    assert!(matches!(err, ComponentError::NotFound(_)));
    assert!(err.to_string().contains("not found in registry"));
}
