use std::sync::Arc;

use crate::plugin_system::{Plugin, PluginCatalog, PluginError, PluginSystemError};
use crate::tests::common::{catalog, descriptor, with_entry, Journal};

#[test]
fn test_instantiate_known_entry_point() {
    let catalog = catalog(&Journal::default());
    assert!(catalog.contains("record"));
    let plugin = catalog.instantiate(&descriptor("a", &[])).unwrap();
    assert_eq!(plugin.name(), "test-plugin");
}

#[test]
fn test_unknown_entry_point() {
    let catalog = catalog(&Journal::default());
    let err = match catalog.instantiate(&with_entry("a", &[], "nope")) {
        Err(e) => e,
        Ok(_) => panic!("unknown entry point should fail"),
    };
    assert!(matches!(err, PluginSystemError::UnknownEntryPoint { .. }));
    assert_eq!(err.kind(), "load");
}

#[test]
fn test_factory_errors_and_panics_become_load_errors() {
    let mut catalog = PluginCatalog::new();
    catalog.register("broken", |_d| Err(PluginError::InitError("missing model file".to_string())));
    catalog.register("panics", |_d| -> Result<Arc<dyn Plugin>, PluginError> { panic!("constructor bug") });
    assert_eq!(catalog.entry_points(), vec!["broken", "panics"]);

    for entry in ["broken", "panics"] {
        match catalog.instantiate(&with_entry("x", &[], entry)) {
            Err(PluginSystemError::LoadError { plugin_id, .. }) => assert_eq!(plugin_id, "x"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("{} should fail", entry),
        }
    }
}
