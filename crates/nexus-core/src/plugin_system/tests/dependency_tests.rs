use crate::plugin_system::dependency::{resolve_load_order, DependencyError, DependencyGraph};
use crate::plugin_system::PluginDescriptor;
use crate::tests::common::descriptor;

#[test]
fn test_chain_loads_dependencies_first() {
    let set = vec![descriptor("a", &["b"]), descriptor("b", &["c"]), descriptor("c", &[])];
    assert_eq!(resolve_load_order(&set).unwrap(), vec!["c", "b", "a"]);

    // Input order does not matter
    let reversed: Vec<PluginDescriptor> = set.into_iter().rev().collect();
    assert_eq!(resolve_load_order(&reversed).unwrap(), vec!["c", "b", "a"]);
}

#[test]
fn test_ready_nodes_ordered_by_priority_then_id() {
    let set = vec![
        descriptor("zeta", &[]).with_priority(1),
        descriptor("beta", &[]).with_priority(5),
        descriptor("alpha", &[]).with_priority(5),
        descriptor("omega", &["zeta"]).with_priority(-10),
    ];
    // omega becomes ready only after zeta, then jumps ahead on priority
    assert_eq!(resolve_load_order(&set).unwrap(), vec!["zeta", "omega", "alpha", "beta"]);
}

#[test]
fn test_cycle_reports_remaining_nodes() {
    let set = vec![descriptor("a", &["b"]), descriptor("b", &["a"]), descriptor("c", &[]), descriptor("d", &["a"])];
    let err = resolve_load_order(&set).unwrap_err();
    assert_eq!(
        err,
        DependencyError::CyclicDependency(vec!["a".to_string(), "b".to_string(), "d".to_string()])
    );
}

#[test]
fn test_self_dependency_is_a_cycle() {
    let set = vec![descriptor("a", &["a"])];
    assert!(matches!(resolve_load_order(&set), Err(DependencyError::CyclicDependency(_))));
}

#[test]
fn test_missing_dependency() {
    let set = vec![descriptor("a", &["ghost"])];
    assert_eq!(
        resolve_load_order(&set).unwrap_err(),
        DependencyError::MissingPlugin {
            plugin: "a".to_string(),
            dependency: "ghost".to_string(),
        }
    );
}

#[test]
fn test_duplicate_and_invalid_version() {
    let set = vec![descriptor("a", &[]), descriptor("a", &[])];
    assert_eq!(
        resolve_load_order(&set).unwrap_err(),
        DependencyError::DuplicatePlugin("a".to_string())
    );

    let set = vec![PluginDescriptor::new("a", "one.two", "record")];
    assert!(matches!(
        resolve_load_order(&set),
        Err(DependencyError::InvalidVersion { .. })
    ));
}

#[test]
fn test_graph_indexes_every_plugin() {
    let set = vec![descriptor("a", &["b"]), descriptor("b", &["c"]), descriptor("c", &[]), descriptor("x", &["c"])];
    let graph = DependencyGraph::build(&set).unwrap();
    assert_eq!(graph.len(), 4);
    assert!(graph.node_id("c").is_some());
    assert!(graph.node_id("missing").is_none());
    assert_eq!(graph.resolve().unwrap(), vec!["c", "b", "a", "x"]);
}

#[test]
fn test_empty_set() {
    assert!(resolve_load_order(&[]).unwrap().is_empty());
    assert!(DependencyGraph::build(&[]).unwrap().is_empty());
}
