//! Resolution properties checked against the in-memory provider

use typeforge_core::error::{Severity, TypeError};
use typeforge_core::model::{TypeInstance, TypeKey, TypeQuery};
use typeforge_core::provider::{FieldShape, InMemoryProvider, ShapeDescriptor, ShapeKind};
use typeforge_core::resolver::Resolver;
use typeforge_core::ResolvedGraph;

fn resolve(provider: &mut InMemoryProvider, roots: &[&str]) -> ResolvedGraph
{
    let queries: Vec<TypeQuery> = roots.iter().map(|root| TypeQuery::name(*root)).collect();
    let mut resolver = Resolver::new(provider, "app");
    resolver.resolve_roots(&queries).unwrap();
    resolver.finish()
}

fn keys(graph: &ResolvedGraph) -> Vec<TypeKey>
{
    graph.ids_by_key().into_iter().map(|id| graph.key(id).clone()).collect()
}

fn shared_fixture() -> InMemoryProvider
{
    InMemoryProvider::new()
        .with_struct("app", "Shared", 4, vec![FieldShape::new("value", "i32", 0)])
        .with_struct(
            "app",
            "A",
            16,
            vec![FieldShape::new("shared", "Shared", 0), FieldShape::new("b", "B*", 8)],
        )
        .with_struct(
            "app",
            "B",
            16,
            vec![FieldShape::new("shared", "Shared", 0), FieldShape::new("a", "A*", 8)],
        )
}

#[test]
fn test_pointer_cycles_terminate()
{
    let mut provider = InMemoryProvider::new().with_struct(
        "app",
        "List",
        16,
        vec![FieldShape::new("next", "List*", 0), FieldShape::new("prev", "List*", 8)],
    );
    let graph = resolve(&mut provider, &["List"]);
    let list = graph.lookup(&TypeKey::named("app", "List")).unwrap();

    assert!(!graph.contains_undefined(list));
    let fields = &graph.get(list).user_type().unwrap().fields;
    assert_eq!(fields[0].ty, fields[1].ty);
}

#[test]
fn test_shared_dependency_has_one_instance()
{
    let mut provider = shared_fixture();
    let graph = resolve(&mut provider, &["A", "B"]);

    let shared_key = TypeKey::named("app", "Shared");
    let count = graph.ids_by_key().into_iter().filter(|id| graph.key(*id) == &shared_key).count();
    assert_eq!(count, 1);

    let shared = graph.lookup(&shared_key).unwrap();
    let a = graph.lookup(&TypeKey::named("app", "A")).unwrap();
    let b = graph.lookup(&TypeKey::named("app", "B")).unwrap();
    assert_eq!(graph.get(a).user_type().unwrap().fields[0].ty, shared);
    assert_eq!(graph.get(b).user_type().unwrap().fields[0].ty, shared);
}

#[test]
fn test_root_order_does_not_change_graph()
{
    let forward = resolve(&mut shared_fixture(), &["A", "B"]);
    let backward = resolve(&mut shared_fixture(), &["B", "A"]);
    assert_eq!(keys(&forward), keys(&backward));
}

#[test]
fn test_each_reference_is_queried_once()
{
    let mut provider = shared_fixture();
    let _ = resolve(&mut provider, &["A", "B", "A"]);
    let first = provider.query_count();

    let mut provider = shared_fixture();
    let _ = resolve(&mut provider, &["A"]);
    // B is reached through A's pointer either way, so repeating roots costs nothing.
    assert_eq!(provider.query_count(), first);
}

#[test]
fn test_undefined_propagates_through_values_only()
{
    let mut provider = InMemoryProvider::new()
        .with_struct("app", "ByValue", 8, vec![FieldShape::new("missing", "Missing", 0)])
        .with_struct("app", "ByPointer", 8, vec![FieldShape::new("missing", "Missing*", 0)]);
    let graph = resolve(&mut provider, &["ByValue", "ByPointer"]);

    let by_value = graph.lookup(&TypeKey::named("app", "ByValue")).unwrap();
    let by_pointer = graph.lookup(&TypeKey::named("app", "ByPointer")).unwrap();
    assert!(graph.contains_undefined(by_value));
    assert!(!graph.contains_undefined(by_pointer));

    let missing = graph.lookup(&TypeKey::named("app", "Missing")).unwrap();
    assert!(matches!(graph.get(missing), TypeInstance::Undefined { .. }));
    assert!(graph
        .diagnostics()
        .iter()
        .any(|diagnostic| matches!(&diagnostic.error, TypeError::Unresolvable { query, .. } if query == "Missing")));
}

#[test]
fn test_value_cycle_is_reported_once_and_spares_others()
{
    let mut provider = InMemoryProvider::new()
        .with_struct("app", "Left", 8, vec![FieldShape::new("right", "Right", 0)])
        .with_struct("app", "Right", 8, vec![FieldShape::new("left", "Left", 0)])
        .with_struct("app", "Bystander", 8, vec![FieldShape::new("left", "Left*", 0)]);
    let graph = resolve(&mut provider, &["Bystander", "Right"]);

    let left = graph.lookup(&TypeKey::named("app", "Left")).unwrap();
    let right = graph.lookup(&TypeKey::named("app", "Right")).unwrap();
    let bystander = graph.lookup(&TypeKey::named("app", "Bystander")).unwrap();
    assert!(graph.is_illegal(left));
    assert!(graph.is_illegal(right));
    assert!(!graph.is_illegal(bystander));

    let cycles: Vec<_> = graph
        .diagnostics()
        .iter()
        .filter(|diagnostic| matches!(diagnostic.error, TypeError::IllegalValueCycle { .. }))
        .collect();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].severity, Severity::Error);
    match &cycles[0].error {
        TypeError::IllegalValueCycle { cycle } => assert_eq!(cycle, &vec!["Left".to_string(), "Right".to_string()]),
        other => panic!("unexpected diagnostic {other:?}"),
    }
}

#[test]
fn test_cycle_report_does_not_depend_on_root_order()
{
    let fixture = || {
        InMemoryProvider::new()
            .with_struct("app", "Left", 8, vec![FieldShape::new("right", "Right", 0)])
            .with_struct("app", "Right", 8, vec![FieldShape::new("left", "Left", 0)])
    };
    let one = resolve(&mut fixture(), &["Left"]);
    let other = resolve(&mut fixture(), &["Right"]);
    assert_eq!(one.diagnostics(), other.diagnostics());
}

#[test]
fn test_direct_self_containment_is_illegal()
{
    let mut provider = InMemoryProvider::new()
        .with_struct("app", "Bad", 8, vec![FieldShape::new("self_value", "Bad", 0)])
        .with_struct("app", "Good", 4, vec![FieldShape::new("value", "i32", 0)]);
    let graph = resolve(&mut provider, &["Bad", "Good"]);

    let bad = graph.lookup(&TypeKey::named("app", "Bad")).unwrap();
    let good = graph.lookup(&TypeKey::named("app", "Good")).unwrap();
    assert!(graph.is_illegal(bad));
    assert!(!graph.is_illegal(good));
}

fn alias_chain_fixture() -> InMemoryProvider
{
    let alias = |target: &str| {
        ShapeDescriptor::new(
            4,
            ShapeKind::Alias {
                target: TypeQuery::name(target),
            },
        )
    };
    InMemoryProvider::new()
        .with_type("app", "A1", alias("A2"))
        .with_type("app", "A2", alias("Target"))
        .with_struct("app", "Target", 4, vec![FieldShape::new("value", "i32", 0)])
}

fn resolve_with_depth(provider: &mut InMemoryProvider, roots: &[&str], max_depth: usize) -> ResolvedGraph
{
    let queries: Vec<TypeQuery> = roots.iter().map(|root| TypeQuery::name(*root)).collect();
    let mut resolver = Resolver::new(provider, "app").with_max_depth(max_depth);
    resolver.resolve_roots(&queries).unwrap();
    resolver.finish()
}

#[test]
fn test_depth_limit_does_not_depend_on_root_order()
{
    let target_first = resolve_with_depth(&mut alias_chain_fixture(), &["Target", "A1"], 1);
    let alias_first = resolve_with_depth(&mut alias_chain_fixture(), &["A1", "Target"], 1);
    assert_eq!(keys(&target_first), keys(&alias_first));

    let target_key = TypeKey::named("app", "Target");
    for graph in [&target_first, &alias_first] {
        let target = graph.lookup(&target_key).unwrap();
        assert!(matches!(graph.get(target), TypeInstance::Aggregate(user) if user.name == "Target"));

        let truncated = graph
            .lookup(&TypeKey::Truncated {
                module: "app".into(),
                query: TypeQuery::name("Target"),
            })
            .unwrap();
        assert!(graph.get(truncated).is_undefined());
        assert!(graph.roots().contains(&target));
        assert!(graph.roots().contains(&truncated));
        assert_eq!(graph.diagnostics().len(), 1);
        assert!(matches!(graph.diagnostics()[0].error, TypeError::DepthLimit { limit: 1, .. }));
    }
}

#[test]
fn test_shallow_answer_is_not_reused_past_the_limit()
{
    // Reached from A1, the chain A2 -> Target needs one more level than is left.
    let graph = resolve_with_depth(&mut alias_chain_fixture(), &["A2", "A1"], 1);
    let target = graph.lookup(&TypeKey::named("app", "Target")).unwrap();
    assert_eq!(graph.roots()[0], target);
    assert!(graph.get(graph.roots()[1]).is_undefined());
}

#[test]
fn test_alias_chain_within_limit_reaches_target()
{
    let graph = resolve_with_depth(&mut alias_chain_fixture(), &["A1"], 2);
    let target = graph.lookup(&TypeKey::named("app", "Target")).unwrap();
    assert_eq!(graph.roots(), &[target]);
    assert!(graph.diagnostics().is_empty());
}
