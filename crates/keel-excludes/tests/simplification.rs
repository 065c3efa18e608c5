use std::collections::BTreeSet;
use std::sync::Arc;

use keel_excludes::{ExcludeSpec, ModuleExclusions};
use keel_ids::ModuleIdentifier;

fn id(group: &str, name: &str) -> ModuleIdentifier {
    ModuleIdentifier::new(group, name)
}

fn ids(pairs: &[(&str, &str)]) -> BTreeSet<ModuleIdentifier> {
    pairs.iter().map(|(g, n)| id(g, n)).collect()
}

fn names(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn all_of_nothing_short_circuits() {
    let exclusions = ModuleExclusions::new();
    let other = exclusions.group("org");
    let spec = exclusions.all_of(exclusions.nothing(), other.clone());
    assert_eq!(*spec, ExcludeSpec::Nothing);
    let spec = exclusions.all_of(other, exclusions.nothing());
    assert_eq!(*spec, ExcludeSpec::Nothing);
}

#[test]
fn any_of_everything_short_circuits() {
    let exclusions = ModuleExclusions::new();
    let other = exclusions.module("mod");
    let spec = exclusions.any_of(exclusions.everything(), other.clone());
    assert_eq!(*spec, ExcludeSpec::Everything);
    let spec = exclusions.any_of(other, exclusions.everything());
    assert_eq!(*spec, ExcludeSpec::Everything);
}

#[test]
fn short_circuits_apply_through_list_forms() {
    let exclusions = ModuleExclusions::new();
    let specs = vec![
        exclusions.group("a"),
        exclusions.nothing(),
        exclusions.module("b"),
    ];
    let spec = exclusions.all_of_list(specs);
    assert_eq!(*spec, ExcludeSpec::Nothing);

    let specs = vec![
        exclusions.group("a"),
        exclusions.everything(),
        exclusions.module("b"),
    ];
    let spec = exclusions.any_of_list(specs);
    assert_eq!(*spec, ExcludeSpec::Everything);
}

#[test]
fn group_absorbs_module_id_sharing_the_group() {
    let exclusions = ModuleExclusions::new();
    let spec = exclusions.any_of(
        exclusions.group("org.slf4j"),
        exclusions.module_id(id("org.slf4j", "slf4j-api")),
    );
    assert_eq!(*spec, ExcludeSpec::Group("org.slf4j".to_string()));
}

#[test]
fn module_absorbs_module_id_sharing_the_name() {
    let exclusions = ModuleExclusions::new();
    let spec = exclusions.any_of(
        exclusions.module("slf4j-api"),
        exclusions.module_id(id("org.slf4j", "slf4j-api")),
    );
    assert_eq!(*spec, ExcludeSpec::Module("slf4j-api".to_string()));
}

#[test]
fn group_set_absorbs_fully_covered_id_set() {
    let exclusions = ModuleExclusions::new();
    let spec = exclusions.any_of(
        exclusions.group_set(names(&["g1", "g2"])),
        exclusions.module_id_set(ids(&[("g1", "a"), ("g2", "b")])),
    );
    assert_eq!(*spec, ExcludeSpec::GroupSet(names(&["g1", "g2"])));
}

#[test]
fn group_set_splits_partially_covered_id_set() {
    let exclusions = ModuleExclusions::new();
    let spec = exclusions.any_of(
        exclusions.group_set(names(&["g1", "g2"])),
        exclusions.module_id_set(ids(&[("g1", "a"), ("g3", "b")])),
    );
    let ExcludeSpec::AnyOf(components) = &*spec else {
        panic!("expected a union, got {spec}");
    };
    assert_eq!(components.len(), 2);
    assert!(components
        .iter()
        .any(|c| **c == ExcludeSpec::GroupSet(names(&["g1", "g2"]))));
    assert!(components
        .iter()
        .any(|c| **c == ExcludeSpec::ModuleId(id("g3", "b"))));
}

#[test]
fn uncovered_id_set_is_not_simplified() {
    let exclusions = ModuleExclusions::new();
    let spec = exclusions.any_of(
        exclusions.module_set(names(&["m1", "m2"])),
        exclusions.module_id_set(ids(&[("g", "x"), ("g", "y")])),
    );
    let ExcludeSpec::AnyOf(components) = &*spec else {
        panic!("expected a union, got {spec}");
    };
    assert_eq!(components.len(), 2);
}

#[test]
fn singleton_excludes_merge_into_set_variants() {
    let exclusions = ModuleExclusions::new();
    let spec = exclusions.any_of(
        exclusions.module_id(id("a", "x")),
        exclusions.module_id(id("b", "y")),
    );
    assert_eq!(
        *spec,
        ExcludeSpec::ModuleIdSet(ids(&[("a", "x"), ("b", "y")]))
    );

    let spec = exclusions.any_of_list(vec![
        exclusions.group("g1"),
        exclusions.group("g2"),
        exclusions.group_set(names(&["g3"])),
    ]);
    assert_eq!(*spec, ExcludeSpec::GroupSet(names(&["g1", "g2", "g3"])));
}

#[test]
fn nested_unions_are_flattened() {
    let exclusions = ModuleExclusions::new();
    let inner = exclusions.any_of(
        exclusions.artifact(id("org", "foo"), "foo.jar"),
        exclusions.module("m"),
    );
    let spec = exclusions.any_of(inner, exclusions.artifact(id("org", "bar"), "bar.jar"));
    let ExcludeSpec::AnyOf(components) = &*spec else {
        panic!("expected a union, got {spec}");
    };
    assert_eq!(components.len(), 3);
    assert!(components
        .iter()
        .all(|c| !matches!(**c, ExcludeSpec::AnyOf(_))));
}

#[test]
fn intersection_of_disjoint_groups_is_nothing() {
    let exclusions = ModuleExclusions::new();
    let spec = exclusions.all_of(exclusions.group("g1"), exclusions.group("g2"));
    assert_eq!(*spec, ExcludeSpec::Nothing);
}

#[test]
fn intersection_of_group_and_module_is_the_module_id() {
    let exclusions = ModuleExclusions::new();
    let spec = exclusions.all_of(exclusions.group("org"), exclusions.module("api"));
    assert_eq!(*spec, ExcludeSpec::ModuleId(id("org", "api")));
}

#[test]
fn intersection_filters_id_sets_by_group() {
    let exclusions = ModuleExclusions::new();
    let spec = exclusions.all_of(
        exclusions.group("g1"),
        exclusions.module_id_set(ids(&[("g1", "a"), ("g2", "b")])),
    );
    assert_eq!(*spec, ExcludeSpec::ModuleId(id("g1", "a")));
}

#[test]
fn intersection_of_group_sets_keeps_common_groups() {
    let exclusions = ModuleExclusions::new();
    let spec = exclusions.all_of(
        exclusions.group_set(names(&["g1", "g2"])),
        exclusions.group_set(names(&["g2", "g3"])),
    );
    assert_eq!(*spec, ExcludeSpec::Group("g2".to_string()));
}

#[test]
fn intersection_distributes_over_union_when_it_simplifies() {
    let exclusions = ModuleExclusions::new();
    let union = exclusions.any_of(exclusions.group("g1"), exclusions.group("g2"));
    let spec = exclusions.all_of(union, exclusions.group("g1"));
    assert_eq!(*spec, ExcludeSpec::Group("g1".to_string()));
}

#[test]
fn commutative_calls_share_the_cached_instance() {
    let exclusions = ModuleExclusions::new();
    // A pair with no targeted simplification, so construction reaches the
    // caching layer.
    let artifact = exclusions.artifact(id("org", "foo"), "foo.jar");
    let pattern = exclusions.ivy_pattern_exclude(
        id("org", "*"),
        Some("*.jar"),
        keel_excludes::PatternMatcher::Glob,
    );
    let left = exclusions.all_of(artifact.clone(), pattern.clone());
    let right = exclusions.all_of(pattern.clone(), artifact.clone());
    assert!(matches!(*left, ExcludeSpec::AllOf(_)));
    assert!(Arc::ptr_eq(&left, &right));

    let left = exclusions.any_of_list(vec![
        artifact.clone(),
        pattern.clone(),
        exclusions.all_of(artifact.clone(), pattern.clone()),
    ]);
    let right = exclusions.any_of_list(vec![
        exclusions.all_of(pattern.clone(), artifact.clone()),
        pattern,
        artifact,
    ]);
    assert!(Arc::ptr_eq(&left, &right));
}

#[test]
fn duplicate_operands_collapse_to_one() {
    let exclusions = ModuleExclusions::new();
    let group = exclusions.group("g");
    let spec = exclusions.any_of(group.clone(), group.clone());
    assert!(Arc::ptr_eq(&spec, &group));
    let spec = exclusions.all_of(group.clone(), group.clone());
    assert!(Arc::ptr_eq(&spec, &group));
}
