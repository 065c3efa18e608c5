//! Checks that the optimizing/normalizing/caching chain never changes the
//! meaning of a composition: whatever the simplifier does, accept/reject
//! answers must match the naive, unoptimized composition.

use std::collections::BTreeSet;
use std::sync::Arc;

use keel_excludes::{
    DefaultExcludeFactory, ExcludeFactory, ExcludeSpec, ModuleExclusions, PatternMatcher,
};
use keel_ids::ModuleIdentifier;

fn id(group: &str, name: &str) -> ModuleIdentifier {
    ModuleIdentifier::new(group, name)
}

fn sample_modules() -> Vec<ModuleIdentifier> {
    let groups = ["g1", "g2", "g3", "org.acme"];
    let names = ["m1", "m2", "api", "core"];
    let mut modules = Vec::new();
    for group in groups {
        for name in names {
            modules.push(id(group, name));
        }
    }
    modules
}

fn sample_artifacts() -> Vec<String> {
    vec![
        "m1-1.0.jar".to_string(),
        "api-2.0.jar".to_string(),
        "core-sources.jar".to_string(),
    ]
}

/// Builds matching spec pairs (optimized chain, naive base factory) from a
/// shared recipe so both sides describe the same rule set.
fn build_pairs(
    exclusions: &ModuleExclusions,
    base: &DefaultExcludeFactory,
) -> Vec<(Arc<ExcludeSpec>, Arc<ExcludeSpec>)> {
    let set = |values: &[&str]| -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    };
    let id_set = |pairs: &[(&str, &str)]| -> BTreeSet<ModuleIdentifier> {
        pairs.iter().map(|(g, n)| id(g, n)).collect()
    };

    vec![
        (exclusions.nothing(), base.nothing()),
        (exclusions.everything(), base.everything()),
        (exclusions.group("g1"), base.group("g1")),
        (exclusions.module("api"), base.module("api")),
        (exclusions.module_id(id("g2", "m2")), base.module_id(id("g2", "m2"))),
        (
            exclusions.group_set(set(&["g1", "g3"])),
            base.group_set(set(&["g1", "g3"])),
        ),
        (
            exclusions.module_set(set(&["m1", "core"])),
            base.module_set(set(&["m1", "core"])),
        ),
        (
            exclusions.module_id_set(id_set(&[("g1", "m1"), ("g2", "api")])),
            base.module_id_set(id_set(&[("g1", "m1"), ("g2", "api")])),
        ),
        (
            exclusions.artifact(id("g1", "m1"), "m1-*.jar"),
            base.artifact(id("g1", "m1"), "m1-*.jar"),
        ),
        (
            exclusions.ivy_pattern_exclude(id("org.*", "*"), None, PatternMatcher::Glob),
            base.ivy_pattern(id("org.*", "*"), None, PatternMatcher::Glob),
        ),
    ]
}

fn assert_same_semantics(optimized: &ExcludeSpec, naive: &ExcludeSpec) {
    for module in sample_modules() {
        assert_eq!(
            optimized.excludes_module(&module),
            naive.excludes_module(&module),
            "module acceptance diverged for {module} between {optimized} and {naive}"
        );
        for artifact in sample_artifacts() {
            assert_eq!(
                optimized.excludes_artifact(&module, &artifact),
                naive.excludes_artifact(&module, &artifact),
                "artifact acceptance diverged for {module}/{artifact}"
            );
        }
    }
}

#[test]
fn pairwise_compositions_preserve_semantics() {
    let exclusions = ModuleExclusions::new();
    let base = DefaultExcludeFactory::new();
    let pairs = build_pairs(&exclusions, &base);

    for (left_optimized, left_naive) in &pairs {
        for (right_optimized, right_naive) in &pairs {
            let optimized =
                exclusions.any_of(Arc::clone(left_optimized), Arc::clone(right_optimized));
            let naive = base.any_of(Arc::clone(left_naive), Arc::clone(right_naive));
            assert_same_semantics(&optimized, &naive);

            let optimized =
                exclusions.all_of(Arc::clone(left_optimized), Arc::clone(right_optimized));
            let naive = base.all_of(Arc::clone(left_naive), Arc::clone(right_naive));
            assert_same_semantics(&optimized, &naive);
        }
    }
}

#[test]
fn nested_compositions_preserve_semantics() {
    let exclusions = ModuleExclusions::new();
    let base = DefaultExcludeFactory::new();
    let pairs = build_pairs(&exclusions, &base);

    // Union-of-intersections and intersection-of-unions over rotating
    // operand triples.
    for offset in 0..pairs.len() {
        let pick = |index: usize| &pairs[(offset + index) % pairs.len()];
        let (a_opt, a_naive) = pick(0);
        let (b_opt, b_naive) = pick(3);
        let (c_opt, c_naive) = pick(5);

        let optimized = exclusions.any_of(
            exclusions.all_of(Arc::clone(a_opt), Arc::clone(b_opt)),
            Arc::clone(c_opt),
        );
        let naive = base.any_of(
            base.all_of(Arc::clone(a_naive), Arc::clone(b_naive)),
            Arc::clone(c_naive),
        );
        assert_same_semantics(&optimized, &naive);

        let optimized = exclusions.all_of(
            exclusions.any_of(Arc::clone(a_opt), Arc::clone(b_opt)),
            exclusions.any_of(Arc::clone(b_opt), Arc::clone(c_opt)),
        );
        let naive = base.all_of(
            base.any_of(Arc::clone(a_naive), Arc::clone(b_naive)),
            base.any_of(Arc::clone(b_naive), Arc::clone(c_naive)),
        );
        assert_same_semantics(&optimized, &naive);
    }
}

#[test]
fn commutativity_of_meaning() {
    let exclusions = ModuleExclusions::new();
    let pairs = build_pairs(&exclusions, &DefaultExcludeFactory::new());
    for (left, _) in &pairs {
        for (right, _) in &pairs {
            let one = exclusions.all_of(Arc::clone(left), Arc::clone(right));
            let two = exclusions.all_of(Arc::clone(right), Arc::clone(left));
            assert_same_semantics(&one, &two);
            let one = exclusions.any_of(Arc::clone(left), Arc::clone(right));
            let two = exclusions.any_of(Arc::clone(right), Arc::clone(left));
            assert_same_semantics(&one, &two);
        }
    }
}
