//! Pairwise intersection simplification.
//!
//! Each rule produces a single spec with the same accept semantics as the
//! conjunction of its operands, or `None` when no targeted rule applies and
//! the caller must fall back to an explicit `AllOf`.

use std::collections::BTreeSet;
use std::sync::Arc;

use keel_ids::ModuleIdentifier;

use crate::factory::ExcludeFactory;
use crate::spec::ExcludeSpec;

pub(crate) fn try_intersect(
    left: &Arc<ExcludeSpec>,
    right: &Arc<ExcludeSpec>,
    factory: &dyn ExcludeFactory,
) -> Option<Arc<ExcludeSpec>> {
    if left == right {
        return Some(Arc::clone(left));
    }
    match (&**left, &**right) {
        (ExcludeSpec::Nothing, _) | (_, ExcludeSpec::Nothing) => Some(factory.nothing()),
        (ExcludeSpec::Everything, _) => Some(Arc::clone(right)),
        (_, ExcludeSpec::Everything) => Some(Arc::clone(left)),
        (ExcludeSpec::AnyOf(lhs), ExcludeSpec::AnyOf(rhs)) => {
            Some(intersect_any_with_any(lhs, rhs, factory))
        }
        (ExcludeSpec::AnyOf(components), _) => {
            intersect_any_with_base(components, right, factory)
        }
        (_, ExcludeSpec::AnyOf(components)) => intersect_any_with_base(components, left, factory),
        _ => intersect_ordered(left, right, factory)
            .or_else(|| intersect_ordered(right, left, factory)),
    }
}

/// `(A ∪ B) ∩ (C ∪ D)`: factor out common components first; failing that,
/// distribute fully.
fn intersect_any_with_any(
    lhs: &[Arc<ExcludeSpec>],
    rhs: &[Arc<ExcludeSpec>],
    factory: &dyn ExcludeFactory,
) -> Arc<ExcludeSpec> {
    let common: Vec<Arc<ExcludeSpec>> = lhs
        .iter()
        .filter(|spec| rhs.contains(spec))
        .cloned()
        .collect();
    if !common.is_empty() {
        let alpha = factory.from_union(common.clone());
        if common.len() == lhs.len() || common.len() == rhs.len() {
            return alpha;
        }
        let remainder = |side: &[Arc<ExcludeSpec>]| -> Vec<Arc<ExcludeSpec>> {
            side.iter()
                .filter(|spec| !common.contains(spec))
                .cloned()
                .collect()
        };
        let union_left = factory.from_union(remainder(lhs));
        let union_right = factory.from_union(remainder(rhs));
        let beta = factory.all_of(union_left, union_right);
        return factory.any_of(alpha, beta);
    }
    // Slowest path, full distribution:
    // (A ∪ B) ∩ (C ∪ D) = (A ∩ C) ∪ (A ∩ D) ∪ (B ∩ C) ∪ (B ∩ D)
    let mut parts: Vec<Arc<ExcludeSpec>> = Vec::with_capacity(lhs.len() * rhs.len());
    for left_spec in lhs {
        for right_spec in rhs {
            let merged = try_intersect(left_spec, right_spec, factory)
                .unwrap_or_else(|| factory.all_of(Arc::clone(left_spec), Arc::clone(right_spec)));
            if !matches!(*merged, ExcludeSpec::Nothing) {
                parts.push(merged);
            }
        }
    }
    factory.from_union(parts)
}

/// `A ∩ (B ∪ C)` distributes if, and only if, at least one of the pairwise
/// intersections simplifies; otherwise distribution would only grow the tree.
fn intersect_any_with_base(
    components: &[Arc<ExcludeSpec>],
    other: &Arc<ExcludeSpec>,
    factory: &dyn ExcludeFactory,
) -> Option<Arc<ExcludeSpec>> {
    let simplified: Vec<Option<Arc<ExcludeSpec>>> = components
        .iter()
        .map(|component| try_intersect(component, other, factory))
        .collect();
    if simplified.iter().all(Option::is_none) {
        return None;
    }
    let mut parts: Vec<Arc<ExcludeSpec>> = Vec::with_capacity(components.len());
    for (component, merged) in components.iter().zip(simplified) {
        match merged {
            Some(spec) => {
                if !matches!(*spec, ExcludeSpec::Nothing) {
                    parts.push(spec);
                }
            }
            None => parts.push(factory.all_of(Arc::clone(component), Arc::clone(other))),
        }
    }
    Some(factory.from_union(parts))
}

/// The leaf-variant rules, canonical direction; [`try_intersect`] tries both
/// orientations. Operand equality has been tested by the caller, so
/// same-variant singleton cases know their payloads differ.
fn intersect_ordered(
    left: &Arc<ExcludeSpec>,
    right: &Arc<ExcludeSpec>,
    factory: &dyn ExcludeFactory,
) -> Option<Arc<ExcludeSpec>> {
    match (&**left, &**right) {
        (ExcludeSpec::Group(_), ExcludeSpec::Group(_)) => Some(factory.nothing()),
        (ExcludeSpec::Group(group), ExcludeSpec::ModuleId(id)) => {
            if id.group() == group {
                Some(Arc::clone(right))
            } else {
                Some(factory.nothing())
            }
        }
        (ExcludeSpec::Group(group), ExcludeSpec::GroupSet(groups)) => {
            if groups.contains(group) {
                Some(Arc::clone(left))
            } else {
                Some(factory.nothing())
            }
        }
        (ExcludeSpec::Group(group), ExcludeSpec::ModuleIdSet(ids)) => {
            let filtered: BTreeSet<ModuleIdentifier> = ids
                .iter()
                .filter(|id| id.group() == group)
                .cloned()
                .collect();
            Some(factory.from_module_ids(filtered))
        }
        (ExcludeSpec::Group(group), ExcludeSpec::Module(module)) => {
            Some(factory.module_id(ModuleIdentifier::new(group.clone(), module.clone())))
        }
        (ExcludeSpec::Group(group), ExcludeSpec::ModuleSet(modules)) => {
            let ids: BTreeSet<ModuleIdentifier> = modules
                .iter()
                .map(|module| ModuleIdentifier::new(group.clone(), module.clone()))
                .collect();
            Some(factory.from_module_ids(ids))
        }
        (ExcludeSpec::GroupSet(lhs), ExcludeSpec::GroupSet(rhs)) => {
            let common: BTreeSet<String> = lhs.intersection(rhs).cloned().collect();
            Some(factory.from_groups(common))
        }
        (ExcludeSpec::GroupSet(groups), ExcludeSpec::ModuleId(id)) => {
            if groups.contains(id.group()) {
                Some(Arc::clone(right))
            } else {
                Some(factory.nothing())
            }
        }
        (ExcludeSpec::GroupSet(groups), ExcludeSpec::ModuleIdSet(ids)) => {
            let filtered: BTreeSet<ModuleIdentifier> = ids
                .iter()
                .filter(|id| groups.contains(id.group()))
                .cloned()
                .collect();
            Some(factory.from_module_ids(filtered))
        }
        (ExcludeSpec::GroupSet(groups), ExcludeSpec::Module(module)) => {
            let ids: BTreeSet<ModuleIdentifier> = groups
                .iter()
                .map(|group| ModuleIdentifier::new(group.clone(), module.clone()))
                .collect();
            Some(factory.from_module_ids(ids))
        }
        (ExcludeSpec::GroupSet(groups), ExcludeSpec::ModuleSet(modules)) => {
            let ids: BTreeSet<ModuleIdentifier> = groups
                .iter()
                .flat_map(|group| {
                    modules
                        .iter()
                        .map(move |module| ModuleIdentifier::new(group.clone(), module.clone()))
                })
                .collect();
            Some(factory.from_module_ids(ids))
        }
        (ExcludeSpec::Module(_), ExcludeSpec::Module(_)) => Some(factory.nothing()),
        (ExcludeSpec::Module(module), ExcludeSpec::ModuleId(id)) => {
            if id.name() == module {
                Some(Arc::clone(right))
            } else {
                Some(factory.nothing())
            }
        }
        (ExcludeSpec::Module(module), ExcludeSpec::ModuleSet(modules)) => {
            if modules.contains(module) {
                Some(Arc::clone(left))
            } else {
                Some(factory.nothing())
            }
        }
        (ExcludeSpec::Module(module), ExcludeSpec::ModuleIdSet(ids)) => {
            let filtered: BTreeSet<ModuleIdentifier> = ids
                .iter()
                .filter(|id| id.name() == module)
                .cloned()
                .collect();
            Some(factory.from_module_ids(filtered))
        }
        (ExcludeSpec::ModuleId(_), ExcludeSpec::ModuleId(_)) => Some(factory.nothing()),
        (ExcludeSpec::ModuleId(id), ExcludeSpec::ModuleIdSet(ids)) => {
            if ids.contains(id) {
                Some(Arc::clone(left))
            } else {
                Some(factory.nothing())
            }
        }
        (ExcludeSpec::ModuleId(id), ExcludeSpec::ModuleSet(modules)) => {
            if modules.contains(id.name()) {
                Some(Arc::clone(left))
            } else {
                Some(factory.nothing())
            }
        }
        (ExcludeSpec::ModuleIdSet(lhs), ExcludeSpec::ModuleIdSet(rhs)) => {
            let common: BTreeSet<ModuleIdentifier> = lhs.intersection(rhs).cloned().collect();
            Some(factory.from_module_ids(common))
        }
        (ExcludeSpec::ModuleIdSet(ids), ExcludeSpec::ModuleSet(modules)) => {
            let filtered: BTreeSet<ModuleIdentifier> = ids
                .iter()
                .filter(|id| modules.contains(id.name()))
                .cloned()
                .collect();
            Some(factory.from_module_ids(filtered))
        }
        (ExcludeSpec::ModuleSet(lhs), ExcludeSpec::ModuleSet(rhs)) => {
            let common: BTreeSet<String> = lhs.intersection(rhs).cloned().collect();
            Some(factory.from_modules(common))
        }
        // Artifact and ivy-pattern excludes have no targeted rules; the
        // caller keeps the explicit intersection.
        _ => None,
    }
}
