//! Pairwise union simplification.
//!
//! Attempts to merge two exclude specs into one spec with the same accept
//! semantics. Returns `None` when no targeted rule applies; the caller then
//! falls back to an explicit `AnyOf`.

use std::collections::BTreeSet;
use std::sync::Arc;

use keel_ids::ModuleIdentifier;

use crate::factory::ExcludeFactory;
use crate::spec::ExcludeSpec;

pub(crate) fn try_union(
    left: &Arc<ExcludeSpec>,
    right: &Arc<ExcludeSpec>,
    factory: &dyn ExcludeFactory,
) -> Option<Arc<ExcludeSpec>> {
    if left == right {
        return Some(Arc::clone(left));
    }
    match (&**left, &**right) {
        (ExcludeSpec::Everything, _) | (_, ExcludeSpec::Everything) => Some(factory.everything()),
        (ExcludeSpec::Nothing, _) => Some(Arc::clone(right)),
        (_, ExcludeSpec::Nothing) => Some(Arc::clone(left)),
        _ => union_ordered(left, right, factory).or_else(|| union_ordered(right, left, factory)),
    }
}

/// The directional rules: `left` is the broader "coordinate" exclude and
/// `right` the module-id exclude it may absorb. [`try_union`] tries both
/// orientations.
fn union_ordered(
    left: &Arc<ExcludeSpec>,
    right: &Arc<ExcludeSpec>,
    factory: &dyn ExcludeFactory,
) -> Option<Arc<ExcludeSpec>> {
    match (&**left, &**right) {
        // A group exclude subsumes any id sharing that group.
        (ExcludeSpec::Group(group), ExcludeSpec::ModuleId(id)) if id.group() == group => {
            Some(Arc::clone(left))
        }
        (ExcludeSpec::Group(group), ExcludeSpec::ModuleIdSet(ids)) => {
            absorb_ids(left, ids, factory, |id| id.group() == group)
        }
        (ExcludeSpec::GroupSet(groups), ExcludeSpec::ModuleId(id))
            if groups.contains(id.group()) =>
        {
            Some(Arc::clone(left))
        }
        (ExcludeSpec::GroupSet(groups), ExcludeSpec::ModuleIdSet(ids)) => {
            absorb_ids(left, ids, factory, |id| groups.contains(id.group()))
        }
        // Same for module-name excludes.
        (ExcludeSpec::Module(module), ExcludeSpec::ModuleId(id)) if id.name() == module => {
            Some(Arc::clone(left))
        }
        (ExcludeSpec::Module(module), ExcludeSpec::ModuleIdSet(ids)) => {
            absorb_ids(left, ids, factory, |id| id.name() == module)
        }
        (ExcludeSpec::ModuleSet(modules), ExcludeSpec::ModuleId(id))
            if modules.contains(id.name()) =>
        {
            Some(Arc::clone(left))
        }
        (ExcludeSpec::ModuleSet(modules), ExcludeSpec::ModuleIdSet(ids)) => {
            absorb_ids(left, ids, factory, |id| modules.contains(id.name()))
        }
        _ => None,
    }
}

/// Partitions `ids` into members already covered by `covering` vs not. All
/// covered: the id set is absorbed entirely. None covered: no simplification.
/// Otherwise the union shrinks to `covering ∪ remainder`.
fn absorb_ids(
    covering: &Arc<ExcludeSpec>,
    ids: &BTreeSet<ModuleIdentifier>,
    factory: &dyn ExcludeFactory,
    covered: impl Fn(&ModuleIdentifier) -> bool,
) -> Option<Arc<ExcludeSpec>> {
    let remaining: BTreeSet<ModuleIdentifier> =
        ids.iter().filter(|id| !covered(id)).cloned().collect();
    if remaining.is_empty() {
        return Some(Arc::clone(covering));
    }
    if remaining.len() == ids.len() {
        return None;
    }
    Some(factory.any_of(Arc::clone(covering), factory.from_module_ids(remaining)))
}
