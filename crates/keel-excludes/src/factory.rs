use std::collections::BTreeSet;
use std::sync::Arc;

use keel_ids::ModuleIdentifier;

use crate::spec::{ExcludeSpec, IvyPatternExclude, PatternMatcher};

/// Constructs and combines [`ExcludeSpec`]s.
///
/// Implementations are stacked as decorators (optimizing, normalizing,
/// caching, base); the provided `from_*` helpers mirror the size-dispatching
/// convenience constructors every layer shares.
pub trait ExcludeFactory: Send + Sync {
    fn nothing(&self) -> Arc<ExcludeSpec>;
    fn everything(&self) -> Arc<ExcludeSpec>;
    fn group(&self, group: &str) -> Arc<ExcludeSpec>;
    fn module(&self, module: &str) -> Arc<ExcludeSpec>;
    fn module_id(&self, id: ModuleIdentifier) -> Arc<ExcludeSpec>;
    fn group_set(&self, groups: BTreeSet<String>) -> Arc<ExcludeSpec>;
    fn module_set(&self, modules: BTreeSet<String>) -> Arc<ExcludeSpec>;
    fn module_id_set(&self, ids: BTreeSet<ModuleIdentifier>) -> Arc<ExcludeSpec>;
    fn artifact(&self, id: ModuleIdentifier, artifact: &str) -> Arc<ExcludeSpec>;
    fn ivy_pattern(
        &self,
        id: ModuleIdentifier,
        artifact: Option<&str>,
        matcher: PatternMatcher,
    ) -> Arc<ExcludeSpec>;
    fn any_of(&self, one: Arc<ExcludeSpec>, two: Arc<ExcludeSpec>) -> Arc<ExcludeSpec>;
    fn all_of(&self, one: Arc<ExcludeSpec>, two: Arc<ExcludeSpec>) -> Arc<ExcludeSpec>;
    fn any_of_list(&self, specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec>;
    fn all_of_list(&self, specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec>;

    fn from_module_ids(&self, ids: BTreeSet<ModuleIdentifier>) -> Arc<ExcludeSpec> {
        match ids.len() {
            0 => self.nothing(),
            1 => self.module_id(first(ids)),
            _ => self.module_id_set(ids),
        }
    }

    fn from_groups(&self, groups: BTreeSet<String>) -> Arc<ExcludeSpec> {
        match groups.len() {
            0 => self.nothing(),
            1 => self.group(&first(groups)),
            _ => self.group_set(groups),
        }
    }

    fn from_modules(&self, modules: BTreeSet<String>) -> Arc<ExcludeSpec> {
        match modules.len() {
            0 => self.nothing(),
            1 => self.module(&first(modules)),
            _ => self.module_set(modules),
        }
    }

    /// Builds the union of an arbitrary collection of specs, collapsing the
    /// empty and singleton cases.
    fn from_union(&self, mut specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        specs.sort_unstable();
        specs.dedup();
        match specs.len() {
            0 => self.nothing(),
            1 => specs.remove(0),
            _ => self.any_of_list(specs),
        }
    }
}

fn first<T: Ord>(set: BTreeSet<T>) -> T {
    let Some(value) = set.into_iter().next() else {
        unreachable!("size checked by caller");
    };
    value
}

/// Raw constructors with no simplification beyond the canonical operand order
/// composite variants require.
pub struct DefaultExcludeFactory {
    nothing: Arc<ExcludeSpec>,
    everything: Arc<ExcludeSpec>,
}

impl DefaultExcludeFactory {
    pub fn new() -> Self {
        Self {
            nothing: Arc::new(ExcludeSpec::Nothing),
            everything: Arc::new(ExcludeSpec::Everything),
        }
    }
}

impl Default for DefaultExcludeFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonicalizes composite operands: sorted and deduplicated, so equal unions
/// and intersections compare equal whatever order their parts arrived in.
fn canonical(mut components: Vec<Arc<ExcludeSpec>>) -> Vec<Arc<ExcludeSpec>> {
    components.sort_unstable();
    components.dedup();
    components
}

impl ExcludeFactory for DefaultExcludeFactory {
    fn nothing(&self) -> Arc<ExcludeSpec> {
        Arc::clone(&self.nothing)
    }

    fn everything(&self) -> Arc<ExcludeSpec> {
        Arc::clone(&self.everything)
    }

    fn group(&self, group: &str) -> Arc<ExcludeSpec> {
        Arc::new(ExcludeSpec::Group(group.to_string()))
    }

    fn module(&self, module: &str) -> Arc<ExcludeSpec> {
        Arc::new(ExcludeSpec::Module(module.to_string()))
    }

    fn module_id(&self, id: ModuleIdentifier) -> Arc<ExcludeSpec> {
        Arc::new(ExcludeSpec::ModuleId(id))
    }

    fn group_set(&self, groups: BTreeSet<String>) -> Arc<ExcludeSpec> {
        Arc::new(ExcludeSpec::GroupSet(groups))
    }

    fn module_set(&self, modules: BTreeSet<String>) -> Arc<ExcludeSpec> {
        Arc::new(ExcludeSpec::ModuleSet(modules))
    }

    fn module_id_set(&self, ids: BTreeSet<ModuleIdentifier>) -> Arc<ExcludeSpec> {
        Arc::new(ExcludeSpec::ModuleIdSet(ids))
    }

    fn artifact(&self, id: ModuleIdentifier, artifact: &str) -> Arc<ExcludeSpec> {
        Arc::new(ExcludeSpec::Artifact(id, artifact.to_string()))
    }

    fn ivy_pattern(
        &self,
        id: ModuleIdentifier,
        artifact: Option<&str>,
        matcher: PatternMatcher,
    ) -> Arc<ExcludeSpec> {
        Arc::new(ExcludeSpec::IvyPattern(IvyPatternExclude {
            group: id.group().to_string(),
            module: id.name().to_string(),
            artifact: artifact.map(str::to_string),
            matcher,
        }))
    }

    fn any_of(&self, one: Arc<ExcludeSpec>, two: Arc<ExcludeSpec>) -> Arc<ExcludeSpec> {
        self.any_of_list(vec![one, two])
    }

    fn all_of(&self, one: Arc<ExcludeSpec>, two: Arc<ExcludeSpec>) -> Arc<ExcludeSpec> {
        self.all_of_list(vec![one, two])
    }

    fn any_of_list(&self, specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        let mut components = canonical(specs);
        match components.len() {
            0 => self.nothing(),
            1 => components.remove(0),
            _ => Arc::new(ExcludeSpec::AnyOf(components)),
        }
    }

    fn all_of_list(&self, specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        let mut components = canonical(specs);
        match components.len() {
            0 => self.everything(),
            1 => components.remove(0),
            _ => Arc::new(ExcludeSpec::AllOf(components)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_operands_are_order_insensitive() {
        let factory = DefaultExcludeFactory::new();
        let a = factory.group("a");
        let b = factory.group("b");
        let left = factory.any_of(a.clone(), b.clone());
        let right = factory.any_of(b, a);
        assert_eq!(left, right);
    }

    #[test]
    fn duplicate_operands_collapse() {
        let factory = DefaultExcludeFactory::new();
        let a = factory.group("a");
        let both = factory.all_of(a.clone(), a.clone());
        assert_eq!(*both, *a);
    }
}
