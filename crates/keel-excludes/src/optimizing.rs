use std::collections::BTreeSet;
use std::sync::Arc;

use keel_ids::ModuleIdentifier;

use crate::factory::ExcludeFactory;
use crate::spec::{ExcludeSpec, PatternMatcher};

/// Fast paths in front of the heavier normalization: identity and absorbing
/// operands are resolved immediately, and small collections are dispatched to
/// the pairwise forms before any flattening machinery runs.
pub struct OptimizingExcludeFactory<F> {
    delegate: F,
}

impl<F: ExcludeFactory> OptimizingExcludeFactory<F> {
    pub fn new(delegate: F) -> Self {
        Self { delegate }
    }
}

impl<F: ExcludeFactory> ExcludeFactory for OptimizingExcludeFactory<F> {
    fn nothing(&self) -> Arc<ExcludeSpec> {
        self.delegate.nothing()
    }

    fn everything(&self) -> Arc<ExcludeSpec> {
        self.delegate.everything()
    }

    fn group(&self, group: &str) -> Arc<ExcludeSpec> {
        self.delegate.group(group)
    }

    fn module(&self, module: &str) -> Arc<ExcludeSpec> {
        self.delegate.module(module)
    }

    fn module_id(&self, id: ModuleIdentifier) -> Arc<ExcludeSpec> {
        self.delegate.module_id(id)
    }

    fn group_set(&self, groups: BTreeSet<String>) -> Arc<ExcludeSpec> {
        self.delegate.group_set(groups)
    }

    fn module_set(&self, modules: BTreeSet<String>) -> Arc<ExcludeSpec> {
        self.delegate.module_set(modules)
    }

    fn module_id_set(&self, ids: BTreeSet<ModuleIdentifier>) -> Arc<ExcludeSpec> {
        self.delegate.module_id_set(ids)
    }

    fn artifact(&self, id: ModuleIdentifier, artifact: &str) -> Arc<ExcludeSpec> {
        self.delegate.artifact(id, artifact)
    }

    fn ivy_pattern(
        &self,
        id: ModuleIdentifier,
        artifact: Option<&str>,
        matcher: PatternMatcher,
    ) -> Arc<ExcludeSpec> {
        self.delegate.ivy_pattern(id, artifact, matcher)
    }

    fn any_of(&self, one: Arc<ExcludeSpec>, two: Arc<ExcludeSpec>) -> Arc<ExcludeSpec> {
        match (&*one, &*two) {
            (ExcludeSpec::Nothing, _) => two,
            (_, ExcludeSpec::Nothing) => one,
            (ExcludeSpec::Everything, _) | (_, ExcludeSpec::Everything) => self.everything(),
            _ if one == two => one,
            _ => self.delegate.any_of(one, two),
        }
    }

    fn all_of(&self, one: Arc<ExcludeSpec>, two: Arc<ExcludeSpec>) -> Arc<ExcludeSpec> {
        match (&*one, &*two) {
            (ExcludeSpec::Nothing, _) | (_, ExcludeSpec::Nothing) => self.nothing(),
            (ExcludeSpec::Everything, _) => two,
            (_, ExcludeSpec::Everything) => one,
            _ if one == two => one,
            _ => self.delegate.all_of(one, two),
        }
    }

    fn any_of_list(&self, mut specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        match specs.len() {
            0 => self.nothing(),
            1 => specs.remove(0),
            2 => {
                let two = specs.remove(1);
                let one = specs.remove(0);
                self.any_of(one, two)
            }
            _ => self.delegate.any_of_list(specs),
        }
    }

    fn all_of_list(&self, mut specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        match specs.len() {
            0 => self.everything(),
            1 => specs.remove(0),
            2 => {
                let two = specs.remove(1);
                let one = specs.remove(0);
                self.all_of(one, two)
            }
            _ => self.delegate.all_of_list(specs),
        }
    }
}
