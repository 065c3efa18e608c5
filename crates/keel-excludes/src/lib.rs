//! Exclude-rule resolution for dependency graphs.
//!
//! This crate implements the exclusion predicates a dependency graph resolver
//! combines while walking edges:
//! - [`ExcludeSpec`]: a closed family of composable exclusion predicates over
//!   module coordinates and artifact file names
//! - the factory decorator chain ([`OptimizingExcludeFactory`] →
//!   [`NormalizingExcludeFactory`] → [`CachingExcludeFactory`] →
//!   [`DefaultExcludeFactory`]) which flattens, simplifies and memoizes
//!   unions/intersections
//! - [`ModuleExclusions`]: the facade wiring the chain together
//!
//! Construction is synchronous and side-effect-free apart from the caches,
//! which are safe for concurrent use from parallel resolution threads.
//! Specs are shared via `Arc`: commutatively equivalent `any_of`/`all_of`
//! calls return pointer-identical instances for the lifetime of the facade.

mod caching;
mod factory;
mod intersections;
mod normalizing;
mod optimizing;
mod spec;
mod unions;

use std::collections::BTreeSet;
use std::sync::Arc;

use keel_ids::ModuleIdentifier;

pub use caching::CachingExcludeFactory;
pub use factory::{DefaultExcludeFactory, ExcludeFactory};
pub use normalizing::NormalizingExcludeFactory;
pub use optimizing::OptimizingExcludeFactory;
pub use spec::{ExcludeSpec, IvyPatternExclude, PatternMatcher};

type FactoryChain =
    OptimizingExcludeFactory<NormalizingExcludeFactory<CachingExcludeFactory<DefaultExcludeFactory>>>;

/// The exclude factory a dependency graph resolver talks to: the full
/// decorator chain, scoped to one resolution session. Discard it when the
/// graph walk finishes; the memoization caches are unbounded.
pub struct ModuleExclusions {
    chain: FactoryChain,
}

impl ModuleExclusions {
    pub fn new() -> Self {
        Self {
            chain: OptimizingExcludeFactory::new(NormalizingExcludeFactory::new(
                CachingExcludeFactory::new(DefaultExcludeFactory::new()),
            )),
        }
    }

    pub fn nothing(&self) -> Arc<ExcludeSpec> {
        self.chain.nothing()
    }

    pub fn everything(&self) -> Arc<ExcludeSpec> {
        self.chain.everything()
    }

    pub fn group(&self, group: &str) -> Arc<ExcludeSpec> {
        self.chain.group(group)
    }

    pub fn module(&self, module: &str) -> Arc<ExcludeSpec> {
        self.chain.module(module)
    }

    pub fn module_id(&self, id: ModuleIdentifier) -> Arc<ExcludeSpec> {
        self.chain.module_id(id)
    }

    pub fn group_set(&self, groups: BTreeSet<String>) -> Arc<ExcludeSpec> {
        self.chain.from_groups(groups)
    }

    pub fn module_set(&self, modules: BTreeSet<String>) -> Arc<ExcludeSpec> {
        self.chain.from_modules(modules)
    }

    pub fn module_id_set(&self, ids: BTreeSet<ModuleIdentifier>) -> Arc<ExcludeSpec> {
        self.chain.from_module_ids(ids)
    }

    pub fn artifact(&self, id: ModuleIdentifier, artifact: &str) -> Arc<ExcludeSpec> {
        self.chain.artifact(id, artifact)
    }

    pub fn ivy_pattern_exclude(
        &self,
        id: ModuleIdentifier,
        artifact: Option<&str>,
        matcher: PatternMatcher,
    ) -> Arc<ExcludeSpec> {
        self.chain.ivy_pattern(id, artifact, matcher)
    }

    pub fn any_of(&self, one: Arc<ExcludeSpec>, two: Arc<ExcludeSpec>) -> Arc<ExcludeSpec> {
        self.chain.any_of(one, two)
    }

    pub fn all_of(&self, one: Arc<ExcludeSpec>, two: Arc<ExcludeSpec>) -> Arc<ExcludeSpec> {
        self.chain.all_of(one, two)
    }

    pub fn any_of_list(&self, specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        self.chain.any_of_list(specs)
    }

    pub fn all_of_list(&self, specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        self.chain.all_of_list(specs)
    }

    /// The underlying factory, for callers that take the chain as a trait
    /// object.
    pub fn factory(&self) -> &dyn ExcludeFactory {
        &self.chain
    }
}

impl Default for ModuleExclusions {
    fn default() -> Self {
        Self::new()
    }
}
