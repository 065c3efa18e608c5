use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use keel_ids::ModuleIdentifier;

use crate::factory::ExcludeFactory;
use crate::intersections::try_intersect;
use crate::spec::{ExcludeSpec, PatternMatcher};
use crate::unions::try_union;

/// Normalizes compositions before they reach the raw constructors: flattens
/// nested same-kind compositions, short-circuits on absorbing elements
/// (`Everything` in a union, `Nothing` in an intersection), merges loose
/// singleton excludes into their set variants to bound structure size, and
/// runs the pairwise simplification rules to a fixed point.
///
/// Simplification is a pure optimization: the result always has the same
/// accept/reject semantics as the unoptimized composition.
pub struct NormalizingExcludeFactory<F> {
    delegate: F,
}

impl<F: ExcludeFactory> NormalizingExcludeFactory<F> {
    pub fn new(delegate: F) -> Self {
        Self { delegate }
    }

    fn do_union(&self, specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        let mut groups: BTreeSet<String> = BTreeSet::new();
        let mut modules: BTreeSet<String> = BTreeSet::new();
        let mut ids: BTreeSet<ModuleIdentifier> = BTreeSet::new();
        let mut worklist: VecDeque<Arc<ExcludeSpec>> = VecDeque::with_capacity(specs.len());

        // Flatten nested unions and bucket coordinate excludes so that any
        // number of group/module/id excludes collapses into one set variant.
        let mut flattened: VecDeque<Arc<ExcludeSpec>> = specs.into();
        while let Some(spec) = flattened.pop_front() {
            match &*spec {
                ExcludeSpec::AnyOf(components) => {
                    flattened.extend(components.iter().cloned());
                }
                ExcludeSpec::Everything => return self.everything(),
                ExcludeSpec::Nothing => {}
                ExcludeSpec::Group(group) => {
                    groups.insert(group.clone());
                }
                ExcludeSpec::GroupSet(set) => groups.extend(set.iter().cloned()),
                ExcludeSpec::Module(module) => {
                    modules.insert(module.clone());
                }
                ExcludeSpec::ModuleSet(set) => modules.extend(set.iter().cloned()),
                ExcludeSpec::ModuleId(id) => {
                    ids.insert(id.clone());
                }
                ExcludeSpec::ModuleIdSet(set) => ids.extend(set.iter().cloned()),
                _ => worklist.push_back(spec),
            }
        }
        if !groups.is_empty() {
            worklist.push_back(self.from_groups(groups));
        }
        if !modules.is_empty() {
            worklist.push_back(self.from_modules(modules));
        }
        if !ids.is_empty() {
            worklist.push_back(self.from_module_ids(ids));
        }

        let mut result: Vec<Arc<ExcludeSpec>> = Vec::new();
        'work: while let Some(candidate) = worklist.pop_front() {
            match &*candidate {
                ExcludeSpec::Everything => return self.everything(),
                ExcludeSpec::Nothing => continue,
                _ => {}
            }
            for index in 0..result.len() {
                if let Some(simplified) = try_union(&result[index], &candidate, self) {
                    result.remove(index);
                    // A simplification may itself be a union (partial
                    // absorption); feed its parts back to keep the final
                    // composition flat.
                    if let ExcludeSpec::AnyOf(components) = &*simplified {
                        worklist.extend(components.iter().cloned());
                    } else {
                        worklist.push_front(simplified);
                    }
                    continue 'work;
                }
            }
            result.push(candidate);
        }

        match result.len() {
            0 => self.nothing(),
            1 => take_single(result),
            2 => {
                let (one, two) = take_pair(result);
                self.delegate.any_of(one, two)
            }
            _ => self.delegate.any_of_list(result),
        }
    }

    fn do_intersect(&self, specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        let mut worklist: VecDeque<Arc<ExcludeSpec>> = VecDeque::with_capacity(specs.len());
        let mut flattened: VecDeque<Arc<ExcludeSpec>> = specs.into();
        while let Some(spec) = flattened.pop_front() {
            match &*spec {
                ExcludeSpec::AllOf(components) => {
                    flattened.extend(components.iter().cloned());
                }
                ExcludeSpec::Nothing => return self.nothing(),
                ExcludeSpec::Everything => {}
                _ => worklist.push_back(spec),
            }
        }

        let mut result: Vec<Arc<ExcludeSpec>> = Vec::new();
        'work: while let Some(candidate) = worklist.pop_front() {
            match &*candidate {
                ExcludeSpec::Nothing => return self.nothing(),
                ExcludeSpec::Everything => continue,
                _ => {}
            }
            for index in 0..result.len() {
                if let Some(simplified) = try_intersect(&result[index], &candidate, self) {
                    if matches!(*simplified, ExcludeSpec::Nothing) {
                        // An empty pairwise intersection empties the whole
                        // conjunction.
                        return self.nothing();
                    }
                    result.remove(index);
                    if let ExcludeSpec::AllOf(components) = &*simplified {
                        worklist.extend(components.iter().cloned());
                    } else {
                        worklist.push_front(simplified);
                    }
                    continue 'work;
                }
            }
            result.push(candidate);
        }

        match result.len() {
            0 => self.everything(),
            1 => take_single(result),
            2 => {
                let (one, two) = take_pair(result);
                self.delegate.all_of(one, two)
            }
            _ => self.delegate.all_of_list(result),
        }
    }
}

fn take_single(mut result: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
    let Some(single) = result.pop() else {
        unreachable!("size checked by caller");
    };
    single
}

fn take_pair(mut result: Vec<Arc<ExcludeSpec>>) -> (Arc<ExcludeSpec>, Arc<ExcludeSpec>) {
    let (Some(two), Some(one)) = (result.pop(), result.pop()) else {
        unreachable!("size checked by caller");
    };
    (one, two)
}

impl<F: ExcludeFactory> ExcludeFactory for NormalizingExcludeFactory<F> {
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
        self.do_union(vec![one, two])
    }

    fn all_of(&self, one: Arc<ExcludeSpec>, two: Arc<ExcludeSpec>) -> Arc<ExcludeSpec> {
        self.do_intersect(vec![one, two])
    }

    fn any_of_list(&self, specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        self.do_union(specs)
    }

    fn all_of_list(&self, specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        self.do_intersect(specs)
    }
}
