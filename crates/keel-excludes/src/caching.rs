use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use keel_ids::ModuleIdentifier;

use crate::factory::ExcludeFactory;
use crate::spec::{ExcludeSpec, PatternMatcher};

/// Memoizes `allOf`/`anyOf` results for the duration of one dependency graph
/// resolution, so that repeated graph edges reuse identical shared instances.
///
/// Keys are commutative-aware: pair keys normalize operand order by hash, and
/// list keys compare permutation-insensitively with an order-independent
/// hash. The caches never evict: identity reuse across a resolution session
/// is what downstream merge caches key on.
///
/// Concurrent lookups may race on a miss; both compute, but the first insert
/// wins and every caller gets the same canonical instance back. No lock is
/// held across the delegate call.
pub struct CachingExcludeFactory<F> {
    delegate: F,
    any_pairs: Mutex<HashMap<ExcludePair, Arc<ExcludeSpec>>>,
    all_pairs: Mutex<HashMap<ExcludePair, Arc<ExcludeSpec>>>,
    any_lists: Mutex<HashMap<ExcludeList, Arc<ExcludeSpec>>>,
    all_lists: Mutex<HashMap<ExcludeList, Arc<ExcludeSpec>>>,
}

impl<F: ExcludeFactory> CachingExcludeFactory<F> {
    pub fn new(delegate: F) -> Self {
        Self {
            delegate,
            any_pairs: Mutex::new(HashMap::new()),
            all_pairs: Mutex::new(HashMap::new()),
            any_lists: Mutex::new(HashMap::new()),
            all_lists: Mutex::new(HashMap::new()),
        }
    }

    fn cached_pair(
        &self,
        cache: &Mutex<HashMap<ExcludePair, Arc<ExcludeSpec>>>,
        one: Arc<ExcludeSpec>,
        two: Arc<ExcludeSpec>,
        compute: impl FnOnce(&F, Arc<ExcludeSpec>, Arc<ExcludeSpec>) -> Arc<ExcludeSpec>,
    ) -> Arc<ExcludeSpec> {
        let key = ExcludePair::new(Arc::clone(&one), Arc::clone(&two));
        if let Some(hit) = lock(cache).get(&key) {
            return Arc::clone(hit);
        }
        let computed = compute(&self.delegate, one, two);
        Arc::clone(lock(cache).entry(key).or_insert(computed))
    }

    fn cached_list(
        &self,
        cache: &Mutex<HashMap<ExcludeList, Arc<ExcludeSpec>>>,
        specs: Vec<Arc<ExcludeSpec>>,
        compute: impl FnOnce(&F, Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec>,
    ) -> Arc<ExcludeSpec> {
        let key = ExcludeList::new(specs.clone());
        if let Some(hit) = lock(cache).get(&key) {
            return Arc::clone(hit);
        }
        let computed = compute(&self.delegate, specs);
        Arc::clone(lock(cache).entry(key).or_insert(computed))
    }
}

fn lock<'a, K, V>(cache: &'a Mutex<HashMap<K, V>>) -> std::sync::MutexGuard<'a, HashMap<K, V>> {
    match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn spec_hash(spec: &ExcludeSpec) -> u64 {
    let mut hasher = DefaultHasher::new();
    spec.hash(&mut hasher);
    hasher.finish()
}

/// A pair key whose operands are stored in hash order, so `(a, b)` and
/// `(b, a)` are the same key.
#[derive(Debug, PartialEq, Eq, Hash)]
struct ExcludePair {
    left: Arc<ExcludeSpec>,
    right: Arc<ExcludeSpec>,
}

impl ExcludePair {
    fn new(one: Arc<ExcludeSpec>, two: Arc<ExcludeSpec>) -> Self {
        let one_hash = spec_hash(&one);
        let two_hash = spec_hash(&two);
        if (one_hash, &one) <= (two_hash, &two) {
            Self {
                left: one,
                right: two,
            }
        } else {
            Self {
                left: two,
                right: one,
            }
        }
    }
}

/// A list key with permutation-insensitive equality (same size, mutual
/// containment) and a hash summing the element hashes so ordering cannot
/// affect it.
#[derive(Debug)]
struct ExcludeList {
    specs: Vec<Arc<ExcludeSpec>>,
    hash: u64,
}

impl ExcludeList {
    fn new(specs: Vec<Arc<ExcludeSpec>>) -> Self {
        let hash = specs
            .iter()
            .fold(0u64, |acc, spec| acc.wrapping_add(spec_hash(spec)));
        Self { specs, hash }
    }
}

impl PartialEq for ExcludeList {
    fn eq(&self, other: &Self) -> bool {
        self.specs.len() == other.specs.len()
            && self.specs.iter().all(|spec| other.specs.contains(spec))
            && other.specs.iter().all(|spec| self.specs.contains(spec))
    }
}

impl Eq for ExcludeList {}

impl Hash for ExcludeList {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl<F: ExcludeFactory> ExcludeFactory for CachingExcludeFactory<F> {
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
        self.cached_pair(&self.any_pairs, one, two, |delegate, a, b| {
            delegate.any_of(a, b)
        })
    }

    fn all_of(&self, one: Arc<ExcludeSpec>, two: Arc<ExcludeSpec>) -> Arc<ExcludeSpec> {
        self.cached_pair(&self.all_pairs, one, two, |delegate, a, b| {
            delegate.all_of(a, b)
        })
    }

    fn any_of_list(&self, specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        self.cached_list(&self.any_lists, specs, |delegate, list| {
            delegate.any_of_list(list)
        })
    }

    fn all_of_list(&self, specs: Vec<Arc<ExcludeSpec>>) -> Arc<ExcludeSpec> {
        self.cached_list(&self.all_lists, specs, |delegate, list| {
            delegate.all_of_list(list)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::DefaultExcludeFactory;

    #[test]
    fn pair_key_is_commutative() {
        let factory = DefaultExcludeFactory::new();
        let a = factory.group("a");
        let b = factory.group("b");
        let left = ExcludePair::new(Arc::clone(&a), Arc::clone(&b));
        let right = ExcludePair::new(b, a);
        assert_eq!(left, right);
    }

    #[test]
    fn list_key_ignores_permutation() {
        let factory = DefaultExcludeFactory::new();
        let a = factory.group("a");
        let b = factory.group("b");
        let c = factory.group("c");
        let left = ExcludeList::new(vec![a.clone(), b.clone(), c.clone()]);
        let right = ExcludeList::new(vec![c, a, b]);
        assert_eq!(left, right);
        assert_eq!(left.hash, right.hash);
    }
}
