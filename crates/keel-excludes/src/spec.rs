use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use keel_ids::ModuleIdentifier;

/// How an ivy-style pattern compares against a coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PatternMatcher {
    Exact,
    Glob,
}

/// An ivy-style exclude rule: group/module patterns plus an optional artifact
/// file pattern. With no artifact pattern the rule excludes whole modules;
/// with one it excludes matching artifact files only.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IvyPatternExclude {
    pub group: String,
    pub module: String,
    pub artifact: Option<String>,
    pub matcher: PatternMatcher,
}

/// An exclusion predicate over dependency graph coordinates.
///
/// The set of variants is closed: the union/intersection helpers match
/// exhaustively, so a new variant extends every simplification site at compile
/// time. Instances are immutable and shared via `Arc`; composite variants hold
/// canonically sorted, deduplicated operand lists, which makes structural
/// equality permutation-insensitive by construction.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExcludeSpec {
    /// Excludes nothing. Identity of unions, absorbing element of nothing.
    Nothing,
    /// Excludes every module. Absorbing element of unions.
    Everything,
    /// Excludes every module in a group.
    Group(String),
    /// Excludes every module with a given name, in any group.
    Module(String),
    /// Excludes one `group:module`.
    ModuleId(ModuleIdentifier),
    /// Excludes every module whose group is in the set.
    GroupSet(BTreeSet<String>),
    /// Excludes every module whose name is in the set.
    ModuleSet(BTreeSet<String>),
    /// Excludes every `group:module` in the set.
    ModuleIdSet(BTreeSet<ModuleIdentifier>),
    /// Excludes a single artifact file of one module.
    Artifact(ModuleIdentifier, String),
    /// Ivy-style pattern exclude.
    IvyPattern(IvyPatternExclude),
    /// Union: excludes whatever any component excludes.
    AnyOf(Vec<Arc<ExcludeSpec>>),
    /// Intersection: excludes only what every component excludes.
    AllOf(Vec<Arc<ExcludeSpec>>),
}

impl ExcludeSpec {
    /// Whether this spec excludes the whole module `id`.
    pub fn excludes_module(&self, id: &ModuleIdentifier) -> bool {
        match self {
            ExcludeSpec::Nothing => false,
            ExcludeSpec::Everything => true,
            ExcludeSpec::Group(group) => group == id.group(),
            ExcludeSpec::Module(module) => module == id.name(),
            ExcludeSpec::ModuleId(module_id) => module_id == id,
            ExcludeSpec::GroupSet(groups) => groups.contains(id.group()),
            ExcludeSpec::ModuleSet(modules) => modules.contains(id.name()),
            ExcludeSpec::ModuleIdSet(ids) => ids.contains(id),
            // Artifact-level excludes never reject the module itself.
            ExcludeSpec::Artifact(_, _) => false,
            ExcludeSpec::IvyPattern(pattern) => {
                pattern.artifact.is_none()
                    && matches_pattern(&pattern.group, id.group(), pattern.matcher)
                    && matches_pattern(&pattern.module, id.name(), pattern.matcher)
            }
            ExcludeSpec::AnyOf(components) => {
                components.iter().any(|spec| spec.excludes_module(id))
            }
            ExcludeSpec::AllOf(components) => {
                components.iter().all(|spec| spec.excludes_module(id))
            }
        }
    }

    /// Whether this spec excludes the artifact `file_name` of module `id`.
    ///
    /// Module-coordinate excludes reject whole modules, not individual
    /// artifacts, so they answer `false` here.
    pub fn excludes_artifact(&self, id: &ModuleIdentifier, file_name: &str) -> bool {
        match self {
            ExcludeSpec::Nothing => false,
            ExcludeSpec::Everything => true,
            ExcludeSpec::Group(_)
            | ExcludeSpec::Module(_)
            | ExcludeSpec::ModuleId(_)
            | ExcludeSpec::GroupSet(_)
            | ExcludeSpec::ModuleSet(_)
            | ExcludeSpec::ModuleIdSet(_) => false,
            ExcludeSpec::Artifact(module_id, artifact) => {
                module_id == id && matches_pattern(artifact, file_name, PatternMatcher::Glob)
            }
            ExcludeSpec::IvyPattern(pattern) => match &pattern.artifact {
                Some(artifact) => {
                    matches_pattern(&pattern.group, id.group(), pattern.matcher)
                        && matches_pattern(&pattern.module, id.name(), pattern.matcher)
                        && matches_pattern(artifact, file_name, pattern.matcher)
                }
                None => false,
            },
            ExcludeSpec::AnyOf(components) => components
                .iter()
                .any(|spec| spec.excludes_artifact(id, file_name)),
            ExcludeSpec::AllOf(components) => components
                .iter()
                .all(|spec| spec.excludes_artifact(id, file_name)),
        }
    }

    /// Whether artifact-level rules are reachable through this spec. Callers
    /// use this to skip per-artifact filtering for the common module-only
    /// case.
    pub fn may_exclude_artifacts(&self) -> bool {
        match self {
            ExcludeSpec::Nothing
            | ExcludeSpec::Everything
            | ExcludeSpec::Group(_)
            | ExcludeSpec::Module(_)
            | ExcludeSpec::ModuleId(_)
            | ExcludeSpec::GroupSet(_)
            | ExcludeSpec::ModuleSet(_)
            | ExcludeSpec::ModuleIdSet(_) => false,
            ExcludeSpec::Artifact(_, _) => true,
            ExcludeSpec::IvyPattern(pattern) => pattern.artifact.is_some(),
            ExcludeSpec::AnyOf(components) | ExcludeSpec::AllOf(components) => {
                components.iter().any(|spec| spec.may_exclude_artifacts())
            }
        }
    }
}

/// Matches `value` against `pattern`. A bare `*` matches anything regardless
/// of matcher type; `Glob` patterns treat every `*` as a wildcard.
pub(crate) fn matches_pattern(pattern: &str, value: &str, matcher: PatternMatcher) -> bool {
    if pattern == "*" {
        return true;
    }
    match matcher {
        PatternMatcher::Exact => pattern == value,
        PatternMatcher::Glob => matches_glob(pattern, value),
    }
}

fn matches_glob(pattern: &str, value: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == value;
    }
    let mut rest = value;
    for (index, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if index == 0 {
            match rest.strip_prefix(segment) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if index == segments.len() - 1 {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(at) => rest = &rest[at + segment.len()..],
                None => return false,
            }
        }
    }
    // The pattern ends with `*`, so any remainder is accepted.
    true
}

impl fmt::Display for ExcludeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExcludeSpec::Nothing => write!(f, "{{excludes nothing}}"),
            ExcludeSpec::Everything => write!(f, "{{excludes everything}}"),
            ExcludeSpec::Group(group) => write!(f, "{{exclude group '{group}'}}"),
            ExcludeSpec::Module(module) => write!(f, "{{exclude module '{module}'}}"),
            ExcludeSpec::ModuleId(id) => write!(f, "{{exclude '{id}'}}"),
            ExcludeSpec::GroupSet(groups) => {
                write!(f, "{{exclude groups {}}}", join(groups.iter()))
            }
            ExcludeSpec::ModuleSet(modules) => {
                write!(f, "{{exclude modules {}}}", join(modules.iter()))
            }
            ExcludeSpec::ModuleIdSet(ids) => {
                write!(f, "{{exclude ids {}}}", join(ids.iter()))
            }
            ExcludeSpec::Artifact(id, artifact) => {
                write!(f, "{{exclude artifact '{artifact}' of '{id}'}}")
            }
            ExcludeSpec::IvyPattern(pattern) => write!(
                f,
                "{{ivy exclude '{}:{}' artifact {:?}}}",
                pattern.group, pattern.module, pattern.artifact
            ),
            ExcludeSpec::AnyOf(components) => {
                write!(f, "{{any of {}}}", join(components.iter()))
            }
            ExcludeSpec::AllOf(components) => {
                write!(f, "{{all of {}}}", join(components.iter()))
            }
        }
    }
}

fn join<T: fmt::Display>(items: impl Iterator<Item = T>) -> String {
    let rendered: Vec<String> = items.map(|item| item.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(group: &str, name: &str) -> ModuleIdentifier {
        ModuleIdentifier::new(group, name)
    }

    #[test]
    fn group_excludes_any_module_in_group() {
        let spec = ExcludeSpec::Group("org.slf4j".to_string());
        assert!(spec.excludes_module(&id("org.slf4j", "slf4j-api")));
        assert!(!spec.excludes_module(&id("org.apache", "slf4j-api")));
        assert!(!spec.excludes_artifact(&id("org.slf4j", "slf4j-api"), "slf4j-api-2.0.jar"));
    }

    #[test]
    fn artifact_exclude_matches_file_names_only() {
        let spec = ExcludeSpec::Artifact(id("org", "foo"), "foo-*.jar".to_string());
        assert!(spec.excludes_artifact(&id("org", "foo"), "foo-1.0.jar"));
        assert!(!spec.excludes_artifact(&id("org", "foo"), "foo-1.0.pom"));
        assert!(!spec.excludes_artifact(&id("org", "bar"), "foo-1.0.jar"));
        assert!(!spec.excludes_module(&id("org", "foo")));
        assert!(spec.may_exclude_artifacts());
    }

    #[test]
    fn ivy_pattern_without_artifact_excludes_modules() {
        let spec = ExcludeSpec::IvyPattern(IvyPatternExclude {
            group: "org.*".to_string(),
            module: "*".to_string(),
            artifact: None,
            matcher: PatternMatcher::Glob,
        });
        assert!(spec.excludes_module(&id("org.slf4j", "slf4j-api")));
        assert!(!spec.excludes_module(&id("com.acme", "slf4j-api")));
        assert!(!spec.may_exclude_artifacts());
    }

    #[test]
    fn glob_matching_handles_inner_wildcards() {
        assert!(matches_glob("foo-*-sources.jar", "foo-1.0-sources.jar"));
        assert!(!matches_glob("foo-*-sources.jar", "foo-1.0.jar"));
        assert!(matches_glob("*-api", "slf4j-api"));
        assert!(matches_glob("org.*", "org.slf4j"));
        assert!(!matches_glob("org.*x", "org.slf4j"));
    }
}
