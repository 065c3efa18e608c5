//! Identifier value types shared by the exclusion algebra and the
//! verification engine.
//!
//! All types here are immutable values with stable `Eq`/`Ord`/`Hash`, suitable
//! as map keys. Display forms follow the `group:name:version` convention used
//! in dependency coordinates.

use std::fmt;

/// Identifies a module independently of its version: `group:name`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleIdentifier {
    group: String,
    name: String,
}

impl ModuleIdentifier {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

/// Identifies a single released component: `group:name:version`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleComponentIdentifier {
    group: String,
    name: String,
    version: String,
}

impl ModuleComponentIdentifier {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn module_identifier(&self) -> ModuleIdentifier {
        ModuleIdentifier::new(self.group.clone(), self.name.clone())
    }
}

impl fmt::Display for ModuleComponentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)
    }
}

/// Identifies one artifact file of a component, e.g. `foo-1.0.jar` of
/// `org:foo:1.0`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleComponentArtifactIdentifier {
    component: ModuleComponentIdentifier,
    file_name: String,
}

impl ModuleComponentArtifactIdentifier {
    pub fn new(component: ModuleComponentIdentifier, file_name: impl Into<String>) -> Self {
        Self {
            component,
            file_name: file_name.into(),
        }
    }

    pub fn component(&self) -> &ModuleComponentIdentifier {
        &self.component
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl fmt::Display for ModuleComponentArtifactIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.file_name, self.component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn display_forms() {
        let component = ModuleComponentIdentifier::new("org.apache", "commons-lang3", "3.14.0");
        assert_eq!(component.to_string(), "org.apache:commons-lang3:3.14.0");
        let artifact =
            ModuleComponentArtifactIdentifier::new(component, "commons-lang3-3.14.0.jar");
        assert_eq!(
            artifact.to_string(),
            "commons-lang3-3.14.0.jar (org.apache:commons-lang3:3.14.0)"
        );
    }

    #[test]
    fn identifiers_are_usable_as_map_keys() {
        let a = ModuleComponentArtifactIdentifier::new(
            ModuleComponentIdentifier::new("org", "foo", "1.0"),
            "foo-1.0.jar",
        );
        let b = a.clone();
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
