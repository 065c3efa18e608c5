//! The persisted verification document.
//!
//! `verification-metadata.xml` carries the global configuration (flags, key
//! servers, trusted/ignored keys, trusted artifacts) and the per-component
//! artifact records. Reading is strict: unknown elements or malformed values
//! fail the build rather than being skipped, so a typo in the document can't
//! silently disable verification. Writing regenerates the canonical form with
//! deterministic ordering.

use std::fmt::Write as _;
use std::path::Path;

use keel_ids::{ModuleComponentArtifactIdentifier, ModuleComponentIdentifier};
use roxmltree::Node;

use crate::checksum::ChecksumKind;
use crate::error::{Result, VerifyError};
use crate::metadata::{DependencyVerifierBuilder, IgnoredKey, VerificationCoordinates};
use crate::verifier::DependencyVerifier;

/// The conventional location of the document, relative to the build root.
pub const VERIFICATION_METADATA_PATH: &str = "verification/verification-metadata.xml";

/// Reads a verification document into `builder`, merging with whatever the
/// builder already holds.
pub fn read_into(path: &Path, builder: &mut DependencyVerifierBuilder) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let invalid = |message: String| VerifyError::InvalidMetadata {
        path: path.to_path_buf(),
        message,
    };
    let doc = roxmltree::Document::parse(&text).map_err(|err| invalid(err.to_string()))?;

    for node in doc.root().children() {
        if node.is_comment() {
            if let Some(comment) = node.text() {
                builder.add_top_level_comment(comment.trim().to_string());
            }
        }
    }

    let root = doc.root_element();
    if root.tag_name().name() != "verification-metadata" {
        return Err(invalid(format!(
            "expected root element 'verification-metadata', found '{}'",
            root.tag_name().name()
        )));
    }
    for child in elements(root) {
        match child.tag_name().name() {
            "configuration" => read_configuration(child, builder, &invalid)?,
            "components" => read_components(child, builder, &invalid)?,
            other => return Err(invalid(format!("unexpected element '{other}'"))),
        }
    }
    Ok(())
}

/// Convenience for the common read-then-build flow.
pub fn read_verifier(path: &Path) -> Result<DependencyVerifier> {
    let mut builder = DependencyVerifierBuilder::new();
    read_into(path, &mut builder)?;
    builder.build()
}

fn read_configuration(
    node: Node<'_, '_>,
    builder: &mut DependencyVerifierBuilder,
    invalid: &impl Fn(String) -> VerifyError,
) -> Result<()> {
    for child in elements(node) {
        match child.tag_name().name() {
            "verify-metadata" => builder.set_verify_metadata(bool_text(child, invalid)?),
            "verify-signatures" => builder.set_verify_signatures(bool_text(child, invalid)?),
            "key-servers" => {
                let enabled = match child.attribute("enabled") {
                    Some(value) => parse_bool(value, invalid)?,
                    None => true,
                };
                builder.set_use_key_servers(enabled);
                for server in elements(child) {
                    if server.tag_name().name() != "key-server" {
                        return Err(invalid(format!(
                            "unexpected element '{}' in key-servers",
                            server.tag_name().name()
                        )));
                    }
                    let uri = required_attribute(server, "uri", invalid)?;
                    builder.add_key_server(uri);
                }
            }
            "trusted-artifacts" => {
                for trust in elements(child) {
                    if trust.tag_name().name() != "trust" {
                        return Err(invalid(format!(
                            "unexpected element '{}' in trusted-artifacts",
                            trust.tag_name().name()
                        )));
                    }
                    builder.add_trusted_artifact(read_coordinates(trust, invalid)?);
                }
            }
            "ignored-keys" => {
                for key in read_ignored_keys(child, invalid)? {
                    builder.add_ignored_key(key);
                }
            }
            "trusted-keys" => {
                for key in elements(child) {
                    if key.tag_name().name() != "trusted-key" {
                        return Err(invalid(format!(
                            "unexpected element '{}' in trusted-keys",
                            key.tag_name().name()
                        )));
                    }
                    let id = required_attribute(key, "id", invalid)?;
                    builder.add_trusted_key(id, read_coordinates(key, invalid)?);
                }
            }
            other => return Err(invalid(format!("unexpected element '{other}'"))),
        }
    }
    Ok(())
}

fn read_components(
    node: Node<'_, '_>,
    builder: &mut DependencyVerifierBuilder,
    invalid: &impl Fn(String) -> VerifyError,
) -> Result<()> {
    for component in elements(node) {
        if component.tag_name().name() != "component" {
            return Err(invalid(format!(
                "unexpected element '{}' in components",
                component.tag_name().name()
            )));
        }
        let component_id = ModuleComponentIdentifier::new(
            required_attribute(component, "group", invalid)?,
            required_attribute(component, "name", invalid)?,
            required_attribute(component, "version", invalid)?,
        );
        for artifact in elements(component) {
            if artifact.tag_name().name() != "artifact" {
                return Err(invalid(format!(
                    "unexpected element '{}' in component",
                    artifact.tag_name().name()
                )));
            }
            let artifact_id = ModuleComponentArtifactIdentifier::new(
                component_id.clone(),
                required_attribute(artifact, "name", invalid)?,
            );
            read_artifact(artifact, &artifact_id, builder, invalid)?;
        }
    }
    Ok(())
}

fn read_artifact(
    node: Node<'_, '_>,
    artifact: &ModuleComponentArtifactIdentifier,
    builder: &mut DependencyVerifierBuilder,
    invalid: &impl Fn(String) -> VerifyError,
) -> Result<()> {
    for child in elements(node) {
        let name = child.tag_name().name();
        if let Ok(kind) = name.parse::<ChecksumKind>() {
            let value = required_attribute(child, "value", invalid)?;
            let origin = child.attribute("origin").map(str::to_string);
            let reason = child.attribute("reason").map(str::to_string);
            builder.add_checksum(artifact, kind, value, origin, reason);
            for alternative in elements(child) {
                if alternative.tag_name().name() != "also-trust" {
                    return Err(invalid(format!(
                        "unexpected element '{}' in {name}",
                        alternative.tag_name().name()
                    )));
                }
                let value = required_attribute(alternative, "value", invalid)?;
                builder.add_checksum_alternative(artifact, kind, value);
            }
        } else if name == "pgp" {
            builder
                .add_trusted_key_for_artifact(artifact, required_attribute(child, "value", invalid)?);
        } else if name == "ignored-keys" {
            for key in read_ignored_keys(child, invalid)? {
                builder.add_ignored_key_for_artifact(artifact, key);
            }
        } else {
            return Err(invalid(format!("unexpected element '{name}' in artifact")));
        }
    }
    Ok(())
}

fn read_ignored_keys(
    node: Node<'_, '_>,
    invalid: &impl Fn(String) -> VerifyError,
) -> Result<Vec<IgnoredKey>> {
    let mut keys = Vec::new();
    for key in elements(node) {
        if key.tag_name().name() != "ignored-key" {
            return Err(invalid(format!(
                "unexpected element '{}' in ignored-keys",
                key.tag_name().name()
            )));
        }
        let id = required_attribute(key, "id", invalid)?;
        keys.push(match key.attribute("reason") {
            Some(reason) => IgnoredKey::with_reason(id, reason),
            None => IgnoredKey::new(id),
        });
    }
    Ok(keys)
}

fn read_coordinates(
    node: Node<'_, '_>,
    invalid: &impl Fn(String) -> VerifyError,
) -> Result<VerificationCoordinates> {
    let regex = match node.attribute("regex") {
        Some(value) => parse_bool(value, invalid)?,
        None => false,
    };
    Ok(VerificationCoordinates {
        group: node.attribute("group").map(str::to_string),
        name: node.attribute("name").map(str::to_string),
        version: node.attribute("version").map(str::to_string),
        file_name: node.attribute("file").map(str::to_string),
        regex,
    })
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

fn required_attribute(
    node: Node<'_, '_>,
    name: &str,
    invalid: &impl Fn(String) -> VerifyError,
) -> Result<String> {
    node.attribute(name)
        .map(str::to_string)
        .ok_or_else(|| {
            invalid(format!(
                "element '{}' is missing required attribute '{name}'",
                node.tag_name().name()
            ))
        })
}

fn bool_text(node: Node<'_, '_>, invalid: &impl Fn(String) -> VerifyError) -> Result<bool> {
    let text = node.text().unwrap_or("").trim();
    parse_bool(text, invalid)
}

fn parse_bool(value: &str, invalid: &impl Fn(String) -> VerifyError) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(invalid(format!("expected 'true' or 'false', found '{other}'"))),
    }
}

/// Serializes the verifier back to the canonical document form.
pub fn write_to_string(verifier: &DependencyVerifier) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    for comment in verifier.top_level_comments() {
        let _ = writeln!(out, "<!-- {} -->", escape_text(comment));
    }
    out.push_str("<verification-metadata>\n");

    let configuration = verifier.configuration();
    out.push_str("  <configuration>\n");
    let _ = writeln!(
        out,
        "    <verify-metadata>{}</verify-metadata>",
        configuration.verify_metadata
    );
    let _ = writeln!(
        out,
        "    <verify-signatures>{}</verify-signatures>",
        configuration.verify_signatures
    );
    if !configuration.use_key_servers || !configuration.key_servers.is_empty() {
        let _ = writeln!(
            out,
            "    <key-servers enabled=\"{}\">",
            configuration.use_key_servers
        );
        for uri in &configuration.key_servers {
            let _ = writeln!(out, "      <key-server uri=\"{}\"/>", escape_attr(uri));
        }
        out.push_str("    </key-servers>\n");
    }
    if !configuration.trusted_artifacts.is_empty() {
        out.push_str("    <trusted-artifacts>\n");
        for coordinates in &configuration.trusted_artifacts {
            let _ = writeln!(
                out,
                "      <trust{}/>",
                coordinate_attrs(coordinates)
            );
        }
        out.push_str("    </trusted-artifacts>\n");
    }
    if !configuration.ignored_keys.is_empty() {
        out.push_str("    <ignored-keys>\n");
        for key in &configuration.ignored_keys {
            write_ignored_key(&mut out, "      ", key);
        }
        out.push_str("    </ignored-keys>\n");
    }
    if !configuration.trusted_keys.is_empty() {
        out.push_str("    <trusted-keys>\n");
        for key in &configuration.trusted_keys {
            let _ = writeln!(
                out,
                "      <trusted-key id=\"{}\"{}/>",
                escape_attr(&key.key_id),
                coordinate_attrs(&key.coordinates)
            );
        }
        out.push_str("    </trusted-keys>\n");
    }
    out.push_str("  </configuration>\n");

    out.push_str("  <components>\n");
    let mut components: Vec<_> = verifier.components().collect();
    components.sort_by(|a, b| a.component_id.cmp(&b.component_id));
    for component in components {
        let _ = writeln!(
            out,
            "    <component group=\"{}\" name=\"{}\" version=\"{}\">",
            escape_attr(component.component_id.group()),
            escape_attr(component.component_id.name()),
            escape_attr(component.component_id.version())
        );
        let mut artifacts: Vec<_> = component.artifacts.iter().collect();
        artifacts.sort_by(|a, b| a.artifact_name.cmp(&b.artifact_name));
        for artifact in artifacts {
            let _ = writeln!(
                out,
                "      <artifact name=\"{}\">",
                escape_attr(&artifact.artifact_name)
            );
            let mut checksums: Vec<_> = artifact.checksums.iter().collect();
            checksums.sort_by_key(|checksum| checksum.kind);
            for checksum in checksums {
                let mut attrs = format!(" value=\"{}\"", escape_attr(&checksum.value));
                if let Some(origin) = &checksum.origin {
                    let _ = write!(attrs, " origin=\"{}\"", escape_attr(origin));
                }
                if let Some(reason) = &checksum.reason {
                    let _ = write!(attrs, " reason=\"{}\"", escape_attr(reason));
                }
                if checksum.alternatives.is_empty() {
                    let _ = writeln!(out, "        <{}{attrs}/>", checksum.kind);
                } else {
                    let _ = writeln!(out, "        <{}{attrs}>", checksum.kind);
                    for alternative in &checksum.alternatives {
                        let _ = writeln!(
                            out,
                            "          <also-trust value=\"{}\"/>",
                            escape_attr(alternative)
                        );
                    }
                    let _ = writeln!(out, "        </{}>", checksum.kind);
                }
            }
            for key in &artifact.trusted_pgp_keys {
                let _ = writeln!(out, "        <pgp value=\"{}\"/>", escape_attr(key));
            }
            if !artifact.ignored_pgp_keys.is_empty() {
                out.push_str("        <ignored-keys>\n");
                for key in &artifact.ignored_pgp_keys {
                    write_ignored_key(&mut out, "          ", key);
                }
                out.push_str("        </ignored-keys>\n");
            }
            out.push_str("      </artifact>\n");
        }
        out.push_str("    </component>\n");
    }
    out.push_str("  </components>\n");
    out.push_str("</verification-metadata>\n");
    out
}

/// Writes the canonical document to `path`, creating parent directories.
pub fn write_to_file(verifier: &DependencyVerifier, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, write_to_string(verifier))?;
    Ok(())
}

fn write_ignored_key(out: &mut String, indent: &str, key: &IgnoredKey) {
    match &key.reason {
        Some(reason) => {
            let _ = writeln!(
                out,
                "{indent}<ignored-key id=\"{}\" reason=\"{}\"/>",
                escape_attr(&key.key_id),
                escape_attr(reason)
            );
        }
        None => {
            let _ = writeln!(out, "{indent}<ignored-key id=\"{}\"/>", escape_attr(&key.key_id));
        }
    }
}

fn coordinate_attrs(coordinates: &VerificationCoordinates) -> String {
    let mut attrs = String::new();
    if let Some(group) = &coordinates.group {
        let _ = write!(attrs, " group=\"{}\"", escape_attr(group));
    }
    if let Some(name) = &coordinates.name {
        let _ = write!(attrs, " name=\"{}\"", escape_attr(name));
    }
    if let Some(version) = &coordinates.version {
        let _ = write!(attrs, " version=\"{}\"", escape_attr(version));
    }
    if let Some(file_name) = &coordinates.file_name {
        let _ = write!(attrs, " file=\"{}\"", escape_attr(file_name));
    }
    if coordinates.regex {
        attrs.push_str(" regex=\"true\"");
    }
    attrs
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn escape_text(value: &str) -> String {
    // Comments cannot contain `--`; anything else passes through.
    value.replace("--", "- -")
}
