//! Variable context and `${{ … }}` interpolation
//!
//! A context is assembled once per run from the push context, version
//! information, platform facts, and the process environment, then frozen.
//! Interpolation is a single left-to-right pass; replacement text is never
//! re-scanned, so expansion cannot recurse.

use crate::hook::PushContext;
use crate::version::{VersionInfo, VersionKind};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("undefined variable: {0}")]
    UnknownVariable(String),
    #[error("unclosed variable reference: {0}")]
    Malformed(String),
}

/// Frozen key → value mapping driving interpolation, `if` predicates, and
/// `only` gating.
#[derive(Debug, Clone, Default)]
pub struct VarContext {
    vars: BTreeMap<String, String>,
}

impl VarContext {
    /// Builds the context for a run. `push` is present only when invoked as a
    /// Git hook; without it, tag/branch fall back to the current checkout.
    pub fn collect(version: &VersionInfo, push: Option<&PushContext>) -> Self {
        let mut vars = BTreeMap::new();

        // Platform facts.
        vars.insert(
            "platform".to_string(),
            format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        );
        vars.insert("os".to_string(), std::env::consts::OS.to_string());
        vars.insert("arch".to_string(), std::env::consts::ARCH.to_string());
        vars.insert("os_version".to_string(), detect_os_version());
        vars.insert("cpu".to_string(), num_cpus::get().to_string());

        // Version and project facts.
        if let Some(v) = &version.version {
            vars.insert("version".to_string(), v.clone());
            vars.insert("version.version".to_string(), v.clone());
            vars.insert("version.tag".to_string(), v.clone());
        }
        if let Some(b) = &version.branch {
            vars.insert("version.branch".to_string(), b.clone());
        }
        vars.insert("project".to_string(), version.project.clone());
        vars.insert("version.project".to_string(), version.project.clone());
        if let Some(module) = version.module() {
            vars.insert("module".to_string(), module.to_string());
            vars.insert("version.module".to_string(), module.to_string());
        }
        if !version.modules.is_empty() {
            let joined = version.modules.join(",");
            vars.insert("modules".to_string(), joined.clone());
            vars.insert("version.modules".to_string(), joined);
        }
        vars.insert(
            "version.build-type".to_string(),
            version.kind.as_str().to_string(),
        );
        vars.insert(
            "version.version-type".to_string(),
            version.kind.as_str().to_string(),
        );

        // Push facts, or current-checkout fallbacks outside hook mode.
        match push {
            Some(push) => {
                if let [tag] = push.tags.as_slice() {
                    vars.insert("tag".to_string(), tag.clone());
                }
                if !push.tags.is_empty() {
                    vars.insert("tags".to_string(), push.tags.join(","));
                }
                if let [branch] = push.branches.as_slice() {
                    vars.insert("branch".to_string(), branch.clone());
                }
                if !push.branches.is_empty() {
                    vars.insert("branches".to_string(), push.branches.join(","));
                }
            }
            None => {
                if let Some(v) = &version.version {
                    vars.insert("tag".to_string(), v.clone());
                }
                if let Some(b) = &version.branch {
                    vars.insert("branch".to_string(), b.clone());
                }
            }
        }

        // Process environment.
        for (key, value) in std::env::vars() {
            vars.insert(format!("env.{key}"), value);
        }

        VarContext { vars }
    }

    /// Builds a context from explicit pairs. Intended for hosts and tests.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        VarContext {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Replaces every `${{ key }}` occurrence with the context value.
    ///
    /// Single pass, left to right; replacement text is not re-scanned.
    pub fn interpolate(&self, input: &str) -> Result<String, InterpolationError> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("${{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 3..];
            let Some(end) = after.find("}}") else {
                return Err(InterpolationError::Malformed(rest[start..].to_string()));
            };

            let key = after[..end].trim();
            let value = self
                .vars
                .get(key)
                .ok_or_else(|| InterpolationError::UnknownVariable(key.to_string()))?;
            out.push_str(value);
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        Ok(out)
    }

    /// Evaluates an `if` predicate of the form `key == 'literal'`.
    ///
    /// A predicate that does not parse evaluates to true; a parseable
    /// predicate over an unknown key compares against the empty string.
    pub fn evaluate(&self, predicate: &str) -> bool {
        let Some((lhs, rhs)) = predicate.split_once("==") else {
            return true;
        };

        let key = lhs.trim();
        let literal = unquote(rhs.trim());
        self.get(key).unwrap_or("") == literal
    }

    /// The version kind driving `only` gating, from `version.version-type`.
    pub fn version_kind(&self) -> VersionKind {
        self.get("version.version-type")
            .map(VersionKind::parse)
            .unwrap_or(VersionKind::Unknown)
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'')
            || (bytes[0] == b'"' && bytes[s.len() - 1] == b'"')
        {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn detect_os_version() -> String {
    if std::env::consts::OS == "linux" {
        if let Ok(data) = std::fs::read_to_string("/etc/os-release") {
            for line in data.lines() {
                if let Some(name) = line.strip_prefix("PRETTY_NAME=") {
                    return name.trim_matches('"').to_string();
                }
            }
        }
    }
    std::env::consts::OS.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> VarContext {
        VarContext::from_pairs([
            ("tag", "v1.2.3"),
            ("branch", "main"),
            ("version.version-type", "release"),
            ("nested", "${{ tag }}"),
        ])
    }

    #[test]
    fn interpolates_single_reference() {
        assert_eq!(ctx().interpolate("tag is ${{ tag }}").unwrap(), "tag is v1.2.3");
    }

    #[test]
    fn interpolates_without_interior_whitespace() {
        assert_eq!(ctx().interpolate("${{tag}}").unwrap(), "v1.2.3");
    }

    #[test]
    fn interpolates_multiple_references() {
        assert_eq!(
            ctx().interpolate("${{ tag }} on ${{ branch }}").unwrap(),
            "v1.2.3 on main"
        );
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(ctx().interpolate("no variables here").unwrap(), "no variables here");
    }

    #[test]
    fn fails_on_unknown_variable() {
        assert_eq!(
            ctx().interpolate("${{ missing }}").unwrap_err(),
            InterpolationError::UnknownVariable("missing".to_string())
        );
    }

    #[test]
    fn fails_on_unclosed_reference() {
        assert!(matches!(
            ctx().interpolate("echo ${{ tag").unwrap_err(),
            InterpolationError::Malformed(_)
        ));
    }

    #[test]
    fn replacement_is_not_rescanned() {
        // `nested` expands to a literal `${{ tag }}` that must survive as-is.
        assert_eq!(ctx().interpolate("${{ nested }}").unwrap(), "${{ tag }}");
    }

    #[test]
    fn interpolation_is_deterministic() {
        let c = ctx();
        let input = "${{ branch }}-${{ tag }}";
        assert_eq!(c.interpolate(input).unwrap(), c.interpolate(input).unwrap());
    }

    #[test]
    fn evaluates_matching_predicate() {
        assert!(ctx().evaluate("branch == 'main'"));
        assert!(ctx().evaluate("branch == \"main\""));
    }

    #[test]
    fn evaluates_non_matching_predicate() {
        assert!(!ctx().evaluate("branch == 'develop'"));
    }

    #[test]
    fn unknown_key_compares_against_empty() {
        assert!(!ctx().evaluate("missing == 'x'"));
        assert!(ctx().evaluate("missing == ''"));
    }

    #[test]
    fn unparseable_predicate_defaults_to_true() {
        assert!(ctx().evaluate("whatever"));
    }

    #[test]
    fn exposes_version_kind() {
        use crate::version::VersionKind;
        assert_eq!(ctx().version_kind(), VersionKind::Release);
        assert_eq!(VarContext::default().version_kind(), VersionKind::Unknown);
    }
}
