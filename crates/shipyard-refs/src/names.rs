//! Branch name validation following git-style conventions.
//!
//! Task-supplied names are passed to git as separate arguments, so the
//! rules below also keep a name from being read as an option.
//!
//! Valid branch names:
//! - Must be non-empty and must not start with `-`
//! - Must not contain whitespace, control characters, `~`, `^`, `:`, `?`,
//!   `*`, `[`, `\`
//! - Must not contain `..` (double dot) or `@{`
//! - Must not start or end with `.` or `/`
//! - Must not end with `.lock`
//! - Components between slashes must be non-empty and not start with `.`

use crate::error::{RefError, Result};

/// Characters that are forbidden anywhere in a branch name.
const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidBranchName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a branch name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use shipyard_refs::names::validate_branch_name;
///
/// assert!(validate_branch_name("master").is_ok());
/// assert!(validate_branch_name("feature/WT-1042").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("--force").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "branch name must not be empty"));
    }
    if name.starts_with('-') {
        return Err(invalid(name, "must not start with '-'"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid(name, "must not start or end with '.'"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid(name, "must not start or end with '/'"));
    }
    if name.ends_with(".lock") {
        return Err(invalid(name, "must not end with '.lock'"));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_deployment_branches() {
        for name in ["master", "develop", "staging", "release-2024.03", "feature/WT-1042"] {
            assert!(validate_branch_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_option_like_names() {
        assert!(validate_branch_name("-b").is_err());
        assert!(validate_branch_name("--upload-pack=evil").is_err());
    }

    #[test]
    fn rejects_shell_and_ref_syntax() {
        for name in ["a b", "a\tb", "a~1", "a^", "a:b", "a?", "a*", "a[0]", "a\\b", "a\u{7}b"] {
            assert!(validate_branch_name(name).is_err(), "{name:?} should be invalid");
        }
    }

    #[test]
    fn rejects_malformed_paths() {
        for name in ["", "a..b", "ref@{0}", ".hidden", "trailing.", "/lead", "trail/", "a//b", "x.lock", "f/.h"] {
            assert!(validate_branch_name(name).is_err(), "{name:?} should be invalid");
        }
    }

    #[test]
    fn error_names_the_branch() {
        let err = validate_branch_name("a b").unwrap_err();
        assert_eq!(
            err,
            RefError::InvalidBranchName {
                name: "a b".into(),
                reason: "contains forbidden character: ' '".into(),
            }
        );
    }
}
