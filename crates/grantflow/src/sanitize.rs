//! Helpers for sanitizing values before they become filesystem path
//! components, span attributes, or cohort-uniqueness keys.

use std::path::Path;

use regex::Regex;
use std::sync::OnceLock;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields — reveals file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Makes a string safe as a single path component. Proposal codes contain
/// `/`, so separators are mapped to `-` before artifacts are keyed by them.
pub fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '-'
            } else {
                c
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

fn registration_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9]").unwrap())
}

/// Canonical form of an organization registration number: punctuation and
/// whitespace stripped, uppercased. `"reg-42/a"` and `"REG 42 A"` collide.
pub fn normalize_registration(value: &str) -> String {
    registration_pattern()
        .replace_all(value, "")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/var/lib/grantflow/artifacts/proposal.pdf")),
            "proposal.pdf"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(&PathBuf::from("/")), "<unknown>");
    }

    #[test]
    fn test_sanitize_component_replaces_separators() {
        assert_eq!(sanitize_component("GP/AGRI/2025/00001"), "GP-AGRI-2025-00001");
        assert_eq!(sanitize_component("a\\b"), "a-b");
    }

    #[test]
    fn test_sanitize_component_trims_dots_and_spaces() {
        assert_eq!(sanitize_component("  ..report.. "), "report");
        assert_eq!(sanitize_component("..."), "unnamed");
        assert_eq!(sanitize_component(""), "unnamed");
    }

    #[test]
    fn test_normalize_registration() {
        assert_eq!(normalize_registration("reg-42/a"), "REG42A");
        assert_eq!(normalize_registration("REG 42 A"), "REG42A");
        assert_eq!(normalize_registration("  r.e.g. 42a "), "REG42A");
    }
}
