//! Predicates shared by the tag and VM listings.
//!
//! Regex predicates are unanchored searches, and a tag without a scope never
//! matches a scope pattern.

use regex::Regex;

use crate::db::entities::tag;
use crate::web::error::AppError;

pub fn compile_regex(pattern: &str) -> Result<Regex, AppError> {
    Regex::new(pattern)
        .map_err(|e| AppError::InvalidInput(format!("invalid regular expression '{pattern}': {e}")))
}

pub fn compile_optional_regex(pattern: Option<&str>) -> Result<Option<Regex>, AppError> {
    pattern.map(compile_regex).transpose()
}

pub fn scope_matches(pattern: &Regex, scope: Option<&str>) -> bool {
    scope.is_some_and(|s| pattern.is_match(s))
}

/// Every pattern must match the scope of at least one tag, not necessarily the same one.
pub fn has_scopes_matching_all(tags: &[tag::Model], patterns: &[Regex]) -> bool {
    patterns
        .iter()
        .all(|re| tags.iter().any(|t| scope_matches(re, t.scope.as_deref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn tag(name: &str, scope: Option<&str>) -> tag::Model {
        tag::Model {
            tag_id: Uuid::new_v4(),
            tag_name: name.to_string(),
            scope: scope.map(str::to_string),
            user_id: 1,
        }
    }

    #[test]
    fn test_malformed_regex_is_invalid_input() {
        let err = compile_regex("(unclosed").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_null_scope_never_matches() {
        let re = compile_regex(".*").unwrap();
        assert!(!scope_matches(&re, None));
        assert!(scope_matches(&re, Some("")));
    }

    #[test]
    fn test_scope_patterns_are_anded_across_tags() {
        let tags = vec![tag("env", Some("prod")), tag("team", Some("infra"))];
        let prod = compile_regex("^prod$").unwrap();
        let infra = compile_regex("infra").unwrap();
        let dev = compile_regex("dev").unwrap();

        assert!(has_scopes_matching_all(&tags, &[prod.clone(), infra]));
        assert!(!has_scopes_matching_all(&tags, &[prod, dev]));
    }
}
