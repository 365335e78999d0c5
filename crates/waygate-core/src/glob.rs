//! Single-`*` glob matching.
//!
//! The only pattern language used across Waygate: `*` matches any run of
//! characters (including none). Used by tool patterns, OpenAPI
//! include/exclude lists, and nothing else.

/// Match `value` against `pattern`, where `*` matches any run of
/// characters. Matching is case-sensitive.
#[must_use]
pub fn glob_match(pattern: &str, value: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == value;
    }

    let mut rest = value;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            // Anchored at the start.
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len().saturating_sub(1) {
            // Anchored at the end.
            match rest.strip_suffix(part) {
                Some(_) => return true,
                None => return false,
            }
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos.saturating_add(part.len())..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        assert!(glob_match("get_user", "get_user"));
        assert!(!glob_match("get_user", "get_users"));
    }

    #[test]
    fn test_star_alone() {
        assert!(glob_match("*", ""));
        assert!(glob_match("*", "anything"));
    }

    #[test]
    fn test_prefix() {
        assert!(glob_match("get*", "get_user"));
        assert!(glob_match("get*", "get"));
        assert!(!glob_match("get*", "list_users"));
    }

    #[test]
    fn test_suffix() {
        assert!(glob_match("*_user", "get_user"));
        assert!(!glob_match("*_user", "get_users"));
    }

    #[test]
    fn test_middle() {
        assert!(glob_match("get*user", "get_the_user"));
        assert!(glob_match("a*b*c", "aXbYc"));
        assert!(!glob_match("a*b*c", "acb"));
    }
}
