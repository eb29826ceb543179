use once_cell::sync::Lazy;
use regex::Regex;

static NON_ALNUM_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static pattern compiles"));

/// Derive the identity key for an entity from its human-readable fields.
///
/// The three fields are joined with `-`, lower-cased, and every run of
/// characters outside `[a-z0-9]` becomes a single hyphen. Leading and trailing
/// hyphens are stripped. Locality and region are part of the key so that
/// same-named schools in different towns do not collide.
///
/// Never fails. Inputs without any ASCII alphanumerics produce an empty key,
/// see [`is_valid_key`].
pub fn generate_key(name: &str, locality: &str, region: &str) -> String {
    let joined = format!("{name}-{locality}-{region}").to_lowercase();
    let collapsed = NON_ALNUM_RUN.replace_all(&joined, "-");
    collapsed.trim_matches('-').to_string()
}

pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().any(|c| c != '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lincoln_high_key() {
        assert_eq!(
            generate_key("Lincoln High School", "Springfield", "IL"),
            "lincoln-high-school-springfield-il"
        );
    }

    #[test]
    fn same_inputs_same_key() {
        let a = generate_key("St. Mary's Academy", "San José", "CA");
        let b = generate_key("St. Mary's Academy", "San José", "CA");
        assert_eq!(a, b);
        assert_eq!(a, "st-mary-s-academy-san-jos-ca");
    }

    #[test]
    fn locality_separates_same_named_schools() {
        assert_ne!(
            generate_key("Washington Elementary", "Oakland", "CA"),
            generate_key("Washington Elementary", "San Jose", "CA")
        );
    }

    #[test]
    fn symbol_runs_collapse_to_one_hyphen() {
        assert_eq!(generate_key("  A &&& B  ", "--C--", "D!!"), "a-b-c-d");
    }

    #[test]
    fn empty_inputs_give_invalid_key() {
        let key = generate_key("", "", "");
        assert_eq!(key, "");
        assert!(!is_valid_key(&key));
        assert!(!is_valid_key(&generate_key("***", "", "日本")));
        assert!(is_valid_key("a"));
    }
}
