//! Sequential subset display names
//!
//! Names look like `Markets_SUB3`. They are decoration only; identity is the
//! signature. The numeric suffix is one past the highest suffix ever handed
//! out in the (project, list) scope, so deleted names are not reused.

/// Separator between list name and sequence number
pub const DEFAULT_NAME_SEPARATOR: &str = "_SUB";

/// Result of name generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextName {
    /// Generated display name
    pub name: String,
    /// Sequence number embedded in `name`; the new high-water mark
    pub sequence: u32,
}

/// Parse the sequence number out of `name` if it is `{list_name}{separator}{N}`
#[must_use]
pub fn parse_subset_suffix(name: &str, list_name: &str, separator: &str) -> Option<u32> {
    let rest = name.strip_prefix(list_name)?.strip_prefix(separator)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Generate the next subset name for a scope
///
/// `high_water` is the largest sequence previously issued for the scope
/// (zero if none). Existing names that do not follow the pattern are ignored.
#[must_use]
pub fn next_subset_name<'a, I>(
    list_name: &str,
    separator: &str,
    existing_names: I,
    high_water: u32,
) -> NextName
where
    I: IntoIterator<Item = &'a str>,
{
    let highest = existing_names
        .into_iter()
        .filter_map(|n| parse_subset_suffix(n, list_name, separator))
        .fold(high_water, u32::max);
    let sequence = highest.saturating_add(1);
    NextName {
        name: format!("{list_name}{separator}{sequence}"),
        sequence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_name_is_one() {
        let next = next_subset_name("Markets", DEFAULT_NAME_SEPARATOR, [], 0);
        assert_eq!(next.name, "Markets_SUB1");
        assert_eq!(next.sequence, 1);
    }

    #[test]
    fn gaps_are_tolerated() {
        let next = next_subset_name("Markets", "_SUB", ["Markets_SUB1", "Markets_SUB4"], 0);
        assert_eq!(next.name, "Markets_SUB5");
    }

    #[test]
    fn high_water_prevents_reuse() {
        // SUB3 was issued and later deleted
        let next = next_subset_name("Markets", "_SUB", ["Markets_SUB1"], 3);
        assert_eq!(next.name, "Markets_SUB4");
    }

    #[test]
    fn unrelated_names_are_ignored() {
        let existing = ["Countries_SUB9", "Markets_SUBx", "Markets_SUB", "Markets_SUB2b", "Custom"];
        let next = next_subset_name("Markets", "_SUB", existing, 0);
        assert_eq!(next.name, "Markets_SUB1");
    }

    #[test]
    fn parse_suffix() {
        assert_eq!(parse_subset_suffix("Markets_SUB12", "Markets", "_SUB"), Some(12));
        assert_eq!(parse_subset_suffix("Markets_SUB-1", "Markets", "_SUB"), None);
        assert_eq!(parse_subset_suffix("Other_SUB1", "Markets", "_SUB"), None);
    }

    proptest! {
        #[test]
        fn prop_generated_name_parses_back(n in 0u32..100_000, name in "[A-Za-z]{1,12}") {
            let next = next_subset_name(&name, "_SUB", [], n);
            prop_assert_eq!(parse_subset_suffix(&next.name, &name, "_SUB"), Some(n + 1));
        }
    }
}
