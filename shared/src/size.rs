use std::cmp::Ordering;

/// Canonical letter sizes, smallest first. "2XL" is folded into "XXL" before lookup.
const LETTER_SIZES: [&str; 8] = ["XS", "S", "M", "L", "XL", "XXL", "3XL", "4XL"];

const FREE: &str = "FREE";

/// Grouping key used for records without an item number.
pub const UNKNOWN_ITEM: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeOrdering {
    #[default]
    Standard,
    /// Operational quantity views: "FREE" goes after everything else.
    FreeLast,
}

/// Sort key for a normalized label. The derived `Ord` is the size order:
/// numbers, then table sizes, then unrecognized labels, then blanks.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SizeKey {
    // (digit count, digits) with leading zeros removed, so any length compares correctly
    Numeric(usize, String),
    Letter(usize),
    Other(String),
    Blank,
}

impl SizeKey {
    fn of(label: &str) -> Self {
        let label = label.trim().to_uppercase();
        if label.is_empty() {
            return SizeKey::Blank;
        }
        if label.bytes().all(|b| b.is_ascii_digit()) {
            let digits = label.trim_start_matches('0');
            let digits = if digits.is_empty() { "0" } else { digits };
            return SizeKey::Numeric(digits.len(), digits.to_string());
        }
        let lookup = if label == "2XL" { "XXL" } else { label.as_str() };
        match LETTER_SIZES.iter().position(|s| *s == lookup) {
            Some(rank) => SizeKey::Letter(rank),
            None => SizeKey::Other(label),
        }
    }
}

fn is_free(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case(FREE)
}

/// Compares two size labels in the standard order.
///
/// Never fails: blank labels sort after every non-blank one.
pub fn compare_sizes(a: &str, b: &str) -> Ordering {
    compare_sizes_with(a, b, SizeOrdering::Standard)
}

pub fn compare_sizes_with(a: &str, b: &str, ordering: SizeOrdering) -> Ordering {
    if ordering == SizeOrdering::FreeLast {
        match (is_free(a), is_free(b)) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }
    }
    SizeKey::of(a).cmp(&SizeKey::of(b))
}

/// Stable sort of `items` by the size label returned from `label`.
pub fn sort_by_size<T, F>(items: &mut [T], ordering: SizeOrdering, label: F)
where
    F: Fn(&T) -> &str,
{
    items.sort_by(|x, y| compare_sizes_with(label(x), label(y), ordering));
}

/// Portion of a code before the first "-"; the whole code if there is none.
pub fn item_prefix(code: &str) -> &str {
    let code = code.trim();
    match code.find('-') {
        Some(idx) => &code[..idx],
        None => code,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizeGroup<T> {
    pub item_number: String,
    pub variants: Vec<T>,
}

/// Groups records by item number (falling back to `"unknown"`) and orders
/// each group's variants by size. Groups come back ordered by key.
pub fn group_by_item_number<T, K, S>(
    records: Vec<T>,
    ordering: SizeOrdering,
    item_number: K,
    specification: S,
) -> Vec<SizeGroup<T>>
where
    K: Fn(&T) -> Option<&str>,
    S: Fn(&T) -> Option<&str>,
{
    let mut groups: std::collections::BTreeMap<String, Vec<T>> = std::collections::BTreeMap::new();
    for record in records {
        let key = match item_number(&record).map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => UNKNOWN_ITEM.to_string(),
        };
        groups.entry(key).or_default().push(record);
    }

    groups
        .into_iter()
        .map(|(item_number, mut variants)| {
            sort_by_size(&mut variants, ordering, |r| specification(r).unwrap_or(""));
            SizeGroup { item_number, variants }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_labels_compare_as_integers() {
        assert_eq!(compare_sizes("85", "90"), Ordering::Less);
        assert_eq!(compare_sizes("100", "95"), Ordering::Greater);
        assert_eq!(compare_sizes("095", "95"), Ordering::Equal);
        assert_eq!(compare_sizes("0", "000"), Ordering::Equal);
        assert_eq!(
            compare_sizes("123456789012345678901234567890", "99"),
            Ordering::Greater
        );
    }

    #[test]
    fn letter_sizes_follow_table_order() {
        let mut labels = vec!["4XL", "m", "XS", " l ", "XXL", "S", "3XL", "XL"];
        labels.sort_by(|a, b| compare_sizes(a, b));
        assert_eq!(labels, vec!["XS", "S", "m", " l ", "XL", "XXL", "3XL", "4XL"]);
    }

    #[test]
    fn two_xl_ranks_with_xxl() {
        assert_eq!(compare_sizes("2XL", "XXL"), Ordering::Equal);
        assert_eq!(compare_sizes("2xl", "XL"), Ordering::Greater);
        assert_eq!(compare_sizes("2XL", "3XL"), Ordering::Less);
    }

    #[test]
    fn numbers_before_letters_before_unknown() {
        assert_eq!(compare_sizes("110", "XS"), Ordering::Less);
        assert_eq!(compare_sizes("4XL", "ONESIZE"), Ordering::Less);
        assert_eq!(compare_sizes("FREE", "XL"), Ordering::Greater);
        assert_eq!(compare_sizes("ABC", "abd"), Ordering::Less);
        assert_eq!(compare_sizes("free", "FREE"), Ordering::Equal);
    }

    #[test]
    fn blank_labels_sort_last() {
        assert_eq!(compare_sizes("", "XL"), Ordering::Greater);
        assert_eq!(compare_sizes("   ", "ZZZ"), Ordering::Greater);
        assert_eq!(compare_sizes("", ""), Ordering::Equal);
        assert_eq!(compare_sizes("90", ""), Ordering::Less);
    }

    #[test]
    fn free_last_puts_free_after_everything() {
        for other in ["XS", "4XL", "100", "ZZZ", "", "2XL"] {
            assert_eq!(
                compare_sizes_with("FREE", other, SizeOrdering::FreeLast),
                Ordering::Greater,
                "FREE vs {other:?}"
            );
            assert_eq!(
                compare_sizes_with(other, "free", SizeOrdering::FreeLast),
                Ordering::Less
            );
        }
    }

    #[test]
    fn item_prefix_truncates_at_first_dash() {
        assert_eq!(item_prefix("TS100-BK-XL"), "TS100");
        assert_eq!(item_prefix("TS100"), "TS100");
        assert_eq!(item_prefix(""), "");
    }

    #[test]
    fn grouping_uses_unknown_bucket_and_sorts_variants() {
        let records = vec![
            (Some("TS100"), Some("XL")),
            (None, Some("M")),
            (Some("TS100"), Some("S")),
            (Some(""), None),
            (Some("TS100"), Some("2XL")),
        ];
        let groups = group_by_item_number(records, SizeOrdering::Standard, |r| r.0, |r| r.1);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].item_number, "TS100");
        let specs: Vec<_> = groups[0].variants.iter().map(|r| r.1.unwrap()).collect();
        assert_eq!(specs, vec!["S", "XL", "2XL"]);

        assert_eq!(groups[1].item_number, UNKNOWN_ITEM);
        assert_eq!(groups[1].variants, vec![(None, Some("M")), (Some(""), None)]);
    }
}
