//! Account holder name policy.
//!
//! Bank records often append suffixes ("Traders", "Pvt Ltd") or drop middle
//! names, so a claimed holder name is accepted when, after normalization, its
//! words appear as a contiguous run in one of the store's allowed names, or
//! the other way round. Partial words never match.

/// Shortest normalized name that may match by containment. Keeps initials
/// like "rk" from matching arbitrary names.
const MIN_MATCH_LEN: usize = 3;

/// Lowercase, drop punctuation, collapse whitespace.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decide whether `claimed` is acceptable for a store whose identities are
/// `allowed`. Empty or absent identities are ignored.
#[must_use]
pub fn name_matches<'a, I>(claimed: &str, allowed: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let claimed = normalize_name(claimed);
    if claimed.is_empty() {
        return false;
    }

    allowed.into_iter().any(|candidate| {
        let candidate = normalize_name(candidate);
        if candidate.is_empty() {
            return false;
        }
        if candidate == claimed {
            return true;
        }
        let (shorter, longer) = if candidate.len() <= claimed.len() {
            (&candidate, &claimed)
        } else {
            (&claimed, &candidate)
        };
        shorter.len() >= MIN_MATCH_LEN && contains_words(longer, shorter)
    })
}

/// Whether the words of `needle` occur consecutively in `haystack`. Both
/// must be normalized.
fn contains_words(haystack: &str, needle: &str) -> bool {
    let haystack: Vec<&str> = haystack.split(' ').collect();
    let needle: Vec<&str> = needle.split(' ').collect();
    haystack.windows(needle.len()).any(|run| run == needle.as_slice())
}
