//! "Did you mean" candidates for unresolved identifiers.

/// At most this many suggestions per unresolved identifier.
pub const MAX_SUGGESTIONS: usize = 3;

/// Shared prefix length that makes a candidate eligible regardless of
/// edit distance.
const PREFIX_MATCH: usize = 4;

/// Rank `candidates` against `needle` and return the best few.
///
/// Both sides are compared on their object part (after the first `.`), so
/// that the shared domain does not dilute the distance. A candidate is
/// eligible when its distance is at most `max(2, len / 2)` of the needle's
/// object part, or when the object parts share a prefix of at least four
/// characters. Ties are broken by identifier.
pub fn suggest<'a>(needle: &str, candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let target = object_part(needle);
    let budget = (target.chars().count() / 2).max(2);
    let mut ranked: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter(|c| *c != needle)
        .filter_map(|c| {
            let object = object_part(c);
            let distance = levenshtein(target, object);
            let eligible = distance <= budget || common_prefix(target, object) >= PREFIX_MATCH;
            eligible.then_some((distance, c))
        })
        .collect();
    ranked.sort_unstable();
    ranked.dedup();
    ranked
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, c)| c.to_string())
        .collect()
}

fn object_part(id: &str) -> &str {
    id.split_once('.').map_or(id, |(_, object)| object)
}

fn common_prefix(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

/// Levenshtein edit distance over characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
