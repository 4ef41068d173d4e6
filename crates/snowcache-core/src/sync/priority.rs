use std::collections::BTreeSet;

/// Order `ids` favorites first, keeping relative order within each group,
/// then truncate to `cap`. Favorites are dropped only if they alone exceed
/// the cap.
pub fn prioritize_ids(ids: &[String], favorites: &BTreeSet<String>, cap: usize) -> Vec<String> {
    let (mut ordered, rest): (Vec<String>, Vec<String>) =
        ids.iter().cloned().partition(|id| favorites.contains(id));
    ordered.extend(rest);
    ordered.truncate(cap);
    ordered
}
