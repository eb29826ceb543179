use std::collections::HashSet;

/// Collapse records sharing an identity key, keeping the first occurrence.
/// Records whose key is empty are dropped.
pub fn dedupe<T, F>(records: Vec<T>, identity: F) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let key = identity(record);
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}
