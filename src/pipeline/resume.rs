use crate::common::constants::POSTAL_PREFIX_LEN;
use crate::common::types::School;
use std::collections::{HashMap, HashSet};

/// A postal-prefix work unit and the ids of the schools it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub key: String,
    pub parent_ids: Vec<String>,
}

impl WorkUnit {
    pub fn new(key: impl Into<String>, parent_ids: Vec<String>) -> Self {
        Self {
            key: key.into(),
            parent_ids,
        }
    }
}

/// First five characters of a postal code, or `None` when it is blank.
pub fn postal_prefix(zip: &str) -> Option<String> {
    let zip = zip.trim();
    if zip.is_empty() {
        return None;
    }
    Some(zip.chars().take(POSTAL_PREFIX_LEN).collect())
}

/// Group stored schools into units by postal prefix, in first-seen order.
/// Schools without an id or zip code belong to no unit.
pub fn group_into_units(schools: &[School]) -> Vec<WorkUnit> {
    let mut order: Vec<String> = Vec::new();
    let mut members: HashMap<String, Vec<String>> = HashMap::new();

    for school in schools {
        let (Some(id), Some(prefix)) = (
            school.id.as_ref(),
            school.zip_code.as_deref().and_then(postal_prefix),
        ) else {
            continue;
        };
        let ids = members.entry(prefix.clone()).or_insert_with(|| {
            order.push(prefix);
            Vec::new()
        });
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }

    order
        .into_iter()
        .filter_map(|key| {
            let ids = members.remove(&key)?;
            Some(WorkUnit::new(key, ids))
        })
        .collect()
}

/// Keys of units with no member present in `completed_parent_ids`, in input order.
pub fn pending_units(all_units: &[WorkUnit], completed_parent_ids: &HashSet<String>) -> Vec<String> {
    all_units
        .iter()
        .filter(|unit| !unit.parent_ids.iter().any(|id| completed_parent_ids.contains(id)))
        .map(|unit| unit.key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn school(id: Option<&str>, zip: Option<&str>) -> School {
        School {
            id: id.map(String::from),
            name: "Test School".into(),
            slug: format!("test-{}", id.unwrap_or("none")),
            kind: "Public".into(),
            address: None,
            city: None,
            state: None,
            zip_code: zip.map(String::from),
        }
    }

    #[test]
    fn unit_with_completed_member_is_skipped() {
        let units = vec![
            WorkUnit::new("U1", vec!["p1".into()]),
            WorkUnit::new("U2", vec!["p2".into(), "p3".into()]),
            WorkUnit::new("U3", vec!["p4".into()]),
        ];
        let done = HashSet::from(["p3".to_string()]);
        assert_eq!(pending_units(&units, &done), vec!["U1", "U3"]);
    }

    #[test]
    fn nothing_completed_keeps_everything() {
        let units = vec![WorkUnit::new("94110", vec!["a".into()])];
        assert_eq!(pending_units(&units, &HashSet::new()), vec!["94110"]);
    }

    #[test]
    fn grouping_uses_five_digit_prefix_in_first_seen_order() {
        let schools = vec![
            school(Some("1"), Some("94110-1234")),
            school(Some("2"), Some("94601")),
            school(Some("3"), Some("94110")),
            school(None, Some("94110")),
            school(Some("4"), None),
            school(Some("5"), Some("  ")),
        ];
        let units = group_into_units(&schools);
        assert_eq!(
            units,
            vec![
                WorkUnit::new("94110", vec!["1".into(), "3".into()]),
                WorkUnit::new("94601", vec!["2".into()]),
            ]
        );
    }
}
