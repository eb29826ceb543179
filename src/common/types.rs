use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Raw school directory row as returned by the structured source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchoolRecord {
    #[serde(default)]
    pub school_name: Option<String>,
    #[serde(default)]
    pub street_location: Option<String>,
    #[serde(default)]
    pub city_location: Option<String>,
    #[serde(default)]
    pub state_location: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub zip_location: Option<String>,
}

/// One listing scraped from a rendered search page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub name: String,
    pub age_range: String,
    pub meeting_time: String,
    pub kind: String,
}

/// Listing category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pillar {
    Stem,
    Art,
    Drama,
    Sport,
    Other,
}

impl Pillar {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pillar::Stem => "stem",
            Pillar::Art => "art",
            Pillar::Drama => "drama",
            Pillar::Sport => "sport",
            Pillar::Other => "other",
        }
    }
}

impl fmt::Display for Pillar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parent entity: a school, upserted on `slug`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_or_number"
    )]
    pub id: Option<String>,
    pub name: String,
    pub slug: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub zip_code: Option<String>,
}

/// Child listing attached to exactly one school. Insert-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Club {
    pub school_id: String,
    pub pillar: Pillar,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub age_range: String,
    pub meeting_time: String,
}

/// Accepts JSON strings, numbers or null for identifier-like columns.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn school_record_accepts_numeric_zip_and_nulls() {
        let record: SchoolRecord = serde_json::from_value(json!({
            "school_name": "Mission High",
            "street_location": null,
            "city_location": "SAN FRANCISCO",
            "state_location": "CA",
            "zip_location": 94110
        }))
        .unwrap();

        assert_eq!(record.zip_location.as_deref(), Some("94110"));
        assert_eq!(record.street_location, None);
    }

    #[test]
    fn club_serializes_type_and_lowercase_pillar() {
        let club = Club {
            school_id: "42".into(),
            pillar: Pillar::Drama,
            name: "Improv Comedy".into(),
            kind: "Local Provider".into(),
            age_range: "11-15".into(),
            meeting_time: "Tue 3:30 PM".into(),
        };
        let value = serde_json::to_value(&club).unwrap();
        assert_eq!(value["pillar"], "drama");
        assert_eq!(value["type"], "Local Provider");
    }

    #[test]
    fn school_id_is_omitted_until_assigned() {
        let school = School {
            id: None,
            name: "Lincoln High School".into(),
            slug: "lincoln-high-school-springfield-il".into(),
            kind: "Public".into(),
            address: None,
            city: Some("Springfield".into()),
            state: Some("IL".into()),
            zip_code: Some("62701".into()),
        };
        let value = serde_json::to_value(&school).unwrap();
        assert!(value.get("id").is_none());

        let stored: School = serde_json::from_value(json!({
            "id": 7, "name": "Lincoln High School", "slug": "x", "type": "Public"
        }))
        .unwrap();
        assert_eq!(stored.id.as_deref(), Some("7"));
    }
}
