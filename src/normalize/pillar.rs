use crate::common::types::Pillar;
use regex::Regex;

/// Ordered keyword rules mapping a listing title to a [`Pillar`].
///
/// Rules are tested in order and the first pillar with a matching keyword wins,
/// so a title such as "Robotics and Dance Club" lands in whichever of its
/// candidate pillars is listed first. Keywords match as substrings of the
/// lower-cased title. A run must use a single rule set throughout.
#[derive(Debug, Clone)]
pub struct PillarRules {
    name: &'static str,
    rules: Vec<(Pillar, Regex)>,
}

impl PillarRules {
    pub fn from_keywords(name: &'static str, table: &[(Pillar, &[&str])]) -> Self {
        let rules = table
            .iter()
            .filter(|(_, words)| !words.is_empty())
            .map(|(pillar, words)| {
                let alternation = words
                    .iter()
                    .map(|w| regex::escape(&w.to_lowercase()))
                    .collect::<Vec<_>>()
                    .join("|");
                let pattern = Regex::new(&format!("({alternation})"))
                    .expect("escaped keyword alternation is a valid pattern");
                (*pillar, pattern)
            })
            .collect();
        Self { name, rules }
    }

    /// Rule set used by the statewide club ingestion: stem, art, drama, sport.
    pub fn standard() -> Self {
        Self::from_keywords(
            "standard",
            &[
                (
                    Pillar::Stem,
                    &["code", "coding", "robotics", "math", "science", "tech", "lego", "engineering", "stem"],
                ),
                (
                    Pillar::Art,
                    &["art", "paint", "draw", "pottery", "design", "music", "clay", "craft"],
                ),
                (
                    Pillar::Drama,
                    &["drama", "theater", "theatre", "improv", "act", "stage", "dance"],
                ),
                (
                    Pillar::Sport,
                    &[
                        "sport",
                        "soccer",
                        "tennis",
                        "basketball",
                        "swim",
                        "martial arts",
                        "karate",
                        "gymnastics",
                        "track",
                        "camp",
                        "fitness",
                    ],
                ),
            ],
        )
    }

    /// Smaller rule set used by the regional pathway. Performing arts fold into art.
    pub fn compact() -> Self {
        Self::from_keywords(
            "compact",
            &[
                (Pillar::Stem, &["code", "math", "science", "tech", "stem"]),
                (
                    Pillar::Art,
                    &["art", "paint", "draw", "music", "dance", "drama", "theater"],
                ),
                (
                    Pillar::Sport,
                    &["sport", "soccer", "tennis", "swim", "camp", "fitness"],
                ),
            ],
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn classify(&self, title: &str) -> Pillar {
        let lower = title.to_lowercase();
        self.rules
            .iter()
            .find(|(_, pattern)| pattern.is_match(&lower))
            .map(|(pillar, _)| *pillar)
            .unwrap_or(Pillar::Other)
    }
}

impl Default for PillarRules {
    fn default() -> Self {
        Self::standard()
    }
}
