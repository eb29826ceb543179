use crate::browser::{BrowserOptions, RenderOptions};
use crate::common::constants::{
    ACTIVITY_HERO_SEARCH_URL, BROWSER_USER_AGENT, DEFAULT_BATCH_SIZE,
    DEFAULT_MAX_LISTINGS_PER_UNIT, DEFAULT_MAX_PAGES, DEFAULT_NAVIGATION_TIMEOUT_MS,
    DEFAULT_PACING_MS, DEFAULT_SETTLE_MS, NCES_BASE_URL, NCES_DIRECTORY_YEAR,
};
use crate::common::error::{IngestError, Result};
use crate::pipeline::pacing::Pacing;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const PLACEHOLDER_MARKER: &str = "your-project-id";
const STORE_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the catalog store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub service_key: String,
    pub timeout: Duration,
}

/// Process-level configuration, validated once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub settings: IngestSettings,
}

impl AppConfig {
    /// Load `.env.local` / `.env`, read store credentials from the environment
    /// and tunables from `settings_path` when given.
    pub fn from_env(settings_path: Option<&Path>) -> Result<Self> {
        load_dotenv();
        let store = StoreConfig::from_lookup(|name| std::env::var(name).ok())?;
        let settings = IngestSettings::load(settings_path)?;
        Ok(Self { store, settings })
    }
}

fn load_dotenv() {
    for file in [".env.local", ".env"] {
        if dotenv::from_filename(file).is_ok() {
            debug!("Loaded environment from {}", file);
        }
    }
}

impl StoreConfig {
    /// Build from an environment lookup. The service-role key is preferred;
    /// the anon key is accepted as a fallback.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = required(&lookup, "SUPABASE_URL")?;
        let service_key = match lookup("SUPABASE_SERVICE_ROLE_KEY") {
            Some(key) if !key.trim().is_empty() => checked("SUPABASE_SERVICE_ROLE_KEY", key)?,
            _ => required(&lookup, "SUPABASE_ANON_KEY").map_err(|_| {
                IngestError::Config(
                    "Missing SUPABASE_SERVICE_ROLE_KEY (or SUPABASE_ANON_KEY)".to_string(),
                )
            })?,
        };

        Ok(Self {
            url,
            service_key,
            timeout: Duration::from_secs(STORE_TIMEOUT_SECS),
        })
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => checked(name, value),
        None => Err(IngestError::Config(format!("Missing {name}"))),
    }
}

fn checked(name: &str, value: String) -> Result<String> {
    let value = value.trim().to_string();
    if value.is_empty() || value.contains(PLACEHOLDER_MARKER) {
        return Err(IngestError::Config(format!(
            "{name} is empty or still a placeholder value"
        )));
    }
    Ok(value)
}

/// Tunables read from an optional TOML file. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub pacing: Pacing,
    pub settle_ms: u64,
    pub navigation_timeout_ms: u64,
    pub batch_size: usize,
    pub max_listings_per_unit: usize,
    pub search_url: String,
    pub nces: NcesSettings,
    pub browser: BrowserSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NcesSettings {
    pub base_url: String,
    pub year: u16,
    pub max_pages: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub user_agent: String,
    pub executable: Option<PathBuf>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            pacing: Pacing::Fixed {
                millis: DEFAULT_PACING_MS,
            },
            settle_ms: DEFAULT_SETTLE_MS,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_listings_per_unit: DEFAULT_MAX_LISTINGS_PER_UNIT,
            search_url: ACTIVITY_HERO_SEARCH_URL.to_string(),
            nces: NcesSettings::default(),
            browser: BrowserSettings::default(),
        }
    }
}

impl Default for NcesSettings {
    fn default() -> Self {
        Self {
            base_url: NCES_BASE_URL.to_string(),
            year: NCES_DIRECTORY_YEAR,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: BROWSER_USER_AGENT.to_string(),
            executable: None,
        }
    }
}

impl IngestSettings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let settings: IngestSettings = toml::from_str(&content)?;
        info!("Loaded ingest settings from {}", path.display());
        Ok(settings)
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            settle: Pacing::Fixed {
                millis: self.settle_ms,
            },
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
        }
    }

    pub fn browser_options(&self) -> BrowserOptions {
        let defaults = BrowserOptions::default();
        BrowserOptions {
            executable: self.browser.executable.clone().or(defaults.executable),
            headless: self.browser.headless,
            user_agent: self.browser.user_agent.clone(),
            request_timeout: Duration::from_millis(self.navigation_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn service_role_key_is_preferred() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "service"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))
        .unwrap();
        assert_eq!(config.service_key, "service");
    }

    #[test]
    fn anon_key_is_the_fallback() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))
        .unwrap();
        assert_eq!(config.service_key, "anon");
    }

    #[test]
    fn missing_or_placeholder_values_are_fatal() {
        let cases = [
            lookup(&[("SUPABASE_SERVICE_ROLE_KEY", "k")]),
            lookup(&[("SUPABASE_URL", "https://abc.supabase.co")]),
            lookup(&[
                ("SUPABASE_URL", "https://your-project-id.supabase.co"),
                ("SUPABASE_SERVICE_ROLE_KEY", "k"),
            ]),
            lookup(&[("SUPABASE_URL", "  "), ("SUPABASE_SERVICE_ROLE_KEY", "k")]),
        ];
        for case in cases {
            let err = StoreConfig::from_lookup(case).unwrap_err();
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn settings_default_without_file() {
        let settings = IngestSettings::load(None).unwrap();
        assert_eq!(settings.batch_size, 20);
        assert_eq!(settings.max_listings_per_unit, 15);
        assert_eq!(settings.pacing, Pacing::Fixed { millis: 3_000 });
        assert_eq!(settings.nces.year, 2022);
    }

    #[test]
    fn settings_file_overrides_selected_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
batch_size = 5
settle_ms = 100

[pacing]
kind = "immediate"

[nces]
max_pages = 2
"#
        )
        .unwrap();

        let settings = IngestSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.batch_size, 5);
        assert_eq!(settings.pacing, Pacing::Immediate);
        assert_eq!(settings.nces.max_pages, 2);
        assert_eq!(settings.nces.year, 2022);
        assert_eq!(settings.max_listings_per_unit, 15);
        assert_eq!(
            settings.render_options().settle,
            Pacing::Fixed { millis: 100 }
        );
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let err = IngestSettings::load(Some(Path::new("/nonexistent/ingest.toml"))).unwrap_err();
        assert!(err.is_fatal());
    }
}
