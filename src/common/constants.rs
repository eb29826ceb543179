/// Source and table name constants shared across jobs, stores and metrics.

// Source identifiers (used in logs, metrics labels and errors)
pub const NCES_SOURCE: &str = "nces_directory";
pub const ACTIVITY_HERO_SOURCE: &str = "activity_hero";

// Catalog tables
pub const SCHOOLS_TABLE: &str = "schools";
pub const CLUBS_TABLE: &str = "clubs";

// Identity key column used for school upserts
pub const SCHOOL_CONFLICT_KEY: &str = "slug";

// Upstream endpoints
pub const NCES_BASE_URL: &str = "https://educationdata.urban.org/api/v1";
pub const NCES_DIRECTORY_YEAR: u16 = 2022;
pub const ACTIVITY_HERO_SEARCH_URL: &str = "https://www.activityhero.com/search";

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// Defaults for courtesy limits
pub const DEFAULT_SETTLE_MS: u64 = 4_000;
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PACING_MS: u64 = 3_000;
pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_MAX_LISTINGS_PER_UNIT: usize = 15;
pub const DEFAULT_MAX_PAGES: usize = 20;

// Listing field handling
pub const LISTING_FIELD_MAX_CHARS: usize = 40;
pub const MIN_TITLE_CHARS: usize = 4;
pub const DEFAULT_AGE_RANGE: &str = "All Ages";
pub const DEFAULT_MEETING_TIME: &str = "Check provider for times";
pub const LOCAL_PROVIDER_KIND: &str = "Local Provider";
pub const PUBLIC_SCHOOL_TYPE: &str = "Public";

// Postal codes are grouped by their 5-digit prefix
pub const POSTAL_PREFIX_LEN: usize = 5;
