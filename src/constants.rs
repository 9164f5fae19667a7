/// Source name constants to ensure consistency across the codebase.
/// These are the names used on the command line, in config files and as
/// column tags in the merged output.

pub const ODDS_API: &str = "odds_api";
pub const BARTTORVIK: &str = "barttorvik";
pub const DRATINGS: &str = "dratings";
pub const MASSEY: &str = "massey";

// Default endpoints
pub const ODDS_API_BASE_URL: &str = "https://api.the-odds-api.com";
pub const ODDS_API_SPORT: &str = "basketball_ncaab";
pub const ODDS_API_REGIONS: &str = "us";
pub const ODDS_API_MARKETS: &str = "h2h,spreads,totals";
pub const BARTTORVIK_URL: &str = "https://www.barttorvik.com/schedule.php";
pub const DRATINGS_URL: &str = "https://www.dratings.com/predictor/ncaa-basketball-predictions/";
pub const MASSEY_URL: &str = "https://masseyratings.com/cb/games";

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Crosswalk column holding the canonical team name
pub const DEFAULT_CANONICAL_COLUMN: &str = "API";

// Persisted registry artifacts
pub const TEAM_NAMES_FILE: &str = "team_names.json";
pub const TEAM_LOOKUP_FILE: &str = "team_lookup.json";

pub const ODDS_API_KEY_ENV: &str = "ODDS_API_KEY";

/// Get all supported source names
pub fn get_supported_sources() -> Vec<&'static str> {
    vec![ODDS_API, BARTTORVIK, DRATINGS, MASSEY]
}
