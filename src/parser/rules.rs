//! Named text rules used by the provider parsers.
//!
//! Each rule is a compiled pattern plus the small conversion helpers that go
//! with it. Rules are grouped by provider.

use once_cell::sync::Lazy;
use regex::Regex;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in rule {pattern}: {e}"))
}

// --- Barttorvik ---

/// T-Rank line: `"<team> [-spread][, aa-bb] (pp%)"`, the team named being
/// the projected winner.
pub static TRANK_LINE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^\s*(?P<team>.+?)(?:\s+(?P<spread>-\d+\.?\d*))?(?:,\s*(?P<score>\d+-\d+))?\s*\((?P<prob>\d+)%\)\s*$",
    )
});

/// Projected score pair `"78-71"`
pub static SCORE_PAIR: Lazy<Regex> = Lazy::new(|| compile(r"^\s*(?P<a>\d+)\s*-\s*(?P<b>\d+)\s*$"));

// --- DRatings ---

/// Matchup cell: `"Away (w-l) Home (w-l)"`
pub static DRATINGS_TEAMS: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?P<away>.+?)\s*\((?P<away_record>\d+-\d+)\)\s*(?P<home>.+?)\s*\((?P<home_record>\d+-\d+)\)",
    )
});

/// Win cell: `"38.2% 61.8%"`, away first
pub static DRATINGS_WIN: Lazy<Regex> =
    Lazy::new(|| compile(r"(?P<away>\d+\.?\d*)%\s*(?P<home>\d+\.?\d*)%"));

/// Best-spread cell: `"+3½-110 -3½-108"`, away first, each point followed by
/// its price
pub static DRATINGS_SPREAD: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?P<away>[+-]?(?:\d+½?|½))\s*(?P<away_price>[-+]\d+)\s*(?P<home>[+-]?(?:\d+½?|½))\s*(?P<home_price>[-+]\d+)",
    )
});

// --- Shared ---

/// A percentage `"64%"`, `"64.5 %"` or a fraction `"0.645"`
pub static PERCENT: Lazy<Regex> =
    Lazy::new(|| compile(r"^\s*(?P<value>\d+(?:\.\d+)?)\s*(?P<pct>%)?\s*$"));

/// Leading `@` or `at` marking the home side
pub static HOME_MARKER: Lazy<Regex> = Lazy::new(|| compile(r"^\s*(?:@|at\s+)\s*"));

/// Parse a point value where `½` stands for `.5`: `"-3½"` → `-3.5`,
/// `"+½"` → `0.5`.
pub fn parse_half_point(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Some(stripped) = text.strip_suffix('½') {
        let (sign, digits) = match stripped.chars().next() {
            Some('-') => (-1.0, &stripped[1..]),
            Some('+') => (1.0, &stripped[1..]),
            _ => (1.0, stripped),
        };
        let whole: f64 = if digits.is_empty() { 0.0 } else { digits.parse().ok()? };
        return Some(sign * (whole + 0.5));
    }
    text.trim_start_matches('+').parse().ok()
}

/// Percentage on a 0-100 scale. Bare fractions at or below 1 are scaled up.
pub fn parse_percent(text: &str) -> Option<f64> {
    let caps = PERCENT.captures(text)?;
    let value: f64 = caps["value"].parse().ok()?;
    if caps.name("pct").is_none() && value <= 1.0 {
        Some(value * 100.0)
    } else {
        Some(value)
    }
}

/// Sum of a projected score pair, `"78-71"` → `149`
pub fn projected_total(score: &str) -> Option<f64> {
    let caps = SCORE_PAIR.captures(score)?;
    let a: f64 = caps["a"].parse().ok()?;
    let b: f64 = caps["b"].parse().ok()?;
    Some(a + b)
}

/// Strip a home marker from a team cell
pub fn strip_home_marker(text: &str) -> &str {
    match HOME_MARKER.find(text) {
        Some(m) => text[m.end()..].trim(),
        None => text.trim(),
    }
}
