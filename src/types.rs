use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants;
use crate::error::LinesError;

/// The data providers this crate knows how to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    OddsApi,
    Barttorvik,
    #[serde(rename = "dratings")]
    DRatings,
    Massey,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::OddsApi => constants::ODDS_API,
            SourceId::Barttorvik => constants::BARTTORVIK,
            SourceId::DRatings => constants::DRATINGS,
            SourceId::Massey => constants::MASSEY,
        }
    }

    pub fn all() -> [SourceId; 4] {
        [
            SourceId::OddsApi,
            SourceId::Barttorvik,
            SourceId::DRatings,
            SourceId::Massey,
        ]
    }

    /// File extension of the payload this source publishes
    pub fn payload_extension(&self) -> &'static str {
        match self {
            SourceId::OddsApi => "json",
            _ => "html",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = LinesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            constants::ODDS_API => Ok(SourceId::OddsApi),
            constants::BARTTORVIK => Ok(SourceId::Barttorvik),
            constants::DRATINGS => Ok(SourceId::DRatings),
            constants::MASSEY => Ok(SourceId::Massey),
            other => Err(LinesError::Config(format!(
                "unknown source '{}'; supported: {}",
                other,
                constants::get_supported_sources().join(", ")
            ))),
        }
    }
}

/// Market and prediction fields a provider may publish for one game.
///
/// Every field is optional: a provider that does not post a market leaves it
/// `None`. Spreads use sportsbook convention (favorite negative).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_moneyline: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_moneyline: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_spread: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_spread_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_spread: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_spread_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub over_point: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub over_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub under_point: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub under_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_projected_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_projected_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_win_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_win_probability: Option<f64>,
}

impl LineSet {
    /// Field names in output column order
    pub const FIELD_NAMES: [&'static str; 15] = [
        "home_moneyline",
        "away_moneyline",
        "home_spread",
        "home_spread_price",
        "away_spread",
        "away_spread_price",
        "over_point",
        "over_price",
        "under_point",
        "under_price",
        "projected_total",
        "home_projected_score",
        "away_projected_score",
        "home_win_probability",
        "away_win_probability",
    ];

    pub fn values(&self) -> [Option<f64>; 15] {
        [
            self.home_moneyline,
            self.away_moneyline,
            self.home_spread,
            self.home_spread_price,
            self.away_spread,
            self.away_spread_price,
            self.over_point,
            self.over_price,
            self.under_point,
            self.under_price,
            self.projected_total,
            self.home_projected_score,
            self.away_projected_score,
            self.home_win_probability,
            self.away_win_probability,
        ]
    }

    /// Populated fields only, as (name, value) pairs
    pub fn present_fields(&self) -> Vec<(&'static str, f64)> {
        Self::FIELD_NAMES
            .iter()
            .zip(self.values())
            .filter_map(|(name, value)| value.map(|v| (*name, v)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values().iter().all(Option::is_none)
    }

    /// Exchange the home and away sides. Totals are side-independent.
    pub fn swapped(&self) -> Self {
        Self {
            home_moneyline: self.away_moneyline,
            away_moneyline: self.home_moneyline,
            home_spread: self.away_spread,
            home_spread_price: self.away_spread_price,
            away_spread: self.home_spread,
            away_spread_price: self.home_spread_price,
            home_projected_score: self.away_projected_score,
            away_projected_score: self.home_projected_score,
            home_win_probability: self.away_win_probability,
            away_win_probability: self.home_win_probability,
            ..self.clone()
        }
    }

    /// Set the spread for the favored/underdog pair given one side's value.
    pub fn set_spread_from_home(&mut self, home_spread: f64) {
        self.home_spread = Some(home_spread);
        self.away_spread = Some(negate(home_spread));
    }

    pub fn set_spread_from_away(&mut self, away_spread: f64) {
        self.away_spread = Some(away_spread);
        self.home_spread = Some(negate(away_spread));
    }

    /// Set both probabilities from one published side (percent scale).
    pub fn set_probability_from_home(&mut self, home_pct: f64) {
        self.home_win_probability = Some(home_pct);
        self.away_win_probability = Some(100.0 - home_pct);
    }

    pub fn set_probability_from_away(&mut self, away_pct: f64) {
        self.away_win_probability = Some(away_pct);
        self.home_win_probability = Some(100.0 - away_pct);
    }
}

// Avoids emitting -0.0 for pick'em lines
fn negate(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        -value
    }
}

/// One game as published by one provider, before team resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGameRecord {
    pub source: SourceId,
    pub home_team: String,
    pub away_team: String,
    /// Start instant when the provider publishes one
    pub start_time: Option<DateTime<Utc>>,
    /// Local slate date when the provider publishes one explicitly
    pub game_date: Option<NaiveDate>,
    /// Disambiguating sub-key, e.g. the sportsbook quoting the lines
    pub bookmaker: Option<String>,
    pub lines: LineSet,
}

impl RawGameRecord {
    pub fn new(
        source: SourceId,
        home_team: impl Into<String>,
        away_team: impl Into<String>,
    ) -> Self {
        Self {
            source,
            home_team: home_team.into(),
            away_team: away_team.into(),
            start_time: None,
            game_date: None,
            bookmaker: None,
            lines: LineSet::default(),
        }
    }

    /// Date bucket in the given local offset. An explicit slate date wins
    /// over a converted start instant.
    pub fn date_bucket(&self, offset: FixedOffset) -> Option<NaiveDate> {
        self.game_date
            .or_else(|| self.start_time.map(|t| t.with_timezone(&offset).date_naive()))
    }

    pub fn tag(&self) -> SourceTag {
        SourceTag {
            source: self.source,
            sub_key: self.bookmaker.clone(),
        }
    }

    /// Same game seen from the other bench
    pub fn swapped(&self) -> Self {
        Self {
            home_team: self.away_team.clone(),
            away_team: self.home_team.clone(),
            lines: self.lines.swapped(),
            ..self.clone()
        }
    }

    pub fn describe(&self) -> String {
        format!("{} @ {} ({})", self.away_team, self.home_team, self.source)
    }
}

/// Source label under which a merged record stores one contribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceTag {
    pub source: SourceId,
    pub sub_key: Option<String>,
}

impl SourceTag {
    pub fn plain(source: SourceId) -> Self {
        Self {
            source,
            sub_key: None,
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_key {
            Some(sub) => write!(f, "{}[{}]", self.source, sub),
            None => write!(f, "{}", self.source),
        }
    }
}

impl Serialize for SourceTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Join key: canonical teams plus local slate date. Field order gives the
/// output ordering (home, then away, then date).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResolvedGameKey {
    pub home: String,
    pub away: String,
    pub date: NaiveDate,
}

impl fmt::Display for ResolvedGameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} on {}", self.away, self.home, self.date)
    }
}

/// Final output unit: one real-world game with per-source contributions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedGameRecord {
    pub key: ResolvedGameKey,
    pub start_time: Option<DateTime<Utc>>,
    pub contributions: BTreeMap<SourceTag, LineSet>,
}

impl MergedGameRecord {
    pub fn contribution(&self, tag: &SourceTag) -> Option<&LineSet> {
        self.contributions.get(tag)
    }

    pub fn has_source(&self, source: SourceId) -> bool {
        self.contributions.keys().any(|tag| tag.source == source)
    }
}
