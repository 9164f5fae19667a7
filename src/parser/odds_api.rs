use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{LineParser, ParseOutcome};
use crate::error::Result;
use crate::types::{LineSet, RawGameRecord, SourceId};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OddsApiEvent {
    pub id: String,
    pub sport_key: String,
    pub commence_time: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Bookmaker {
    pub key: String,
    pub title: String,
    pub markets: Vec<Market>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Market {
    pub key: String,
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Outcome {
    pub name: String,
    pub price: Option<f64>,
    pub point: Option<f64>,
}

/// Parser for the odds API `/v4/sports/{sport}/odds` response.
///
/// Emits one record per (game, bookmaker). A game nobody quotes still yields
/// one line-less record so the schedule it defines stays complete.
pub struct OddsApiParser;

impl Default for OddsApiParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OddsApiParser {
    pub fn new() -> Self {
        Self
    }

    fn lines_for(bookmaker: &Bookmaker, home: &str, away: &str) -> LineSet {
        let mut lines = LineSet::default();
        for market in &bookmaker.markets {
            match market.key.as_str() {
                "h2h" => {
                    for outcome in &market.outcomes {
                        if outcome.name == home {
                            lines.home_moneyline = outcome.price;
                        } else if outcome.name == away {
                            lines.away_moneyline = outcome.price;
                        }
                    }
                }
                "spreads" => {
                    for outcome in &market.outcomes {
                        if outcome.name == home {
                            lines.home_spread = outcome.point;
                            lines.home_spread_price = outcome.price;
                        } else if outcome.name == away {
                            lines.away_spread = outcome.point;
                            lines.away_spread_price = outcome.price;
                        }
                    }
                }
                "totals" => {
                    for outcome in &market.outcomes {
                        match outcome.name.as_str() {
                            "Over" => {
                                lines.over_point = outcome.point;
                                lines.over_price = outcome.price;
                            }
                            "Under" => {
                                lines.under_point = outcome.point;
                                lines.under_price = outcome.price;
                            }
                            _ => {}
                        }
                    }
                    if let (Some(over), Some(under)) = (lines.over_point, lines.under_point) {
                        lines.projected_total = Some((over + under) / 2.0);
                    }
                }
                other => debug!("odds_api: ignoring market '{}'", other),
            }
        }
        lines
    }
}

impl LineParser for OddsApiParser {
    fn source(&self) -> SourceId {
        SourceId::OddsApi
    }

    fn parse(&self, payload: &[u8]) -> Result<ParseOutcome> {
        let events: Vec<OddsApiEvent> = serde_json::from_slice(payload)?;
        let mut outcome = ParseOutcome::new();

        for event in events {
            let home = event.home_team.as_deref().map(str::trim).unwrap_or("");
            let away = event.away_team.as_deref().map(str::trim).unwrap_or("");
            if home.is_empty() || away.is_empty() {
                outcome.drop_record(
                    self.source(),
                    format!("game {} is missing a team name", event.id),
                );
                continue;
            }
            let start_time = match event
                .commence_time
                .as_deref()
                .map(DateTime::parse_from_rfc3339)
            {
                Some(Ok(t)) => t.with_timezone(&Utc),
                Some(Err(e)) => {
                    outcome.drop_record(
                        self.source(),
                        format!("game {} has an unreadable start time: {}", event.id, e),
                    );
                    continue;
                }
                None => {
                    outcome.drop_record(
                        self.source(),
                        format!("game {} has no start time", event.id),
                    );
                    continue;
                }
            };

            let mut quoted = 0usize;
            for bookmaker in &event.bookmakers {
                let lines = Self::lines_for(bookmaker, home, away);
                if lines.is_empty() {
                    continue;
                }
                let mut record = RawGameRecord::new(self.source(), home, away);
                record.start_time = Some(start_time);
                record.bookmaker = Some(if bookmaker.title.is_empty() {
                    bookmaker.key.clone()
                } else {
                    bookmaker.title.clone()
                });
                record.lines = lines;
                outcome.records.push(record);
                quoted += 1;
            }

            if quoted == 0 {
                let mut record = RawGameRecord::new(self.source(), home, away);
                record.start_time = Some(start_time);
                outcome.records.push(record);
            }
        }

        Ok(outcome)
    }
}
