use chrono::NaiveDate;
use scraper::Html;

use super::html::{element_text, selector};
use super::rules::{parse_percent, strip_home_marker};
use super::{LineParser, ParseContext, ParseOutcome};
use crate::error::{LinesError, Result};
use crate::types::{RawGameRecord, SourceId};

const DATE: usize = 0;
const AWAY: usize = 1;
const HOME: usize = 2;
const AWAY_PRED: usize = 3;
const HOME_PRED: usize = 4;
const AWAY_PWIN: usize = 5;
const HOME_PWIN: usize = 6;

/// Parser for the Massey games page.
///
/// Rows are `Date | Away | Home | Away Pred | Home Pred | Away Pwin | Home Pwin`.
/// The page is not scoped to one competition, so its output must go through
/// the schedule filter before joining.
pub struct MasseyParser {
    context: ParseContext,
}

impl MasseyParser {
    pub fn new(context: ParseContext) -> Self {
        Self { context }
    }

    /// Row date; an empty cell means the slate date
    fn date(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        if text.is_empty() {
            return Some(self.context.slate_date);
        }
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(text, "%m/%d/%Y"))
            .ok()
    }
}

fn number(cells: &[String], idx: usize) -> Option<f64> {
    cells.get(idx).and_then(|c| c.trim().parse::<f64>().ok())
}

impl LineParser for MasseyParser {
    fn source(&self) -> SourceId {
        SourceId::Massey
    }

    fn parse(&self, payload: &[u8]) -> Result<ParseOutcome> {
        let body = String::from_utf8_lossy(payload);
        let document = Html::parse_document(&body);
        let row_sel = selector("tr")?;
        let td_sel = selector("td")?;

        let mut outcome = ParseOutcome::new();
        let mut game_rows = 0usize;
        for row in document.select(&row_sel) {
            let cells: Vec<String> = row.select(&td_sel).map(element_text).collect();
            if cells.len() <= HOME {
                continue;
            }
            game_rows += 1;

            let away = strip_home_marker(&cells[AWAY]);
            let home = strip_home_marker(&cells[HOME]);
            if away.is_empty() || home.is_empty() {
                outcome.drop_record(
                    self.source(),
                    format!("row dated '{}' is missing a team", cells[DATE]),
                );
                continue;
            }

            let Some(date) = self.date(&cells[DATE]) else {
                outcome.drop_record(
                    self.source(),
                    format!("{} @ {} has an unreadable date '{}'", away, home, cells[DATE]),
                );
                continue;
            };

            let mut record = RawGameRecord::new(self.source(), home, away);
            record.game_date = Some(date);

            let away_pred = number(&cells, AWAY_PRED);
            let home_pred = number(&cells, HOME_PRED);
            record.lines.away_projected_score = away_pred;
            record.lines.home_projected_score = home_pred;
            if let (Some(a), Some(h)) = (away_pred, home_pred) {
                record.lines.projected_total = Some(a + h);
                // Home favored by (h - a) points means a negative home spread
                record.lines.set_spread_from_home(a - h);
            }

            let away_pwin = cells.get(AWAY_PWIN).and_then(|c| parse_percent(c));
            let home_pwin = cells.get(HOME_PWIN).and_then(|c| parse_percent(c));
            match (away_pwin, home_pwin) {
                (Some(a), Some(h)) => {
                    record.lines.away_win_probability = Some(a);
                    record.lines.home_win_probability = Some(h);
                }
                (Some(a), None) => record.lines.set_probability_from_away(a),
                (None, Some(h)) => record.lines.set_probability_from_home(h),
                (None, None) => {}
            }

            outcome.records.push(record);
        }

        if game_rows == 0 {
            return Err(LinesError::MissingField("no games table rows on the page".into()));
        }
        Ok(outcome)
    }
}
