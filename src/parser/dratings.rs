use chrono::{NaiveDateTime, NaiveTime, Utc};
use scraper::{ElementRef, Html};
use std::collections::HashMap;

use super::html::{element_text, header_key, selector};
use super::rules::{parse_half_point, DRATINGS_SPREAD, DRATINGS_TEAMS, DRATINGS_WIN};
use super::{LineParser, ParseContext, ParseOutcome};
use crate::error::{LinesError, Result};
use crate::types::{RawGameRecord, SourceId};

const TEAMS_COLUMN: &str = "teams";
const SPREAD_COLUMN: &str = "best_spread";
const WIN_COLUMN: &str = "win";
const TOTAL_COLUMN: &str = "total_points";
const TIME_COLUMN: &str = "time";

/// Parser for the DRatings college basketball predictions table.
///
/// Columns are located by header label rather than position. The matchup
/// cell lists the away team first, each followed by its record.
pub struct DRatingsParser {
    context: ParseContext,
}

impl DRatingsParser {
    pub fn new(context: ParseContext) -> Self {
        Self { context }
    }

    fn columns(table: ElementRef<'_>) -> Result<HashMap<String, usize>> {
        let header_sel = selector("tr")?;
        let th_sel = selector("th")?;
        let header_row = table
            .select(&header_sel)
            .find(|row| row.select(&th_sel).next().is_some())
            .ok_or_else(|| LinesError::MissingField("dratings table header".into()))?;

        let columns: HashMap<String, usize> = header_row
            .select(&th_sel)
            .enumerate()
            .map(|(idx, th)| (header_key(&element_text(th)), idx))
            .collect();
        if !columns.contains_key(TEAMS_COLUMN) {
            return Err(LinesError::MissingField(format!(
                "dratings table has no '{}' column",
                TEAMS_COLUMN
            )));
        }
        Ok(columns)
    }

    /// "01/22/2025 07:00 PM" or a bare "07:00 PM" on the slate date
    fn schedule(&self, text: &str) -> (chrono::NaiveDate, Option<chrono::DateTime<Utc>>) {
        let text = text.trim();
        let local = NaiveDateTime::parse_from_str(text, "%m/%d/%Y %I:%M %p")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%m/%d/%Y %I:%M%p"))
            .ok()
            .or_else(|| {
                NaiveTime::parse_from_str(text, "%I:%M %p")
                    .ok()
                    .map(|t| self.context.slate_date.and_time(t))
            });
        match local {
            Some(local) => {
                let start = local
                    .and_local_timezone(self.context.utc_offset)
                    .single()
                    .map(|t| t.with_timezone(&Utc));
                (local.date(), start)
            }
            None => (self.context.slate_date, None),
        }
    }
}

impl LineParser for DRatingsParser {
    fn source(&self) -> SourceId {
        SourceId::DRatings
    }

    fn parse(&self, payload: &[u8]) -> Result<ParseOutcome> {
        let body = String::from_utf8_lossy(payload);
        let document = Html::parse_document(&body);
        let table_sel = selector("table.tablesaw")?;
        let row_sel = selector("tr")?;
        let td_sel = selector("td")?;

        let table = document
            .select(&table_sel)
            .next()
            .ok_or_else(|| LinesError::MissingField("no table.tablesaw on the page".into()))?;
        let columns = Self::columns(table)?;
        let cell = |cells: &[String], name: &str| -> Option<String> {
            columns.get(name).and_then(|idx| cells.get(*idx)).cloned()
        };

        let mut outcome = ParseOutcome::new();
        for row in table.select(&row_sel) {
            let cells: Vec<String> = row.select(&td_sel).map(element_text).collect();
            if cells.is_empty() {
                continue;
            }

            let teams_text = cell(&cells, TEAMS_COLUMN).unwrap_or_default();
            let Some(teams) = DRATINGS_TEAMS.captures(&teams_text) else {
                outcome.drop_record(self.source(), format!("unreadable matchup '{}'", teams_text));
                continue;
            };
            let away = teams["away"].trim();
            let home = teams["home"].trim();
            if away.is_empty() || home.is_empty() {
                outcome.drop_record(
                    self.source(),
                    format!("empty team in matchup '{}'", teams_text),
                );
                continue;
            }

            let mut record = RawGameRecord::new(self.source(), home, away);
            let (date, start) = cell(&cells, TIME_COLUMN)
                .map(|t| self.schedule(&t))
                .unwrap_or((self.context.slate_date, None));
            record.game_date = Some(date);
            record.start_time = start;

            // Both sides are published, so each is taken as-is
            if let Some(win) = cell(&cells, WIN_COLUMN).and_then(|w| {
                DRATINGS_WIN.captures(&w).map(|c| {
                    (c["away"].parse::<f64>().ok(), c["home"].parse::<f64>().ok())
                })
            }) {
                record.lines.away_win_probability = win.0;
                record.lines.home_win_probability = win.1;
            }

            if let Some(spread_text) = cell(&cells, SPREAD_COLUMN) {
                if let Some(c) = DRATINGS_SPREAD.captures(&spread_text) {
                    record.lines.away_spread = parse_half_point(&c["away"]);
                    record.lines.away_spread_price = parse_half_point(&c["away_price"]);
                    record.lines.home_spread = parse_half_point(&c["home"]);
                    record.lines.home_spread_price = parse_half_point(&c["home_price"]);
                }
            }

            record.lines.projected_total = cell(&cells, TOTAL_COLUMN)
                .and_then(|t| t.trim().parse::<f64>().ok());

            outcome.records.push(record);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    fn parser() -> DRatingsParser {
        DRatingsParser::new(ParseContext {
            slate_date: NaiveDate::from_ymd_opt(2025, 1, 22).unwrap(),
            utc_offset: FixedOffset::west_opt(5 * 3600).unwrap(),
        })
    }

    const PAGE: &str = r#"
    <html><body>
    <table class="tablesaw">
      <thead><tr>
        <th>Time</th><th>Teams</th><th>Win</th><th>Best ML</th>
        <th>Best Spread</th><th>Points</th><th>Total Points</th>
      </tr></thead>
      <tbody>
        <tr>
          <td>01/22/2025 07:00 PM</td>
          <td><a>North Carolina Tar Heels</a> (13-6)<br><a>Duke Blue Devils</a> (16-2)</td>
          <td>21.4%<br>78.6%</td>
          <td>+300<br>-350</td>
          <td>+7½-110<br>-7½-108</td>
          <td>70.1<br>78.2</td>
          <td>148.3</td>
        </tr>
        <tr>
          <td>09:30 PM</td>
          <td>Gonzaga Bulldogs (15-5) Saint Mary's Gaels (17-3)</td>
          <td>55.0% 45.0%</td>
          <td>-125 +110</td>
          <td></td>
          <td>73.0 71.2</td>
          <td>144.2</td>
        </tr>
        <tr>
          <td>TBA</td>
          <td>Postponed</td>
          <td></td><td></td><td></td><td></td><td></td>
        </tr>
      </tbody>
    </table>
    </body></html>"#;

    #[test]
    fn test_parses_teams_spreads_and_probabilities() {
        let outcome = parser().parse(PAGE.as_bytes()).unwrap();
        assert_eq!(outcome.records.len(), 2);

        let duke = &outcome.records[0];
        assert_eq!(duke.away_team, "North Carolina Tar Heels");
        assert_eq!(duke.home_team, "Duke Blue Devils");
        assert_eq!(duke.lines.away_spread, Some(7.5));
        assert_eq!(duke.lines.home_spread, Some(-7.5));
        assert_eq!(duke.lines.home_spread_price, Some(-108.0));
        assert_eq!(duke.lines.away_win_probability, Some(21.4));
        assert_eq!(duke.lines.home_win_probability, Some(78.6));
        assert_eq!(duke.lines.projected_total, Some(148.3));
        assert_eq!(duke.start_time, Some(Utc.with_ymd_and_hms(2025, 1, 23, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_missing_spread_stays_absent() {
        let outcome = parser().parse(PAGE.as_bytes()).unwrap();
        let gaels = &outcome.records[1];
        assert_eq!(gaels.home_team, "Saint Mary's Gaels");
        assert_eq!(gaels.lines.home_spread, None);
        assert_eq!(gaels.lines.away_spread, None);
        assert_eq!(gaels.game_date, NaiveDate::from_ymd_opt(2025, 1, 22));
    }

    #[test]
    fn test_unreadable_matchup_dropped_with_diagnostic() {
        let outcome = parser().parse(PAGE.as_bytes()).unwrap();
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_page_without_table_is_an_error() {
        assert!(parser().parse(b"<html><body><p>maintenance</p></body></html>").is_err());
    }
}
