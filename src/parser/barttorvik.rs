use chrono::{NaiveTime, Utc};
use scraper::Html;
use tracing::debug;

use super::html::{element_text, selector};
use super::rules::{projected_total, SCORE_PAIR, TRANK_LINE};
use super::{LineParser, ParseContext, ParseOutcome};
use crate::error::{LinesError, Result};
use crate::types::{RawGameRecord, SourceId};

/// Parser for the T-Rank daily schedule page.
///
/// A game row carries two `team.php` links (away first) and one `trank.php`
/// link whose text is the T-Rank line, e.g. `"Duke -7.5, 78-71 (79%)"`.
/// The line names the projected winner; its numbers are attached to whichever
/// side of the row carries that exact name.
pub struct BarttorvikParser {
    context: ParseContext,
}

impl BarttorvikParser {
    pub fn new(context: ParseContext) -> Self {
        Self { context }
    }

    fn apply_line(
        &self,
        record: &mut RawGameRecord,
        line: &str,
    ) -> std::result::Result<(), String> {
        let caps = TRANK_LINE
            .captures(line)
            .ok_or_else(|| format!("unreadable T-Rank line '{}'", line))?;

        let team = caps["team"].trim();
        let spread: Option<f64> = caps.name("spread").and_then(|m| m.as_str().parse().ok());
        let prob: Option<f64> = caps.name("prob").and_then(|m| m.as_str().parse().ok());
        let score = caps.name("score").map(|m| m.as_str());

        // Projected total does not depend on which side the line names
        if let Some(score) = score {
            record.lines.projected_total = projected_total(score);
        }

        let is_home = if team == record.home_team {
            true
        } else if team == record.away_team {
            false
        } else {
            return Err(format!(
                "T-Rank line names '{}', which is neither '{}' nor '{}'",
                team, record.away_team, record.home_team
            ));
        };

        if let Some(spread) = spread {
            if is_home {
                record.lines.set_spread_from_home(spread);
            } else {
                record.lines.set_spread_from_away(spread);
            }
        }
        if let Some(prob) = prob {
            if is_home {
                record.lines.set_probability_from_home(prob);
            } else {
                record.lines.set_probability_from_away(prob);
            }
        }
        // Winner's projected score is listed first
        if let Some(caps) = score.and_then(|s| SCORE_PAIR.captures(s)) {
            let winner: Option<f64> = caps["a"].parse().ok();
            let loser: Option<f64> = caps["b"].parse().ok();
            if is_home {
                record.lines.home_projected_score = winner;
                record.lines.away_projected_score = loser;
            } else {
                record.lines.away_projected_score = winner;
                record.lines.home_projected_score = loser;
            }
        }
        Ok(())
    }

    fn start_time(&self, text: &str) -> Option<chrono::DateTime<Utc>> {
        let time = NaiveTime::parse_from_str(text.trim(), "%I:%M %p").ok()?;
        self.context
            .slate_date
            .and_time(time)
            .and_local_timezone(self.context.utc_offset)
            .single()
            .map(|t| t.with_timezone(&Utc))
    }
}

impl LineParser for BarttorvikParser {
    fn source(&self) -> SourceId {
        SourceId::Barttorvik
    }

    fn parse(&self, payload: &[u8]) -> Result<ParseOutcome> {
        let body = String::from_utf8_lossy(payload);
        let document = Html::parse_document(&body);
        let row_sel = selector("tr")?;
        let team_sel = selector(r#"a[href*="team.php"]"#)?;
        let line_sel = selector(r#"a[href*="trank.php"]"#)?;
        let time_sel = selector("span.gametime")?;

        let mut outcome = ParseOutcome::new();
        let mut game_rows = 0usize;
        for row in document.select(&row_sel) {
            let teams: Vec<String> = row.select(&team_sel).map(element_text).collect();
            if teams.len() != 2 {
                continue;
            }
            game_rows += 1;
            let Some(line) = row.select(&line_sel).next().map(element_text) else {
                debug!("barttorvik: no T-Rank line for {} @ {}", teams[0], teams[1]);
                continue;
            };
            if teams.iter().any(|t| t.is_empty()) {
                outcome.drop_record(self.source(), format!("row with empty team name: '{}'", line));
                continue;
            }

            let mut record =
                RawGameRecord::new(self.source(), teams[1].as_str(), teams[0].as_str());
            record.game_date = Some(self.context.slate_date);
            record.start_time = row
                .select(&time_sel)
                .next()
                .and_then(|span| self.start_time(&element_text(span)));

            if let Err(detail) = self.apply_line(&mut record, &line) {
                // Teams are known, so the game still counts; only its lines are missing
                outcome.note(self.source(), format!("{} (kept without lines)", detail));
            }
            outcome.records.push(record);
        }

        if game_rows == 0 {
            return Err(LinesError::MissingField(
                "no schedule rows with two team links on the page".into(),
            ));
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    fn parser() -> BarttorvikParser {
        BarttorvikParser::new(ParseContext {
            slate_date: NaiveDate::from_ymd_opt(2025, 1, 22).unwrap(),
            utc_offset: FixedOffset::west_opt(5 * 3600).unwrap(),
        })
    }

    const PAGE: &str = r#"
    <html><body><table>
      <tr><th>Time</th><th>Matchup</th><th>T-Rank Line</th></tr>
      <tr>
        <td><span class="gametime">07:00 PM</span></td>
        <td><a href="team.php?team=North+Carolina">North Carolina</a> at
            <a href="team.php?team=Duke">Duke</a></td>
        <td><a href="trank.php?line=1">Duke -7.5, 78-71 (79%)</a></td>
      </tr>
      <tr>
        <td><span class="gametime">09:00 PM</span></td>
        <td><a href="team.php?team=Gonzaga">Gonzaga</a> at
            <a href="team.php?team=Saint+Mary%27s">Saint Mary's</a></td>
        <td><a href="trank.php?line=2">Gonzaga -2.0, 74-72 (58%)</a></td>
      </tr>
      <tr>
        <td></td>
        <td><a href="team.php?team=Iowa">Iowa</a> at <a href="team.php?team=Ohio+St.">Ohio St.</a></td>
        <td><a href="trank.php?line=3">Ohio State -3.0, 80-77 (61%)</a></td>
      </tr>
      <tr>
        <td><a href="team.php?team=Final">Final</a> vs <a href="team.php?team=Score">Score</a></td>
        <td>final</td>
      </tr>
    </table></body></html>"#;

    #[test]
    fn test_home_favorite_line() {
        let outcome = parser().parse(PAGE.as_bytes()).unwrap();
        let duke = &outcome.records[0];
        assert_eq!(duke.home_team, "Duke");
        assert_eq!(duke.away_team, "North Carolina");
        assert_eq!(duke.lines.home_spread, Some(-7.5));
        assert_eq!(duke.lines.away_spread, Some(7.5));
        assert_eq!(duke.lines.home_win_probability, Some(79.0));
        assert_eq!(duke.lines.away_win_probability, Some(21.0));
        assert_eq!(duke.lines.projected_total, Some(149.0));
        assert_eq!(duke.lines.home_projected_score, Some(78.0));
        assert_eq!(
            duke.start_time,
            Some(Utc.with_ymd_and_hms(2025, 1, 23, 0, 0, 0).unwrap())
        );
        assert_eq!(duke.game_date, NaiveDate::from_ymd_opt(2025, 1, 22));
    }

    #[test]
    fn test_away_favorite_line_is_negated_for_home() {
        let outcome = parser().parse(PAGE.as_bytes()).unwrap();
        let zags = &outcome.records[1];
        assert_eq!(zags.away_team, "Gonzaga");
        assert_eq!(zags.lines.away_spread, Some(-2.0));
        assert_eq!(zags.lines.home_spread, Some(2.0));
        assert_eq!(zags.lines.away_win_probability, Some(58.0));
        assert_eq!(zags.lines.home_win_probability, Some(42.0));
        assert_eq!(zags.lines.away_projected_score, Some(74.0));
        assert_eq!(zags.lines.home_projected_score, Some(72.0));
    }

    #[test]
    fn test_unmatched_team_keeps_record_without_side_lines() {
        let outcome = parser().parse(PAGE.as_bytes()).unwrap();
        assert_eq!(outcome.records.len(), 3);
        let iowa = &outcome.records[2];
        assert_eq!(iowa.home_team, "Ohio St.");
        assert_eq!(iowa.lines.home_spread, None);
        assert_eq!(iowa.lines.home_win_probability, None);
        assert_eq!(iowa.lines.projected_total, Some(157.0));
        assert!(iowa.start_time.is_none());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.dropped, 0);
    }

    #[test]
    fn test_page_without_schedule_rows_is_an_error() {
        let page = b"<html><body><h1>Access denied</h1></body></html>";
        assert!(parser().parse(page).is_err());

        let outcome = crate::parser::parse_payload(&parser(), page);
        assert!(outcome.records.is_empty());
        assert!(matches!(
            outcome.diagnostics.entries(),
            [crate::diagnostics::Diagnostic::SourceUnavailable { .. }]
        ));
    }
}
