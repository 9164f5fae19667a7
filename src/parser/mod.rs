//! Provider parsers: one fetched payload in, typed game records out.
//!
//! Each provider gets its own parser struct so its format can change without
//! touching the others. Text patterns live in [`rules`] as named statics.

pub mod barttorvik;
pub mod dratings;
pub mod html;
pub mod massey;
pub mod odds_api;
pub mod rules;

pub use barttorvik::BarttorvikParser;
pub use dratings::DRatingsParser;
pub use massey::MasseyParser;
pub use odds_api::OddsApiParser;

use chrono::{FixedOffset, NaiveDate};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::Result;
use crate::types::{RawGameRecord, SourceId};

/// Records and per-record diagnostics produced from one payload
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub records: Vec<RawGameRecord>,
    pub diagnostics: Diagnostics,
    /// Rows discarded outright, as opposed to records kept with a note
    pub dropped: usize,
}

impl ParseOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drop_record(&mut self, source: SourceId, detail: impl Into<String>) {
        self.dropped += 1;
        self.note(source, detail);
    }

    /// Record a partial extraction for a record that is still kept
    pub fn note(&mut self, source: SourceId, detail: impl Into<String>) {
        self.diagnostics.push(Diagnostic::ExtractionFailure {
            source,
            detail: detail.into(),
        });
    }
}

/// Slate information a parser needs when a provider omits it
#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    /// Local date the fetched pages describe
    pub slate_date: NaiveDate,
    /// Offset of the local clock providers publish times in
    pub utc_offset: FixedOffset,
}

pub trait LineParser: Send + Sync {
    fn source(&self) -> SourceId;

    /// Parse a whole payload. An `Err` means the payload as a whole was
    /// unusable; per-record problems go into the outcome's diagnostics.
    fn parse(&self, payload: &[u8]) -> Result<ParseOutcome>;
}

pub fn parser_for(source: SourceId, context: ParseContext) -> Box<dyn LineParser> {
    match source {
        SourceId::OddsApi => Box::new(OddsApiParser::new()),
        SourceId::Barttorvik => Box::new(BarttorvikParser::new(context)),
        SourceId::DRatings => Box::new(DRatingsParser::new(context)),
        SourceId::Massey => Box::new(MasseyParser::new(context)),
    }
}

/// Run a parser without letting its failure escape: an unusable payload
/// yields an empty record set and a `SourceUnavailable` diagnostic.
pub fn parse_payload(parser: &dyn LineParser, payload: &[u8]) -> ParseOutcome {
    let source = parser.source();
    debug!("{}: start bytes_len={}", source, payload.len());

    if payload.iter().all(u8::is_ascii_whitespace) {
        warn!("{}: empty payload", source);
        let mut outcome = ParseOutcome::new();
        outcome.diagnostics.push(Diagnostic::SourceUnavailable {
            source,
            message: "empty payload".to_string(),
        });
        return outcome;
    }

    match parser.parse(payload) {
        Ok(outcome) => {
            info!(
                "{}: parsed {} records, dropped {} ({} diagnostics)",
                source,
                outcome.records.len(),
                outcome.dropped,
                outcome.diagnostics.len()
            );
            counter!("cbb_records_parsed_total", "source" => source.as_str())
                .increment(outcome.records.len() as u64);
            counter!("cbb_records_dropped_total", "source" => source.as_str())
                .increment(outcome.dropped as u64);
            outcome
        }
        Err(e) => {
            warn!("{}: payload rejected: {}", source, e);
            let mut outcome = ParseOutcome::new();
            outcome.diagnostics.push(Diagnostic::SourceUnavailable {
                source,
                message: e.to_string(),
            });
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ParseContext {
        ParseContext {
            slate_date: NaiveDate::from_ymd_opt(2025, 1, 22).unwrap(),
            utc_offset: FixedOffset::west_opt(5 * 3600).unwrap(),
        }
    }

    #[test]
    fn test_empty_payload_is_source_unavailable() {
        for source in SourceId::all() {
            let parser = parser_for(source, context());
            let outcome = parse_payload(parser.as_ref(), b"  \n");
            assert!(outcome.records.is_empty());
            assert!(matches!(
                outcome.diagnostics.entries(),
                [Diagnostic::SourceUnavailable { .. }]
            ));
        }
    }

    #[test]
    fn test_malformed_odds_payload_does_not_escape() {
        let parser = parser_for(SourceId::OddsApi, context());
        let outcome = parse_payload(parser.as_ref(), b"{\"message\": \"quota exceeded\"}");
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_notes_are_not_counted_as_drops() {
        let mut outcome = ParseOutcome::new();
        outcome.note(SourceId::Barttorvik, "line names neither team");
        outcome.drop_record(SourceId::Barttorvik, "row with empty team name");
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.diagnostics.len(), 2);
    }

    #[test]
    fn test_parser_for_reports_its_source() {
        for source in SourceId::all() {
            assert_eq!(parser_for(source, context()).source(), source);
        }
    }
}
