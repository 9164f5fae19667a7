//! Non-fatal conditions collected during a run.
//!
//! Everything that drops or degrades data without aborting the run is
//! recorded here so the final summary can say what was lost and which team
//! spellings still need a crosswalk entry.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

use crate::types::SourceId;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A provider's payload could not be fetched or parsed at all
    SourceUnavailable { source: SourceId, message: String },
    /// One record's fields could not be extracted; siblings unaffected
    ExtractionFailure { source: SourceId, detail: String },
    /// A team string has no canonical mapping
    UnresolvedIdentity { source: SourceId, name: String },
    /// Several records claimed the same join key; the first was kept
    AmbiguousMatch {
        source: SourceId,
        game: String,
        dropped: usize,
    },
    /// A resolved game not present on the authoritative schedule
    OutOfSchedule { source: SourceId, game: String },
}

impl Diagnostic {
    pub fn source(&self) -> SourceId {
        match self {
            Diagnostic::SourceUnavailable { source, .. }
            | Diagnostic::ExtractionFailure { source, .. }
            | Diagnostic::UnresolvedIdentity { source, .. }
            | Diagnostic::AmbiguousMatch { source, .. }
            | Diagnostic::OutOfSchedule { source, .. } => *source,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SourceUnavailable { source, message } => {
                write!(f, "[{}] source unavailable: {}", source, message)
            }
            Diagnostic::ExtractionFailure { source, detail } => {
                write!(f, "[{}] extraction failure: {}", source, detail)
            }
            Diagnostic::UnresolvedIdentity { source, name } => {
                write!(f, "[{}] unresolved team name: '{}'", source, name)
            }
            Diagnostic::AmbiguousMatch {
                source,
                game,
                dropped,
            } => write!(
                f,
                "[{}] ambiguous match for {}: kept first, dropped {}",
                source, game, dropped
            ),
            Diagnostic::OutOfSchedule { source, game } => {
                write!(f, "[{}] not on authoritative schedule: {}", source, game)
            }
        }
    }
}

/// Accumulated diagnostics for one run
#[derive(Debug, Default, Clone, Serialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log a diagnostic
    pub fn push(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct unresolved spellings, grouped by source, for crosswalk upkeep
    pub fn unresolved_names(&self) -> BTreeMap<SourceId, BTreeSet<String>> {
        let mut out: BTreeMap<SourceId, BTreeSet<String>> = BTreeMap::new();
        for entry in &self.entries {
            if let Diagnostic::UnresolvedIdentity { source, name } = entry {
                out.entry(*source).or_default().insert(name.clone());
            }
        }
        out
    }

    pub fn count_for(&self, source: SourceId) -> usize {
        self.entries.iter().filter(|d| d.source() == source).count()
    }

    /// Human-readable summary, one line per kind and source
    pub fn summary(&self) -> Vec<String> {
        let mut counts: BTreeMap<(SourceId, &'static str), usize> = BTreeMap::new();
        for entry in &self.entries {
            let kind = match entry {
                Diagnostic::SourceUnavailable { .. } => "source unavailable",
                Diagnostic::ExtractionFailure { .. } => "extraction failures",
                Diagnostic::UnresolvedIdentity { .. } => "unresolved names",
                Diagnostic::AmbiguousMatch { .. } => "ambiguous matches",
                Diagnostic::OutOfSchedule { .. } => "off-schedule games",
            };
            *counts.entry((entry.source(), kind)).or_default() += 1;
        }
        let mut lines: Vec<String> = counts
            .into_iter()
            .map(|((source, kind), n)| format!("{}: {} {}", source, n, kind))
            .collect();
        for (source, names) in self.unresolved_names() {
            let joined: Vec<&str> = names.iter().map(String::as_str).collect();
            lines.push(format!("{} unresolved: {}", source, joined.join(", ")));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_names_are_deduplicated_per_source() {
        let mut diagnostics = Diagnostics::new();
        for name in ["Lakers", "Celtics", "Lakers"] {
            diagnostics.push(Diagnostic::UnresolvedIdentity {
                source: SourceId::Massey,
                name: name.to_string(),
            });
        }
        diagnostics.push(Diagnostic::UnresolvedIdentity {
            source: SourceId::DRatings,
            name: "St Marys".to_string(),
        });

        let unresolved = diagnostics.unresolved_names();
        assert_eq!(unresolved[&SourceId::Massey].len(), 2);
        assert!(unresolved[&SourceId::DRatings].contains("St Marys"));
        assert_eq!(diagnostics.count_for(SourceId::Massey), 3);
    }

    #[test]
    fn test_summary_counts_by_kind() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::ExtractionFailure {
            source: SourceId::Barttorvik,
            detail: "no teams".to_string(),
        });
        diagnostics.push(Diagnostic::ExtractionFailure {
            source: SourceId::Barttorvik,
            detail: "no line".to_string(),
        });
        let summary = diagnostics.summary();
        assert_eq!(summary, vec!["barttorvik: 2 extraction failures".to_string()]);
    }
}
