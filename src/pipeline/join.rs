//! Aligns every source's records into one merged record per scheduled game.

use std::collections::{btree_map::Entry, BTreeMap};
use tracing::{debug, info, instrument};

use super::schedule_filter::{report, resolve_key, Orientation, Schedule, SchedulePolicy};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::registry::CanonicalRegistry;
use crate::types::{MergedGameRecord, RawGameRecord, ResolvedGameKey, SourceTag};

pub struct JoinEngine<'a> {
    registry: &'a CanonicalRegistry,
    policy: &'a SchedulePolicy,
    schedule: &'a Schedule,
}

impl<'a> JoinEngine<'a> {
    pub fn new(
        registry: &'a CanonicalRegistry,
        policy: &'a SchedulePolicy,
        schedule: &'a Schedule,
    ) -> Self {
        Self {
            registry,
            policy,
            schedule,
        }
    }

    /// One merged record per scheduled game, sorted by home, away, date.
    ///
    /// A game only some sources cover keeps the other sources absent. When a
    /// tag claims the same game twice the first record is kept and the rest
    /// are reported as ambiguous.
    #[instrument(skip_all, fields(authoritative = authoritative.len(), others = others.len()))]
    pub fn join(
        &self,
        authoritative: &[RawGameRecord],
        others: &[RawGameRecord],
        diagnostics: &mut Diagnostics,
    ) -> Vec<MergedGameRecord> {
        let mut merged: BTreeMap<ResolvedGameKey, MergedGameRecord> = self
            .schedule
            .games()
            .iter()
            .map(|game| {
                let record = MergedGameRecord {
                    key: game.key.clone(),
                    start_time: game.start_time,
                    contributions: BTreeMap::new(),
                };
                (game.key.clone(), record)
            })
            .collect();
        let mut ambiguous: BTreeMap<(ResolvedGameKey, SourceTag), usize> = BTreeMap::new();

        for record in authoritative {
            // Unresolvable authoritative rows were reported when the schedule was built
            let Ok(key) = resolve_key(record, self.registry, self.policy) else {
                continue;
            };
            if let Some(game) = merged.get_mut(&key) {
                attach(game, record, &mut ambiguous);
            }
        }

        for record in others {
            if record.source == self.policy.authoritative {
                continue;
            }
            let placement = match self.schedule.place(record, self.registry, self.policy) {
                Ok(placement) => placement,
                Err(missing) => {
                    report(record, missing, diagnostics);
                    continue;
                }
            };
            let Some(game) = merged.get_mut(&placement.key) else {
                continue;
            };
            if placement.orientation == Orientation::Swapped {
                debug!("Re-oriented {} to {}", record.describe(), placement.key);
                attach(game, &record.swapped(), &mut ambiguous);
            } else {
                attach(game, record, &mut ambiguous);
            }
        }

        for ((key, tag), dropped) in ambiguous {
            diagnostics.push(Diagnostic::AmbiguousMatch {
                source: tag.source,
                game: format!("{} under {}", key, tag),
                dropped,
            });
        }

        let games: Vec<MergedGameRecord> = merged.into_values().collect();
        let covered = games.iter().filter(|g| g.contributions.len() > 1).count();
        info!(
            "Joined {} games ({} with more than one contribution)",
            games.len(),
            covered
        );
        games
    }
}

fn attach(
    game: &mut MergedGameRecord,
    record: &RawGameRecord,
    ambiguous: &mut BTreeMap<(ResolvedGameKey, SourceTag), usize>,
) {
    // A schedule-only row carries no fields to contribute
    if record.lines.is_empty() {
        return;
    }
    let tag = record.tag();
    match game.contributions.entry(tag) {
        Entry::Vacant(slot) => {
            slot.insert(record.lines.clone());
        }
        Entry::Occupied(slot) => {
            *ambiguous
                .entry((game.key.clone(), slot.key().clone()))
                .or_insert(0) += 1;
        }
    }
}
