//! Authoritative schedule and the filter that scopes noisy sources to it.
//!
//! One source (the odds API by default) is requested per sport, so its games
//! define the slate. Any other source's record survives only if its resolved
//! team pair appears on that slate within the configured tolerance.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::config::ScheduleConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::Result;
use crate::registry::CanonicalRegistry;
use crate::types::{RawGameRecord, ResolvedGameKey, SourceId};

/// Authoritative-source selector plus the tolerance window
#[derive(Debug, Clone)]
pub struct SchedulePolicy {
    pub authoritative: SourceId,
    pub utc_offset: FixedOffset,
    pub date_tolerance_days: i64,
    pub time_drift: Duration,
}

impl SchedulePolicy {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Ok(Self {
            authoritative: config.authoritative,
            utc_offset: config.utc_offset()?,
            date_tolerance_days: config.date_tolerance_days,
            time_drift: Duration::hours(config.time_drift_hours),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    AsPublished,
    /// Provider listed the teams the other way round (neutral sites)
    Swapped,
}

#[derive(Debug, Clone)]
pub struct ScheduledGame {
    pub key: ResolvedGameKey,
    pub start_time: Option<DateTime<Utc>>,
}

/// Where a record lands on the slate
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub key: ResolvedGameKey,
    pub orientation: Orientation,
}

/// Why a record could not be placed
#[derive(Debug, Clone, PartialEq)]
pub enum Misplacement {
    Unresolved(Vec<String>),
    OffSchedule(String),
}

/// Resolved games of the authoritative source, indexed by team pair
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    games: Vec<ScheduledGame>,
    by_pair: HashMap<(String, String), Vec<usize>>,
}

impl Schedule {
    /// Build the slate. Bookmaker rows of one game collapse into one entry;
    /// unresolvable authoritative records are reported and left out.
    pub fn from_records(
        records: &[RawGameRecord],
        registry: &CanonicalRegistry,
        policy: &SchedulePolicy,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let mut schedule = Schedule::default();
        for record in records {
            match resolve_key(record, registry, policy) {
                Ok(key) => schedule.insert(key, record.start_time),
                Err(missing) => report(record, missing, diagnostics),
            }
        }
        info!("Authoritative schedule has {} games", schedule.games.len());
        schedule
    }

    fn insert(&mut self, key: ResolvedGameKey, start_time: Option<DateTime<Utc>>) {
        let pair = (key.home.clone(), key.away.clone());
        let slots = self.by_pair.entry(pair).or_default();
        if let Some(&idx) = slots.iter().find(|&&idx| self.games[idx].key == key) {
            let game = &mut self.games[idx];
            game.start_time = match (game.start_time, start_time) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            return;
        }
        slots.push(self.games.len());
        self.games.push(ScheduledGame { key, start_time });
    }

    pub fn games(&self) -> &[ScheduledGame] {
        &self.games
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Find the scheduled game for a resolved pair, trying the published
    /// orientation first. Among several candidates the nearest date wins.
    pub fn locate(
        &self,
        home: &str,
        away: &str,
        date: Option<NaiveDate>,
        start_time: Option<DateTime<Utc>>,
        policy: &SchedulePolicy,
    ) -> Option<Placement> {
        let attempts = [
            (home, away, Orientation::AsPublished),
            (away, home, Orientation::Swapped),
        ];
        for (h, a, orientation) in attempts {
            let Some(slots) = self.by_pair.get(&(h.to_string(), a.to_string())) else {
                continue;
            };
            let best = slots
                .iter()
                .map(|&idx| &self.games[idx])
                .filter(|game| within_window(game, date, start_time, policy))
                .min_by_key(|game| date.map(|d| (game.key.date - d).num_days().abs()).unwrap_or(0));
            if let Some(game) = best {
                return Some(Placement {
                    key: game.key.clone(),
                    orientation,
                });
            }
        }
        None
    }

    /// Resolve a record and place it on the slate
    pub fn place(
        &self,
        record: &RawGameRecord,
        registry: &CanonicalRegistry,
        policy: &SchedulePolicy,
    ) -> std::result::Result<Placement, Misplacement> {
        let (home, away) = resolve_pair(record, registry)?;
        let date = record.date_bucket(policy.utc_offset);
        self.locate(home, away, date, record.start_time, policy)
            .ok_or_else(|| Misplacement::OffSchedule(format!("{} @ {}", away, home)))
    }
}

fn within_window(
    game: &ScheduledGame,
    date: Option<NaiveDate>,
    start_time: Option<DateTime<Utc>>,
    policy: &SchedulePolicy,
) -> bool {
    if let (Some(scheduled), Some(start)) = (game.start_time, start_time) {
        if (scheduled - start).num_seconds().abs() <= policy.time_drift.num_seconds() {
            return true;
        }
    }
    match date {
        Some(date) => (game.key.date - date).num_days().abs() <= policy.date_tolerance_days,
        None => false,
    }
}

fn resolve_pair<'r>(
    record: &RawGameRecord,
    registry: &'r CanonicalRegistry,
) -> std::result::Result<(&'r str, &'r str), Misplacement> {
    let home = registry.resolve(&record.home_team).canonical();
    let away = registry.resolve(&record.away_team).canonical();
    match (home, away) {
        (Some(home), Some(away)) => Ok((home, away)),
        _ => {
            let mut missing = Vec::new();
            if home.is_none() {
                missing.push(record.home_team.clone());
            }
            if away.is_none() {
                missing.push(record.away_team.clone());
            }
            Err(Misplacement::Unresolved(missing))
        }
    }
}

/// Resolve a record's own key without consulting any schedule
pub fn resolve_key(
    record: &RawGameRecord,
    registry: &CanonicalRegistry,
    policy: &SchedulePolicy,
) -> std::result::Result<ResolvedGameKey, Misplacement> {
    let (home, away) = resolve_pair(record, registry)?;
    let date = record
        .date_bucket(policy.utc_offset)
        .ok_or_else(|| Misplacement::OffSchedule(format!("{} has no date", record.describe())))?;
    Ok(ResolvedGameKey {
        home: home.to_string(),
        away: away.to_string(),
        date,
    })
}

/// Turn a misplacement into diagnostics
pub fn report(record: &RawGameRecord, missing: Misplacement, diagnostics: &mut Diagnostics) {
    match missing {
        Misplacement::Unresolved(names) => {
            for name in names {
                diagnostics.push(Diagnostic::UnresolvedIdentity {
                    source: record.source,
                    name,
                });
            }
        }
        Misplacement::OffSchedule(game) => diagnostics.push(Diagnostic::OutOfSchedule {
            source: record.source,
            game,
        }),
    }
}

/// Scopes non-authoritative sources to the authoritative slate
pub struct ScheduleFilter<'a> {
    registry: &'a CanonicalRegistry,
    policy: &'a SchedulePolicy,
    schedule: Schedule,
}

impl<'a> ScheduleFilter<'a> {
    pub fn new(
        registry: &'a CanonicalRegistry,
        policy: &'a SchedulePolicy,
        authoritative: &[RawGameRecord],
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let schedule = Schedule::from_records(authoritative, registry, policy, diagnostics);
        Self {
            registry,
            policy,
            schedule,
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Records whose resolved pair is on the slate. Unresolvable records are
    /// dropped rather than guessed at.
    #[instrument(skip_all, fields(records = records.len()))]
    pub fn filter(
        &self,
        records: Vec<RawGameRecord>,
        diagnostics: &mut Diagnostics,
    ) -> Vec<RawGameRecord> {
        let before = records.len();
        let kept: Vec<RawGameRecord> = records
            .into_iter()
            .filter(|record| {
                if record.source == self.policy.authoritative {
                    return true;
                }
                match self.schedule.place(record, self.registry, self.policy) {
                    Ok(_) => true,
                    Err(missing) => {
                        debug!("Filtered out {}", record.describe());
                        report(record, missing, diagnostics);
                        false
                    }
                }
            })
            .collect();
        info!("Schedule filter kept {}/{} records", kept.len(), before);
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CrosswalkEntry;
    use chrono::TimeZone;

    fn eastern() -> SchedulePolicy {
        SchedulePolicy::from_config(&ScheduleConfig::default()).unwrap()
    }

    fn registry() -> CanonicalRegistry {
        CanonicalRegistry::build(&[
            CrosswalkEntry::new("Duke Blue Devils", ["Duke"]),
            CrosswalkEntry::new("North Carolina Tar Heels", ["North Carolina", "UNC"]),
            CrosswalkEntry::new("Kansas Jayhawks", ["Kansas"]),
            CrosswalkEntry::new("Baylor Bears", ["Baylor"]),
        ])
        .unwrap()
    }

    fn odds_game(home: &str, away: &str, hour_utc: u32) -> RawGameRecord {
        let mut record = RawGameRecord::new(SourceId::OddsApi, home, away);
        record.start_time = Some(Utc.with_ymd_and_hms(2025, 1, 23, hour_utc, 0, 0).unwrap());
        record
    }

    fn massey_game(home: &str, away: &str, day: u32) -> RawGameRecord {
        let mut record = RawGameRecord::new(SourceId::Massey, home, away);
        record.game_date = NaiveDate::from_ymd_opt(2025, 1, day);
        record
    }

    #[test]
    fn test_filter_drops_other_leagues() {
        let registry = registry();
        let policy = eastern();
        let mut diagnostics = Diagnostics::new();
        let authoritative = vec![odds_game("Duke Blue Devils", "North Carolina Tar Heels", 0)];
        let filter = ScheduleFilter::new(&registry, &policy, &authoritative, &mut diagnostics);

        let noisy = vec![
            massey_game("Duke", "North Carolina", 22),
            massey_game("LA Lakers", "Boston", 22),
        ];
        let kept = filter.filter(noisy, &mut diagnostics);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].home_team, "Duke");
        assert_eq!(diagnostics.unresolved_names()[&SourceId::Massey].len(), 2);
    }

    #[test]
    fn test_resolved_game_off_the_slate_is_dropped() {
        let registry = registry();
        let policy = eastern();
        let mut diagnostics = Diagnostics::new();
        let authoritative = vec![odds_game("Duke Blue Devils", "North Carolina Tar Heels", 0)];
        let filter = ScheduleFilter::new(&registry, &policy, &authoritative, &mut diagnostics);

        let kept = filter.filter(vec![massey_game("Kansas", "Baylor", 22)], &mut diagnostics);
        assert!(kept.is_empty());
        assert!(matches!(
            diagnostics.entries(),
            [Diagnostic::OutOfSchedule { .. }]
        ));
    }

    #[test]
    fn test_date_tolerance_window() {
        let registry = registry();
        let mut policy = eastern();
        let mut diagnostics = Diagnostics::new();
        // 00:00 UTC on the 23rd is the evening of the 22nd Eastern
        let authoritative = vec![odds_game("Duke Blue Devils", "North Carolina Tar Heels", 0)];

        let filter = ScheduleFilter::new(&registry, &policy, &authoritative, &mut diagnostics);
        assert_eq!(filter.filter(vec![massey_game("Duke", "UNC", 22)], &mut diagnostics).len(), 1);
        assert!(filter.filter(vec![massey_game("Duke", "UNC", 23)], &mut diagnostics).is_empty());

        policy.date_tolerance_days = 1;
        let filter = ScheduleFilter::new(&registry, &policy, &authoritative, &mut diagnostics);
        assert_eq!(filter.filter(vec![massey_game("Duke", "UNC", 23)], &mut diagnostics).len(), 1);
    }

    #[test]
    fn test_start_time_drift_crosses_date_boundary() {
        let registry = registry();
        let policy = eastern();
        let mut diagnostics = Diagnostics::new();
        let authoritative = vec![odds_game("Duke Blue Devils", "North Carolina Tar Heels", 4)];
        let filter = ScheduleFilter::new(&registry, &policy, &authoritative, &mut diagnostics);

        // Published as a UTC date with a nearby start time
        let mut record = massey_game("Duke", "UNC", 23);
        record.start_time = Some(Utc.with_ymd_and_hms(2025, 1, 23, 2, 0, 0).unwrap());
        assert_eq!(filter.filter(vec![record], &mut diagnostics).len(), 1);
    }

    #[test]
    fn test_swapped_orientation_is_located() {
        let registry = registry();
        let policy = eastern();
        let mut diagnostics = Diagnostics::new();
        let schedule = Schedule::from_records(
            &[odds_game("Duke Blue Devils", "North Carolina Tar Heels", 0)],
            &registry,
            &policy,
            &mut diagnostics,
        );
        let placement = schedule
            .place(&massey_game("UNC", "Duke", 22), &registry, &policy)
            .unwrap();
        assert_eq!(placement.orientation, Orientation::Swapped);
        assert_eq!(placement.key.home, "Duke Blue Devils");
    }

    #[test]
    fn test_bookmaker_rows_collapse_into_one_game() {
        let registry = registry();
        let policy = eastern();
        let mut diagnostics = Diagnostics::new();
        let mut dk = odds_game("Duke Blue Devils", "North Carolina Tar Heels", 0);
        dk.bookmaker = Some("DraftKings".into());
        let mut fd = dk.clone();
        fd.bookmaker = Some("FanDuel".into());
        let schedule = Schedule::from_records(&[dk, fd], &registry, &policy, &mut diagnostics);
        assert_eq!(schedule.len(), 1);
    }
}
