// Batch pipeline: fetch, parse, filter to the authoritative schedule, join

pub mod join;
pub mod schedule_filter;

pub use join::JoinEngine;
pub use schedule_filter::{Orientation, Schedule, ScheduleFilter, SchedulePolicy};

use chrono::{NaiveDate, Utc};
use metrics::counter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{LinesError, Result};
use crate::infra::{save_snapshot, PayloadFetcher};
use crate::parser::{parse_payload, parser_for, ParseContext, ParseOutcome};
use crate::registry::CanonicalRegistry;
use crate::types::{MergedGameRecord, RawGameRecord, SourceId};

/// Everything one run produced
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub slate_date: NaiveDate,
    pub merged: Vec<MergedGameRecord>,
    pub diagnostics: Diagnostics,
    /// Records each source yielded before filtering
    pub parsed: BTreeMap<SourceId, usize>,
    /// Records each source kept after the schedule filter
    pub kept: BTreeMap<SourceId, usize>,
}

pub struct Pipeline {
    registry: Arc<CanonicalRegistry>,
    fetcher: Arc<dyn PayloadFetcher>,
    policy: SchedulePolicy,
    sources: Vec<SourceId>,
    fetch_timeout: Duration,
    slate_date: NaiveDate,
    snapshot_dir: Option<PathBuf>,
}

impl Pipeline {
    /// Pipeline for today's slate in the configured local offset
    pub fn from_config(
        config: &Config,
        registry: Arc<CanonicalRegistry>,
        fetcher: Arc<dyn PayloadFetcher>,
    ) -> Result<Self> {
        let policy = SchedulePolicy::from_config(&config.schedule)?;
        let slate_date = Utc::now().with_timezone(&policy.utc_offset).date_naive();
        Ok(Self {
            registry,
            fetcher,
            policy,
            sources: config.active_sources(),
            fetch_timeout: Duration::from_secs(config.http.timeout_seconds),
            slate_date,
            snapshot_dir: None,
        })
    }

    pub fn with_slate_date(mut self, date: NaiveDate) -> Self {
        self.slate_date = date;
        self
    }

    /// Restrict the run to these sources; the authoritative one is always kept
    pub fn with_sources(mut self, sources: &[SourceId]) -> Self {
        let mut selected = sources.to_vec();
        selected.push(self.policy.authoritative);
        selected.sort();
        selected.dedup();
        self.sources = selected;
        self
    }

    /// Save every fetched payload under `dir` so the run can be replayed
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    /// Fetch every source concurrently, each under its own timeout
    async fn fetch_all(&self) -> BTreeMap<SourceId, Result<Vec<u8>>> {
        let mut tasks = JoinSet::new();
        for &source in &self.sources {
            let fetcher = Arc::clone(&self.fetcher);
            let limit = self.fetch_timeout;
            tasks.spawn(async move {
                let result = match tokio::time::timeout(limit, fetcher.fetch(source)).await {
                    Ok(result) => result,
                    Err(_) => Err(LinesError::unavailable(
                        source.as_str(),
                        format!("timed out after {}s", limit.as_secs()),
                    )),
                };
                (source, result)
            });
        }

        let mut payloads = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((source, result)) => {
                    payloads.insert(source, result);
                }
                Err(e) => warn!("Fetch task failed: {}", e),
            }
        }
        for &source in &self.sources {
            payloads.entry(source).or_insert_with(|| {
                Err(LinesError::unavailable(source.as_str(), "fetch task failed"))
            });
        }
        payloads
    }

    fn parse(&self, source: SourceId, payload: &[u8]) -> ParseOutcome {
        let context = ParseContext {
            slate_date: self.slate_date,
            utc_offset: self.policy.utc_offset,
        };
        let parser = parser_for(source, context);
        parse_payload(parser.as_ref(), payload)
    }

    /// Run once. Fails only when the authoritative source is unusable or a
    /// snapshot cannot be written; every other problem becomes a diagnostic.
    #[instrument(skip(self), fields(slate = %self.slate_date))]
    pub async fn run(&self) -> Result<RunReport> {
        let authoritative_source = self.policy.authoritative;
        let mut diagnostics = Diagnostics::new();
        let mut parsed = BTreeMap::new();
        let mut authoritative: Option<Vec<RawGameRecord>> = None;
        let mut batches: Vec<(SourceId, Vec<RawGameRecord>)> = Vec::new();

        for (source, fetched) in self.fetch_all().await {
            let payload = match fetched {
                Ok(payload) => payload,
                Err(e) if source == authoritative_source => return Err(e),
                Err(e) => {
                    diagnostics.push(Diagnostic::SourceUnavailable {
                        source,
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            if let Some(dir) = &self.snapshot_dir {
                save_snapshot(dir, source, &payload)?;
            }

            let outcome = self.parse(source, &payload);
            if source == authoritative_source {
                if let Some(message) = unavailable_message(&outcome) {
                    return Err(LinesError::unavailable(source.as_str(), message));
                }
            }
            parsed.insert(source, outcome.records.len());
            diagnostics.extend(outcome.diagnostics);
            if source == authoritative_source {
                authoritative = Some(outcome.records);
            } else {
                batches.push((source, outcome.records));
            }
        }

        let authoritative = authoritative.ok_or_else(|| {
            LinesError::unavailable(authoritative_source.as_str(), "no payload fetched")
        })?;

        let filter = ScheduleFilter::new(
            &self.registry,
            &self.policy,
            &authoritative,
            &mut diagnostics,
        );
        let mut kept = BTreeMap::new();
        kept.insert(authoritative_source, authoritative.len());
        let mut others = Vec::new();
        for (source, records) in batches {
            let survivors = filter.filter(records, &mut diagnostics);
            kept.insert(source, survivors.len());
            others.extend(survivors);
        }

        let merged = JoinEngine::new(&self.registry, &self.policy, filter.schedule()).join(
            &authoritative,
            &others,
            &mut diagnostics,
        );
        counter!("cbb_merged_games_total").increment(merged.len() as u64);
        info!(
            "Run complete: {} games, {} diagnostics",
            merged.len(),
            diagnostics.len()
        );

        Ok(RunReport {
            slate_date: self.slate_date,
            merged,
            diagnostics,
            parsed,
            kept,
        })
    }
}

fn unavailable_message(outcome: &ParseOutcome) -> Option<String> {
    outcome.diagnostics.entries().iter().find_map(|d| match d {
        Diagnostic::SourceUnavailable { message, .. } => Some(message.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CrosswalkEntry;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StubFetcher {
        payloads: HashMap<SourceId, &'static str>,
        stalled: Option<SourceId>,
    }

    #[async_trait]
    impl PayloadFetcher for StubFetcher {
        async fn fetch(&self, source: SourceId) -> Result<Vec<u8>> {
            if self.stalled == Some(source) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.payloads
                .get(&source)
                .map(|p| p.as_bytes().to_vec())
                .ok_or_else(|| LinesError::unavailable(source.as_str(), "HTTP 503"))
        }
    }

    const ODDS: &str = r#"[{"home_team":"Duke Blue Devils","away_team":"North Carolina Tar Heels",
        "commence_time":"2025-01-23T00:00:00Z","bookmakers":[{"key":"draftkings","title":"DraftKings",
        "markets":[{"key":"h2h","outcomes":[{"name":"Duke Blue Devils","price":-250},
        {"name":"North Carolina Tar Heels","price":205}]}]}]}]"#;

    const MASSEY: &str = r#"<table>
        <tr><td>2025-01-22</td><td>North Carolina</td><td>@ Duke</td><td>70</td><td>77</td><td>24%</td><td>76%</td></tr>
        <tr><td>2025-01-22</td><td>Boston</td><td>@ LA Lakers</td><td>112</td><td>108</td><td>55%</td><td>45%</td></tr>
        </table>"#;

    fn pipeline(fetcher: StubFetcher) -> Pipeline {
        let registry = CanonicalRegistry::build(&[
            CrosswalkEntry::new("Duke Blue Devils", ["Duke"]),
            CrosswalkEntry::new("North Carolina Tar Heels", ["North Carolina"]),
        ])
        .unwrap();
        let mut config = Config::default();
        config.http.timeout_seconds = 1;
        Pipeline::from_config(&config, Arc::new(registry), Arc::new(fetcher))
            .unwrap()
            .with_slate_date(NaiveDate::from_ymd_opt(2025, 1, 22).unwrap())
            .with_sources(&[SourceId::Massey, SourceId::DRatings])
    }

    #[tokio::test]
    async fn test_run_joins_filtered_sources() {
        let fetcher = StubFetcher {
            payloads: HashMap::from([(SourceId::OddsApi, ODDS), (SourceId::Massey, MASSEY)]),
            stalled: None,
        };
        let report = pipeline(fetcher).run().await.unwrap();

        assert_eq!(report.merged.len(), 1);
        let game = &report.merged[0];
        assert!(game.has_source(SourceId::OddsApi));
        assert!(game.has_source(SourceId::Massey));
        assert!(!game.has_source(SourceId::DRatings));
        assert_eq!(report.parsed[&SourceId::Massey], 2);
        assert_eq!(report.kept[&SourceId::Massey], 1);
        assert_eq!(report.diagnostics.count_for(SourceId::DRatings), 1);
    }

    #[tokio::test]
    async fn test_authoritative_failure_aborts_run() {
        let fetcher = StubFetcher {
            payloads: HashMap::from([(SourceId::Massey, MASSEY)]),
            stalled: None,
        };
        let err = pipeline(fetcher).run().await.unwrap_err();
        assert!(matches!(err, LinesError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_unparseable_authoritative_payload_aborts_run() {
        let fetcher = StubFetcher {
            payloads: HashMap::from([(SourceId::OddsApi, "{not json")]),
            stalled: None,
        };
        assert!(pipeline(fetcher).run().await.is_err());
    }

    #[tokio::test]
    async fn test_stalled_source_times_out() {
        let fetcher = StubFetcher {
            payloads: HashMap::from([(SourceId::OddsApi, ODDS), (SourceId::Massey, MASSEY)]),
            stalled: Some(SourceId::Massey),
        };
        let report = pipeline(fetcher).run().await.unwrap();
        assert_eq!(report.merged.len(), 1);
        assert!(!report.merged[0].has_source(SourceId::Massey));
        assert!(report.diagnostics.entries().iter().any(|d| matches!(
            d,
            Diagnostic::SourceUnavailable {
                source: SourceId::Massey,
                message,
            } if message.contains("timed out")
        )));
    }

    #[tokio::test]
    async fn test_snapshot_dir_keeps_fetched_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = dir.path().join("snapshots");
        let fetcher = StubFetcher {
            payloads: HashMap::from([(SourceId::OddsApi, ODDS), (SourceId::Massey, MASSEY)]),
            stalled: None,
        };
        let report = pipeline(fetcher)
            .with_snapshot_dir(&snapshots)
            .run()
            .await
            .unwrap();
        assert_eq!(report.merged.len(), 1);

        let odds = std::fs::read_to_string(snapshots.join("odds_api.json")).unwrap();
        assert_eq!(odds, ODDS);
        let massey = std::fs::read_to_string(snapshots.join("massey.html")).unwrap();
        assert_eq!(massey, MASSEY);
        // Unavailable sources leave nothing behind
        assert!(!snapshots.join("dratings.html").exists());
    }
}
