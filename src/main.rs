use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use cbb_lines::config::Config;
use cbb_lines::constants;
use cbb_lines::infra::{DirectoryFetcher, HttpFetcher, PayloadFetcher};
use cbb_lines::logging;
use cbb_lines::output;
use cbb_lines::parser::{parse_payload, parser_for, ParseContext};
use cbb_lines::pipeline::Pipeline;
use cbb_lines::registry::{CanonicalRegistry, Crosswalk};
use cbb_lines::types::SourceId;

#[derive(Parser)]
#[command(name = "cbb_lines")]
#[command(about = "College basketball line and prediction aggregator")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to ./cbb_lines.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the canonical registry from the crosswalk table and persist it
    BuildRegistry {
        /// Crosswalk CSV, one row per team
        #[arg(long)]
        crosswalk: Option<PathBuf>,
        /// Column holding the canonical name
        #[arg(long)]
        column: Option<String>,
        /// Directory for team_names.json and team_lookup.json
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Resolve team names against the registry
    Resolve {
        names: Vec<String>,
    },
    /// Fetch, parse, filter and join one slate
    Run {
        /// Slate date (YYYY-MM-DD), defaults to today in the configured offset
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Sources to include (comma-separated). Available: odds_api, barttorvik, dratings, massey
        #[arg(long)]
        sources: Option<String>,
        /// Read saved payloads from this directory instead of fetching
        #[arg(long)]
        payload_dir: Option<PathBuf>,
        /// Save fetched payloads to this directory
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
    },
    /// Parse one saved payload and print its records as JSON
    Parse {
        #[arg(long)]
        source: SourceId,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

/// Use the persisted registry when there is one, else build from the crosswalk
fn load_registry(config: &Config) -> anyhow::Result<CanonicalRegistry> {
    let dir = &config.registry.persisted_dir;
    if dir.join(constants::TEAM_NAMES_FILE).exists() {
        info!("Loading registry from {}", dir.display());
        return CanonicalRegistry::load(dir)
            .with_context(|| format!("Failed to load registry from {}", dir.display()));
    }
    build_registry(&config.registry.crosswalk_path, &config.registry.canonical_column)
}

fn build_registry(crosswalk: &Path, column: &str) -> anyhow::Result<CanonicalRegistry> {
    let crosswalk = Crosswalk::from_csv_path(crosswalk, column)
        .with_context(|| format!("Failed to read crosswalk {}", crosswalk.display()))?;
    Ok(CanonicalRegistry::from_crosswalk(&crosswalk)?)
}

fn parse_sources(list: &str) -> anyhow::Result<Vec<SourceId>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<SourceId>().map_err(anyhow::Error::from))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::BuildRegistry {
            crosswalk,
            column,
            out,
        } => {
            let crosswalk = crosswalk.unwrap_or_else(|| config.registry.crosswalk_path.clone());
            let column = column.unwrap_or_else(|| config.registry.canonical_column.clone());
            let out = out.unwrap_or_else(|| config.registry.persisted_dir.clone());

            let registry = build_registry(&crosswalk, &column)?;
            registry.persist(&out)?;
            println!(
                "📚 Registry: {} teams, {} variations → {}",
                registry.team_count(),
                registry.variation_count(),
                out.display()
            );
        }
        Commands::Resolve { names } => {
            let registry = load_registry(&config)?;
            for name in &names {
                let canonical = registry.resolve(name).canonical().unwrap_or("<unresolved>");
                println!("{}\t{}", name, canonical);
            }
            let unresolved = registry.unresolved(names.iter().map(String::as_str));
            if !unresolved.is_empty() {
                anyhow::bail!("{} of {} names unresolved", unresolved.len(), names.len());
            }
        }
        Commands::Run {
            date,
            sources,
            payload_dir,
            snapshot_dir,
        } => {
            let registry = Arc::new(load_registry(&config)?);
            let fetcher: Arc<dyn PayloadFetcher> = match &payload_dir {
                Some(dir) => Arc::new(DirectoryFetcher::new(dir)),
                None => Arc::new(HttpFetcher::from_config(&config)?),
            };

            let mut pipeline = Pipeline::from_config(&config, registry, fetcher)?;
            if let Some(date) = date {
                pipeline = pipeline.with_slate_date(date);
            }
            if let Some(list) = sources {
                pipeline = pipeline.with_sources(&parse_sources(&list)?);
            }
            if let Some(dir) = snapshot_dir {
                pipeline = pipeline.with_snapshot_dir(dir);
            }

            let report = match pipeline.run().await {
                Ok(report) => report,
                Err(e) if e.is_fatal_configuration() => {
                    error!("Configuration error, nothing processed: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    error!("Run aborted before joining: {}", e);
                    return Err(e.into());
                }
            };
            let (csv_path, json_path) = output::persist_report(&report, &config.output.dir)?;

            println!("\n📊 Slate {}:", report.slate_date);
            println!("   Games: {}", report.merged.len());
            for (source, parsed) in &report.parsed {
                let kept = report.kept.get(source).copied().unwrap_or(0);
                println!("   {}: {} parsed, {} kept", source, parsed, kept);
            }
            if !report.diagnostics.is_empty() {
                println!("\n⚠️  Diagnostics:");
                for line in report.diagnostics.summary() {
                    println!("   - {}", line);
                }
            }
            println!("\n💾 Saved {} and {}", csv_path.display(), json_path.display());
        }
        Commands::Parse { source, file, date } => {
            let offset = config.schedule.utc_offset()?;
            let today = chrono::Utc::now().with_timezone(&offset).date_naive();
            let context = ParseContext {
                slate_date: date.unwrap_or(today),
                utc_offset: offset,
            };
            let payload = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let parser = parser_for(source, context);
            let outcome = parse_payload(parser.as_ref(), &payload);
            println!("{}", serde_json::to_string_pretty(&outcome.records)?);
            for diagnostic in outcome.diagnostics.entries() {
                eprintln!("{}", diagnostic);
            }
        }
    }
    Ok(())
}
