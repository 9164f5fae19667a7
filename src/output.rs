use chrono::Utc;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::pipeline::RunReport;
use crate::types::{LineSet, MergedGameRecord, SourceTag};

const KEY_COLUMNS: [&str; 4] = ["date", "home_team", "away_team", "start_time"];

/// `(tag, field index)` pairs populated anywhere in the table, in column order
fn value_columns(games: &[MergedGameRecord]) -> Vec<(SourceTag, usize)> {
    let mut columns = BTreeSet::new();
    for game in games {
        for (tag, lines) in &game.contributions {
            for (idx, value) in lines.values().iter().enumerate() {
                if value.is_some() {
                    columns.insert((tag.clone(), idx));
                }
            }
        }
    }
    columns.into_iter().collect()
}

/// Write the comparison table. One row per game; a column per
/// `<source tag>.<field>` that any game populates. Absent values are empty
/// cells, never zero.
pub fn write_csv<W: Write>(writer: W, games: &[MergedGameRecord]) -> Result<()> {
    let columns = value_columns(games);
    let mut csv = csv::Writer::from_writer(writer);

    let mut header: Vec<String> = KEY_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(
        columns
            .iter()
            .map(|(tag, idx)| format!("{}.{}", tag, LineSet::FIELD_NAMES[*idx])),
    );
    csv.write_record(&header)?;

    for game in games {
        let mut row = vec![
            game.key.date.to_string(),
            game.key.home.clone(),
            game.key.away.clone(),
            game.start_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ];
        for (tag, idx) in &columns {
            let value = game.contribution(tag).and_then(|lines| lines.values()[*idx]);
            row.push(value.map(|v| v.to_string()).unwrap_or_default());
        }
        csv.write_record(&row)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(writer: W, report: &RunReport) -> Result<()> {
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}

/// Persist a run as `lines_<slate>_<timestamp>.{csv,json}` under `output_dir`
pub fn persist_report(report: &RunReport, output_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(output_dir)?;
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let stem = format!("lines_{}_{}", report.slate_date.format("%Y%m%d"), timestamp);

    let csv_path = output_dir.join(format!("{stem}.csv"));
    write_csv(fs::File::create(&csv_path)?, &report.merged)?;

    let json_path = output_dir.join(format!("{stem}.json"));
    write_json(fs::File::create(&json_path)?, report)?;

    Ok((csv_path, json_path))
}
