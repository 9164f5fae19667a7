use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{LinesError, Result};

/// One canonical team and every spelling any provider uses for it.
///
/// The canonical name is always one of its own variations. Cells are trimmed
/// and empty ones ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrosswalkEntry {
    canonical: String,
    variations: BTreeSet<String>,
}

impl CrosswalkEntry {
    pub fn new<I, S>(canonical: impl Into<String>, variations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let canonical = canonical.into().trim().to_string();
        let mut set: BTreeSet<String> = variations
            .into_iter()
            .map(|v| v.as_ref().trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        set.insert(canonical.clone());
        Self {
            canonical,
            variations: set,
        }
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// De-duplicated variations in sorted order
    pub fn variations(&self) -> impl Iterator<Item = &str> {
        self.variations.iter().map(String::as_str)
    }
}

/// The static reference table, one entry per crosswalk row.
#[derive(Debug, Clone, Default)]
pub struct Crosswalk {
    entries: Vec<CrosswalkEntry>,
}

impl Crosswalk {
    pub fn new(entries: Vec<CrosswalkEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CrosswalkEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read a crosswalk table. `canonical_column` names the header whose
    /// cell is the canonical name; every other non-empty cell in the row is
    /// a variation.
    pub fn from_csv_reader<R: Read>(reader: R, canonical_column: &str) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let canonical_idx = headers
            .iter()
            .position(|h| h == canonical_column)
            .ok_or_else(|| {
                LinesError::Config(format!(
                    "crosswalk has no '{}' column (found: {})",
                    canonical_column,
                    headers.iter().collect::<Vec<_>>().join(", ")
                ))
            })?;

        let mut entries = Vec::new();
        for (row_idx, row) in csv_reader.records().enumerate() {
            let row = row?;
            let canonical = row.get(canonical_idx).unwrap_or("").trim();
            if canonical.is_empty() {
                // A row without a canonical name cannot route anything
                debug!("Skipping crosswalk row {} with empty canonical cell", row_idx + 2);
                continue;
            }
            entries.push(CrosswalkEntry::new(canonical, row.iter()));
        }

        info!("Loaded {} crosswalk rows", entries.len());
        Ok(Self { entries })
    }

    pub fn from_csv_path(path: impl AsRef<Path>, canonical_column: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            LinesError::Config(format!("Failed to open crosswalk '{}': {}", path.display(), e))
        })?;
        Self::from_csv_reader(file, canonical_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_includes_canonical_and_dedupes() {
        let entry = CrosswalkEntry::new(
            "Duke Blue Devils",
            ["Duke", " Duke ", "", "Duke Blue Devils"],
        );
        let variations: Vec<&str> = entry.variations().collect();
        assert_eq!(variations, vec!["Duke", "Duke Blue Devils"]);
    }

    #[test]
    fn test_from_csv_reader_uses_designated_column() {
        let table = "\
Torvik,API,DRatings
Duke,Duke Blue Devils,Duke Blue Devils
UConn,UConn Huskies,Connecticut Huskies
,,
St. Mary's,Saint Mary's Gaels,
";
        let crosswalk = Crosswalk::from_csv_reader(table.as_bytes(), "API").unwrap();
        assert_eq!(crosswalk.len(), 3);

        let uconn = &crosswalk.entries()[1];
        assert_eq!(uconn.canonical(), "UConn Huskies");
        let variations: Vec<&str> = uconn.variations().collect();
        assert_eq!(variations, vec!["Connecticut Huskies", "UConn", "UConn Huskies"]);
    }

    #[test]
    fn test_missing_canonical_column_is_configuration_error() {
        let table = "Torvik,DRatings\nDuke,Duke Blue Devils\n";
        let err = Crosswalk::from_csv_reader(table.as_bytes(), "API").unwrap_err();
        assert!(matches!(err, LinesError::Config(_)));
    }
}
