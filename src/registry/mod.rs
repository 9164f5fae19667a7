//! Canonical team registry.
//!
//! Built once per run from the crosswalk and shared read-only by the
//! schedule filter and the join engine.

pub mod crosswalk;

pub use crosswalk::{Crosswalk, CrosswalkEntry};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::constants::{TEAM_LOOKUP_FILE, TEAM_NAMES_FILE};
use crate::error::{LinesError, Result};

/// Outcome of a name lookup. Unknown names are never guessed.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    Resolved(&'a str),
    Unresolved,
}

impl<'a> Resolution<'a> {
    pub fn canonical(self) -> Option<&'a str> {
        match self {
            Resolution::Resolved(name) => Some(name),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TeamNamesEntry {
    variations: Vec<String>,
}

/// Case-insensitive mapping from every known spelling to its canonical team.
#[derive(Debug, Clone, Default)]
pub struct CanonicalRegistry {
    team_names: BTreeMap<String, BTreeSet<String>>,
    lookup: HashMap<String, String>,
}

fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}

impl CanonicalRegistry {
    /// Build the lookup. Rows sharing a canonical name are merged; a
    /// case-folded variation claimed by two canonical names is fatal.
    #[instrument(skip(entries), fields(rows = entries.len()))]
    pub fn build(entries: &[CrosswalkEntry]) -> Result<Self> {
        let mut team_names: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut lookup: HashMap<String, String> = HashMap::new();

        for entry in entries {
            let canonical = entry.canonical();
            let names = team_names.entry(canonical.to_string()).or_default();
            for variation in entry.variations() {
                names.insert(variation.to_string());
                let folded = fold(variation);
                match lookup.get(&folded) {
                    Some(existing) if existing != canonical => {
                        return Err(LinesError::ConflictingVariation {
                            variation: variation.to_string(),
                            first: existing.clone(),
                            second: canonical.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        lookup.insert(folded, canonical.to_string());
                    }
                }
            }
        }

        info!(
            "Built registry: {} teams, {} variations",
            team_names.len(),
            lookup.len()
        );
        Ok(Self { team_names, lookup })
    }

    pub fn from_crosswalk(crosswalk: &Crosswalk) -> Result<Self> {
        Self::build(crosswalk.entries())
    }

    pub fn resolve(&self, name: &str) -> Resolution<'_> {
        match self.lookup.get(&fold(name)) {
            Some(canonical) => Resolution::Resolved(canonical.as_str()),
            None => {
                debug!("Unresolved team name: '{}'", name);
                Resolution::Unresolved
            }
        }
    }

    /// Names from `names` that have no mapping, de-duplicated
    pub fn unresolved<'n>(&self, names: impl IntoIterator<Item = &'n str>) -> BTreeSet<String> {
        names
            .into_iter()
            .filter(|name| !self.resolve(name).is_resolved())
            .map(str::to_string)
            .collect()
    }

    pub fn team_count(&self) -> usize {
        self.team_names.len()
    }

    pub fn variation_count(&self) -> usize {
        self.lookup.len()
    }

    pub fn variations_of(&self, canonical: &str) -> Option<impl Iterator<Item = &str>> {
        self.team_names
            .get(canonical)
            .map(|set| set.iter().map(String::as_str))
    }

    /// The two persisted documents: canonical → sorted variations, and the
    /// flat case-folded lookup. Keys are sorted so equal inputs serialize to
    /// identical bytes.
    pub fn to_documents(&self) -> Result<(String, String)> {
        let names: BTreeMap<&str, TeamNamesEntry> = self
            .team_names
            .iter()
            .map(|(canonical, variations)| {
                (
                    canonical.as_str(),
                    TeamNamesEntry {
                        variations: variations.iter().cloned().collect(),
                    },
                )
            })
            .collect();
        let lookup: BTreeMap<&str, &str> = self
            .lookup
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        Ok((
            serde_json::to_string_pretty(&names)?,
            serde_json::to_string_pretty(&lookup)?,
        ))
    }

    pub fn persist(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let (names, lookup) = self.to_documents()?;
        fs::write(dir.join(TEAM_NAMES_FILE), names)?;
        fs::write(dir.join(TEAM_LOOKUP_FILE), lookup)?;
        info!("Persisted registry to {}", dir.display());
        Ok(())
    }

    /// Reload a persisted registry. The names document is re-validated and
    /// the lookup document must agree with it.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let names_text = fs::read_to_string(dir.join(TEAM_NAMES_FILE))?;
        let lookup_text = fs::read_to_string(dir.join(TEAM_LOOKUP_FILE))?;

        let names: BTreeMap<String, TeamNamesEntry> = serde_json::from_str(&names_text)?;
        let entries: Vec<CrosswalkEntry> = names
            .into_iter()
            .map(|(canonical, entry)| CrosswalkEntry::new(canonical, entry.variations))
            .collect();
        let registry = Self::build(&entries)?;

        let stored: HashMap<String, String> = serde_json::from_str(&lookup_text)?;
        if stored != registry.lookup {
            return Err(LinesError::Config(format!(
                "{} in {} does not match {}; rebuild the registry",
                TEAM_LOOKUP_FILE,
                dir.display(),
                TEAM_NAMES_FILE
            )));
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entries() -> Vec<CrosswalkEntry> {
        vec![
            CrosswalkEntry::new("Duke Blue Devils", ["Duke"]),
            CrosswalkEntry::new("North Carolina Tar Heels", ["North Carolina", "UNC"]),
            CrosswalkEntry::new("Saint Mary's Gaels", ["St. Mary's", "Saint Mary's"]),
        ]
    }

    #[test]
    fn test_every_variation_resolves_case_insensitively() {
        let entries = sample_entries();
        let registry = CanonicalRegistry::build(&entries).unwrap();
        for entry in &entries {
            for variation in entry.variations() {
                assert_eq!(registry.resolve(variation).canonical(), Some(entry.canonical()));
                assert_eq!(
                    registry.resolve(&variation.to_uppercase()).canonical(),
                    Some(entry.canonical())
                );
            }
        }
        assert_eq!(registry.resolve("  unc ").canonical(), Some("North Carolina Tar Heels"));
    }

    #[test]
    fn test_unknown_name_is_unresolved() {
        let registry = CanonicalRegistry::build(&sample_entries()).unwrap();
        assert_eq!(registry.resolve("Los Angeles Lakers"), Resolution::Unresolved);
        let missing = registry.unresolved(["Duke", "Lakers", "Lakers"]);
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec!["Lakers".to_string()]);
    }

    #[test]
    fn test_conflicting_variation_is_fatal() {
        let entries = vec![
            CrosswalkEntry::new("Miami Hurricanes", ["Miami", "Miami FL"]),
            CrosswalkEntry::new("Miami RedHawks", ["MIAMI", "Miami OH"]),
        ];
        let err = CanonicalRegistry::build(&entries).unwrap_err();
        match &err {
            LinesError::ConflictingVariation { first, second, .. } => {
                assert_eq!(first, "Miami Hurricanes");
                assert_eq!(second, "Miami RedHawks");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_fatal_configuration());
    }

    #[test]
    fn test_rows_sharing_a_canonical_name_merge() {
        let entries = vec![
            CrosswalkEntry::new("Duke Blue Devils", ["Duke"]),
            CrosswalkEntry::new("Duke Blue Devils", ["DUKE", "Duke University"]),
        ];
        let registry = CanonicalRegistry::build(&entries).unwrap();
        assert_eq!(registry.team_count(), 1);
        assert_eq!(registry.variations_of("Duke Blue Devils").unwrap().count(), 4);
    }

    #[test]
    fn test_rebuild_is_byte_identical() {
        let first = CanonicalRegistry::build(&sample_entries()).unwrap();
        let mut reversed = sample_entries();
        reversed.reverse();
        let second = CanonicalRegistry::build(&reversed).unwrap();
        assert_eq!(first.to_documents().unwrap(), second.to_documents().unwrap());
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CanonicalRegistry::build(&sample_entries()).unwrap();
        registry.persist(dir.path()).unwrap();

        let names = fs::read_to_string(dir.path().join(TEAM_NAMES_FILE)).unwrap();
        assert!(names.contains("\"variations\""));

        let loaded = CanonicalRegistry::load(dir.path()).unwrap();
        assert_eq!(loaded.resolve("st. mary's").canonical(), Some("Saint Mary's Gaels"));
        assert_eq!(loaded.to_documents().unwrap(), registry.to_documents().unwrap());
    }

    #[test]
    fn test_load_rejects_tampered_lookup() {
        let dir = tempfile::tempdir().unwrap();
        CanonicalRegistry::build(&sample_entries())
            .unwrap()
            .persist(dir.path())
            .unwrap();
        fs::write(dir.path().join(TEAM_LOOKUP_FILE), r#"{"duke": "Duke Blue Devils"}"#).unwrap();
        assert!(matches!(
            CanonicalRegistry::load(dir.path()),
            Err(LinesError::Config(_))
        ));
    }
}
