//! Per-project package preferences
//!
//! Include/exclude overrides live in `LocalPreferences.toml` beside the
//! project file, under a `[jusim]` table:
//!
//! ```toml
//! [jusim]
//! include = ["Plots"]
//! exclude = ["CUDA"]
//! ```
//!
//! Reads never fail: a missing or malformed document means "no overrides".
//! Writes go through `toml_edit` so unrelated tables and comments survive.

pub mod selection;

pub use selection::{choose, initial_selection};

use crate::error::{JusimError, JusimResult};
use crate::project::ProjectContext;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use toml_edit::{Array, DocumentMut, Item};
use tracing::{debug, info, warn};

/// Table holding jusim's keys inside the preference document
pub const PREFS_TABLE: &str = "jusim";

/// Include/exclude overrides for one project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceRecord {
    /// Packages added on top of the defaults
    pub include: BTreeSet<String>,
    /// Packages removed from the defaults
    pub exclude: BTreeSet<String>,
}

impl PreferenceRecord {
    /// Build a record, rejecting names present in both sets
    pub fn new(
        include: impl IntoIterator<Item = String>,
        exclude: impl IntoIterator<Item = String>,
    ) -> JusimResult<Self> {
        let record = Self {
            include: include.into_iter().collect(),
            exclude: exclude.into_iter().collect(),
        };
        if let Some(name) = record.include.intersection(&record.exclude).next() {
            return Err(JusimError::PreferenceConflict(name.clone()));
        }
        Ok(record)
    }

    /// Mark a package as included
    pub fn add(&mut self, name: &str) {
        self.exclude.remove(name);
        self.include.insert(name.to_string());
    }

    /// Mark a package as excluded
    pub fn remove(&mut self, name: &str) {
        self.include.remove(name);
        self.exclude.insert(name.to_string());
    }

    /// `(defaults ∪ include) − exclude`
    pub fn packages_to_include(&self, defaults: &BTreeSet<String>) -> BTreeSet<String> {
        defaults
            .union(&self.include)
            .filter(|name| !self.exclude.contains(*name))
            .cloned()
            .collect()
    }
}

/// Preference document for one project
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    /// Store for the given project
    pub fn for_project(ctx: &ProjectContext) -> Self {
        Self::with_path(ctx.preferences_file())
    }

    /// Store backed by an explicit document path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the preference document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current overrides; empty when the document is missing or malformed
    pub fn get(&self) -> PreferenceRecord {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return PreferenceRecord::default();
            }
            Err(e) => {
                warn!("Cannot read {}: {}", self.path.display(), e);
                return PreferenceRecord::default();
            }
        };

        let doc = match content.parse::<DocumentMut>() {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Ignoring malformed {}: {}", self.path.display(), e);
                return PreferenceRecord::default();
            }
        };

        let Some(table) = doc.get(PREFS_TABLE).and_then(Item::as_table_like) else {
            return PreferenceRecord::default();
        };

        let mut record = PreferenceRecord {
            include: string_set(table.get("include")),
            exclude: string_set(table.get("exclude")),
        };

        // A hand-edited document may list a name twice; exclusion wins
        let conflicts: Vec<String> = record
            .include
            .intersection(&record.exclude)
            .cloned()
            .collect();
        for name in conflicts {
            warn!("{} is both included and excluded, treating as excluded", name);
            record.include.remove(&name);
        }

        record
    }

    /// Replace both sets wholesale
    pub fn set(&self, record: &PreferenceRecord) -> JusimResult<()> {
        if let Some(name) = record.include.intersection(&record.exclude).next() {
            return Err(JusimError::PreferenceConflict(name.clone()));
        }
        self.write(record)?;
        info!(
            "Saved {} include / {} exclude overrides to {}",
            record.include.len(),
            record.exclude.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Include a package and persist
    pub fn add(&self, name: &str) -> JusimResult<PreferenceRecord> {
        let mut record = self.get();
        record.add(name);
        self.set(&record)?;
        Ok(record)
    }

    /// Exclude a package and persist
    pub fn remove(&self, name: &str) -> JusimResult<PreferenceRecord> {
        let mut record = self.get();
        record.remove(name);
        self.set(&record)?;
        Ok(record)
    }

    /// Resolved package set for the given defaults
    pub fn packages_to_include(&self, defaults: &BTreeSet<String>) -> BTreeSet<String> {
        self.get().packages_to_include(defaults)
    }

    fn write(&self, record: &PreferenceRecord) -> JusimResult<()> {
        let mut doc = match fs::read_to_string(&self.path) {
            Ok(content) => content.parse::<DocumentMut>().map_err(|e| JusimError::ConfigInvalid {
                path: self.path.clone(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DocumentMut::new(),
            Err(e) => {
                return Err(JusimError::PreferenceWrite {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        if !doc.contains_key(PREFS_TABLE) {
            doc[PREFS_TABLE] = toml_edit::table();
        }
        let table = doc[PREFS_TABLE]
            .as_table_like_mut()
            .ok_or_else(|| JusimError::ConfigInvalid {
                path: self.path.clone(),
                reason: format!("`{}` must be a table", PREFS_TABLE),
            })?;

        table.insert("include", toml_edit::value(to_array(&record.include)));
        table.insert("exclude", toml_edit::value(to_array(&record.exclude)));

        let tmp = temp_sibling(&self.path);
        let result = fs::write(&tmp, doc.to_string()).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(JusimError::PreferenceWrite {
                path: self.path.clone(),
                source: e,
            });
        }

        debug!("Wrote {}", self.path.display());
        Ok(())
    }
}

fn string_set(item: Option<&Item>) -> BTreeSet<String> {
    item.and_then(Item::as_array)
        .map(|array| {
            array
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn to_array(names: &BTreeSet<String>) -> Array {
    names.iter().map(String::as_str).collect()
}

/// Temporary file in the same directory, so the rename stays atomic
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn store(dir: &TempDir) -> PreferenceStore {
        PreferenceStore::with_path(dir.path().join("LocalPreferences.toml"))
    }

    #[test]
    fn missing_document_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).get(), PreferenceRecord::default());
    }

    #[test]
    fn malformed_document_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "[jusim\ninclude = ").unwrap();
        assert_eq!(store.get(), PreferenceRecord::default());
    }

    #[test]
    fn add_and_remove_keep_sets_disjoint() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.add("C").unwrap();
        store.remove("A").unwrap();
        store.remove("C").unwrap();
        store.add("A").unwrap();
        store.add("A").unwrap();

        let record = store.get();
        assert_eq!(record.include, names(&["A"]));
        assert_eq!(record.exclude, names(&["C"]));
        assert!(record.include.is_disjoint(&record.exclude));
    }

    #[test]
    fn packages_to_include_applies_overrides() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let defaults = names(&["A", "B"]);

        store.add("C").unwrap();
        store.remove("A").unwrap();
        assert_eq!(store.packages_to_include(&defaults), names(&["B", "C"]));

        store.remove("C").unwrap();
        assert_eq!(store.packages_to_include(&defaults), names(&["B"]));
    }

    #[test]
    fn random_sequences_respect_invariants() {
        let defaults = names(&["A", "B", "C"]);
        let pool = ["A", "B", "C", "D", "E"];
        let mut record = PreferenceRecord::default();

        // Deterministic pseudo-random walk over add/remove calls
        let mut seed: u32 = 7;
        for _ in 0..200 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let name = pool[(seed >> 16) as usize % pool.len()];
            if seed & 1 == 0 {
                record.add(name);
            } else {
                record.remove(name);
            }

            assert!(record.include.is_disjoint(&record.exclude));
            let expected: BTreeSet<String> = defaults
                .union(&record.include)
                .filter(|n| !record.exclude.contains(*n))
                .cloned()
                .collect();
            assert_eq!(record.packages_to_include(&defaults), expected);
        }
    }

    #[test]
    fn set_rejects_overlapping_partition() {
        let dir = TempDir::new().unwrap();
        let record = PreferenceRecord {
            include: names(&["A"]),
            exclude: names(&["A"]),
        };
        assert!(matches!(
            store(&dir).set(&record),
            Err(JusimError::PreferenceConflict(name)) if name == "A"
        ));
        assert!(PreferenceRecord::new(names(&["A"]), names(&["A"])).is_err());
    }

    #[test]
    fn write_preserves_unrelated_content() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(
            store.path(),
            "# managed by hand\n[OtherPackage]\nbackend = \"gr\"\n",
        )
        .unwrap();

        store.add("Plots").unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("# managed by hand"));
        assert!(content.contains("backend = \"gr\""));
        assert!(content.contains("include = [\"Plots\"]"));
        assert_eq!(store.get().include, names(&["Plots"]));
    }

    #[test]
    fn hand_edited_conflict_prefers_exclusion() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(
            store.path(),
            "[jusim]\ninclude = [\"A\", \"B\"]\nexclude = [\"A\"]\n",
        )
        .unwrap();

        let record = store.get();
        assert_eq!(record.include, names(&["B"]));
        assert_eq!(record.exclude, names(&["A"]));
    }

    #[cfg(unix)]
    #[test]
    fn write_failure_is_surfaced() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::with_path(dir.path().join("missing-dir").join("Prefs.toml"));
        let err = store.add("A").unwrap_err();
        assert!(matches!(err, JusimError::PreferenceWrite { .. }));
    }
}
