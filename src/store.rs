//! Persisted motor pin configuration.
//!
//! The document is a JSON object mapping motor names to their wiring:
//!
//! ```json
//! {
//!     "motor1": { "step_pin": 17, "dir_pin": 27 },
//!     "motor2": { "step_pin": 22, "dir_pin": 23 }
//! }
//! ```
//!
//! A missing, unparsable or internally conflicting file is replaced by the
//! default document on load. Saves go through a temporary file in the same
//! directory followed by a rename, so a crash never leaves a torn file behind.

use crate::board::Board;
use crate::error::ConfigError;
use crate::motor::{PinAssignment, PinNumber, PinRole};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ordered mapping from motor name to pin assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigurationDocument {
    motors: BTreeMap<String, PinAssignment>,
}

impl Default for ConfigurationDocument {
    fn default() -> Self {
        Self::empty()
            .with_motor("motor1", PinAssignment::new(17, 27))
            .with_motor("motor2", PinAssignment::new(22, 23))
    }
}

impl ConfigurationDocument {
    pub fn empty() -> Self {
        Self { motors: BTreeMap::new() }
    }

    /// Builder-style insert. Does not validate.
    pub fn with_motor(mut self, name: &str, assignment: PinAssignment) -> Self {
        self.motors.insert(name.to_string(), assignment);
        self
    }

    pub fn get(&self, name: &str) -> Option<PinAssignment> {
        self.motors.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.motors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PinAssignment)> {
        self.motors.iter().map(|(name, a)| (name.as_str(), *a))
    }

    /// The motor and role currently holding `pin`.
    pub fn owner_of(&self, pin: PinNumber) -> Option<(&str, PinRole)> {
        self.iter()
            .find_map(|(name, a)| a.role_of(pin).map(|role| (name, role)))
    }

    /// Check `assignment` for motor `name` against the board and every *other* motor.
    pub fn check_assignment(
        &self,
        name: &str,
        assignment: &PinAssignment,
        board: &Board,
    ) -> Result<(), ConfigError> {
        if assignment.step_pin == assignment.dir_pin {
            return Err(ConfigError::SamePin { pin: assignment.step_pin });
        }
        for (other, held) in self.iter().filter(|(other, _)| *other != name) {
            if let Some((pin, role)) = assignment.shared_pin(&held) {
                return Err(ConfigError::Conflict { pin, motor: other.to_string(), role });
            }
        }
        for pin in assignment.pins() {
            if !board.is_valid(pin) {
                return Err(ConfigError::InvalidPin { pin, board: board.name().to_string() });
            }
        }
        Ok(())
    }

    /// Check the whole document is pin-unique and valid for `board`.
    pub fn validate(&self, board: &Board) -> Result<(), ConfigError> {
        self.iter()
            .try_for_each(|(name, assignment)| self.check_assignment(name, &assignment, board))
    }
}

/// File-backed store for the [`ConfigurationDocument`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    board: Board,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, board: Board) -> Self {
        Self { path: path.into(), board }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Load the document, falling back to (and persisting) the default when
    /// the file is absent or unusable. Never fails.
    pub fn load(&self) -> ConfigurationDocument {
        match self.read() {
            Ok(doc) => {
                tracing::info!("Loaded {} motor(s) from {}", doc.len(), self.path.display());
                doc
            }
            Err(err) => {
                match &err {
                    StoreError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        tracing::info!("No pin configuration at {}; writing defaults", self.path.display());
                    }
                    _ => {
                        tracing::warn!("Pin configuration at {} is unusable ({}); restoring defaults", self.path.display(), err);
                    }
                }
                let doc = ConfigurationDocument::default();
                if let Err(e) = self.save(&doc) {
                    tracing::error!("Failed to write default pin configuration: {}", e);
                }
                doc
            }
        }
    }

    /// Read and validate the persisted document without any fallback.
    pub fn read(&self) -> Result<ConfigurationDocument, StoreError> {
        let contents = fs::read_to_string(&self.path)?;
        let doc: ConfigurationDocument = serde_json::from_str(&contents)?;
        doc.validate(&self.board)?;
        Ok(doc)
    }

    /// Atomically replace the persisted document. Invalid documents are
    /// rejected before the filesystem is touched.
    pub fn save(&self, doc: &ConfigurationDocument) -> Result<(), StoreError> {
        doc.validate(&self.board)?;

        let mut contents = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut contents, formatter);
        doc.serialize(&mut serializer)?;
        contents.push(b'\n');

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!("Saved pin configuration to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> ConfigStore {
        ConfigStore::new(dir.join("motor_config.json"), Board::raspberry_pi())
    }

    #[test]
    fn test_default_boot_writes_file() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(!store.path().exists());

        let doc = store.load();
        assert_eq!(doc, ConfigurationDocument::default());
        assert_eq!(doc.get("motor1"), Some(PinAssignment::new(17, 27)));
        assert_eq!(doc.get("motor2"), Some(PinAssignment::new(22, 23)));

        assert!(store.path().exists());
        assert_eq!(store.read().unwrap(), doc);
    }

    #[test]
    fn test_malformed_file_is_replaced() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let mut file = File::create(store.path()).unwrap();
        writeln!(file, "{{ not json").unwrap();
        file.flush().unwrap();

        assert_eq!(store.load(), ConfigurationDocument::default());
        assert_eq!(store.read().unwrap(), ConfigurationDocument::default());
    }

    #[test]
    fn test_wrong_shape_is_replaced() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.path(), r#"{"motor1": {"step_pin": "seventeen", "dir_pin": 27}}"#).unwrap();
        assert_eq!(store.load(), ConfigurationDocument::default());
    }

    #[test]
    fn test_conflicting_file_is_replaced() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(
            store.path(),
            r#"{"a": {"step_pin": 5, "dir_pin": 6}, "b": {"step_pin": 6, "dir_pin": 7}}"#,
        )
        .unwrap();
        assert!(matches!(store.read(), Err(StoreError::Config(ConfigError::Conflict { pin: 6, .. }))));
        assert_eq!(store.load(), ConfigurationDocument::default());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let doc = ConfigurationDocument::empty()
            .with_motor("x", PinAssignment::new(5, 6))
            .with_motor("y", PinAssignment::new(13, 19))
            .with_motor("z", PinAssignment::new(26, 20));
        store.save(&doc).unwrap();
        assert_eq!(store.load(), doc);
        store.save(&store.load()).unwrap();
        assert_eq!(store.load(), doc);
    }

    #[test]
    fn test_file_format() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&ConfigurationDocument::default()).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({
                "motor1": {"step_pin": 17, "dir_pin": 27},
                "motor2": {"step_pin": 22, "dir_pin": 23}
            })
        );
    }

    #[test]
    fn test_save_rejects_conflict_before_touching_disk() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.save(&ConfigurationDocument::default()).unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        let bad = ConfigurationDocument::default().with_motor("motor3", PinAssignment::new(23, 24));
        let err = store.save(&bad).unwrap_err();
        assert!(matches!(err, StoreError::Config(ConfigError::Conflict { pin: 23, .. })));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_save_rejects_same_and_invalid_pins() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let same = ConfigurationDocument::empty().with_motor("m", PinAssignment::new(4, 4));
        assert!(matches!(store.save(&same), Err(StoreError::Config(ConfigError::SamePin { pin: 4 }))));
        let invalid = ConfigurationDocument::empty().with_motor("m", PinAssignment::new(4, 99));
        assert!(matches!(store.save(&invalid), Err(StoreError::Config(ConfigError::InvalidPin { pin: 99, .. }))));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        for _ in 0..3 {
            store.save(&ConfigurationDocument::default()).unwrap();
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_save_into_missing_directory_is_io_error() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("missing").join("motors.json"), Board::raspberry_pi());
        let err = store.save(&ConfigurationDocument::default()).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_owner_of() {
        let doc = ConfigurationDocument::default();
        assert_eq!(doc.owner_of(27), Some(("motor1", PinRole::Direction)));
        assert_eq!(doc.owner_of(22), Some(("motor2", PinRole::Step)));
        assert_eq!(doc.owner_of(4), None);
    }
}
