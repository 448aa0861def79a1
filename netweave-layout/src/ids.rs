//! Persisted identifiers for generated schematic entities.
//!
//! Every symbol instance, pin, wire, power symbol and no-connect flag gets
//! a UUID looked up by a human-readable key (`R1`, `R1_2`, `R1_2_nc`,
//! `wire_…`). Keeping the map between runs means regenerating the same
//! circuit yields the same identifiers.

use crate::types::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum IdMapError {
    #[error("Failed to access id map: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse id map: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdMap {
    ids: BTreeMap<String, Uuid>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, IdMapError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Load `path` if it exists, an empty map otherwise.
    pub fn load_or_new(path: impl AsRef<Path>) -> Result<Self, IdMapError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("no id map at {}, starting fresh", path.display());
            Ok(Self::new())
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IdMapError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Stored id for `key`, minting and storing a fresh one if needed.
    pub fn id(&mut self, key: &str) -> Uuid {
        if let Some(id) = self.ids.get(key) {
            return *id;
        }
        let id = Uuid::new_v4();
        self.ids.insert(key.to_string(), id);
        id
    }

    pub fn get(&self, key: &str) -> Option<Uuid> {
        self.ids.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Key of a wire segment, endpoints in canonical order at four decimals.
pub fn wire_key(a: Point, b: Point) -> String {
    let (x1, y1, x2, y2) = crate::assembly::wire_key(a, b);
    format!(
        "wire_{}_{}_{}_{}",
        fixed4(x1),
        fixed4(y1),
        fixed4(x2),
        fixed4(y2)
    )
}

fn fixed4(v: i64) -> String {
    let sign = if v < 0 { "-" } else { "" };
    let v = v.unsigned_abs();
    format!("{sign}{}.{:04}", v / 10_000, v % 10_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_per_key() {
        let mut ids = IdMap::new();
        let a = ids.id("R1");
        assert_eq!(ids.id("R1"), a);
        assert_ne!(ids.id("R2"), a);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.get("R3"), None);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.json");
        let mut ids = IdMap::new();
        let a = ids.id("R1_1_nc");
        ids.save(&path).unwrap();

        let mut back = IdMap::load(&path).unwrap();
        assert_eq!(back, ids);
        assert_eq!(back.id("R1_1_nc"), a);
        assert!(IdMap::load_or_new(dir.path().join("absent.json")).unwrap().is_empty());
    }

    #[test]
    fn wire_keys_ignore_direction() {
        let a = Point::new(-2.54, 1.27);
        let b = Point::new(5.08, 1.27);
        assert_eq!(wire_key(a, b), "wire_-2.5400_1.2700_5.0800_1.2700");
        assert_eq!(wire_key(b, a), wire_key(a, b));
    }
}
