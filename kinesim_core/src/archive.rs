//! Persistent tile archive backed by `sled`.
//!
//! Tiles live under `tile/<code>`, free-form patches under `patch/<name>`.
//! Values are serde-encoded [`ElevationPatch`] records; the encoding is
//! private to the archive.

use crate::elevation::{ElevationPatch, TileCode};
use crate::error::CoreResult;
use std::path::Path;
use tracing::debug;

const TILE_PREFIX: &str = "tile/";
const PATCH_PREFIX: &str = "patch/";

/// Embedded key-value store for elevation tiles and patches.
pub struct TileArchive {
    db: sled::Db,
}

impl TileArchive {
    /// Opens (or creates) an archive at the given directory.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let db = sled::open(path.as_ref())?;
        debug!("Opened tile archive at {}", path.as_ref().display());
        Ok(Self { db })
    }

    /// Opens a throwaway archive that is deleted on drop.
    pub fn temporary() -> CoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub fn save_tile(&self, code: TileCode, patch: &ElevationPatch) -> CoreResult<()> {
        self.put(&format!("{}{}", TILE_PREFIX, code), patch)
    }

    pub fn load_tile(&self, code: TileCode) -> CoreResult<Option<ElevationPatch>> {
        self.fetch(&format!("{}{}", TILE_PREFIX, code))
    }

    pub fn save_patch(&self, name: &str, patch: &ElevationPatch) -> CoreResult<()> {
        self.put(&format!("{}{}", PATCH_PREFIX, name), patch)
    }

    pub fn load_patch(&self, name: &str) -> CoreResult<Option<ElevationPatch>> {
        self.fetch(&format!("{}{}", PATCH_PREFIX, name))
    }

    /// Codes of every archived tile, in key order.
    pub fn tile_codes(&self) -> CoreResult<Vec<TileCode>> {
        let mut codes = Vec::new();
        for entry in self.db.scan_prefix(TILE_PREFIX) {
            let (key, _) = entry?;
            let key = String::from_utf8_lossy(&key);
            if let Ok(code) = key[TILE_PREFIX.len()..].parse() {
                codes.push(code);
            }
        }
        Ok(codes)
    }

    pub fn flush(&self) -> CoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn put(&self, key: &str, patch: &ElevationPatch) -> CoreResult<()> {
        let bytes = serde_json::to_vec(patch)?;
        self.db.insert(key.as_bytes(), bytes)?;
        debug!("Archived {}", key);
        Ok(())
    }

    fn fetch(&self, key: &str) -> CoreResult<Option<ElevationPatch>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::GeoBounds;
    use nalgebra::DMatrix;

    #[test]
    fn test_tile_round_trip() {
        let archive = TileArchive::temporary().unwrap();
        let code = TileCode::new(51, -3);
        let grid = DMatrix::from_fn(4, 4, |r, c| (r * 10 + c) as f32 + 0.25);
        let patch = ElevationPatch::new(code.bounds(), grid, true).unwrap();

        archive.save_tile(code, &patch).unwrap();
        let loaded = archive.load_tile(code).unwrap().unwrap();

        assert_eq!(loaded, patch);
        assert_eq!(loaded.bounds(), &GeoBounds::new(51.0, -3.0, 52.0, -2.0));
    }

    #[test]
    fn test_missing_tile_is_none() {
        let archive = TileArchive::temporary().unwrap();
        assert!(archive.load_tile(TileCode::new(0, 0)).unwrap().is_none());
        assert!(archive.load_patch("nowhere").unwrap().is_none());
    }

    #[test]
    fn test_tile_codes_ignore_patches() {
        let archive = TileArchive::temporary().unwrap();
        let a = TileCode::new(1, 1);
        let b = TileCode::new(-2, 3);
        archive.save_tile(a, &ElevationPatch::flat(a.bounds(), 2, 0.0).unwrap()).unwrap();
        archive.save_tile(b, &ElevationPatch::flat(b.bounds(), 2, 0.0).unwrap()).unwrap();
        archive
            .save_patch("valley", &ElevationPatch::flat(a.bounds(), 2, 0.0).unwrap())
            .unwrap();

        let mut codes = archive.tile_codes().unwrap();
        codes.sort();
        assert_eq!(codes, vec![b, a]);
    }
}
