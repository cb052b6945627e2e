//! Terrain elevation patches and the store that answers height queries.
//!
//! A patch is a geographic bounding box over a grid of elevation samples.
//! Samples sit on the grid lines, so a patch with `rows × cols` samples has
//! `rows - 1` latitude cells and `cols - 1` longitude cells, and the four
//! corner samples sit exactly on the bounding-box corners.
//!
//! Tiles are patches addressed by a [`TileCode`]: 1° × 1° cells named by
//! their south-west corner, e.g. `N51W003`.

use crate::error::{CoreError, CoreResult};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Sentinel returned for points outside every loaded patch.
pub const INVALID_ELEVATION: f64 = -99999.0;

/// Returns true when `value` is a real elevation rather than the sentinel.
pub fn is_valid_elevation(value: f64) -> bool {
    value != INVALID_ELEVATION && value.is_finite()
}

/// Address of a 1° × 1° tile by its south-west corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCode {
    pub lat: i32,
    pub lon: i32,
}

impl TileCode {
    pub fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// Tile containing the given point.
    pub fn containing(lat: f64, lon: f64) -> Self {
        Self::new(lat.floor() as i32, lon.floor() as i32)
    }

    pub fn bounds(&self) -> GeoBounds {
        GeoBounds::new(
            self.lat as f64,
            self.lon as f64,
            self.lat as f64 + 1.0,
            self.lon as f64 + 1.0,
        )
    }
}

impl std::fmt::Display for TileCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ns = if self.lat >= 0 { 'N' } else { 'S' };
        let ew = if self.lon >= 0 { 'E' } else { 'W' };
        write!(f, "{}{:02}{}{:03}", ns, self.lat.abs(), ew, self.lon.abs())
    }
}

impl std::str::FromStr for TileCode {
    type Err = CoreError;

    /// Parses `N51W003` / `s10e045` style codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidTileCode(s.to_string());
        let name = s.trim();
        if name.len() != 7 || !name.is_ascii() {
            return Err(invalid());
        }
        let digits = |range: std::ops::Range<usize>| name.as_bytes()[range].iter().all(u8::is_ascii_digit);
        if !digits(1..3) || !digits(4..7) {
            return Err(invalid());
        }

        let lat_sign = match &name[0..1] {
            "N" | "n" => 1,
            "S" | "s" => -1,
            _ => return Err(invalid()),
        };
        let lat: i32 = name[1..3].parse().map_err(|_| invalid())?;

        let lon_sign = match &name[3..4] {
            "E" | "e" => 1,
            "W" | "w" => -1,
            _ => return Err(invalid()),
        };
        let lon: i32 = name[4..7].parse().map_err(|_| invalid())?;

        if lat > 90 || lon > 180 {
            return Err(invalid());
        }
        Ok(Self::new(lat * lat_sign, lon * lon_sign))
    }
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self { min_lat, min_lon, max_lat, max_lon }
    }

    pub fn delta_lat(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn delta_lon(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Inclusive containment: points on the edges belong to the box.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    fn is_valid(&self) -> bool {
        self.delta_lat() > 0.0 && self.delta_lon() > 0.0
    }
}

/// An in-memory grid of elevation samples over a bounding box.
///
/// Decoding goes through [`ElevationPatch::new`], so a stored patch with a
/// degenerate grid or box is rejected rather than loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PatchRecord")]
pub struct ElevationPatch {
    bounds: GeoBounds,
    /// rows = latitude samples, cols = longitude samples (west to east)
    grid: DMatrix<f32>,
    /// Row 0 is the northernmost edge (raster convention)
    north_up: bool,
}

/// Unvalidated wire form of a patch.
#[derive(Deserialize)]
struct PatchRecord {
    bounds: GeoBounds,
    grid: DMatrix<f32>,
    north_up: bool,
}

impl TryFrom<PatchRecord> for ElevationPatch {
    type Error = CoreError;

    fn try_from(record: PatchRecord) -> CoreResult<Self> {
        Self::new(record.bounds, record.grid, record.north_up)
    }
}

impl ElevationPatch {
    /// Creates a patch. Needs at least 2×2 samples and a non-empty box.
    pub fn new(bounds: GeoBounds, grid: DMatrix<f32>, north_up: bool) -> CoreResult<Self> {
        if grid.nrows() < 2 || grid.ncols() < 2 {
            return Err(CoreError::InvalidPatch(format!(
                "grid must be at least 2x2, got {}x{}",
                grid.nrows(),
                grid.ncols()
            )));
        }
        if !bounds.is_valid() {
            return Err(CoreError::InvalidPatch(format!("empty bounding box {:?}", bounds)));
        }
        Ok(Self { bounds, grid, north_up })
    }

    /// Patch of `samples × samples` points at a single elevation.
    pub fn flat(bounds: GeoBounds, samples: usize, elevation: f32) -> CoreResult<Self> {
        Self::new(bounds, DMatrix::from_element(samples, samples, elevation), true)
    }

    pub fn bounds(&self) -> &GeoBounds {
        &self.bounds
    }

    pub fn grid(&self) -> &DMatrix<f32> {
        &self.grid
    }

    pub fn north_up(&self) -> bool {
        self.north_up
    }

    pub fn rows(&self) -> usize {
        self.grid.nrows()
    }

    pub fn cols(&self) -> usize {
        self.grid.ncols()
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.bounds.contains(lat, lon)
    }

    /// Degrees per sample on the coarser axis.
    pub fn resolution(&self) -> f64 {
        let lat_res = self.bounds.delta_lat() / (self.rows() - 1) as f64;
        let lon_res = self.bounds.delta_lon() / (self.cols() - 1) as f64;
        lat_res.max(lon_res)
    }

    /// Bilinear elevation at a point, or `INVALID_ELEVATION` outside the box.
    pub fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        if !self.contains(lat, lon) {
            return INVALID_ELEVATION;
        }

        let frac_lat = ((lat - self.bounds.min_lat) / self.bounds.delta_lat()).clamp(0.0, 1.0);
        let frac_lon = ((lon - self.bounds.min_lon) / self.bounds.delta_lon()).clamp(0.0, 1.0);
        let frac_row = if self.north_up { 1.0 - frac_lat } else { frac_lat };

        let row = frac_row * (self.rows() - 1) as f64;
        let col = frac_lon * (self.cols() - 1) as f64;
        self.bilinear(row, col)
    }

    /// Bilinear interpolation at fractional row/col.
    fn bilinear(&self, row: f64, col: f64) -> f64 {
        let r0 = (row.floor() as usize).min(self.rows() - 1);
        let c0 = (col.floor() as usize).min(self.cols() - 1);
        let r1 = (r0 + 1).min(self.rows() - 1);
        let c1 = (c0 + 1).min(self.cols() - 1);

        let fr = row - r0 as f64;
        let fc = col - c0 as f64;

        let e00 = self.grid[(r0, c0)] as f64;
        let e01 = self.grid[(r0, c1)] as f64;
        let e10 = self.grid[(r1, c0)] as f64;
        let e11 = self.grid[(r1, c1)] as f64;

        let top = e00 * (1.0 - fc) + e01 * fc;
        let bot = e10 * (1.0 - fc) + e11 * fc;
        top * (1.0 - fr) + bot * fr
    }

    /// Minimum and maximum sample values.
    pub fn elevation_range(&self) -> (f32, f32) {
        (self.grid.min(), self.grid.max())
    }
}

/// Summary line for one stored patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchSummary {
    pub key: String,
    pub bounds: GeoBounds,
    pub rows: usize,
    pub cols: usize,
    pub resolution: f64,
    pub min_elevation: f32,
    pub max_elevation: f32,
}

impl std::fmt::Display for PatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{:.4},{:.4} .. {:.4},{:.4}] {}x{} res={:.6} elev={:.1}..{:.1}",
            self.key,
            self.bounds.min_lat,
            self.bounds.min_lon,
            self.bounds.max_lat,
            self.bounds.max_lon,
            self.rows,
            self.cols,
            self.resolution,
            self.min_elevation,
            self.max_elevation,
        )
    }
}

/// Thread-safe collection of loaded patches, keyed by name.
///
/// Tiles are stored under their code (`N51W003`); free-form patches under
/// any other name.
#[derive(Debug, Default)]
pub struct ElevationStore {
    patches: RwLock<BTreeMap<String, ElevationPatch>>,
}

impl ElevationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a patch, replacing any previous patch with the same key.
    pub fn insert(&self, key: impl Into<String>, patch: ElevationPatch) {
        let mut patches = self.patches.write().unwrap_or_else(|e| e.into_inner());
        patches.insert(key.into(), patch);
    }

    pub fn insert_tile(&self, code: TileCode, patch: ElevationPatch) {
        self.insert(code.to_string(), patch);
    }

    pub fn remove(&self, key: &str) -> Option<ElevationPatch> {
        let mut patches = self.patches.write().unwrap_or_else(|e| e.into_inner());
        patches.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<ElevationPatch> {
        let patches = self.patches.read().unwrap_or_else(|e| e.into_inner());
        patches.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let patches = self.patches.read().unwrap_or_else(|e| e.into_inner());
        patches.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.patches.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.patches.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// True if any loaded patch covers the point.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let patches = self.patches.read().unwrap_or_else(|e| e.into_inner());
        patches.values().any(|p| p.contains(lat, lon))
    }

    /// Elevation from the finest-resolution patch covering the point, or
    /// `INVALID_ELEVATION` if none does.
    pub fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        let patches = self.patches.read().unwrap_or_else(|e| e.into_inner());
        patches
            .values()
            .filter(|p| p.contains(lat, lon))
            .min_by(|a, b| a.resolution().total_cmp(&b.resolution()))
            .map(|p| p.elevation_at(lat, lon))
            .unwrap_or(INVALID_ELEVATION)
    }

    /// Builds a north-up patch of `samples × samples` points by querying the
    /// store; points no patch covers get `fill`.
    pub fn sample_patch(&self, bounds: GeoBounds, samples: usize, fill: f32) -> CoreResult<ElevationPatch> {
        let samples = samples.max(2);
        let step_lat = bounds.delta_lat() / (samples - 1) as f64;
        let step_lon = bounds.delta_lon() / (samples - 1) as f64;
        let grid = DMatrix::from_fn(samples, samples, |r, c| {
            let value = self.elevation_at(bounds.max_lat - r as f64 * step_lat, bounds.min_lon + c as f64 * step_lon);
            if is_valid_elevation(value) { value as f32 } else { fill }
        });
        ElevationPatch::new(bounds, grid, true)
    }

    /// Per-patch summary, sorted by key.
    pub fn report(&self) -> Vec<PatchSummary> {
        let patches = self.patches.read().unwrap_or_else(|e| e.into_inner());
        patches
            .iter()
            .map(|(key, p)| {
                let (min_elevation, max_elevation) = p.elevation_range();
                PatchSummary {
                    key: key.clone(),
                    bounds: p.bounds,
                    rows: p.rows(),
                    cols: p.cols(),
                    resolution: p.resolution(),
                    min_elevation,
                    max_elevation,
                }
            })
            .collect()
    }
}
