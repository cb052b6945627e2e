//! Raster tile utilities: joining four neighbours into one tile and
//! splitting a tile into quadrants.
//!
//! Neighbouring tiles share their edge samples, so collating two `n`-sample
//! tiles along an edge yields `2n - 1` samples, and dividing needs an odd
//! sample count so the middle row/column can be shared by both halves.

use crate::elevation::{ElevationPatch, GeoBounds};
use crate::error::{CoreError, CoreResult};
use nalgebra::DMatrix;

/// Tolerance for matching shared edges, in degrees.
const EDGE_TOLERANCE: f64 = 1e-9;

/// The four quadrants of a tile, north-west first.
#[derive(Debug, Clone, PartialEq)]
pub struct Quadrants {
    pub nw: ElevationPatch,
    pub ne: ElevationPatch,
    pub sw: ElevationPatch,
    pub se: ElevationPatch,
}

/// Converts a patch to north-up orientation.
fn north_up(patch: &ElevationPatch) -> DMatrix<f32> {
    if patch.north_up() {
        patch.grid().clone()
    } else {
        let rows = patch.rows();
        DMatrix::from_fn(rows, patch.cols(), |r, c| patch.grid()[(rows - 1 - r, c)])
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= EDGE_TOLERANCE
}

/// Joins four edge-sharing patches into one north-up patch.
///
/// All four must have the same sample dimensions and meet exactly at a
/// common corner.
pub fn collate(nw: &ElevationPatch, ne: &ElevationPatch, sw: &ElevationPatch, se: &ElevationPatch) -> CoreResult<ElevationPatch> {
    let (rows, cols) = (nw.rows(), nw.cols());
    for p in [ne, sw, se] {
        if p.rows() != rows || p.cols() != cols {
            return Err(CoreError::InvalidPatch(format!(
                "collate needs equal grids, got {}x{} and {}x{}",
                rows,
                cols,
                p.rows(),
                p.cols()
            )));
        }
    }

    let (bnw, bne, bsw, bse) = (nw.bounds(), ne.bounds(), sw.bounds(), se.bounds());
    let aligned = close(bnw.max_lon, bne.min_lon)
        && close(bsw.max_lon, bse.min_lon)
        && close(bnw.min_lat, bsw.max_lat)
        && close(bne.min_lat, bse.max_lat)
        && close(bnw.min_lon, bsw.min_lon)
        && close(bne.max_lon, bse.max_lon)
        && close(bnw.max_lat, bne.max_lat)
        && close(bsw.min_lat, bse.min_lat);
    if !aligned {
        return Err(CoreError::InvalidPatch("collate tiles do not share edges".to_string()));
    }

    let grids = [north_up(nw), north_up(ne), north_up(sw), north_up(se)];
    let out_rows = 2 * rows - 1;
    let out_cols = 2 * cols - 1;
    let grid = DMatrix::from_fn(out_rows, out_cols, |r, c| {
        let (north, local_r) = if r < rows { (true, r) } else { (false, r - (rows - 1)) };
        let (west, local_c) = if c < cols { (true, c) } else { (false, c - (cols - 1)) };
        let index = match (north, west) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        grids[index][(local_r, local_c)]
    });

    let bounds = GeoBounds::new(bsw.min_lat, bsw.min_lon, bne.max_lat, bne.max_lon);
    ElevationPatch::new(bounds, grid, true)
}

/// Splits a patch into four edge-sharing quadrants.
pub fn divide(patch: &ElevationPatch) -> CoreResult<Quadrants> {
    let (rows, cols) = (patch.rows(), patch.cols());
    if rows < 3 || cols < 3 || rows % 2 == 0 || cols % 2 == 0 {
        return Err(CoreError::InvalidPatch(format!(
            "divide needs odd sample counts of at least 3, got {}x{}",
            rows, cols
        )));
    }

    let grid = north_up(patch);
    let half_r = rows / 2;
    let half_c = cols / 2;
    let sub = |r0: usize, c0: usize| grid.view((r0, c0), (half_r + 1, half_c + 1)).into_owned();

    let b = patch.bounds();
    let mid_lat = b.min_lat + b.delta_lat() / 2.0;
    let mid_lon = b.min_lon + b.delta_lon() / 2.0;

    Ok(Quadrants {
        nw: ElevationPatch::new(GeoBounds::new(mid_lat, b.min_lon, b.max_lat, mid_lon), sub(0, 0), true)?,
        ne: ElevationPatch::new(GeoBounds::new(mid_lat, mid_lon, b.max_lat, b.max_lon), sub(0, half_c), true)?,
        sw: ElevationPatch::new(GeoBounds::new(b.min_lat, b.min_lon, mid_lat, mid_lon), sub(half_r, 0), true)?,
        se: ElevationPatch::new(GeoBounds::new(b.min_lat, mid_lon, mid_lat, b.max_lon), sub(half_r, half_c), true)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::TileCode;

    fn ramp(code: TileCode, samples: usize) -> ElevationPatch {
        let grid = DMatrix::from_fn(samples, samples, |r, c| (r * 100 + c) as f32);
        ElevationPatch::new(code.bounds(), grid, true).unwrap()
    }

    #[test]
    fn test_divide_then_collate_restores_patch() {
        let patch = ramp(TileCode::new(0, 0), 5);
        let q = divide(&patch).unwrap();

        assert_eq!(q.nw.rows(), 3);
        assert_eq!(q.se.bounds(), &GeoBounds::new(0.0, 0.5, 0.5, 1.0));
        // shared edge sample
        assert_eq!(q.nw.grid()[(2, 2)], q.se.grid()[(0, 0)]);

        let joined = collate(&q.nw, &q.ne, &q.sw, &q.se).unwrap();
        assert_eq!(joined, patch);
    }

    #[test]
    fn test_collate_preserves_elevation_queries() {
        let nw = ramp(TileCode::new(1, 0), 3);
        let ne = ramp(TileCode::new(1, 1), 3);
        let sw = ramp(TileCode::new(0, 0), 3);
        let se = ramp(TileCode::new(0, 1), 3);
        let joined = collate(&nw, &ne, &sw, &se).unwrap();

        assert_eq!(joined.rows(), 5);
        assert_eq!(joined.bounds(), &GeoBounds::new(0.0, 0.0, 2.0, 2.0));
        assert_eq!(joined.elevation_at(1.5, 1.5), ne.elevation_at(1.5, 1.5));
        assert_eq!(joined.elevation_at(0.25, 0.75), sw.elevation_at(0.25, 0.75));
    }

    #[test]
    fn test_collate_rejects_misaligned_tiles() {
        let a = ramp(TileCode::new(0, 0), 3);
        let far = ramp(TileCode::new(10, 10), 3);
        assert!(collate(&a, &far, &a, &a).is_err());
    }

    #[test]
    fn test_divide_rejects_even_grid() {
        let patch = ramp(TileCode::new(0, 0), 4);
        assert!(divide(&patch).is_err());
    }
}
