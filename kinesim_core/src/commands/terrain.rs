//! Elevation tile, patch and raster commands.
//!
//! Tiles are keyed in the elevation store by their code (`N51W003`), named
//! patches by their name. `elesave*`/`*load*` commands move them between the
//! store and the tile archive.

use super::{arg, num, opt_num, FnCommand};
use crate::elevation::{is_valid_elevation, ElevationPatch, GeoBounds, TileCode};
use crate::error::{CoreError, CoreResult};
use crate::raster;
use crate::runtime::RuntimeContext;
use tracing::info;

pub const COMMANDS: &[FnCommand] = &[
    FnCommand::new("eleprep", "eleprep <code> <samples> [elevation] - create a flat tile", prep),
    FnCommand::new("eleloadtile", "eleloadtile <code> - load a tile from the archive", load_tile),
    FnCommand::new("elesavetile", "elesavetile <code> - save a loaded tile to the archive", save_tile),
    FnCommand::new("elesavetileset", "elesavetileset - save every loaded tile to the archive", save_tile_set),
    FnCommand::new("elepatchload", "elepatchload <name> - load a named patch from the archive", load_patch),
    FnCommand::new(
        "elepatchsave",
        "elepatchsave <name> <min-lat> <min-lon> <max-lat> <max-lon> <samples> - sample loaded terrain into a named patch and archive it",
        save_patch,
    ),
    FnCommand::new("elequery", "elequery <lat> <lon> - elevation at a point", query),
    FnCommand::new("elereport", "elereport - list loaded tiles and patches", report),
    FnCommand::new("elearchivelist", "elearchivelist - list tile codes stored in the archive", archive_list),
    FnCommand::new(
        "rastercollate",
        "rastercollate <out-name> <nw> <ne> <sw> <se> - join four neighbouring tiles",
        collate,
    ),
    FnCommand::new("rasterdivide", "rasterdivide <name> - split a tile into four quadrants", divide),
];

fn tile_code(args: &[&str], index: usize) -> CoreResult<TileCode> {
    arg(args, index, "code")?.parse()
}

/// Sample count argument, bounded by `max_tile_samples`.
fn samples_arg(rt: &RuntimeContext, args: &[&str], index: usize) -> CoreResult<usize> {
    let samples: usize = num(args, index, "samples")?;
    let limit = rt.config().max_tile_samples;
    if samples > limit {
        return Err(CoreError::InvalidArgument(format!(
            "{} samples exceeds max_tile_samples ({})",
            samples, limit
        )));
    }
    Ok(samples)
}

fn loaded(rt: &RuntimeContext, key: &str) -> CoreResult<ElevationPatch> {
    rt.elevation()
        .get(key)
        .ok_or_else(|| CoreError::TileNotFound(key.to_string()))
}

fn prep(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let code = tile_code(args, 0)?;
    let samples = samples_arg(rt, args, 1)?;
    let elevation = opt_num::<f32>(args, 2, "elevation")?.unwrap_or(0.0);
    let patch = ElevationPatch::flat(code.bounds(), samples, elevation)?;
    rt.elevation().insert_tile(code, patch);
    Ok(format!("Prepared {} ({}x{} at {:.1}m)", code, samples, samples, elevation))
}

fn load_tile(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let code = tile_code(args, 0)?;
    let patch = rt
        .archive()?
        .load_tile(code)?
        .ok_or_else(|| CoreError::TileNotFound(code.to_string()))?;
    let (rows, cols) = (patch.rows(), patch.cols());
    rt.elevation().insert_tile(code, patch);
    Ok(format!("Loaded {} ({}x{})", code, rows, cols))
}

fn save_tile(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let code = tile_code(args, 0)?;
    let patch = loaded(rt, &code.to_string())?;
    let archive = rt.archive()?;
    archive.save_tile(code, &patch)?;
    archive.flush()?;
    Ok(format!("Saved {}", code))
}

fn save_tile_set(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    let archive = rt.archive()?;
    let mut saved = Vec::new();
    for key in rt.elevation().keys() {
        let Ok(code) = key.parse::<TileCode>() else {
            continue;
        };
        if let Some(patch) = rt.elevation().get(&key) {
            archive.save_tile(code, &patch)?;
            saved.push(key);
        }
    }
    archive.flush()?;
    info!("Archived {} tiles", saved.len());
    Ok(format!("Saved {} tiles: {}", saved.len(), saved.join(" ")))
}

fn load_patch(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let patch = rt
        .archive()?
        .load_patch(name)?
        .ok_or_else(|| CoreError::TileNotFound(name.to_string()))?;
    rt.elevation().insert(name, patch);
    Ok(format!("Loaded patch {}", name))
}

fn save_patch(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let bounds = GeoBounds::new(
        num(args, 1, "min-lat")?,
        num(args, 2, "min-lon")?,
        num(args, 3, "max-lat")?,
        num(args, 4, "max-lon")?,
    );
    let samples = samples_arg(rt, args, 5)?;
    let patch = rt.elevation().sample_patch(bounds, samples, 0.0)?;

    let archive = rt.archive()?;
    archive.save_patch(name, &patch)?;
    archive.flush()?;
    rt.elevation().insert(name, patch);
    Ok(format!("Saved patch {} ({}x{})", name, samples.max(2), samples.max(2)))
}

fn query(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let lat: f64 = num(args, 0, "lat")?;
    let lon: f64 = num(args, 1, "lon")?;
    let elevation = rt.elevation().elevation_at(lat, lon);
    if !is_valid_elevation(elevation) {
        return Err(CoreError::InvalidArgument(format!("no elevation data at {:.6} {:.6}", lat, lon)));
    }
    Ok(format!("{:.6} {:.6} {:.2}m", lat, lon, elevation))
}

fn report(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    let lines: Vec<String> = rt.elevation().report().iter().map(ToString::to_string).collect();
    if lines.is_empty() {
        return Ok("No elevation data loaded".to_string());
    }
    Ok(lines.join("\n"))
}

fn archive_list(rt: &RuntimeContext, _args: &[&str]) -> CoreResult<String> {
    let codes = rt.archive()?.tile_codes()?;
    if codes.is_empty() {
        return Ok("No archived tiles".to_string());
    }
    let codes: Vec<String> = codes.iter().map(ToString::to_string).collect();
    Ok(format!("{} archived tiles: {}", codes.len(), codes.join(" ")))
}

fn collate(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let out = arg(args, 0, "out-name")?;
    let nw = loaded(rt, arg(args, 1, "nw")?)?;
    let ne = loaded(rt, arg(args, 2, "ne")?)?;
    let sw = loaded(rt, arg(args, 3, "sw")?)?;
    let se = loaded(rt, arg(args, 4, "se")?)?;
    let joined = raster::collate(&nw, &ne, &sw, &se)?;
    let (rows, cols) = (joined.rows(), joined.cols());
    rt.elevation().insert(out, joined);
    Ok(format!("Collated {} ({}x{})", out, rows, cols))
}

fn divide(rt: &RuntimeContext, args: &[&str]) -> CoreResult<String> {
    let name = arg(args, 0, "name")?;
    let quadrants = raster::divide(&loaded(rt, name)?)?;
    let store = rt.elevation();
    let names: Vec<String> = ["nw", "ne", "sw", "se"].iter().map(|q| format!("{}_{}", name, q)).collect();
    store.insert(names[0].clone(), quadrants.nw);
    store.insert(names[1].clone(), quadrants.ne);
    store.insert(names[2].clone(), quadrants.sw);
    store.insert(names[3].clone(), quadrants.se);
    Ok(format!("Divided {} into {}", name, names.join(" ")))
}
