//! Terrane headless flythrough.
//!
//! Flies a scripted viewer over the procedural terrain and drives the full
//! per-frame pipeline (LOD selection, patch cache, generation) against a
//! recording backend. Reports triangle counts, cache behaviour and frame
//! timings every 60 frames.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p terrane-flythrough --release -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod args;
mod export;
mod flight;
mod stats;

use std::time::Instant;

use anyhow::Context;
use terrane_core::{GridCoord, PatchKey};
use terrane_world::{HeadlessBackend, TerrainContext};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::args::FlythroughArgs;
use crate::flight::Flyer;
use crate::stats::FrameTimer;

/// Simulated frame step (seconds).
const FRAME_DT: f32 = 1.0 / 60.0;
const ASPECT: f32 = 16.0 / 9.0;

fn main() -> anyhow::Result<()> {
    let args = FlythroughArgs::from_env()?;
    if args.help {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = args.settings()?;
    let mut backend = HeadlessBackend::new();
    let mut terrain = TerrainContext::new(settings, &mut backend).context("failed to initialize terrain")?;

    if let Some(path) = &args.dump_patch {
        let patch = terrain
            .generator()
            .generate_patch(PatchKey::new(0, GridCoord::default()));
        export::save_patch(&patch, path)?;
    }

    let mut flyer = Flyer::new(args.speed);
    if args.prewarm {
        terrain.prewarm(&flyer.viewer(), &mut backend)?;
    }

    info!(frames = args.frames, "starting flythrough");
    let mut timer = FrameTimer::new();
    let started = Instant::now();
    for _ in 0..args.frames {
        let frame_start = Instant::now();
        flyer.advance(FRAME_DT, &terrain);
        let viewer = flyer.viewer();
        let uniforms = flyer.uniforms(terrain.settings(), ASPECT);

        backend.clear_frame();
        let stats = terrain.render_frame(&viewer, &uniforms, &mut backend)?;
        timer.record(frame_start.elapsed(), &stats);
    }

    terrain.check_consistency()?;
    let totals = terrain.cache_stats();
    info!(
        frames = terrain.frame_count(),
        seconds = format_args!("{:.2}", started.elapsed().as_secs_f64()),
        flight_time = format_args!("{:.1}", flyer.elapsed()),
        hits = totals.hits,
        misses = totals.misses,
        evictions = totals.evictions,
        upload_failures = totals.upload_failures,
        "flythrough finished"
    );
    terrain.shutdown();
    Ok(())
}

fn print_help() {
    eprintln!(
        "Terrane headless flythrough

USAGE:
    cargo run -p terrane-flythrough -- [OPTIONS]

RUN OPTIONS:
    -n, --frames <N>          Frames to simulate (default: 600)
    --speed <UNITS>           Flight speed in world units per second (default: 120)
    --prewarm                 Generate the first view in parallel before flying
    --dump-patch <PATH>       Export the level-0 patch at the origin as a 16-bit PNG

TERRAIN OPTIONS:
    -c, --config <PATH>       Load terrain settings from a JSON file
    --seed <N>                Noise seed (default: 0)
    --render-distance <N>     Patches drawn beyond the viewer's own per level (default: 3)
    --levels <N>              Resolution levels (default: 5)
    --layers <N>              Cache slots per level, at most 256 (default: 256)
    --strategy <NAME>         LOD strategy: rings or quadtree (default: rings)
    --async                   Generate patches on a background worker
    --eviction-seed <N>       Seed cache eviction for reproducible runs

OTHER:
    -h, --help                Print this help message

EXAMPLES:
    # Default flight
    cargo run -p terrane-flythrough --release

    # Small cache with background generation
    cargo run -p terrane-flythrough --release -- --layers 64 --async

    # Quadtree LOD, verbose cache logging
    RUST_LOG=terrane_world=debug cargo run -p terrane-flythrough -- --strategy quadtree

ENVIRONMENT VARIABLES:
    RUST_LOG                  Set log level (e.g., info, debug, trace)"
    );
}
