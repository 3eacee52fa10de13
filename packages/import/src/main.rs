#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the collision CSV import.

use std::time::Instant;

use clap::Parser;
use crash_map_import::{Args, ImportError, IndicatifProgress, init_logger, run};

fn main() -> Result<(), ImportError> {
    let multi = init_logger();
    let args = Args::parse();

    let started = Instant::now();
    let progress = IndicatifProgress::rows_bar(&multi, &args.table);
    let summary = run(&args, &progress)?;

    log::info!(
        "Import complete in {:.1}s: {} rows inserted",
        started.elapsed().as_secs_f64(),
        summary.inserted
    );
    Ok(())
}
