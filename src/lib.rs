// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Library for the time-window scheduling of tours and subtours in activity-based travel
//! demand models.
#![doc(html_no_source)]

pub mod alternative_set;
pub mod alternatives;
pub mod chunk;
pub mod error;
pub mod interaction;
pub mod io;
pub mod logging;
pub mod parameters;
pub mod pipeline;
pub mod probabilistic;
pub mod progress_bar;
pub mod random;
pub mod scheduling;
pub mod timetable;
pub mod tours;
pub mod units;
pub mod utility_spec;

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

// Re-exports.
pub use error::SchedulingError;
pub use scheduling::{run_scheduling_step, run_tour_scheduling_probabilistic, StepOutcome};

// Dependencies only used in the bins.
use clap as _;

/// Deserializes the inputs of a scheduling run, runs the scheduling step and stores the results
/// to the output directory.
///
/// This function takes as argument the path to the `parameters.json` file.
pub fn run_scheduling(path: &Path) -> Result<()> {
    run_scheduling_imp(path, None::<std::io::Empty>)
}

/// Deserializes the inputs of a scheduling run, runs the scheduling step and stores the results
/// to the output directory.
///
/// This function takes as argument the path to the `parameters.json` file and a writer for the
/// logs.
pub fn run_scheduling_with_writer<W: std::io::Write + Send + 'static>(
    path: &Path,
    writer: W,
) -> Result<()> {
    run_scheduling_imp(path, Some(writer))
}

fn run_scheduling_imp<W: std::io::Write + Send + 'static>(
    path: &Path,
    writer: Option<W>,
) -> Result<()> {
    // Read parameters.
    let mut parameters = io::json::get_parameters_from_json(path)?;

    // Set the working directory to the directory of the `parameters.json` file so that the input
    // paths can be interpreted as being relative to this file.
    if let Some(parent_dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        env::set_current_dir(parent_dir)
            .with_context(|| format!("Failed to set working directory to `{parent_dir:?}`"))?;
    }

    // Create output directory if it does not exists yet.
    std::fs::create_dir_all(&parameters.output_directory).with_context(|| {
        format!(
            "Failed to create output directory `{:?}`",
            parameters.output_directory
        )
    })?;

    logging::initialize_logging(&parameters.output_directory, writer)?;

    parameters.fix_random_seed();
    let mut spinner = progress_bar::Spinner::new("Reading input files");
    let (tours, model) = io::json::read_inputs(&parameters)?;
    spinner.finish();

    let mut pipeline = pipeline::Pipeline::with_tours(tours);
    let outcome = scheduling::run_scheduling_step(&mut pipeline, &model, &parameters)?;

    info!("Writing results");
    let output = &parameters.output_directory;
    io::json::write_json(pipeline.get_table(pipeline::TOURS)?, output, "tours")?;
    io::json::write_json(&outcome, output, "outcome")?;
    io::json::write_json(&parameters, output, "parameters")?;
    Ok(())
}
