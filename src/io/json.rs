// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Imports / exports through JSON files.
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::alternatives::TddAlternatives;
use crate::parameters::Parameters;
use crate::probabilistic::ProbabilityTable;
use crate::scheduling::SchedulingModel;
use crate::tours::ToursTable;
use crate::utility_spec::ChoiceSpec;

/// Deserializes the parameters of a run from a JSON file.
pub fn get_parameters_from_json(filename: &Path) -> Result<Parameters> {
    read_json(filename).context("Failed to read parameters")
}

/// Reads the tours and the model of a run from the input files given in the parameters.
pub fn read_inputs(parameters: &Parameters) -> Result<(ToursTable, SchedulingModel)> {
    info!("Reading input files");
    let files = &parameters.input_files;
    let tours: ToursTable = read_json(&files.tours).context("Failed to read tours")?;
    let alternatives: Option<TddAlternatives> = files
        .alternatives
        .as_deref()
        .map(read_json)
        .transpose()
        .context("Failed to read time-window alternatives")?;
    let spec: Option<ChoiceSpec> = files
        .choice_spec
        .as_deref()
        .map(read_json)
        .transpose()
        .context("Failed to read choice specification")?;
    let probabilities: Option<ProbabilityTable> = files
        .probability_table
        .as_deref()
        .map(read_json)
        .transpose()
        .context("Failed to read probability table")?;
    Ok((
        tours,
        SchedulingModel {
            alternatives,
            spec,
            probabilities,
        },
    ))
}

/// Reads some deserializable data from a JSON file.
pub fn read_json<D: DeserializeOwned>(filename: &Path) -> Result<D> {
    let file =
        File::open(filename).with_context(|| format!("Unable to open file `{filename:?}`"))?;
    let data = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Unable to parse file `{filename:?}`"))?;
    Ok(data)
}

/// Writes some serializable data as a JSON file.
///
/// The file is stored in the given directory, with filename "{name}.json".
pub fn write_json<D: Serialize>(data: &D, output_dir: &Path, name: &str) -> Result<()> {
    let filename = output_dir.join(format!("{name}.json"));
    let file = File::create(&filename)
        .with_context(|| format!("Unable to create file `{filename:?}`"))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)
        .with_context(|| format!("Unable to write file `{filename:?}`"))?;
    writer.flush()?;
    Ok(())
}
