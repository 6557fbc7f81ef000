// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Parameters of a scheduling run.
use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use choice::ChoiceModel;
use log::info;
use rand::prelude::*;
use schemars::JsonSchema;
use serde_derive::{Deserialize, Serialize};

use crate::probabilistic::ProbabilisticSettings;
use crate::tours::{HouseholdId, TourCategory};
use crate::units::Window;

const DEFAULT_DAY: Window = Window::new(5, 23);

fn default_day() -> Window {
    DEFAULT_DAY
}

fn default_categories() -> Vec<TourCategory> {
    vec![TourCategory::Atwork]
}

fn default_step_name() -> String {
    "atwork_subtour_scheduling".to_owned()
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("output")
}

/// What to do when a chooser has no feasible alternative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnschedulablePolicy {
    /// Stop the run with an error.
    #[default]
    Abort,
    /// Leave the chooser unscheduled and list it in the outcome of the step.
    Exclude,
}

/// Paths to the input files of a run.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct InputFiles {
    /// Path to the JSON file with the tours.
    pub tours: PathBuf,
    /// Path to the JSON file with the time-window alternatives.
    ///
    /// If `None`, every window of the day is an alternative.
    #[serde(default)]
    pub alternatives: Option<PathBuf>,
    /// Path to the JSON file with the choice specification.
    #[serde(default)]
    pub choice_spec: Option<PathBuf>,
    /// Path to the JSON file with the departure / return probabilities, used when there is no
    /// choice specification.
    #[serde(default)]
    pub probability_table: Option<PathBuf>,
}

/// Set of parameters used to control how a scheduling run behaves.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(try_from = "UncheckedParameters")]
#[schemars(title = "Parameters")]
pub struct Parameters {
    /// Paths to the input files.
    pub input_files: InputFiles,
    /// Directory where the output files and the logs are stored.
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    /// Name of the step, used in the logs and to key the random streams.
    #[serde(default = "default_step_name")]
    pub step_name: String,
    /// First and last time bins of the day.
    #[serde(default = "default_day")]
    pub day: Window,
    /// Memory budget of a chunk of choosers, in bytes (`0` for a single chunk).
    #[serde(default)]
    pub chunk_size: usize,
    /// Seed of the random streams.
    ///
    /// If `None`, a seed is drawn from entropy and logged.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Household whose tours are written to the logs.
    #[serde(default)]
    pub trace_hh_id: Option<HouseholdId>,
    /// Categories of the tours scheduled by the step.
    #[serde(default = "default_categories")]
    pub categories: Vec<TourCategory>,
    /// Choice model used with the choice specification.
    #[serde(default)]
    pub choice_model: ChoiceModel<f64>,
    /// If `true`, the windows of two tours of the same agent (person or parent tour) cannot
    /// share a bin.
    #[serde(default)]
    pub sibling_exclusion: bool,
    /// What to do with the choosers without any feasible alternative.
    #[serde(default)]
    pub unschedulable: UnschedulablePolicy,
    /// Settings of the probabilistic scheduler.
    #[serde(default)]
    pub probabilistic: ProbabilisticSettings,
    /// Named constants available in the choice specification.
    #[serde(default)]
    pub constants: BTreeMap<String, f64>,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            input_files: InputFiles::default(),
            output_directory: default_output_directory(),
            step_name: default_step_name(),
            day: DEFAULT_DAY,
            chunk_size: 0,
            random_seed: None,
            trace_hh_id: None,
            categories: default_categories(),
            choice_model: ChoiceModel::default(),
            sibling_exclusion: false,
            unschedulable: UnschedulablePolicy::default(),
            probabilistic: ProbabilisticSettings::default(),
            constants: BTreeMap::new(),
        }
    }
}

impl Parameters {
    /// Returns the random seed, drawing and storing one if it is not set.
    pub fn fix_random_seed(&mut self) -> u64 {
        match self.random_seed {
            Some(seed) => seed,
            None => {
                let seed = thread_rng().gen();
                info!("Using random seed {seed}");
                self.random_seed = Some(seed);
                seed
            }
        }
    }

    /// Returns `true` if the tours of the given household are traced.
    pub fn is_traced(&self, household_id: HouseholdId) -> bool {
        self.trace_hh_id == Some(household_id)
    }
}

/// [Parameters] before validation, for deserialization.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
pub struct UncheckedParameters {
    input_files: InputFiles,
    #[serde(default = "default_output_directory")]
    output_directory: PathBuf,
    #[serde(default = "default_step_name")]
    step_name: String,
    #[serde(default = "default_day")]
    day: Window,
    #[serde(default)]
    chunk_size: usize,
    #[serde(default)]
    random_seed: Option<u64>,
    #[serde(default)]
    trace_hh_id: Option<HouseholdId>,
    #[serde(default = "default_categories")]
    categories: Vec<TourCategory>,
    #[serde(default)]
    choice_model: ChoiceModel<f64>,
    #[serde(default)]
    sibling_exclusion: bool,
    #[serde(default)]
    unschedulable: UnschedulablePolicy,
    #[serde(default)]
    probabilistic: ProbabilisticSettings,
    #[serde(default)]
    constants: BTreeMap<String, f64>,
}

impl TryFrom<UncheckedParameters> for Parameters {
    type Error = anyhow::Error;
    fn try_from(value: UncheckedParameters) -> Result<Self> {
        if !value.day.is_valid() {
            return Err(anyhow!("Invalid day: {}", value.day));
        }
        if value.categories.is_empty() {
            return Err(anyhow!("At least one tour category must be scheduled"));
        }
        if let ChoiceModel::Logit(model) = &value.choice_model {
            model.probabilities(&[0.0])?;
        }
        Ok(Parameters {
            input_files: value.input_files,
            output_directory: value.output_directory,
            step_name: value.step_name,
            day: value.day,
            chunk_size: value.chunk_size,
            random_seed: value.random_seed,
            trace_hh_id: value.trace_hh_id,
            categories: value.categories,
            choice_model: value.choice_model,
            sibling_exclusion: value.sibling_exclusion,
            unschedulable: value.unschedulable,
            probabilistic: value.probabilistic,
            constants: value.constants,
        })
    }
}
