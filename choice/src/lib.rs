// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Discrete choice models between a finite number of alternatives.
//!
//! The models do not own any random-number generator: the uniform draw used to pick an
//! alternative is given by the caller for each choice. This way, the caller can make the draws
//! reproducible per chooser.
mod deterministic_choice;
mod logit;

use std::fmt::Debug;

pub use self::deterministic_choice::DeterministicChoiceModel;
pub use self::logit::LogitModel;

use anyhow::{anyhow, Result};
use num_traits::Float;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Numeric types that can be used as alternative values.
pub trait ChoiceNum: Float + Debug {}

impl<T: Float + Debug> ChoiceNum for T {}

/// A choice model between a finite number of alternatives.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "type", content = "value")]
pub enum ChoiceModel<T> {
    /// Choose the alternative with the largest utility.
    Deterministic(DeterministicChoiceModel<T>),
    /// Choose the alternative using Logit probabilities.
    Logit(LogitModel<T>),
    /// Always choose the first alternative.
    First,
}

impl<T> Default for ChoiceModel<T> {
    fn default() -> Self {
        Self::Deterministic(DeterministicChoiceModel::default())
    }
}

impl<T: ChoiceNum> ChoiceModel<T> {
    /// Returns the index of the chosen alternative and the expected utility of the choice, given
    /// the values of the alternatives and a uniform draw `u` (`0.0 <= u < 1.0`).
    pub fn get_choice(&self, values: &[T], u: f64) -> Result<(usize, T)> {
        if !(0.0..1.0).contains(&u) {
            return Err(anyhow!("Invalid uniform draw: {u}"));
        }
        match self {
            Self::Deterministic(model) => model.get_choice(values, u),
            Self::Logit(model) => model.get_choice(values, u),
            Self::First => values
                .first()
                .map(|&v| (0, v))
                .ok_or_else(|| anyhow!("Cannot compute choice from an empty slice of values")),
        }
    }
}
