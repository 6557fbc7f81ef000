// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

use std::cmp::Ordering;

use anyhow::{anyhow, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ChoiceNum;

/// A deterministic choice model between a finite number of alternatives.
///
/// The chosen alternative is the one with the largest value.
/// In case of tie, the uniform draw given to [DeterministicChoiceModel::get_choice] selects one
/// of the alternatives with the largest value.
///
/// # Example
///
/// ```
/// use choice::DeterministicChoiceModel;
/// let model = DeterministicChoiceModel::<f64>::default();
/// assert_eq!(model.get_choice(&[0., 1.], 0.0).unwrap(), (1, 1.));
/// assert_eq!(model.get_choice(&[0., 0., -1.], 0.0).unwrap(), (0, 0.));
/// ```
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[schemars(title = "Deterministic choice model")]
#[schemars(description = "Choose the alternative with the largest value.")]
pub struct DeterministicChoiceModel<T> {
    /// Constants added to the value of each alternative.
    ///
    /// The number of constants does not have to match the number of alternatives. If there are
    /// less constants than alternatives, then the constants are cycled over.
    ///
    /// If `None`, no constant is added to the alternatives' value.
    #[serde(default = "default_is_none::<T>")]
    constants: Option<Vec<T>>,
}

fn default_is_none<T>() -> Option<Vec<T>> {
    None
}

impl<T> Default for DeterministicChoiceModel<T> {
    fn default() -> Self {
        DeterministicChoiceModel { constants: None }
    }
}

impl<T: ChoiceNum> DeterministicChoiceModel<T> {
    /// Initializes a new deterministic choice model with constants.
    pub fn new_with_constants(constants: Vec<T>) -> Self {
        DeterministicChoiceModel {
            constants: Some(constants),
        }
    }

    fn iter_values<'a>(&'a self, values: &'a [T]) -> Box<dyn Iterator<Item = T> + 'a> {
        if let Some(csts) = &self.constants {
            Box::new(values.iter().zip(csts.iter().cycle()).map(|(&v, &c)| v + c))
        } else {
            Box::new(values.iter().copied())
        }
    }

    /// Returns the id of the chosen alternative and its payoff, given a vector of payoffs and a
    /// uniform draw used to break ties.
    ///
    /// Returns an error if
    ///
    /// - The vector of payoffs is empty.
    ///
    /// - The payoffs cannot be compared.
    pub fn get_choice(&self, values: &[T], u: f64) -> Result<(usize, T)> {
        if values.is_empty() {
            return Err(anyhow!(
                "Cannot compute choice from an empty slice of values"
            ));
        }
        // Find the maximum value and the indices where the value is maximal.
        let mut max_indices = Vec::new();
        let mut max_value = T::neg_infinity();
        for (i, value) in self.iter_values(values).enumerate() {
            match value.partial_cmp(&max_value) {
                Some(Ordering::Greater) => {
                    max_value = value;
                    max_indices = vec![i];
                }
                Some(Ordering::Equal) => {
                    max_indices.push(i);
                }
                None => {
                    return Err(anyhow!("Cannot compare {:?} and {:?}", value, max_value));
                }
                _ => {}
            }
        }
        // If there are n alternatives with the maximum value, we choose the i-th one if:
        // (i / n) <= u < ((i+1) / n)   =>   i <= u * n < i+1
        // so i is equal to the integer part of u * n.
        let i = (u * max_indices.len() as f64) as usize;
        let choice_id = max_indices[i.min(max_indices.len() - 1)];
        Ok((choice_id, max_value))
    }
}
