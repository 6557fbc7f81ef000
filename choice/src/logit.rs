// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

use anyhow::{anyhow, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ChoiceNum;

const EULER_MASCHERONI: f64 = 0.5772156649;

/// Return Euler's constant in the desired type.
fn euler_mascheroni<V: ChoiceNum>() -> Result<V> {
    V::from(EULER_MASCHERONI)
        .ok_or_else(|| anyhow!("Cannot convert {:?} to Float", EULER_MASCHERONI))
}

/// A discrete Logit model.
///
/// The alternative is drawn by inversion sampling of the Logit probabilities, which is
/// equivalent in distribution to choosing the alternative with the largest Gumbel-perturbed
/// value.
///
/// The expected payoff of the choice is computed using the Log-sum formula.
///
/// # Example
///
/// ```
/// use choice::LogitModel;
///
/// let model = LogitModel::new(1.0f64);
///
/// let (choice_id, exp_payoff) = model.get_choice(&[0.], 0.8).unwrap();
/// assert_eq!(choice_id, 0);
/// // The expected payoff is equal to the Euler's constant.
/// assert!((exp_payoff - 0.5772156649).abs() < 1e-8);
///
/// // The probabilities are `[e / (1 + e), 1 / (1 + e)]`, i.e., around 0.73 and 0.27.
/// // With `u = 0.8`, the second alternative is chosen.
/// let (choice_id, _exp_payoff) = model.get_choice(&[1., 0.], 0.8).unwrap();
/// assert_eq!(choice_id, 1);
/// ```
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[schemars(title = "Logit model")]
pub struct LogitModel<T> {
    /// Variance of the error terms, must be positive.
    mu: T,
}

impl<T: ChoiceNum> LogitModel<T> {
    /// Initializes a Logit model.
    ///
    /// The value of `mu` must be such that `mu > 0`.
    pub fn new(mu: T) -> Self {
        LogitModel { mu }
    }

    /// Returns the Logit probabilities of the alternatives.
    ///
    /// Returns an error if the slice is empty or if it contains non-finite values.
    pub fn probabilities(&self, values: &[T]) -> Result<Vec<T>> {
        let (exp_values, sigma, _) = self.exp_values(values)?;
        Ok(exp_values.into_iter().map(|v| v / sigma).collect())
    }

    /// Returns the exponentiated values (shifted by the maximum value), their sum and the
    /// maximum value.
    fn exp_values(&self, values: &[T]) -> Result<(Vec<T>, T, T)> {
        if values.is_empty() {
            return Err(anyhow!(
                "Cannot compute choice from an empty slice of values"
            ));
        }
        if values.iter().any(|&v| !v.is_finite()) {
            return Err(anyhow!("Found a non-finite payoff: {:?}", values));
        }
        if !(self.mu > T::zero()) {
            return Err(anyhow!("The value of mu must be positive, got {:?}", self.mu));
        }
        // The maximum value is guaranteed to be finite because (i) all values are finite and (ii)
        // there is at least one value.
        let max_value = values.iter().fold(T::neg_infinity(), |m, &v| m.max(v));
        // Decrease the value of all alternatives by the maximum value to prevent overflow.
        // (v - max_value) is non-positive and mu is positive so the `exp` cannot overflow.
        // All exp_values are between 0.0 and 1.0.
        let exp_values: Vec<T> = values
            .iter()
            .map(|&v| ((v - max_value) / self.mu).exp())
            .collect();
        // Sigma is between 1.0 and values.len() because, for i such that v_i = max_value,
        // exp_value_i is equal to 1.0.
        let sigma = exp_values.iter().fold(T::zero(), |sum, &v| sum + v);
        Ok((exp_values, sigma, max_value))
    }

    /// Returns the alternative chosen and the expected payoff of the choice given a slice of
    /// values for a finite number of alternatives and a uniform draw `u`.
    ///
    /// The expected payoff is computed using the log-sum formula.
    ///
    /// Returns an Error if
    ///
    /// - The vector of values is empty.
    ///
    /// - Invalid values where found (e.g., NAN or infinity).
    ///
    /// - Euler's constant is not a valid value for the Float type.
    pub fn get_choice(&self, values: &[T], u: f64) -> Result<(usize, T)> {
        let (exp_values, sigma, max_value) = self.exp_values(values)?;
        let u = T::from(u).ok_or_else(|| anyhow!("Cannot convert {u} to Float"))?;
        // Compute the cumulative logit probabilities and find the index of the alternative chosen
        // using the inverse sampling theorem.
        // Rounding errors can make the last cumulative probability slightly smaller than `u`, in
        // which case the last alternative is chosen.
        let choice_id = exp_values
            .iter()
            .scan(T::zero(), |sum, &exp_v| {
                *sum = *sum + exp_v / sigma;
                Some(*sum)
            })
            .position(|cum_prob| u < cum_prob)
            .unwrap_or(values.len() - 1);
        // Do not forget to add back the maximum value that was substracted.
        let expected_value = max_value + self.mu * (sigma.ln() + euler_mascheroni()?);
        Ok((choice_id, expected_value))
    }
}
