// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Evaluation of the utilities and choice of one alternative per chooser.
use anyhow::{anyhow, Context, Result};
use choice::ChoiceModel;
use log::debug;
use serde_derive::Serialize;

use crate::alternative_set::InteractionDataset;
use crate::alternatives::TddAlternatives;
use crate::error::SchedulingError;
use crate::random::RandomStreams;
use crate::tours::{Tour, TourId};
use crate::units::Window;
use crate::utility_spec::{ChooserColumns, CompiledSpec};

/// Alternative chosen by a chooser of an interaction choice.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct InteractionChoice {
    /// Identifier of the chooser.
    pub tour_id: TourId,
    /// Code of the chosen time-window alternative.
    pub code: usize,
    /// Expected utility of the choice.
    pub utility: f64,
}

/// Alternative chosen by a chooser of a simple choice.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimpleChoice {
    /// Identifier of the chooser.
    pub tour_id: TourId,
    /// Label of the chosen alternative.
    pub label: String,
    /// Expected utility of the choice.
    pub utility: f64,
}

/// Sums `coefficient * value` over the terms, for every row.
fn linear_utilities(spec: &CompiledSpec, column: usize, variables: &[Vec<f64>], nb_rows: usize) -> Vec<f64> {
    let mut utilities = vec![0.0; nb_rows];
    for (t, values) in variables.iter().enumerate() {
        let coef = spec.coefficient(t, column);
        if coef == 0.0 {
            continue;
        }
        for (u, v) in utilities.iter_mut().zip(values) {
            *u += coef * v;
        }
    }
    utilities
}

fn check_finite(values: &[f64], tour_id: TourId) -> Result<()> {
    if let Some(v) = values.iter().find(|v| !v.is_finite()) {
        return Err(SchedulingError::SpecEvaluation(format!(
            "non-finite utility {v} for tour {tour_id}"
        ))
        .into());
    }
    Ok(())
}

/// Chooses one time-window alternative for each chooser of an interaction dataset.
///
/// The utility of a row is the sum of the coefficients times the values of the terms at this
/// row. The choice of each chooser uses the uniform draw of its own random stream.
///
/// `choosers` is the slice the dataset was built from.
///
/// Returns an error if the choice spec does not have exactly one column or if a utility is
/// not finite.
pub fn interaction_simulate(
    choosers: &[&Tour],
    dataset: &InteractionDataset,
    alternatives: &TddAlternatives,
    spec: &CompiledSpec,
    model: &ChoiceModel<f64>,
    streams: &RandomStreams,
) -> Result<Vec<InteractionChoice>> {
    if spec.columns().len() != 1 {
        return Err(SchedulingError::SpecEvaluation(format!(
            "an interaction specification must have exactly one column, found {}",
            spec.columns().len()
        ))
        .into());
    }
    if dataset.nb_choosers() == 0 {
        return Ok(Vec::new());
    }
    let dataset_choosers: Vec<&Tour> = (0..dataset.nb_choosers())
        .map(|i| choosers[dataset.chooser_position(i)])
        .collect();
    let columns = ChooserColumns::gather(spec.registry(), &dataset_choosers)?;
    debug!(
        "Evaluating {} term(s) over {} row(s) for {} chooser(s)",
        spec.nb_terms(),
        dataset.nb_rows(),
        dataset.nb_choosers()
    );
    let variables = spec.eval_interaction_variables(dataset, alternatives, &columns);
    let utilities = linear_utilities(spec, 0, &variables, dataset.nb_rows());
    (0..dataset.nb_choosers())
        .map(|i| {
            let tour_id = dataset.chooser_id(i);
            let rows = dataset.rows(i);
            let values = &utilities[rows.clone()];
            check_finite(values, tour_id)?;
            let (j, utility) = model
                .get_choice(values, streams.uniform(tour_id))
                .with_context(|| format!("Failed to choose an alternative for tour {tour_id}"))?;
            let code = alternatives.at(dataset.alternative(rows.start + j)).code;
            Ok(InteractionChoice {
                tour_id,
                code,
                utility,
            })
        })
        .collect()
}

/// Chooses one of a fixed set of labelled alternatives for each chooser.
///
/// The specification must have one column per alternative, with the same labels in the same
/// order.
pub fn simple_simulate(
    choosers: &[&Tour],
    spec: &CompiledSpec,
    labels: &[String],
    model: &ChoiceModel<f64>,
    streams: &RandomStreams,
) -> Result<Vec<SimpleChoice>> {
    if spec.columns() != labels {
        return Err(SchedulingError::SpecEvaluation(format!(
            "the columns of the choice spec {:?} do not match the alternatives {:?}",
            spec.columns(),
            labels
        ))
        .into());
    }
    let variables = eval_variables(choosers, spec, Window::default())?;
    let utilities: Vec<Vec<f64>> = (0..labels.len())
        .map(|c| linear_utilities(spec, c, &variables, choosers.len()))
        .collect();
    choosers
        .iter()
        .enumerate()
        .map(|(i, tour)| {
            let values: Vec<f64> = utilities.iter().map(|col| col[i]).collect();
            check_finite(&values, tour.id)?;
            let (j, utility) = model
                .get_choice(&values, streams.uniform(tour.id))
                .with_context(|| format!("Failed to choose an alternative for tour {}", tour.id))?;
            let label = labels
                .get(j)
                .ok_or_else(|| anyhow!("Invalid choice index {j}"))?
                .clone();
            Ok(SimpleChoice {
                tour_id: tour.id,
                label,
                utility,
            })
        })
        .collect()
}

/// Returns the values of the terms of the choice spec for each chooser (indexed by term,
/// then by chooser).
///
/// Alternative fields evaluate to NaN and containment fields to the given window.
pub fn eval_variables(choosers: &[&Tour], spec: &CompiledSpec, bound: Window) -> Result<Vec<Vec<f64>>> {
    let columns = ChooserColumns::gather(spec.registry(), choosers)?;
    Ok(spec.eval_variables(choosers.len(), &columns, bound))
}
