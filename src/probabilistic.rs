// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Scheduling by direct sampling from a table of departure / return probabilities.
//!
//! The probability table has one row per combination of the join columns and one column per
//! departure / return pair, coded as `"<departure>_<return>"`.
use anyhow::{anyhow, Result};
use hashbrown::HashMap;
use itertools::Itertools;
use log::warn;
use schemars::JsonSchema;
use serde_derive::{Deserialize, Serialize};

use crate::error::SchedulingError;
use crate::random::RandomStreams;
use crate::tours::{JoinValue, Tour, TourId, Value};
use crate::units::{Bin, Window};

/// Maximum number of failed tour ids written in the warning message.
const MAX_REPORTED_FAILURES: usize = 10;

/// Tolerance on the sum of the probabilities of a row.
const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Returns the combined code of a departure / return pair.
pub fn encode_code(departure: Bin, ret: Bin, depart_alt_base: i32) -> String {
    format!(
        "{}_{}",
        departure.0 + depart_alt_base,
        ret.0 + depart_alt_base
    )
}

/// Returns the departure / return pair of a combined code.
pub fn decode_code(code: &str, depart_alt_base: i32) -> Result<(Bin, Bin), SchedulingError> {
    let (raw_departure, raw_return) = parse_code(code)?;
    Ok((
        Bin(raw_departure - depart_alt_base),
        Bin(raw_return - depart_alt_base),
    ))
}

fn parse_code(code: &str) -> Result<(i32, i32), SchedulingError> {
    let invalid = || SchedulingError::MalformedProbabilityTable(format!("invalid code `{code}`"));
    let (dep, ret) = code.split_once('_').ok_or_else(invalid)?;
    let dep = dep.trim().parse::<i32>().map_err(|_| invalid())?;
    let ret = ret.trim().parse::<i32>().map_err(|_| invalid())?;
    Ok((dep, ret))
}

/// Row of a [ProbabilityTable], before validation.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct ProbabilityRow {
    /// Values of the join columns.
    pub key: Vec<Value>,
    /// Probability of each code.
    pub probabilities: Vec<f64>,
}

/// [ProbabilityTable] before validation, for (de)serialization.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[schemars(title = "Probability table")]
pub struct UncheckedProbabilityTable {
    /// Attributes of the tours used to find their row.
    pub join_columns: Vec<String>,
    /// Combined departure / return codes.
    pub codes: Vec<String>,
    /// Rows of the table.
    pub rows: Vec<ProbabilityRow>,
}

/// Table of probabilities of the departure / return pairs, by combination of the join columns.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(
    try_from = "UncheckedProbabilityTable",
    into = "UncheckedProbabilityTable"
)]
pub struct ProbabilityTable {
    join_columns: Vec<String>,
    codes: Vec<String>,
    /// Undecoded departure / return of each code.
    raw_pairs: Vec<(i32, i32)>,
    rows: Vec<ProbabilityRow>,
    index: HashMap<Vec<JoinValue>, usize>,
}

impl JsonSchema for ProbabilityTable {
    fn schema_name() -> String {
        "ProbabilityTable".to_owned()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        UncheckedProbabilityTable::json_schema(gen)
    }
}

impl TryFrom<UncheckedProbabilityTable> for ProbabilityTable {
    type Error = SchedulingError;

    fn try_from(value: UncheckedProbabilityTable) -> Result<Self, Self::Error> {
        let malformed = SchedulingError::MalformedProbabilityTable;
        let raw_pairs = value
            .codes
            .iter()
            .map(|c| parse_code(c))
            .collect::<Result<Vec<_>, _>>()?;
        if value.codes.is_empty() {
            return Err(malformed("the table has no code".to_owned()));
        }
        let mut index = HashMap::with_capacity(value.rows.len());
        for (i, row) in value.rows.iter().enumerate() {
            if row.key.len() != value.join_columns.len() {
                return Err(malformed(format!(
                    "row {i} has {} key value(s) for {} join column(s)",
                    row.key.len(),
                    value.join_columns.len()
                )));
            }
            if row.probabilities.len() != value.codes.len() {
                return Err(malformed(format!(
                    "row {i} has {} probabilities for {} code(s)",
                    row.probabilities.len(),
                    value.codes.len()
                )));
            }
            if row.probabilities.iter().any(|&p| !(p >= 0.0) || !p.is_finite()) {
                return Err(malformed(format!("row {i} has a negative probability")));
            }
            let sum: f64 = row.probabilities.iter().sum();
            if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
                return Err(malformed(format!(
                    "the probabilities of row {i} sum to {sum}"
                )));
            }
            let key = row
                .key
                .iter()
                .map(|v| v.to_join_value())
                .collect::<Result<Vec<_>>>()
                .map_err(|e| malformed(format!("row {i}: {e}")))?;
            if index.insert(key, i).is_some() {
                return Err(malformed(format!("duplicate key in row {i}")));
            }
        }
        Ok(ProbabilityTable {
            join_columns: value.join_columns,
            codes: value.codes,
            raw_pairs,
            rows: value.rows,
            index,
        })
    }
}

impl From<ProbabilityTable> for UncheckedProbabilityTable {
    fn from(table: ProbabilityTable) -> Self {
        UncheckedProbabilityTable {
            join_columns: table.join_columns,
            codes: table.codes,
            rows: table.rows,
        }
    }
}

impl ProbabilityTable {
    /// Creates a validated table.
    pub fn new(
        join_columns: Vec<String>,
        codes: Vec<String>,
        rows: Vec<ProbabilityRow>,
    ) -> Result<Self, SchedulingError> {
        Self::try_from(UncheckedProbabilityTable {
            join_columns,
            codes,
            rows,
        })
    }

    /// Returns the join columns.
    pub fn join_columns(&self) -> &[String] {
        &self.join_columns
    }

    /// Returns the codes.
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// Returns the departure / return pair of the code at the given position.
    pub fn pair(&self, position: usize, depart_alt_base: i32) -> (Bin, Bin) {
        let (dep, ret) = self.raw_pairs[position];
        (Bin(dep - depart_alt_base), Bin(ret - depart_alt_base))
    }

    /// Returns the probabilities of the row of a tour.
    ///
    /// Returns an error if the tour does not have one of the join columns or if there is no row
    /// for its key.
    pub fn probabilities_for(&self, tour: &Tour) -> Result<&[f64], SchedulingError> {
        let key = self
            .join_columns
            .iter()
            .map(|col| {
                tour.attribute(col)
                    .and_then(|v| v.to_join_value().ok())
                    .ok_or_else(|| SchedulingError::MissingProbabilityRow {
                        tour_id: tour.id,
                        key: format!("<invalid or missing attribute `{col}`>"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.index
            .get(&key)
            .map(|&i| self.rows[i].probabilities.as_slice())
            .ok_or_else(|| SchedulingError::MissingProbabilityRow {
                tour_id: tour.id,
                key: format!("({})", key.iter().join(", ")),
            })
    }
}

/// What to do with the choosers whose draw is infeasible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Clamp the drawn window inside the bounds of the chooser.
    #[default]
    ClipToBounds,
    /// Keep the drawn window, for a later corrective step.
    LeaveInvalid,
}

/// Settings of the probabilistic scheduler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct ProbabilisticSettings {
    /// Offset of the bins in the codes of the table.
    pub depart_alt_base: i32,
    /// If `true`, the departure is pinned to the earliest bound of the chooser.
    pub first_leg: bool,
    /// If `true`, a draw outside the `[earliest, latest]` bounds of the chooser is a failure.
    ///
    /// Subtours are always checked against their bounds.
    pub clip_earliest_latest: bool,
    /// What to do with failed draws.
    pub failure_policy: FailurePolicy,
}

/// Window drawn for a chooser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProbabilisticChoice {
    /// Identifier of the chooser.
    pub tour_id: TourId,
    /// Position of the drawn code in the table.
    pub code_position: usize,
    /// Window assigned to the chooser.
    pub window: Window,
    /// `true` if the drawn window was infeasible.
    pub failed: bool,
}

/// Result of the probabilistic scheduler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbabilisticOutcome {
    /// One choice per chooser, in the order of the choosers.
    pub choices: Vec<ProbabilisticChoice>,
    /// Identifiers of the choosers whose draw failed.
    pub failed: Vec<TourId>,
}

/// Index of the code drawn by inverse CDF at `u`.
fn draw(probabilities: &[f64], u: f64) -> usize {
    let mut cum = 0.0;
    for (i, &p) in probabilities.iter().enumerate() {
        cum += p;
        if u < cum {
            return i;
        }
    }
    // Rounding errors: last code with a positive probability.
    probabilities
        .iter()
        .rposition(|&p| p > 0.0)
        .unwrap_or(probabilities.len() - 1)
}

/// Draws one departure / return pair for each chooser.
///
/// `bounds` gives the `[earliest, latest]` window of each chooser.
///
/// Returns an error if the row of a chooser cannot be found. Failed draws are not errors: they
/// are reported with a warning and listed in the outcome.
pub fn make_scheduling_choices(
    choosers: &[&Tour],
    bounds: &[Window],
    table: &ProbabilityTable,
    settings: &ProbabilisticSettings,
    streams: &RandomStreams,
) -> Result<ProbabilisticOutcome> {
    if choosers.len() != bounds.len() {
        return Err(anyhow!(
            "Got {} bounds for {} chooser(s)",
            bounds.len(),
            choosers.len()
        ));
    }
    let mut outcome = ProbabilisticOutcome::default();
    for (tour, &bound) in choosers.iter().zip(bounds) {
        let probabilities = table.probabilities_for(tour)?;
        let position = draw(probabilities, streams.uniform(tour.id));
        let (mut departure, ret) = table.pair(position, settings.depart_alt_base);
        if settings.first_leg {
            departure = bound.start;
        }
        let drawn = Window {
            start: departure,
            end: ret,
        };
        let check_bounds = settings.clip_earliest_latest || tour.parent_tour_id.is_some();
        let failed = !drawn.is_valid() || (check_bounds && !bound.contains(&drawn));
        let window = if failed {
            outcome.failed.push(tour.id);
            match settings.failure_policy {
                FailurePolicy::ClipToBounds => drawn.clamp_to(&bound),
                FailurePolicy::LeaveInvalid => drawn,
            }
        } else {
            drawn
        };
        outcome.choices.push(ProbabilisticChoice {
            tour_id: tour.id,
            code_position: position,
            window,
            failed,
        });
    }
    Ok(outcome)
}

/// Logs a warning with the number of failed draws among `nb_choosers` draws.
pub fn report_failures(failed: &[TourId], nb_choosers: usize, trace_label: &str) {
    if failed.is_empty() {
        return;
    }
    let share = 100. * failed.len() as f64 / nb_choosers.max(1) as f64;
    warn!(
        "{trace_label}: {} of {nb_choosers} tour(s) ({share:.2}%) got an infeasible departure / \
        return draw, first ones: {:?}",
        failed.len(),
        &failed[..failed.len().min(MAX_REPORTED_FAILURES)]
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tours::TourCategory;

    fn work_table() -> ProbabilityTable {
        ProbabilityTable::new(
            vec!["purpose".to_owned()],
            vec!["8_17".to_owned(), "9_18".to_owned()],
            vec![ProbabilityRow {
                key: vec![Value::Text("work".to_owned())],
                probabilities: vec![0.7, 0.3],
            }],
        )
        .unwrap()
    }

    fn tour(id: TourId, purpose: &str) -> Tour {
        Tour::new(id, id, id, TourCategory::Mandatory, None)
            .with_attribute("purpose", Value::Text(purpose.to_owned()))
    }

    #[test]
    fn code_test() {
        assert_eq!(encode_code(Bin(8), Bin(17), 0), "8_17");
        assert_eq!(encode_code(Bin(3), Bin(12), 5), "8_17");
        assert_eq!(decode_code("8_17", 5).unwrap(), (Bin(3), Bin(12)));
        assert_eq!(decode_code(&encode_code(Bin(-2), Bin(4), 3), 3).unwrap(), (Bin(-2), Bin(4)));
        assert!(decode_code("8-17", 0).is_err());
        assert!(decode_code("8_x", 0).is_err());
    }

    #[test]
    fn table_validation_test() {
        let row = |probabilities: Vec<f64>| ProbabilityRow {
            key: vec![Value::Int(1)],
            probabilities,
        };
        let codes = vec!["8_17".to_owned(), "9_18".to_owned()];
        let cols = vec!["c".to_owned()];
        assert!(ProbabilityTable::new(cols.clone(), codes.clone(), vec![row(vec![0.5, 0.4])]).is_err());
        assert!(ProbabilityTable::new(cols.clone(), codes.clone(), vec![row(vec![1.0])]).is_err());
        assert!(ProbabilityTable::new(cols.clone(), codes.clone(), vec![row(vec![1.2, -0.2])]).is_err());
        assert!(ProbabilityTable::new(
            cols.clone(),
            codes.clone(),
            vec![row(vec![0.5, 0.5]), row(vec![1.0, 0.0])]
        )
        .is_err());
        assert!(ProbabilityTable::new(cols.clone(), vec!["bad".to_owned()], vec![]).is_err());
        assert!(ProbabilityTable::new(cols, codes, vec![row(vec![0.5, 0.5])]).is_ok());
    }

    #[test]
    fn deser_table_test() {
        let js = r#"{
            "join_columns": ["purpose", "income_segment"],
            "codes": ["8_17", "9_18"],
            "rows": [
                {"key": ["work", 1.0], "probabilities": [0.7, 0.3]},
                {"key": ["work", 2], "probabilities": [0.5, 0.5]}
            ]
        }"#;
        let table: ProbabilityTable = serde_json::from_str(js).unwrap();
        let chooser = tour(1, "work").with_attribute("income_segment", Value::Int(1));
        assert_eq!(table.probabilities_for(&chooser).unwrap(), &[0.7, 0.3]);
        let chooser = chooser.with_attribute("income_segment", Value::Int(3));
        assert!(matches!(
            table.probabilities_for(&chooser),
            Err(SchedulingError::MissingProbabilityRow { tour_id: 1, .. })
        ));
    }

    #[test]
    fn frequency_test() {
        let table = work_table();
        let tours: Vec<Tour> = (0..1000).map(|i| tour(i, "work")).collect();
        let choosers: Vec<&Tour> = tours.iter().collect();
        let bounds = vec![Window::new(5, 23); choosers.len()];
        let streams = RandomStreams::new(7, "tour_scheduling_probabilistic");
        let outcome = make_scheduling_choices(
            &choosers,
            &bounds,
            &table,
            &ProbabilisticSettings::default(),
            &streams,
        )
        .unwrap();
        assert!(outcome.failed.is_empty());
        let nb_first = outcome
            .choices
            .iter()
            .filter(|c| c.window == Window::new(8, 17))
            .count();
        assert_eq!(
            outcome
                .choices
                .iter()
                .filter(|c| c.window == Window::new(9, 18))
                .count(),
            1000 - nb_first
        );
        assert!((620..=780).contains(&nb_first), "{nb_first}");
    }

    #[test]
    fn all_failed_test() {
        let table = ProbabilityTable::new(
            vec!["purpose".to_owned()],
            vec!["17_8".to_owned(), "18_9".to_owned()],
            vec![ProbabilityRow {
                key: vec![Value::Text("work".to_owned())],
                probabilities: vec![0.5, 0.5],
            }],
        )
        .unwrap();
        let tours: Vec<Tour> = (0..20).map(|i| tour(i, "work")).collect();
        let choosers: Vec<&Tour> = tours.iter().collect();
        let bounds = vec![Window::new(5, 23); choosers.len()];
        let streams = RandomStreams::new(7, "test");
        let mut settings = ProbabilisticSettings::default();
        let outcome = make_scheduling_choices(&choosers, &bounds, &table, &settings, &streams).unwrap();
        assert_eq!(outcome.failed.len(), 20);
        // Clipped windows are valid.
        assert!(outcome.choices.iter().all(|c| c.failed && c.window.is_valid()));
        settings.failure_policy = FailurePolicy::LeaveInvalid;
        let outcome = make_scheduling_choices(&choosers, &bounds, &table, &settings, &streams).unwrap();
        assert_eq!(outcome.failed.len(), 20);
        assert!(outcome.choices.iter().all(|c| !c.window.is_valid()));
    }

    #[test]
    fn bounds_test() {
        let table = work_table();
        let tours = vec![
            tour(1, "work"),
            Tour::new(2, 2, 2, TourCategory::Atwork, Some(10))
                .with_attribute("purpose", Value::Text("work".to_owned())),
        ];
        let choosers: Vec<&Tour> = tours.iter().collect();
        let bounds = vec![Window::new(10, 12), Window::new(10, 12)];
        let streams = RandomStreams::new(7, "test");
        let mut settings = ProbabilisticSettings::default();
        let outcome = make_scheduling_choices(&choosers, &bounds, &table, &settings, &streams).unwrap();
        // Top-level tours are not clipped unless asked, subtours always are.
        assert_eq!(outcome.failed, vec![2]);
        assert_eq!(outcome.choices[1].window, Window::new(10, 12));
        settings.clip_earliest_latest = true;
        settings.first_leg = true;
        let outcome = make_scheduling_choices(&choosers, &bounds, &table, &settings, &streams).unwrap();
        assert_eq!(outcome.failed, vec![1, 2]);
        assert!(outcome.choices.iter().all(|c| c.window == Window::new(10, 12)));
    }
}
