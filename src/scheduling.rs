// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! The scheduling step: selects the choosers in the tours table, chooses a time window for each
//! of them and writes the windows back into the table.
//!
//! Choosers whose parent tour is scheduled by the same step are processed after all the other
//! choosers, so that the window of their parent is known. Inside a level, the choosers are
//! processed chunk by chunk, in the order of the tours table. When sibling exclusion is enabled,
//! the choosers of a chunk are processed in rounds by sibling rank: a chooser sees the
//! reservations of all its siblings coming before it in the table, whatever the chunking.
use std::borrow::Cow;
use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use choice::ChoiceModel;
use hashbrown::{HashMap, HashSet};
use log::{debug, info, log_enabled, warn, Level};
use rand::prelude::*;
use serde_derive::Serialize;

use crate::alternative_set::{containment_window, AlternativeSetBuilder};
use crate::alternatives::TddAlternatives;
use crate::chunk::{interaction_row_size, probabilistic_row_size, AdaptiveChunker};
use crate::error::SchedulingError;
use crate::interaction::interaction_simulate;
use crate::parameters::{Parameters, UnschedulablePolicy};
use crate::pipeline::{Pipeline, TOURS};
use crate::probabilistic::{
    make_scheduling_choices, report_failures, FailurePolicy, ProbabilisticSettings,
    ProbabilityTable,
};
use crate::progress_bar::ChunkProgressBar;
use crate::random::RandomStreams;
use crate::timetable::{AgentKey, Timetable};
use crate::tours::{Tour, TourId, TourSchedule};
use crate::units::Window;
use crate::utility_spec::{ChoiceSpec, CompiledSpec, FieldRegistry};

/// Maximum number of tour ids written in the warning messages.
const MAX_REPORTED_TOURS: usize = 10;

/// Inputs of a scheduling step, besides the tours and the parameters.
#[derive(Clone, Debug, Default)]
pub struct SchedulingModel {
    /// Time-window alternatives (every window of the day if `None`).
    pub alternatives: Option<TddAlternatives>,
    /// Choice specification of the interaction choice.
    pub spec: Option<ChoiceSpec>,
    /// Probability table, used when there is no choice specification.
    pub probabilities: Option<ProbabilityTable>,
}

impl SchedulingModel {
    /// Creates a model using an interaction choice.
    pub fn interaction(alternatives: Option<TddAlternatives>, spec: ChoiceSpec) -> Self {
        SchedulingModel {
            alternatives,
            spec: Some(spec),
            probabilities: None,
        }
    }

    /// Creates a model using the probability table.
    pub fn probabilistic(table: ProbabilityTable) -> Self {
        SchedulingModel {
            alternatives: None,
            spec: None,
            probabilities: Some(table),
        }
    }
}

/// Reserved windows of an agent at the end of a step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TourMapEntry {
    /// Agent of the timetable record.
    pub agent: AgentKey,
    /// Reserved windows, sorted by start bin.
    pub windows: Vec<Window>,
    /// Occupancy of the bins of the day (`X` for occupied).
    pub bins: String,
}

/// Summary of a scheduling step.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StepOutcome {
    /// Number of tours selected as choosers.
    pub nb_choosers: usize,
    /// Window assigned to each scheduled chooser.
    pub schedules: Vec<TourSchedule>,
    /// Choosers left unscheduled because they had no feasible alternative.
    pub infeasible: Vec<TourId>,
    /// Choosers whose probabilistic draw was infeasible.
    pub failed_draws: Vec<TourId>,
    /// Timetable of each agent at the end of the step.
    pub tour_map: Vec<TourMapEntry>,
}

/// Method used to choose the windows.
enum Evaluator<'a> {
    Interaction {
        alternatives: Cow<'a, TddAlternatives>,
        spec: CompiledSpec,
        model: &'a ChoiceModel<f64>,
    },
    Probabilistic {
        table: &'a ProbabilityTable,
        settings: &'a ProbabilisticSettings,
    },
}

impl<'a> Evaluator<'a> {
    fn new(model: &'a SchedulingModel, choosers: &[&Tour], parameters: &'a Parameters) -> Result<Self> {
        if let Some(spec) = &model.spec {
            let alternatives = match &model.alternatives {
                Some(alts) => Cow::Borrowed(alts),
                None => Cow::Owned(TddAlternatives::from_day(parameters.day)?),
            };
            let registry = FieldRegistry::for_interaction(choosers);
            let spec = CompiledSpec::compile(spec, registry, &parameters.constants)
                .context("Failed to compile the choice specification")?;
            Ok(Evaluator::Interaction {
                alternatives,
                spec,
                model: &parameters.choice_model,
            })
        } else if let Some(table) = &model.probabilities {
            Ok(Evaluator::Probabilistic {
                table,
                settings: &parameters.probabilistic,
            })
        } else {
            Err(anyhow!(
                "Step `{}` needs either a choice specification or a probability table",
                parameters.step_name
            ))
        }
    }

    /// Estimated bytes per chooser.
    fn row_size(&self) -> usize {
        match self {
            Self::Interaction {
                alternatives, spec, ..
            } => interaction_row_size(alternatives.len(), spec.nb_terms()),
            Self::Probabilistic { table, .. } => {
                probabilistic_row_size(table.codes().len(), table.join_columns().len())
            }
        }
    }

    /// Logs the terms of the choice spec and their coefficient.
    fn trace_terms(&self, label: &str) {
        if let Self::Interaction { spec, .. } = self {
            for (term, description) in spec.descriptions().iter().enumerate() {
                debug!(
                    "{label}: trace term `{description}` with coefficient {}",
                    spec.coefficient(term, 0)
                );
            }
        }
    }

    /// Schedules a group of choosers, whose containment windows are all known.
    ///
    /// Returns the number of bytes used, as estimated from the number of rows evaluated.
    fn schedule(
        &self,
        choosers: &[&Tour],
        parameters: &Parameters,
        streams: &RandomStreams,
        state: &mut StepState,
    ) -> Result<usize> {
        match self {
            Self::Interaction {
                alternatives,
                spec,
                model,
            } => {
                let sets =
                    AlternativeSetBuilder::new(alternatives, &state.timetable, state.exclusion)
                        .build(choosers)?;
                state.infeasible.extend(sets.infeasible);
                let choices = interaction_simulate(
                    choosers,
                    &sets.dataset,
                    alternatives,
                    spec,
                    model,
                    streams,
                )?;
                for (i, choice) in choices.into_iter().enumerate() {
                    let tour = choosers[sets.dataset.chooser_position(i)];
                    let window = alternatives
                        .get(choice.code)
                        .ok_or_else(|| anyhow!("Unknown alternative code {}", choice.code))?
                        .window();
                    if parameters.is_traced(tour.household_id) {
                        debug!(
                            "{}: trace tour {}: chose alternative {} {window} among {} with \
                            utility {:.4}",
                            parameters.step_name,
                            tour.id,
                            choice.code,
                            sets.dataset.rows(i).len(),
                            choice.utility,
                        );
                    }
                    state.record(tour, Some(choice.code), window, state.exclusion)?;
                }
                Ok(sets.dataset.nb_rows() * interaction_row_size(1, spec.nb_terms()))
            }
            Self::Probabilistic { table, settings } => {
                let bounds = choosers
                    .iter()
                    .map(|tour| {
                        let bound = containment_window(tour, &state.timetable)?;
                        Ok(Window {
                            start: tour.earliest.unwrap_or(bound.start),
                            end: tour.latest.unwrap_or(bound.end),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let outcome = make_scheduling_choices(choosers, &bounds, table, settings, streams)?;
                for ((tour, choice), bound) in choosers.iter().zip(outcome.choices).zip(bounds) {
                    let mut failed = choice.failed;
                    let mut window = choice.window;
                    let in_day = window.is_valid() && state.timetable.day().contains(&window);
                    let agent = tour.agent_key();
                    if state.exclusion && in_day && !state.timetable.is_available(agent, window) {
                        // Overlaps an earlier sibling.
                        failed = true;
                        let free = match settings.failure_policy {
                            FailurePolicy::ClipToBounds => {
                                state.timetable.closest_free_window(agent, bound, window)
                            }
                            FailurePolicy::LeaveInvalid => None,
                        };
                        match free {
                            Some(free) => window = free,
                            None => {
                                state.failed.push(tour.id);
                                state.infeasible.push(tour.id);
                                continue;
                            }
                        }
                    }
                    if failed {
                        state.failed.push(tour.id);
                    }
                    let reserve = state.exclusion
                        && window.is_valid()
                        && state.timetable.day().contains(&window);
                    state.record(tour, None, window, reserve)?;
                }
                Ok(choosers.len() * self.row_size())
            }
        }
    }
}

/// Mutable state of a step.
struct StepState {
    timetable: Timetable,
    exclusion: bool,
    schedules: Vec<TourSchedule>,
    infeasible: Vec<TourId>,
    failed: Vec<TourId>,
}

impl StepState {
    /// Sorts the results in the order of the choosers in the tours table.
    fn sort_by_position(&mut self, positions: &HashMap<TourId, usize>) {
        self.schedules.sort_by_key(|s| positions[&s.tour_id]);
        self.infeasible.sort_by_key(|id| positions[id]);
        self.failed.sort_by_key(|id| positions[id]);
    }

    fn record(&mut self, tour: &Tour, tdd: Option<usize>, window: Window, reserve: bool) -> Result<()> {
        self.schedules.push(TourSchedule {
            tour_id: tour.id,
            tdd,
            window,
        });
        if window.is_valid() && self.timetable.day().contains(&window) {
            self.timetable.register_window(tour.id, window)?;
        }
        if reserve {
            self.timetable
                .reserve(tour.agent_key(), window)
                .with_context(|| format!("Failed to reserve the window of tour {}", tour.id))?;
        }
        Ok(())
    }
}

/// Returns an error if the parent of a chooser is neither a scheduled tour nor a chooser.
fn check_parents(
    choosers: &[&Tour],
    chooser_ids: &HashSet<TourId>,
    timetable: &Timetable,
) -> Result<()> {
    for tour in choosers {
        if let Some(parent) = tour.parent_tour_id {
            if !chooser_ids.contains(&parent) {
                containment_window(tour, timetable)?;
            }
        }
    }
    Ok(())
}

/// Returns the rank of each chooser among the choosers with the same [AgentKey].
fn sibling_ranks(choosers: &[&Tour]) -> HashMap<TourId, usize> {
    let mut counts: HashMap<AgentKey, usize> = HashMap::new();
    choosers
        .iter()
        .map(|tour| {
            let count = counts.entry(tour.agent_key()).or_default();
            let rank = *count;
            *count += 1;
            (tour.id, rank)
        })
        .collect()
}

/// Splits a chunk in groups of choosers with the same sibling rank, by increasing rank.
fn sibling_rounds<'a>(chunk: &[&'a Tour], ranks: &HashMap<TourId, usize>) -> Vec<Vec<&'a Tour>> {
    let mut rounds: BTreeMap<usize, Vec<&'a Tour>> = BTreeMap::new();
    for &tour in chunk {
        rounds.entry(ranks[&tour.id]).or_default().push(tour);
    }
    rounds.into_values().collect()
}

fn first_ids(ids: &[TourId]) -> &[TourId] {
    &ids[..ids.len().min(MAX_REPORTED_TOURS)]
}

/// Schedules the choosers of one level.
fn run_level(
    choosers: &[&Tour],
    evaluator: &Evaluator,
    parameters: &Parameters,
    streams: &RandomStreams,
    state: &mut StepState,
    bp: &ChunkProgressBar,
) -> Result<()> {
    let ranks = sibling_ranks(choosers);
    let mut chunker = AdaptiveChunker::new(choosers.len(), parameters.chunk_size, evaluator.row_size());
    let mut chunk_index = 0;
    while let Some(range) = chunker.next_chunk() {
        let chunk = &choosers[range.clone()];
        // Subtours of a parent that could not be scheduled.
        let (chunk, orphans): (Vec<&Tour>, Vec<&Tour>) = chunk.iter().copied().partition(|tour| {
            tour.parent_tour_id
                .map_or(true, |p| state.timetable.window_for(p).is_ok())
        });
        if !orphans.is_empty() {
            warn!(
                "{}: {} tour(s) cannot be scheduled because their parent tour is unscheduled",
                parameters.step_name,
                orphans.len()
            );
            state.infeasible.extend(orphans.iter().map(|t| t.id));
        }
        let rounds = if parameters.sibling_exclusion {
            sibling_rounds(&chunk, &ranks)
        } else {
            vec![chunk]
        };
        let mut bytes = 0;
        for round in rounds {
            bytes += evaluator
                .schedule(&round, parameters, streams, state)
                .with_context(|| {
                    format!("Failed to schedule chunk {chunk_index} of {}", parameters.step_name)
                })?;
        }
        chunker.observe(range.len(), bytes);
        bp.inc(range.len());
        chunk_index += 1;
    }
    Ok(())
}

/// Runs a scheduling step on the `tours` table of the pipeline.
///
/// The tours of the categories given in the parameters are the choosers. Their windows are
/// chosen with the interaction choice if the model has a choice specification, with the
/// probability table otherwise. The `tours` table is replaced by the updated table.
///
/// Returns an error (and leaves the pipeline untouched) if:
///
/// - The parent tour of a chooser is unknown.
/// - The choice specification refers to unknown fields or constants.
/// - The probability table has no row for a chooser.
/// - A chooser has no feasible alternative and the unschedulable policy is `abort`.
/// - A chooser is left without a complete schedule.
pub fn run_scheduling_step(
    pipeline: &mut Pipeline,
    model: &SchedulingModel,
    parameters: &Parameters,
) -> Result<StepOutcome> {
    let label = parameters.step_name.as_str();
    let tours = pipeline
        .get_table(TOURS)
        .with_context(|| format!("Failed to read the tours of step `{label}`"))?;
    let choosers = tours.select_categories(&parameters.categories);
    if choosers.is_empty() {
        info!("{label}: no tours to schedule, no results");
        return Ok(StepOutcome::default());
    }
    info!("{label}: scheduling {} tour(s)", choosers.len());
    let chooser_ids: HashSet<TourId> = choosers.iter().map(|t| t.id).collect();
    let timetable = Timetable::build(
        parameters.day,
        tours.iter().filter(|t| !chooser_ids.contains(&t.id)),
    )
    .context("Failed to build the timetable of the scheduled tours")?;
    check_parents(&choosers, &chooser_ids, &timetable)
        .with_context(|| format!("Invalid choosers for step `{label}`"))?;
    let (top, nested): (Vec<&Tour>, Vec<&Tour>) = choosers.iter().copied().partition(|tour| {
        tour.parent_tour_id
            .map_or(true, |p| !chooser_ids.contains(&p))
    });

    let seed = match parameters.random_seed {
        Some(seed) => seed,
        None => {
            let seed = thread_rng().gen();
            info!("{label}: using random seed {seed}");
            seed
        }
    };
    let streams = RandomStreams::new(seed, label);
    let evaluator = Evaluator::new(model, &choosers, parameters)?;
    if parameters.trace_hh_id.is_some() {
        evaluator.trace_terms(label);
    }

    let mut state = StepState {
        timetable,
        exclusion: parameters.sibling_exclusion,
        schedules: Vec::with_capacity(choosers.len()),
        infeasible: Vec::new(),
        failed: Vec::new(),
    };
    let bp = ChunkProgressBar::new(choosers.len()).with_message(label.to_owned());
    for level in [top, nested] {
        if !level.is_empty() {
            run_level(&level, &evaluator, parameters, &streams, &mut state, &bp)?;
        }
    }
    bp.finish();
    let positions: HashMap<TourId, usize> =
        choosers.iter().enumerate().map(|(i, t)| (t.id, i)).collect();
    state.sort_by_position(&positions);

    if !state.infeasible.is_empty() {
        warn!(
            "{label}: {} tour(s) without any feasible time window, first ones: {:?}",
            state.infeasible.len(),
            first_ids(&state.infeasible)
        );
        if parameters.unschedulable == UnschedulablePolicy::Abort {
            return Err(SchedulingError::IncompleteSchedule {
                step: label.to_owned(),
                tours: state.infeasible,
            })
            .context("Some tours have no feasible time window");
        }
    }
    report_failures(&state.failed, choosers.len(), label);

    let mut table = tours.clone();
    table.assign_in_place(&state.schedules)?;
    let excluded: HashSet<TourId> = state.infeasible.iter().copied().collect();
    let incomplete: Vec<TourId> = choosers
        .iter()
        .map(|t| t.id)
        .filter(|id| !excluded.contains(id))
        .filter(|id| table.get(*id).map_or(true, |t| !t.has_complete_schedule()))
        .collect();
    if !incomplete.is_empty() {
        return Err(SchedulingError::IncompleteSchedule {
            step: label.to_owned(),
            tours: incomplete,
        }
        .into());
    }

    if parameters.trace_hh_id.is_some() {
        for tour in table.iter().filter(|t| parameters.is_traced(t.household_id)) {
            debug!(
                "{label}: trace tour {} (person {}, {:?}): tdd {:?}, start {:?}, end {:?}, \
                duration {:?}",
                tour.id,
                tour.person_id,
                tour.category,
                tour.tdd,
                tour.start.map(|b| b.0),
                tour.end.map(|b| b.0),
                tour.duration.map(|b| b.0),
            );
        }
    }
    let tour_map: Vec<TourMapEntry> = state
        .timetable
        .tour_map()
        .into_iter()
        .map(|(agent, windows)| TourMapEntry {
            agent,
            windows,
            bins: state.timetable.render(agent),
        })
        .collect();
    if log_enabled!(Level::Debug) {
        for entry in &tour_map {
            debug!("{label}: {:>14} {}", entry.agent.to_string(), entry.bins);
        }
    }

    let outcome = StepOutcome {
        nb_choosers: choosers.len(),
        schedules: state.schedules,
        infeasible: state.infeasible,
        failed_draws: state.failed,
        tour_map,
    };
    pipeline.replace_table(TOURS, table);
    info!(
        "{label}: scheduled {} of {} tour(s)",
        outcome.schedules.len(),
        outcome.nb_choosers
    );
    Ok(outcome)
}

/// Schedules every tour of the categories given in the parameters (top-level tours included)
/// by sampling the probability table.
pub fn run_tour_scheduling_probabilistic(
    pipeline: &mut Pipeline,
    table: ProbabilityTable,
    parameters: &Parameters,
) -> Result<StepOutcome> {
    run_scheduling_step(pipeline, &SchedulingModel::probabilistic(table), parameters)
}
