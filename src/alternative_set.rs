// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Construction of the feasible time-window alternatives of each chooser.
use std::ops::Range;

use anyhow::{Context, Result};

use crate::alternatives::TddAlternatives;
use crate::timetable::Timetable;
use crate::tours::{Tour, TourId};
use crate::units::Window;

/// Returns the window a tour must be scheduled in: the window of its parent tour for subtours,
/// the day otherwise.
pub fn containment_window(tour: &Tour, timetable: &Timetable) -> Result<Window> {
    match tour.parent_tour_id {
        Some(parent) => timetable
            .window_for(parent)
            .with_context(|| format!("Failed to get the containment window of tour {}", tour.id)),
        None => Ok(timetable.day()),
    }
}

/// Cross-join of the choosers with their feasible alternatives.
///
/// The rows of a chooser are contiguous and follow the `(start, end)` order of the alternatives.
#[derive(Clone, Debug, Default)]
pub struct InteractionDataset {
    /// Identifier of each chooser.
    chooser_ids: Vec<TourId>,
    /// Position of each chooser in the slice of choosers the dataset was built from.
    chooser_positions: Vec<usize>,
    /// Containment window of each chooser.
    bounds: Vec<Window>,
    /// Start of the rows of each chooser (plus the total number of rows).
    offsets: Vec<usize>,
    /// Position of the alternative of each row in the [TddAlternatives].
    alternatives: Vec<usize>,
}

impl InteractionDataset {
    fn new() -> Self {
        InteractionDataset {
            offsets: vec![0],
            ..Default::default()
        }
    }

    fn push(&mut self, tour_id: TourId, position: usize, bound: Window, alts: Vec<usize>) {
        self.chooser_ids.push(tour_id);
        self.chooser_positions.push(position);
        self.bounds.push(bound);
        self.alternatives.extend(alts);
        self.offsets.push(self.alternatives.len());
    }

    /// Returns the number of choosers.
    pub fn nb_choosers(&self) -> usize {
        self.chooser_ids.len()
    }

    /// Returns the number of (chooser, alternative) rows.
    pub fn nb_rows(&self) -> usize {
        self.alternatives.len()
    }

    /// Returns the identifier of the i-th chooser.
    pub fn chooser_id(&self, i: usize) -> TourId {
        self.chooser_ids[i]
    }

    /// Returns the position of the i-th chooser in the slice of choosers.
    pub fn chooser_position(&self, i: usize) -> usize {
        self.chooser_positions[i]
    }

    /// Returns the containment window of the i-th chooser.
    pub fn bound(&self, i: usize) -> Window {
        self.bounds[i]
    }

    /// Returns the rows of the i-th chooser.
    pub fn rows(&self, i: usize) -> Range<usize> {
        self.offsets[i]..self.offsets[i + 1]
    }

    /// Returns the position of the alternative of a row.
    pub fn alternative(&self, row: usize) -> usize {
        self.alternatives[row]
    }
}

/// Feasible alternatives of a set of choosers.
#[derive(Clone, Debug)]
pub struct AlternativeSets {
    /// Interaction dataset of the choosers with at least one feasible alternative.
    pub dataset: InteractionDataset,
    /// Choosers without any feasible alternative.
    pub infeasible: Vec<TourId>,
}

/// Builds the feasible alternatives of choosers from the alternative table and a [Timetable].
#[derive(Clone, Copy, Debug)]
pub struct AlternativeSetBuilder<'a> {
    alternatives: &'a TddAlternatives,
    timetable: &'a Timetable,
    sibling_exclusion: bool,
}

impl<'a> AlternativeSetBuilder<'a> {
    /// Creates a builder.
    ///
    /// When `sibling_exclusion` is `true`, alternatives overlapping bins already occupied in the
    /// chooser's timetable record are infeasible.
    pub fn new(
        alternatives: &'a TddAlternatives,
        timetable: &'a Timetable,
        sibling_exclusion: bool,
    ) -> Self {
        AlternativeSetBuilder {
            alternatives,
            timetable,
            sibling_exclusion,
        }
    }

    /// Returns the positions of the feasible alternatives of a chooser, with its containment
    /// window.
    pub fn feasible_alternatives(&self, chooser: &Tour) -> Result<(Window, Vec<usize>)> {
        let bound = containment_window(chooser, self.timetable)?;
        let agent = chooser.agent_key();
        let alts = self
            .alternatives
            .positions_within(bound)
            .filter(|&i| {
                !self.sibling_exclusion
                    || self
                        .timetable
                        .is_available(agent, self.alternatives.at(i).window())
            })
            .collect();
        Ok((bound, alts))
    }

    /// Builds the interaction dataset of the given choosers, in the given order.
    ///
    /// Choosers without feasible alternatives are not part of the dataset, they are listed in
    /// [AlternativeSets::infeasible].
    ///
    /// Returns an error if the parent of a subtour is unknown.
    pub fn build(&self, choosers: &[&Tour]) -> Result<AlternativeSets> {
        let mut dataset = InteractionDataset::new();
        let mut infeasible = Vec::new();
        for (position, chooser) in choosers.iter().enumerate() {
            let (bound, alts) = self.feasible_alternatives(chooser)?;
            if alts.is_empty() {
                infeasible.push(chooser.id);
            } else {
                dataset.push(chooser.id, position, bound, alts);
            }
        }
        Ok(AlternativeSets {
            dataset,
            infeasible,
        })
    }
}
