// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Errors that abort a scheduling run.
//!
//! Per-chooser infeasibility (no feasible alternative, failed probabilistic draw) is not an error:
//! it is reported in the outcome of the step.
use thiserror::Error;

use crate::timetable::AgentKey;
use crate::tours::TourId;
use crate::units::Window;

/// Structural errors and post-condition violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulingError {
    #[error("Parent tour {parent_tour_id} is not a scheduled tour")]
    MissingParent { parent_tour_id: TourId },
    #[error("Window {window} overlaps an already reserved window of {agent}")]
    Overlap { agent: AgentKey, window: Window },
    #[error("Window {window} is not inside the day {day}")]
    WindowOutOfDay { window: Window, day: Window },
    #[error("Invalid choice specification: {0}")]
    SpecEvaluation(String),
    #[error("No probability row for tour {tour_id} with join key {key}")]
    MissingProbabilityRow { tour_id: TourId, key: String },
    #[error("Malformed probability table: {0}")]
    MalformedProbabilityTable(String),
    #[error("Invalid time-window alternatives: {0}")]
    InvalidAlternatives(String),
    #[error("Table `{0}` is not registered in the pipeline")]
    MissingTable(String),
    #[error("Step `{step}` left {} tour(s) without a complete schedule: {tours:?}", .tours.len())]
    IncompleteSchedule { step: String, tours: Vec<TourId> },
}
