// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Definition of the discretized time units of a day.
//!
//! - [Bin]: index of a time bin of the day (e.g., an hour or a half-hour).
//! - [Window]: inclusive interval of bins `[start, end]`.
use std::fmt;
use std::ops::{Add, Sub};

use schemars::JsonSchema;
use serde_derive::{Deserialize, Serialize};

/// Index of a discrete time bin.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    JsonSchema,
)]
#[serde(transparent)]
pub struct Bin(pub i32);

impl Add for Bin {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Bin {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Interval of time bins, inclusive on both ends.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema,
)]
pub struct Window {
    /// First bin of the window.
    pub start: Bin,
    /// Last bin of the window.
    pub end: Bin,
}

impl Window {
    /// Creates a new window from two bin indices.
    pub const fn new(start: i32, end: i32) -> Self {
        Window {
            start: Bin(start),
            end: Bin(end),
        }
    }

    /// Returns the duration of the window, i.e., `end - start`.
    ///
    /// The duration is negative for an invalid window.
    pub fn duration(&self) -> Bin {
        self.end - self.start
    }

    /// Returns `true` if `end >= start`.
    pub fn is_valid(&self) -> bool {
        self.end >= self.start
    }

    /// Returns `true` if the given window is fully inside this window.
    pub fn contains(&self, other: &Window) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns the number of bins in the window (`0` for an invalid window).
    pub fn nb_bins(&self) -> usize {
        if self.is_valid() {
            (self.end.0 - self.start.0) as usize + 1
        } else {
            0
        }
    }

    /// Returns the window clamped inside the given bounds, keeping `end >= start`.
    ///
    /// The window is returned unchanged if the bounds are invalid.
    pub fn clamp_to(&self, bounds: &Window) -> Window {
        if !bounds.is_valid() {
            return *self;
        }
        let start = self.start.clamp(bounds.start, bounds.end);
        let end = self.end.clamp(start, bounds.end);
        Window { start, end }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
