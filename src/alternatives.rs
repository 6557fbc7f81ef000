// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Table of the time-window (tour departure and duration) alternatives.
use anyhow::Result;
use hashbrown::HashMap;
use schemars::JsonSchema;
use serde_derive::{Deserialize, Serialize};

use crate::error::SchedulingError;
use crate::units::{Bin, Window};

/// One discretized `(start, end)` choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct TddAlternative {
    /// Code of the alternative.
    pub code: usize,
    /// First bin of the window.
    pub start: Bin,
    /// Last bin of the window.
    pub end: Bin,
}

impl TddAlternative {
    /// Returns the window of the alternative.
    pub fn window(&self) -> Window {
        Window {
            start: self.start,
            end: self.end,
        }
    }

    /// Returns the duration of the alternative.
    pub fn duration(&self) -> Bin {
        self.end - self.start
    }
}

/// The finite set of time-window alternatives, sorted by `(start, end)`.
///
/// Codes are unique and their order is the same as the `(start, end)` order.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(try_from = "Vec<TddAlternative>", into = "Vec<TddAlternative>")]
pub struct TddAlternatives {
    alternatives: Vec<TddAlternative>,
    index: HashMap<usize, usize>,
}

impl JsonSchema for TddAlternatives {
    fn schema_name() -> String {
        "TddAlternatives".to_owned()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        <Vec<TddAlternative>>::json_schema(gen)
    }
}

impl TryFrom<Vec<TddAlternative>> for TddAlternatives {
    type Error = SchedulingError;

    fn try_from(mut alternatives: Vec<TddAlternative>) -> Result<Self, Self::Error> {
        if alternatives.is_empty() {
            return Err(SchedulingError::InvalidAlternatives(
                "the table is empty".to_owned(),
            ));
        }
        if let Some(alt) = alternatives.iter().find(|a| a.end < a.start) {
            return Err(SchedulingError::InvalidAlternatives(format!(
                "alternative {} ends before it starts",
                alt.code
            )));
        }
        alternatives.sort_by_key(|a| a.code);
        for pair in alternatives.windows(2) {
            if pair[0].code == pair[1].code {
                return Err(SchedulingError::InvalidAlternatives(format!(
                    "duplicate code {}",
                    pair[0].code
                )));
            }
            if (pair[0].start, pair[0].end) >= (pair[1].start, pair[1].end) {
                return Err(SchedulingError::InvalidAlternatives(format!(
                    "codes {} and {} are not ordered by (start, end)",
                    pair[0].code, pair[1].code
                )));
            }
        }
        let index = alternatives
            .iter()
            .enumerate()
            .map(|(i, a)| (a.code, i))
            .collect();
        Ok(TddAlternatives {
            alternatives,
            index,
        })
    }
}

impl From<TddAlternatives> for Vec<TddAlternative> {
    fn from(value: TddAlternatives) -> Self {
        value.alternatives
    }
}

impl TddAlternatives {
    /// Creates the table from a vector of alternatives.
    ///
    /// Returns an error if the table is empty, if a code is duplicated, if an alternative ends
    /// before it starts or if the code order differs from the `(start, end)` order.
    pub fn new(alternatives: Vec<TddAlternative>) -> Result<Self> {
        Ok(Self::try_from(alternatives)?)
    }

    /// Enumerates all the `(start, end)` pairs with `start <= end` inside the day.
    ///
    /// Codes are assigned from 0, in `(start, end)` order.
    pub fn from_day(day: Window) -> Result<Self> {
        let mut alternatives = Vec::with_capacity(day.nb_bins() * (day.nb_bins() + 1) / 2);
        for start in day.start.0..=day.end.0 {
            for end in start..=day.end.0 {
                alternatives.push(TddAlternative {
                    code: alternatives.len(),
                    start: Bin(start),
                    end: Bin(end),
                });
            }
        }
        Self::new(alternatives)
    }

    /// Returns the number of alternatives.
    pub fn len(&self) -> usize {
        self.alternatives.len()
    }

    /// Returns `true` if there is no alternative (never the case for a valid table).
    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// Returns the alternative at the given position.
    pub fn at(&self, position: usize) -> &TddAlternative {
        &self.alternatives[position]
    }

    /// Returns the alternative with the given code.
    pub fn get(&self, code: usize) -> Option<&TddAlternative> {
        self.index.get(&code).map(|&i| &self.alternatives[i])
    }

    /// Iterates over the alternatives in `(start, end)` order.
    pub fn iter(&self) -> impl Iterator<Item = &TddAlternative> {
        self.alternatives.iter()
    }

    /// Iterates over the positions of the alternatives lying inside the given bounds.
    pub fn positions_within(&self, bounds: Window) -> impl Iterator<Item = usize> + '_ {
        // Alternatives are sorted by start so the candidates are a contiguous range.
        let first = self.alternatives.partition_point(|a| a.start < bounds.start);
        let last = self.alternatives.partition_point(|a| a.start <= bounds.end);
        (first..last.max(first)).filter(move |&i| self.alternatives[i].end <= bounds.end)
    }
}
