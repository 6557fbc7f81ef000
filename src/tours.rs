// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Everything related to tours and the tours table.
use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, Result};
use hashbrown::HashMap;
use schemars::JsonSchema;
use serde_derive::{Deserialize, Serialize};

use crate::timetable::AgentKey;
use crate::units::{Bin, Window};

/// Identifier of a tour.
pub type TourId = u64;
/// Identifier of a person.
pub type PersonId = u64;
/// Identifier of a household.
pub type HouseholdId = u64;

/// Category of a tour.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TourCategory {
    /// Work or school tour.
    Mandatory,
    /// Individual non-mandatory tour (shopping, escort, etc.).
    NonMandatory,
    /// Tour made jointly by several members of a household.
    Joint,
    /// Subtour made during a work tour.
    Atwork,
}

impl TourCategory {
    /// Returns `true` if tours of this category are nested inside a parent tour.
    pub fn is_subtour(self) -> bool {
        matches!(self, Self::Atwork)
    }
}

/// Value of a chooser attribute.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Returns the numeric representation of the value (`1.0` / `0.0` for booleans), or `None`
    /// for text values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            Self::Text(_) => None,
        }
    }

    /// Returns the text of the value, or `None` for numeric values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the hashable representation of the value, used to join tables.
    ///
    /// Floats are accepted only when they have an integral value.
    pub fn to_join_value(&self) -> Result<JoinValue> {
        match self {
            Self::Bool(b) => Ok(JoinValue::Bool(*b)),
            Self::Int(i) => Ok(JoinValue::Int(*i)),
            Self::Float(x) if x.fract() == 0.0 && x.is_finite() => Ok(JoinValue::Int(*x as i64)),
            Self::Float(x) => Err(anyhow!("Cannot join on non-integral value {x}")),
            Self::Text(s) => Ok(JoinValue::Text(s.clone())),
        }
    }
}

/// Hashable value used as a join key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JoinValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for JoinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => b.fmt(f),
            Self::Int(i) => i.fmt(f),
            Self::Text(s) => s.fmt(f),
        }
    }
}

fn default_participants() -> u32 {
    1
}

/// One round-trip activity episode of a person.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Tour {
    /// Unique identifier of the tour.
    pub id: TourId,
    /// Identifier of the person making the tour.
    pub person_id: PersonId,
    /// Identifier of the household of the person.
    #[serde(default)]
    pub household_id: HouseholdId,
    /// Category of the tour.
    pub category: TourCategory,
    /// Identifier of the parent tour (subtours only).
    #[serde(default)]
    pub parent_tour_id: Option<TourId>,
    /// Number of persons taking part in the tour.
    #[serde(default = "default_participants")]
    pub number_of_participants: u32,
    /// Code of the chosen time-window alternative.
    #[serde(default)]
    pub tdd: Option<usize>,
    /// First bin of the tour.
    #[serde(default)]
    pub start: Option<Bin>,
    /// Last bin of the tour.
    #[serde(default)]
    pub end: Option<Bin>,
    /// Duration of the tour, equal to `end - start`.
    #[serde(default)]
    pub duration: Option<Bin>,
    /// Earliest bin the tour can start at, if already established upstream.
    #[serde(default)]
    pub earliest: Option<Bin>,
    /// Latest bin the tour can end at, if already established upstream.
    #[serde(default)]
    pub latest: Option<Bin>,
    /// Attributes of the tour and of its person, used by the choice models.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Tour {
    /// Creates a new unscheduled tour without attributes.
    pub fn new(
        id: TourId,
        person_id: PersonId,
        household_id: HouseholdId,
        category: TourCategory,
        parent_tour_id: Option<TourId>,
    ) -> Self {
        Tour {
            id,
            person_id,
            household_id,
            category,
            parent_tour_id,
            number_of_participants: 1,
            tdd: None,
            start: None,
            end: None,
            duration: None,
            earliest: None,
            latest: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Returns the tour with the given window already scheduled.
    pub fn with_window(mut self, window: Window) -> Self {
        self.set_window(window, None);
        self
    }

    /// Returns the tour with an additional attribute.
    pub fn with_attribute(mut self, name: &str, value: Value) -> Self {
        self.attributes.insert(name.to_owned(), value);
        self
    }

    /// Returns the scheduled window of the tour, if `start` and `end` are both set.
    pub fn window(&self) -> Option<Window> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(Window { start, end }),
            _ => None,
        }
    }

    /// Writes the start, end, duration and alternative code of the tour.
    pub fn set_window(&mut self, window: Window, tdd: Option<usize>) {
        self.start = Some(window.start);
        self.end = Some(window.end);
        self.duration = Some(window.duration());
        self.tdd = tdd;
    }

    /// Returns `true` if start, end and duration are set and consistent.
    pub fn has_complete_schedule(&self) -> bool {
        match (self.window(), self.duration) {
            (Some(window), Some(duration)) => window.duration() == duration,
            _ => false,
        }
    }

    /// Returns the key of the timetable the tour is recorded in: the parent tour for subtours,
    /// the person otherwise.
    pub fn agent_key(&self) -> AgentKey {
        match self.parent_tour_id {
            Some(parent) => AgentKey::Tour(parent),
            None => AgentKey::Person(self.person_id),
        }
    }

    /// Returns the value of an attribute of the tour.
    ///
    /// `number_of_participants` is also accessible as an attribute.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        if name == "number_of_participants" {
            return Some(Value::Int(self.number_of_participants as i64));
        }
        self.attributes.get(name).cloned()
    }
}

/// Start, end and alternative code chosen for a tour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TourSchedule {
    /// Identifier of the tour.
    pub tour_id: TourId,
    /// Code of the chosen alternative (if the choice was made among the alternative table).
    pub tdd: Option<usize>,
    /// Chosen window.
    pub window: Window,
}

/// Collection of tours with unique identifiers, in a fixed order.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "Vec<Tour>", into = "Vec<Tour>")]
pub struct ToursTable {
    tours: Vec<Tour>,
    index: HashMap<TourId, usize>,
}

impl JsonSchema for ToursTable {
    fn schema_name() -> String {
        "ToursTable".to_owned()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        <Vec<Tour>>::json_schema(gen)
    }
}

impl TryFrom<Vec<Tour>> for ToursTable {
    type Error = anyhow::Error;

    fn try_from(tours: Vec<Tour>) -> Result<Self, Self::Error> {
        ToursTable::new(tours)
    }
}

impl From<ToursTable> for Vec<Tour> {
    fn from(table: ToursTable) -> Self {
        table.tours
    }
}

impl ToursTable {
    /// Creates a table from a vector of tours.
    ///
    /// Returns an error if two tours share the same identifier.
    pub fn new(tours: Vec<Tour>) -> Result<Self> {
        let mut index = HashMap::with_capacity(tours.len());
        for (i, tour) in tours.iter().enumerate() {
            if index.insert(tour.id, i).is_some() {
                return Err(anyhow!("Duplicate tour id: {}", tour.id));
            }
        }
        Ok(ToursTable { tours, index })
    }

    /// Returns the number of tours.
    pub fn len(&self) -> usize {
        self.tours.len()
    }

    /// Returns `true` if the table has no tour.
    pub fn is_empty(&self) -> bool {
        self.tours.is_empty()
    }

    /// Returns the tour with the given identifier.
    pub fn get(&self, id: TourId) -> Option<&Tour> {
        self.index.get(&id).map(|&i| &self.tours[i])
    }

    /// Returns a mutable reference to the tour with the given identifier.
    pub fn get_mut(&mut self, id: TourId) -> Option<&mut Tour> {
        self.index.get(&id).map(|&i| &mut self.tours[i])
    }

    /// Iterates over the tours, in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Tour> {
        self.tours.iter()
    }

    /// Returns the tours whose category is in the given list, in table order.
    pub fn select_categories(&self, categories: &[TourCategory]) -> Vec<&Tour> {
        self.tours
            .iter()
            .filter(|t| categories.contains(&t.category))
            .collect()
    }

    /// Writes the given schedules into the table.
    ///
    /// Returns an error if a schedule refers to an unknown tour.
    pub fn assign_in_place(&mut self, schedules: &[TourSchedule]) -> Result<()> {
        for schedule in schedules {
            let tour = self
                .get_mut(schedule.tour_id)
                .ok_or_else(|| anyhow!("Cannot assign schedule to unknown tour {}", schedule.tour_id))?;
            tour.set_window(schedule.window, schedule.tdd);
        }
        Ok(())
    }
}
