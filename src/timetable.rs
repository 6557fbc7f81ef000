// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Per-agent occupancy of the time bins of the day.
//!
//! The occupancy of top-level tours is recorded per person. The occupancy of subtours is recorded
//! per parent tour, so that the parent tour itself does not block its own subtours.
use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use serde_derive::Serialize;

use crate::error::SchedulingError;
use crate::tours::{PersonId, Tour, TourId};
use crate::units::Window;

/// Key of a timetable record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AgentKey {
    /// Timetable of the top-level tours of a person.
    Person(PersonId),
    /// Timetable of the subtours of a parent tour.
    Tour(TourId),
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Person(id) => write!(f, "person {id}"),
            Self::Tour(id) => write!(f, "tour {id}"),
        }
    }
}

/// Occupancy record of one agent.
#[derive(Clone, Debug)]
struct AgentTimetable {
    /// Occupied bins, relative to the start of the day.
    bins: FixedBitSet,
    /// Reserved windows, in reservation order.
    reserved: Vec<Window>,
}

impl AgentTimetable {
    fn new(nb_bins: usize) -> Self {
        AgentTimetable {
            bins: FixedBitSet::with_capacity(nb_bins),
            reserved: Vec::new(),
        }
    }
}

/// Occupied time bins of each agent, over a fixed day.
///
/// Once a bin is occupied, it is never freed.
#[derive(Clone, Debug)]
pub struct Timetable {
    day: Window,
    occupancy: HashMap<AgentKey, AgentTimetable>,
    /// Window of each known scheduled tour.
    windows: HashMap<TourId, Window>,
}

impl Timetable {
    /// Creates an empty timetable over the given day.
    pub fn new(day: Window) -> Self {
        Timetable {
            day,
            occupancy: HashMap::new(),
            windows: HashMap::new(),
        }
    }

    /// Creates a timetable from already scheduled tours.
    ///
    /// The bins of each scheduled tour are marked as occupied for its [AgentKey] and its window
    /// is recorded so that it can be used as a parent window. Unscheduled tours are ignored.
    ///
    /// Existing tours of the same agent are allowed to overlap (e.g., a tour starting at the bin
    /// where the previous one ends).
    ///
    /// Returns an error if a scheduled window is invalid or not inside the day.
    pub fn build<'a>(day: Window, tours: impl IntoIterator<Item = &'a Tour>) -> Result<Self> {
        let mut timetable = Self::new(day);
        for tour in tours {
            if let Some(window) = tour.window() {
                timetable.check_window(window)?;
                timetable.mark(tour.agent_key(), window);
                timetable.windows.insert(tour.id, window);
            }
        }
        Ok(timetable)
    }

    /// Returns the day covered by the timetable.
    pub fn day(&self) -> Window {
        self.day
    }

    /// Returns the containment window of the subtours of the given parent tour.
    ///
    /// Returns [SchedulingError::MissingParent] if the parent tour is not a known scheduled tour.
    pub fn window_for(&self, parent_tour_id: TourId) -> Result<Window> {
        self.windows
            .get(&parent_tour_id)
            .copied()
            .ok_or_else(|| SchedulingError::MissingParent { parent_tour_id }.into())
    }

    /// Records the window of a tour scheduled during the run, so that its subtours can be
    /// scheduled inside it.
    pub fn register_window(&mut self, tour_id: TourId, window: Window) -> Result<()> {
        self.check_window(window)?;
        self.windows.insert(tour_id, window);
        Ok(())
    }

    /// Returns `true` if all the bins of the window are free for the agent.
    ///
    /// Windows that are not inside the day are never available.
    pub fn is_available(&self, agent: AgentKey, window: Window) -> bool {
        if !window.is_valid() || !self.day.contains(&window) {
            return false;
        }
        match self.occupancy.get(&agent) {
            Some(record) => self.bin_range(window).all(|i| !record.bins.contains(i)),
            None => true,
        }
    }

    /// Marks the bins of the window as occupied for the agent.
    ///
    /// Reserving a window identical to an already reserved window of the agent does nothing.
    ///
    /// Returns an error if the window is not inside the day or if one of its bins is already
    /// occupied.
    pub fn reserve(&mut self, agent: AgentKey, window: Window) -> Result<()> {
        self.check_window(window)?;
        if let Some(record) = self.occupancy.get(&agent) {
            if record.reserved.contains(&window) {
                return Ok(());
            }
        }
        if !self.is_available(agent, window) {
            return Err(SchedulingError::Overlap { agent, window }.into());
        }
        self.mark(agent, window);
        Ok(())
    }

    /// Returns the free window of the agent inside `bounds` that is the closest to `target`: the
    /// closest duration first, then the closest start bin.
    ///
    /// Returns `None` if none of the bins of `bounds` is free inside the day.
    pub fn closest_free_window(
        &self,
        agent: AgentKey,
        bounds: Window,
        target: Window,
    ) -> Option<Window> {
        let first = bounds.start.max(self.day.start).0;
        let last = bounds.end.min(self.day.end).0;
        (first..=last)
            .flat_map(|start| (start..=last).map(move |end| Window::new(start, end)))
            .filter(|&window| self.is_available(agent, window))
            .min_by_key(|window| {
                (
                    (window.duration().0 - target.duration().0).abs(),
                    (window.start.0 - target.start.0).abs(),
                    window.start,
                )
            })
    }

    /// Returns the reserved windows of each agent, sorted by agent and by start bin.
    pub fn tour_map(&self) -> BTreeMap<AgentKey, Vec<Window>> {
        self.occupancy
            .iter()
            .map(|(&agent, record)| {
                let mut windows = record.reserved.clone();
                windows.sort();
                (agent, windows)
            })
            .collect()
    }

    /// Returns a one-character-per-bin representation of the occupancy of an agent (`X` for
    /// occupied bins, `.` for free bins).
    pub fn render(&self, agent: AgentKey) -> String {
        let nb_bins = self.day.nb_bins();
        match self.occupancy.get(&agent) {
            Some(record) => (0..nb_bins)
                .map(|i| if record.bins.contains(i) { 'X' } else { '.' })
                .collect(),
            None => ".".repeat(nb_bins),
        }
    }

    fn check_window(&self, window: Window) -> Result<()> {
        if !window.is_valid() || !self.day.contains(&window) {
            return Err(SchedulingError::WindowOutOfDay {
                window,
                day: self.day,
            }
            .into());
        }
        Ok(())
    }

    /// Range of the bit indices of a window (the window must be inside the day).
    fn bin_range(&self, window: Window) -> std::ops::Range<usize> {
        let first = (window.start.0 - self.day.start.0) as usize;
        first..first + window.nb_bins()
    }

    fn mark(&mut self, agent: AgentKey, window: Window) {
        let range = self.bin_range(window);
        let nb_bins = self.day.nb_bins();
        let record = self
            .occupancy
            .entry(agent)
            .or_insert_with(|| AgentTimetable::new(nb_bins));
        record.bins.set_range(range, true);
        record.reserved.push(window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tours::TourCategory;

    const DAY: Window = Window::new(5, 23);

    fn get_tours() -> Vec<Tour> {
        vec![
            Tour::new(1, 100, 1, TourCategory::Mandatory, None).with_window(Window::new(8, 18)),
            Tour::new(2, 100, 1, TourCategory::NonMandatory, None).with_window(Window::new(18, 21)),
            Tour::new(3, 101, 1, TourCategory::Mandatory, None),
            Tour::new(4, 100, 1, TourCategory::Atwork, Some(1)).with_window(Window::new(12, 13)),
        ]
    }

    #[test]
    fn build_test() {
        let tours = get_tours();
        let timetable = Timetable::build(DAY, &tours).unwrap();
        assert_eq!(timetable.window_for(1).unwrap(), Window::new(8, 18));
        // Unscheduled tours are not known.
        assert!(timetable.window_for(3).is_err());
        let person = AgentKey::Person(100);
        assert!(!timetable.is_available(person, Window::new(7, 8)));
        assert!(timetable.is_available(person, Window::new(5, 7)));
        assert!(timetable.is_available(person, Window::new(22, 23)));
        // The subtour is recorded under its parent tour.
        assert!(!timetable.is_available(AgentKey::Tour(1), Window::new(13, 14)));
        assert!(timetable.is_available(AgentKey::Tour(1), Window::new(14, 15)));
        assert!(timetable.is_available(AgentKey::Person(101), DAY));
    }

    #[test]
    fn missing_parent_test() {
        let tours = get_tours();
        let timetable = Timetable::build(DAY, &tours).unwrap();
        let err = timetable.window_for(42).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SchedulingError>(),
            Some(&SchedulingError::MissingParent { parent_tour_id: 42 })
        );
    }

    #[test]
    fn build_out_of_day_test() {
        let tours = vec![Tour::new(1, 1, 1, TourCategory::Mandatory, None).with_window(Window::new(3, 9))];
        assert!(Timetable::build(DAY, &tours).is_err());
    }

    #[test]
    fn reserve_test() {
        let mut timetable = Timetable::new(DAY);
        let agent = AgentKey::Tour(7);
        timetable.reserve(agent, Window::new(10, 11)).unwrap();
        // Identical reservation: no-op.
        timetable.reserve(agent, Window::new(10, 11)).unwrap();
        // Overlapping reservation.
        let err = timetable.reserve(agent, Window::new(11, 12)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SchedulingError>(),
            Some(SchedulingError::Overlap { .. })
        ));
        // Other agents are not affected.
        timetable.reserve(AgentKey::Tour(8), Window::new(11, 12)).unwrap();
        // Outside of the day.
        assert!(timetable.reserve(agent, Window::new(22, 24)).is_err());
        timetable.reserve(agent, Window::new(5, 6)).unwrap();
        let map = timetable.tour_map();
        assert_eq!(map[&agent], vec![Window::new(5, 6), Window::new(10, 11)]);
        assert_eq!(map[&AgentKey::Tour(8)], vec![Window::new(11, 12)]);
        assert_eq!(timetable.render(agent), "XX...XX............");
    }

    #[test]
    fn closest_free_window_test() {
        let mut timetable = Timetable::new(DAY);
        let agent = AgentKey::Tour(1);
        timetable.reserve(agent, Window::new(12, 13)).unwrap();
        let bounds = Window::new(8, 18);
        assert_eq!(
            timetable.closest_free_window(agent, bounds, Window::new(12, 13)),
            Some(Window::new(10, 11))
        );
        assert_eq!(
            timetable.closest_free_window(agent, bounds, Window::new(13, 15)),
            Some(Window::new(14, 16))
        );
        // Free windows of other agents are not affected.
        assert_eq!(
            timetable.closest_free_window(AgentKey::Tour(2), bounds, Window::new(12, 13)),
            Some(Window::new(12, 13))
        );
        // Fully occupied bounds.
        assert_eq!(
            timetable.closest_free_window(agent, Window::new(12, 13), Window::new(12, 13)),
            None
        );
    }
}
