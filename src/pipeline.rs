// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Store of the tables shared between the model steps.
use anyhow::Result;
use hashbrown::HashMap;
use log::debug;

use crate::error::SchedulingError;
use crate::tours::ToursTable;

/// Name of the table of tours.
pub const TOURS: &str = "tours";

/// Named tables shared by the steps of a run. The last write of a table wins.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    tables: HashMap<String, ToursTable>,
}

impl Pipeline {
    /// Creates a pipeline with a single `tours` table.
    pub fn with_tours(tours: ToursTable) -> Self {
        let mut pipeline = Pipeline::default();
        pipeline.replace_table(TOURS, tours);
        pipeline
    }

    /// Returns the table with the given name.
    pub fn get_table(&self, name: &str) -> Result<&ToursTable> {
        self.tables
            .get(name)
            .ok_or_else(|| SchedulingError::MissingTable(name.to_owned()).into())
    }

    /// Stores a table, replacing any table with the same name.
    pub fn replace_table(&mut self, name: &str, table: ToursTable) {
        debug!("Replacing table `{name}` ({} rows)", table.len());
        self.tables.insert(name.to_owned(), table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tours::{Tour, TourCategory};

    #[test]
    fn replace_test() {
        let mut pipeline = Pipeline::default();
        let err = pipeline.get_table(TOURS).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SchedulingError>(),
            Some(&SchedulingError::MissingTable(TOURS.to_owned()))
        );
        pipeline.replace_table(TOURS, ToursTable::default());
        assert!(pipeline.get_table(TOURS).unwrap().is_empty());
        let table =
            ToursTable::new(vec![Tour::new(1, 1, 1, TourCategory::Mandatory, None)]).unwrap();
        pipeline.replace_table(TOURS, table);
        assert_eq!(pipeline.get_table(TOURS).unwrap().len(), 1);
    }
}
