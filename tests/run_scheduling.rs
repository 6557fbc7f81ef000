// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

use std::fs;
use std::path::PathBuf;

use serde_json::json;
use tour_scheduling::io::json::read_json;
use tour_scheduling::tours::{TourCategory, ToursTable};
use tour_scheduling::units::Window;

/// Temporary directory, removed when dropped.
struct TempDir(PathBuf);

impl TempDir {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("{name}_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        TempDir(dir)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

#[test]
fn run_from_files_test() {
    let tmp = TempDir::new("tour_scheduling_run");
    let dir = &tmp.0;
    let tours = json!([
        {"id": 1, "person_id": 1, "household_id": 1, "category": "mandatory", "start": 8, "end": 17},
        {"id": 2, "person_id": 1, "household_id": 1, "category": "atwork", "parent_tour_id": 1,
         "attributes": {"purpose": "eat"}},
        {"id": 3, "person_id": 2, "household_id": 1, "category": "mandatory", "start": 9, "end": 15},
        {"id": 4, "person_id": 2, "household_id": 1, "category": "atwork", "parent_tour_id": 3,
         "attributes": {"purpose": "business"}},
        {"id": 5, "person_id": 2, "household_id": 1, "category": "atwork", "parent_tour_id": 3,
         "attributes": {"purpose": "eat"}}
    ]);
    let spec = json!({
        "terms": [
            {"description": "Duration", "expression": {"type": "Field", "value": "duration"},
             "coefficients": [-1.0]},
            {"description": "Start", "expression": {"type": "Field", "value": "start"},
             "coefficients": [-0.01]},
            {"description": "Lunch", "expression": {"type": "All", "value": [
                {"type": "Equals", "value": {"field": "purpose", "value": "eat"}},
                {"type": "Compare", "value": {"op": "Eq",
                 "left": {"type": "Field", "value": "start"},
                 "right": {"type": "Constant", "value": 12.0}}}
             ]}, "coefficients": [3.0]}
        ]
    });
    let parameters = json!({
        "input_files": {
            "tours": dir.join("tours.json"),
            "choice_spec": dir.join("spec.json")
        },
        "output_directory": dir.join("output"),
        "random_seed": 1,
        "sibling_exclusion": true,
        "trace_hh_id": 1
    });
    fs::write(dir.join("tours.json"), tours.to_string()).unwrap();
    fs::write(dir.join("spec.json"), spec.to_string()).unwrap();
    fs::write(dir.join("parameters.json"), parameters.to_string()).unwrap();

    tour_scheduling::run_scheduling(&dir.join("parameters.json")).unwrap();

    let output = dir.join("output");
    assert!(output.join("log.txt").is_file());
    assert!(output.join("outcome.json").is_file());
    let table: ToursTable = read_json(&output.join("tours.json")).unwrap();
    let window = |id| table.get(id).unwrap().window().unwrap();
    assert_eq!(window(2), Window::new(12, 12));
    assert_eq!(window(5), Window::new(12, 12));
    // The business subtour takes the earliest zero-duration window of its parent.
    assert_eq!(window(4), Window::new(9, 9));
    for tour in table.iter().filter(|t| t.category == TourCategory::Atwork) {
        assert!(tour.has_complete_schedule());
    }
    // Household 1 is traced in the log file.
    let log = fs::read_to_string(output.join("log.txt")).unwrap();
    assert!(log.contains("trace term `Lunch` with coefficient 3"));
    assert!(log.contains("trace tour 4: chose alternative"));
}
