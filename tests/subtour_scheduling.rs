// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

use choice::{ChoiceModel, LogitModel};
use hashbrown::HashMap;
use tour_scheduling::alternatives::{TddAlternative, TddAlternatives};
use tour_scheduling::parameters::{Parameters, UnschedulablePolicy};
use tour_scheduling::pipeline::{Pipeline, TOURS};
use tour_scheduling::scheduling::{run_scheduling_step, SchedulingModel};
use tour_scheduling::tours::{Tour, TourCategory, TourId, ToursTable, Value};
use tour_scheduling::units::{Bin, Window};
use tour_scheduling::utility_spec::{ChoiceSpec, Comparison, Expression, SpecTerm};
use tour_scheduling::SchedulingError;

/// Persons with one work tour, one to three at-work subtours and sometimes an already scheduled
/// non-mandatory tour.
fn get_tours(nb_persons: u64) -> ToursTable {
    let mut tours = Vec::new();
    for p in 0..nb_persons {
        let start = 7 + (p % 3) as i32;
        let end = 15 + (p % 4) as i32;
        let work_id = 100 * p;
        tours.push(
            Tour::new(work_id, p, p / 2, TourCategory::Mandatory, None)
                .with_window(Window::new(start, end)),
        );
        for k in 1..=(1 + p % 3) {
            let purpose = if k % 2 == 1 { "eat" } else { "business" };
            tours.push(
                Tour::new(work_id + k, p, p / 2, TourCategory::Atwork, Some(work_id))
                    .with_attribute("purpose", Value::Text(purpose.to_owned()))
                    .with_attribute("income", Value::Float(20000. + 1000. * p as f64)),
            );
        }
        if p % 4 == 0 {
            tours.push(
                Tour::new(work_id + 50, p, p / 2, TourCategory::NonMandatory, None)
                    .with_window(Window::new(19, 21)),
            );
        }
    }
    ToursTable::new(tours).unwrap()
}

fn get_spec() -> ChoiceSpec {
    let eat = Expression::Equals {
        field: "purpose".to_owned(),
        value: Value::Text("eat".to_owned()),
    };
    let midday = Expression::Between {
        expression: Box::new(Expression::field("start")),
        low: 11.,
        high: 13.,
    };
    ChoiceSpec::interaction(vec![
        SpecTerm::new("Duration", Expression::field("duration"), -0.8),
        SpecTerm::new("Midday start for meals", Expression::All(vec![eat, midday]), 1.5),
        SpecTerm::new(
            "Start relative to the parent start",
            Expression::Difference(
                Box::new(Expression::field("start")),
                Box::new(Expression::field("parent_start")),
            ),
            0.05,
        ),
        SpecTerm::new(
            "Income effect on duration",
            Expression::Product(vec![
                Expression::field("duration"),
                Expression::field("income"),
                Expression::Named("income_scale".to_owned()),
            ]),
            1.0,
        ),
    ])
    .unwrap()
}

fn get_parameters(chunk_size: usize, sibling_exclusion: bool) -> Parameters {
    let mut parameters = Parameters {
        chunk_size,
        sibling_exclusion,
        random_seed: Some(2022),
        choice_model: ChoiceModel::Logit(LogitModel::new(1.0)),
        unschedulable: UnschedulablePolicy::Exclude,
        ..Default::default()
    };
    parameters
        .constants
        .insert("income_scale".to_owned(), 1e-5);
    parameters
}

fn run(tours: ToursTable, parameters: &Parameters) -> ToursTable {
    let mut pipeline = Pipeline::with_tours(tours);
    let model = SchedulingModel::interaction(None, get_spec());
    run_scheduling_step(&mut pipeline, &model, parameters).unwrap();
    pipeline.get_table(TOURS).unwrap().clone()
}

fn parent_window(table: &ToursTable, tour: &Tour) -> Window {
    table
        .get(tour.parent_tour_id.unwrap())
        .unwrap()
        .window()
        .unwrap()
}

#[test]
fn containment_test() {
    let table = run(get_tours(30), &get_parameters(0, false));
    let mut nb_subtours = 0;
    for tour in table.iter().filter(|t| t.category == TourCategory::Atwork) {
        assert!(tour.has_complete_schedule());
        let window = tour.window().unwrap();
        assert!(parent_window(&table, tour).contains(&window));
        assert!(tour.tdd.is_some());
        nb_subtours += 1;
    }
    assert_eq!(nb_subtours, 60);
    // Tours that are not choosers are unchanged.
    let original = get_tours(30);
    for tour in table.iter().filter(|t| t.category != TourCategory::Atwork) {
        assert_eq!(Some(tour), original.get(tour.id));
    }
}

#[test]
fn chunk_invariance_test() {
    for exclusion in [false, true] {
        let single = run(get_tours(30), &get_parameters(0, exclusion));
        for chunk_size in [8_000, 20_000, 100_000] {
            let chunked = run(get_tours(30), &get_parameters(chunk_size, exclusion));
            assert_eq!(single, chunked, "chunk size {chunk_size}, exclusion {exclusion}");
        }
    }
}

#[test]
fn outcome_order_test() {
    let model = SchedulingModel::interaction(None, get_spec());
    let outcome = |chunk_size| {
        let mut pipeline = Pipeline::with_tours(get_tours(30));
        run_scheduling_step(&mut pipeline, &model, &get_parameters(chunk_size, true)).unwrap()
    };
    let single = outcome(0);
    // Subtour ids increase along the tours table.
    assert!(single
        .schedules
        .windows(2)
        .all(|pair| pair[0].tour_id < pair[1].tour_id));
    for chunk_size in [8_000, 20_000] {
        let chunked = outcome(chunk_size);
        assert_eq!(single.schedules, chunked.schedules, "chunk size {chunk_size}");
        assert_eq!(single.infeasible, chunked.infeasible, "chunk size {chunk_size}");
    }
}

#[test]
fn sibling_exclusion_test() {
    let table = run(get_tours(30), &get_parameters(20_000, true));
    let mut siblings: HashMap<TourId, Vec<Window>> = HashMap::new();
    for tour in table.iter().filter(|t| t.category == TourCategory::Atwork) {
        if let Some(window) = tour.window() {
            siblings
                .entry(tour.parent_tour_id.unwrap())
                .or_default()
                .push(window);
        }
    }
    for windows in siblings.values() {
        for (i, a) in windows.iter().enumerate() {
            for b in &windows[i + 1..] {
                assert!(a.end < b.start || b.end < a.start, "{a} overlaps {b}");
            }
        }
    }
}

#[test]
fn decoy_alternatives_test() {
    let tours = ToursTable::new(vec![
        Tour::new(1, 1, 1, TourCategory::Mandatory, None).with_window(Window::new(8, 18)),
        Tour::new(2, 1, 1, TourCategory::Atwork, Some(1))
            .with_attribute("purpose", Value::Text("eat".to_owned()))
            .with_attribute("income", Value::Int(30000)),
    ])
    .unwrap();
    let alt = |code, start, end| TddAlternative {
        code,
        start: Bin(start),
        end: Bin(end),
    };
    // Decoys start before the parent or end after it; they would be the most attractive.
    let alternatives = TddAlternatives::new(vec![
        alt(0, 5, 5),
        alt(1, 7, 7),
        alt(2, 8, 9),
        alt(3, 12, 13),
        alt(4, 18, 18),
        alt(5, 18, 20),
        alt(6, 22, 22),
    ])
    .unwrap();
    let mut pipeline = Pipeline::with_tours(tours);
    let model = SchedulingModel::interaction(Some(alternatives), get_spec());
    let parameters = get_parameters(0, false);
    let outcome = run_scheduling_step(&mut pipeline, &model, &parameters).unwrap();
    assert_eq!(outcome.schedules.len(), 1);
    let subtour = pipeline.get_table(TOURS).unwrap().get(2).unwrap();
    assert!([2, 3, 4].contains(&subtour.tdd.unwrap()));
    assert!(Window::new(8, 18).contains(&subtour.window().unwrap()));
}

#[test]
fn missing_parent_test() {
    let tours = ToursTable::new(vec![
        Tour::new(1, 1, 1, TourCategory::Mandatory, None).with_window(Window::new(8, 18)),
        Tour::new(2, 1, 1, TourCategory::Atwork, Some(99))
            .with_attribute("purpose", Value::Text("eat".to_owned()))
            .with_attribute("income", Value::Int(30000)),
    ])
    .unwrap();
    let mut pipeline = Pipeline::with_tours(tours.clone());
    let model = SchedulingModel::interaction(None, get_spec());
    let err = run_scheduling_step(&mut pipeline, &model, &get_parameters(0, false)).unwrap_err();
    assert_eq!(
        err.root_cause().downcast_ref::<SchedulingError>(),
        Some(&SchedulingError::MissingParent { parent_tour_id: 99 })
    );
    // The pipeline is untouched.
    assert_eq!(pipeline.get_table(TOURS).unwrap(), &tours);
}

#[test]
fn no_choosers_test() {
    let tours = ToursTable::new(vec![
        Tour::new(1, 1, 1, TourCategory::Mandatory, None).with_window(Window::new(8, 18))
    ])
    .unwrap();
    let mut pipeline = Pipeline::with_tours(tours.clone());
    let model = SchedulingModel::interaction(None, get_spec());
    let outcome = run_scheduling_step(&mut pipeline, &model, &get_parameters(0, false)).unwrap();
    assert_eq!(outcome.nb_choosers, 0);
    assert!(outcome.schedules.is_empty());
    assert_eq!(pipeline.get_table(TOURS).unwrap(), &tours);
}

#[test]
fn unschedulable_test() {
    let tours = ToursTable::new(vec![
        Tour::new(1, 1, 1, TourCategory::Mandatory, None).with_window(Window::new(9, 9)),
        Tour::new(2, 1, 1, TourCategory::Atwork, Some(1))
            .with_attribute("purpose", Value::Text("eat".to_owned()))
            .with_attribute("income", Value::Int(30000)),
        Tour::new(3, 2, 1, TourCategory::Mandatory, None).with_window(Window::new(8, 18)),
        Tour::new(4, 2, 1, TourCategory::Atwork, Some(3))
            .with_attribute("purpose", Value::Text("business".to_owned()))
            .with_attribute("income", Value::Int(30000)),
    ])
    .unwrap();
    // Only windows of two bins or more.
    let alternatives = TddAlternatives::new(
        (0..10)
            .map(|i| TddAlternative {
                code: i,
                start: Bin(8 + i as i32),
                end: Bin(9 + i as i32),
            })
            .collect(),
    )
    .unwrap();
    let model = SchedulingModel::interaction(Some(alternatives), get_spec());

    let mut parameters = get_parameters(0, false);
    parameters.unschedulable = UnschedulablePolicy::Abort;
    let mut pipeline = Pipeline::with_tours(tours.clone());
    let err = run_scheduling_step(&mut pipeline, &model, &parameters).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulingError>(),
        Some(SchedulingError::IncompleteSchedule { tours, .. }) if tours == &vec![2]
    ));

    parameters.unschedulable = UnschedulablePolicy::Exclude;
    let outcome = run_scheduling_step(&mut pipeline, &model, &parameters).unwrap();
    assert_eq!(outcome.infeasible, vec![2]);
    let table = pipeline.get_table(TOURS).unwrap();
    assert!(table.get(2).unwrap().window().is_none());
    assert!(table.get(4).unwrap().has_complete_schedule());
}

#[test]
fn unknown_field_test() {
    let spec = ChoiceSpec::interaction(vec![SpecTerm::new(
        "Early start",
        Expression::compare(
            Comparison::Lt,
            Expression::field("start"),
            Expression::field("preferred_start"),
        ),
        1.0,
    )])
    .unwrap();
    let mut pipeline = Pipeline::with_tours(get_tours(3));
    let model = SchedulingModel::interaction(None, spec);
    let err = run_scheduling_step(&mut pipeline, &model, &get_parameters(0, false)).unwrap_err();
    assert!(matches!(
        err.root_cause().downcast_ref::<SchedulingError>(),
        Some(SchedulingError::SpecEvaluation(_))
    ));
}
