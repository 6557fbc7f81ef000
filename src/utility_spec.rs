// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Choice specifications: utility terms expressed over the attributes of the choosers and of the
//! alternatives, with one coefficient per alternative column.
//!
//! The field names used in the expressions are resolved once, against a [FieldRegistry], when
//! the choice spec is compiled. Unknown fields, unknown constants and type mismatches are
//! reported at that point, before any evaluation.
use std::collections::BTreeMap;

use anyhow::Result;
use hashbrown::{HashMap, HashSet};
use schemars::JsonSchema;
use serde_derive::{Deserialize, Serialize};

use crate::alternative_set::InteractionDataset;
use crate::alternatives::{TddAlternative, TddAlternatives};
use crate::error::SchedulingError;
use crate::tours::{Tour, Value};
use crate::units::Window;

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Eq => left == right,
            Self::Ne => left != right,
        }
    }
}

/// Expression of a utility term.
///
/// Boolean results are represented as `1.0` (true) and `0.0` (false).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "type", content = "value")]
pub enum Expression {
    /// Value of a numeric field.
    Field(String),
    /// Constant value.
    Constant(f64),
    /// Named constant of the model.
    Named(String),
    /// Test of equality between a field (numeric or text) and a value.
    Equals { field: String, value: Value },
    /// Comparison of two expressions.
    Compare {
        op: Comparison,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Test whether `low <= expression <= high`.
    Between {
        expression: Box<Expression>,
        low: f64,
        high: f64,
    },
    Sum(Vec<Expression>),
    Product(Vec<Expression>),
    Difference(Box<Expression>, Box<Expression>),
    Ratio(Box<Expression>, Box<Expression>),
    Min(Vec<Expression>),
    Max(Vec<Expression>),
    Not(Box<Expression>),
    All(Vec<Expression>),
    Any(Vec<Expression>),
}

impl Expression {
    /// Shortcut for [Expression::Field].
    pub fn field(name: &str) -> Self {
        Self::Field(name.to_owned())
    }

    /// Shortcut for [Expression::Compare].
    pub fn compare(op: Comparison, left: Expression, right: Expression) -> Self {
        Self::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// One row of a [ChoiceSpec].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct SpecTerm {
    /// Human-readable description of the term.
    #[serde(default)]
    pub description: String,
    /// Expression of the term.
    pub expression: Expression,
    /// Coefficient of the term for each column of the choice spec.
    pub coefficients: Vec<f64>,
}

impl SpecTerm {
    /// Creates a term with a single coefficient.
    pub fn new(description: &str, expression: Expression, coefficient: f64) -> Self {
        SpecTerm {
            description: description.to_owned(),
            expression,
            coefficients: vec![coefficient],
        }
    }
}

fn default_columns() -> Vec<String> {
    vec!["coefficient".to_owned()]
}

/// Expression-by-column coefficient matrix.
///
/// For an interaction choice (the alternatives are the rows of the interaction dataset), the
/// specification has a single column. Otherwise, there is one column per alternative.
#[derive(Clone, Debug, PartialEq, Serialize, JsonSchema)]
pub struct ChoiceSpec {
    /// Labels of the columns.
    pub columns: Vec<String>,
    /// Terms of the utility.
    pub terms: Vec<SpecTerm>,
}

/// [ChoiceSpec] before validation, for deserialization.
#[derive(Clone, Debug, Deserialize)]
pub struct UncheckedChoiceSpec {
    #[serde(default = "default_columns")]
    columns: Vec<String>,
    terms: Vec<SpecTerm>,
}

impl<'de> serde::Deserialize<'de> for ChoiceSpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let unchecked = <UncheckedChoiceSpec as serde::Deserialize>::deserialize(deserializer)?;
        ChoiceSpec::new(unchecked.columns, unchecked.terms).map_err(serde::de::Error::custom)
    }
}

impl ChoiceSpec {
    /// Creates a specification.
    ///
    /// Returns an error if there is no column, if a column label is duplicated or if a term does
    /// not have one coefficient per column.
    pub fn new(columns: Vec<String>, terms: Vec<SpecTerm>) -> Result<Self, SchedulingError> {
        if columns.is_empty() {
            return Err(spec_error("the choice spec has no column".to_owned()));
        }
        {
            let mut seen = HashSet::new();
            if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
                return Err(spec_error(format!("duplicate column `{dup}`")));
            }
        }
        if let Some(term) = terms.iter().find(|t| t.coefficients.len() != columns.len()) {
            return Err(spec_error(format!(
                "term `{}` has {} coefficient(s) for {} column(s)",
                term.description,
                term.coefficients.len(),
                columns.len()
            )));
        }
        Ok(ChoiceSpec { columns, terms })
    }

    /// Creates a single-column specification for an interaction choice.
    pub fn interaction(terms: Vec<SpecTerm>) -> Result<Self, SchedulingError> {
        Self::new(default_columns(), terms)
    }
}

fn spec_error(msg: String) -> SchedulingError {
    SchedulingError::SpecEvaluation(msg)
}

/// Type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Numeric,
    Text,
}

/// Fields of a time-window alternative.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowField {
    Start,
    End,
    Duration,
}

impl WindowField {
    fn get(self, window: Window) -> f64 {
        match self {
            Self::Start => window.start.0 as f64,
            Self::End => window.end.0 as f64,
            Self::Duration => window.duration().0 as f64,
        }
    }
}

/// Resolved field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    /// Field of the alternative of the row.
    Alternative(WindowField),
    /// Field of the containment window of the chooser.
    Containment(WindowField),
    /// Numeric attribute of the chooser (index of the numeric column).
    ChooserNumeric(usize),
    /// Text attribute of the chooser (index of the text column).
    ChooserText(usize),
}

const ALTERNATIVE_FIELDS: [(&str, WindowField); 3] = [
    ("start", WindowField::Start),
    ("end", WindowField::End),
    ("duration", WindowField::Duration),
];

const CONTAINMENT_FIELDS: [(&str, WindowField); 3] = [
    ("parent_start", WindowField::Start),
    ("parent_end", WindowField::End),
    ("parent_duration", WindowField::Duration),
];

/// Registry of the fields that expressions can refer to.
#[derive(Clone, Debug, Default)]
pub struct FieldRegistry {
    chooser_numeric: Vec<String>,
    chooser_text: Vec<String>,
    lookup: HashMap<String, Field>,
    /// Attributes found with inconsistent types or missing for some choosers.
    rejected: HashMap<String, String>,
}

impl FieldRegistry {
    /// Creates the registry of an interaction choice: fields of the alternatives, of the
    /// containment window and of the choosers.
    ///
    /// Chooser attributes shadowed by an alternative or containment field are ignored.
    pub fn for_interaction(choosers: &[&Tour]) -> Self {
        let mut registry = Self::for_choosers(choosers);
        for (name, f) in ALTERNATIVE_FIELDS {
            registry.lookup.insert(name.to_owned(), Field::Alternative(f));
        }
        for (name, f) in CONTAINMENT_FIELDS {
            registry.lookup.insert(name.to_owned(), Field::Containment(f));
        }
        registry
    }

    /// Creates the registry of the chooser attributes.
    ///
    /// An attribute is registered if it is present in every chooser with a consistent type.
    pub fn for_choosers(choosers: &[&Tour]) -> Self {
        // Type of each attribute, with the number of choosers having it.
        let mut types: BTreeMap<&str, (Option<FieldType>, usize)> = BTreeMap::new();
        let mut inconsistent = HashSet::new();
        for chooser in choosers {
            for (name, value) in &chooser.attributes {
                let ty = match value {
                    Value::Text(_) => FieldType::Text,
                    _ => FieldType::Numeric,
                };
                let entry = types.entry(name.as_str()).or_insert((Some(ty), 0));
                if entry.0 != Some(ty) {
                    inconsistent.insert(name.as_str());
                }
                entry.1 += 1;
            }
        }
        let mut registry = FieldRegistry::default();
        registry.add("number_of_participants".to_owned(), FieldType::Numeric);
        for (name, (ty, count)) in types {
            if registry.lookup.contains_key(name) {
                continue;
            } else if inconsistent.contains(name) {
                registry
                    .rejected
                    .insert(name.to_owned(), "it has inconsistent types".to_owned());
            } else if count < choosers.len() {
                registry.rejected.insert(
                    name.to_owned(),
                    format!("it is missing for {} chooser(s)", choosers.len() - count),
                );
            } else if let Some(ty) = ty {
                registry.add(name.to_owned(), ty);
            }
        }
        registry
    }

    fn add(&mut self, name: String, ty: FieldType) {
        let field = match ty {
            FieldType::Numeric => {
                self.chooser_numeric.push(name.clone());
                Field::ChooserNumeric(self.chooser_numeric.len() - 1)
            }
            FieldType::Text => {
                self.chooser_text.push(name.clone());
                Field::ChooserText(self.chooser_text.len() - 1)
            }
        };
        self.lookup.insert(name, field);
    }

    /// Returns the field with the given name.
    pub fn resolve(&self, name: &str) -> Result<Field, SchedulingError> {
        self.lookup.get(name).copied().ok_or_else(|| {
            if let Some(reason) = self.rejected.get(name) {
                spec_error(format!("field `{name}` cannot be used because {reason}"))
            } else {
                spec_error(format!(
                    "unknown field `{name}` (not in the choosers nor in the alternatives)"
                ))
            }
        })
    }

    /// Returns the type of a resolved field.
    fn field_type(field: Field) -> FieldType {
        match field {
            Field::ChooserText(_) => FieldType::Text,
            _ => FieldType::Numeric,
        }
    }
}

/// Expression whose fields and constants are resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum CompiledExpression {
    Field(Field),
    Constant(f64),
    TextEquals { column: usize, value: String },
    Compare(Comparison, Box<CompiledExpression>, Box<CompiledExpression>),
    Between(Box<CompiledExpression>, f64, f64),
    Sum(Vec<CompiledExpression>),
    Product(Vec<CompiledExpression>),
    Difference(Box<CompiledExpression>, Box<CompiledExpression>),
    Ratio(Box<CompiledExpression>, Box<CompiledExpression>),
    Min(Vec<CompiledExpression>),
    Max(Vec<CompiledExpression>),
    Not(Box<CompiledExpression>),
    All(Vec<CompiledExpression>),
    Any(Vec<CompiledExpression>),
}

fn as_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Values of the chooser attributes, column by column.
#[derive(Clone, Debug, Default)]
pub struct ChooserColumns {
    numeric: Vec<Vec<f64>>,
    text: Vec<Vec<String>>,
}

impl ChooserColumns {
    /// Gathers the attributes of the registry for the given choosers.
    ///
    /// Returns an error if an attribute is missing or has an unexpected type for a chooser.
    pub fn gather(registry: &FieldRegistry, choosers: &[&Tour]) -> Result<Self, SchedulingError> {
        let missing = |name: &str, tour: &Tour| {
            spec_error(format!(
                "attribute `{name}` is missing or invalid for tour {}",
                tour.id
            ))
        };
        let numeric = registry
            .chooser_numeric
            .iter()
            .map(|name| {
                choosers
                    .iter()
                    .map(|tour| {
                        tour.attribute(name)
                            .and_then(|v| v.as_f64())
                            .ok_or_else(|| missing(name, tour))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let text = registry
            .chooser_text
            .iter()
            .map(|name| {
                choosers
                    .iter()
                    .map(|tour| {
                        tour.attribute(name)
                            .and_then(|v| v.as_text().map(str::to_owned))
                            .ok_or_else(|| missing(name, tour))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ChooserColumns { numeric, text })
    }
}

/// One row at which expressions are evaluated.
#[derive(Clone, Copy, Debug)]
pub struct Row<'a> {
    /// Index of the chooser in the [ChooserColumns].
    pub chooser: usize,
    /// Alternative of the row (`None` when choosing among fixed labelled alternatives).
    pub alternative: Option<&'a TddAlternative>,
    /// Containment window of the chooser.
    pub bound: Window,
}

impl CompiledExpression {
    /// Evaluates the expression at the given row.
    pub fn eval(&self, row: Row, columns: &ChooserColumns) -> f64 {
        let eval_all = |exprs: &[CompiledExpression]| {
            exprs
                .iter()
                .map(|e| e.eval(row, columns))
                .collect::<Vec<_>>()
        };
        match self {
            Self::Field(Field::Alternative(f)) => row
                .alternative
                .map_or(f64::NAN, |alt| f.get(alt.window())),
            Self::Field(Field::Containment(f)) => f.get(row.bound),
            Self::Field(Field::ChooserNumeric(i)) => columns.numeric[*i][row.chooser],
            // Text fields are rejected at compile time outside of `TextEquals`.
            Self::Field(Field::ChooserText(_)) => f64::NAN,
            Self::Constant(x) => *x,
            Self::TextEquals { column, value } => as_f64(columns.text[*column][row.chooser] == *value),
            Self::Compare(op, left, right) => {
                as_f64(op.apply(left.eval(row, columns), right.eval(row, columns)))
            }
            Self::Between(e, low, high) => {
                let x = e.eval(row, columns);
                as_f64(*low <= x && x <= *high)
            }
            Self::Sum(exprs) => eval_all(exprs).into_iter().sum(),
            Self::Product(exprs) => eval_all(exprs).into_iter().product(),
            Self::Difference(a, b) => a.eval(row, columns) - b.eval(row, columns),
            Self::Ratio(a, b) => a.eval(row, columns) / b.eval(row, columns),
            Self::Min(exprs) => eval_all(exprs).into_iter().fold(f64::INFINITY, f64::min),
            Self::Max(exprs) => eval_all(exprs)
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max),
            Self::Not(e) => as_f64(e.eval(row, columns) == 0.0),
            Self::All(exprs) => as_f64(eval_all(exprs).into_iter().all(|x| x != 0.0)),
            Self::Any(exprs) => as_f64(eval_all(exprs).into_iter().any(|x| x != 0.0)),
        }
    }
}

/// Compiles an expression against a registry and the named constants of the model.
pub fn compile(
    expression: &Expression,
    registry: &FieldRegistry,
    constants: &BTreeMap<String, f64>,
) -> Result<CompiledExpression, SchedulingError> {
    let numeric = |e: &Expression| compile(e, registry, constants);
    let numeric_all =
        |es: &[Expression]| es.iter().map(numeric).collect::<Result<Vec<_>, _>>();
    let boxed = |e: &Expression| numeric(e).map(Box::new);
    Ok(match expression {
        Expression::Field(name) => {
            let field = registry.resolve(name)?;
            if FieldRegistry::field_type(field) == FieldType::Text {
                return Err(spec_error(format!(
                    "text field `{name}` used in a numeric expression"
                )));
            }
            CompiledExpression::Field(field)
        }
        Expression::Constant(x) => CompiledExpression::Constant(*x),
        Expression::Named(name) => CompiledExpression::Constant(
            *constants
                .get(name)
                .ok_or_else(|| spec_error(format!("unknown constant `{name}`")))?,
        ),
        Expression::Equals { field, value } => match (registry.resolve(field)?, value) {
            (Field::ChooserText(column), Value::Text(s)) => CompiledExpression::TextEquals {
                column,
                value: s.clone(),
            },
            (Field::ChooserText(_), _) => {
                return Err(spec_error(format!(
                    "text field `{field}` compared to a numeric value"
                )))
            }
            (f, v) => CompiledExpression::Compare(
                Comparison::Eq,
                Box::new(CompiledExpression::Field(f)),
                Box::new(CompiledExpression::Constant(v.as_f64().ok_or_else(|| {
                    spec_error(format!("numeric field `{field}` compared to a text value"))
                })?)),
            ),
        },
        Expression::Compare { op, left, right } => {
            CompiledExpression::Compare(*op, boxed(left)?, boxed(right)?)
        }
        Expression::Between {
            expression,
            low,
            high,
        } => CompiledExpression::Between(boxed(expression)?, *low, *high),
        Expression::Sum(es) => CompiledExpression::Sum(numeric_all(es)?),
        Expression::Product(es) => CompiledExpression::Product(numeric_all(es)?),
        Expression::Difference(a, b) => CompiledExpression::Difference(boxed(a)?, boxed(b)?),
        Expression::Ratio(a, b) => CompiledExpression::Ratio(boxed(a)?, boxed(b)?),
        Expression::Min(es) => CompiledExpression::Min(numeric_all(es)?),
        Expression::Max(es) => CompiledExpression::Max(numeric_all(es)?),
        Expression::Not(e) => CompiledExpression::Not(boxed(e)?),
        Expression::All(es) => CompiledExpression::All(numeric_all(es)?),
        Expression::Any(es) => CompiledExpression::Any(numeric_all(es)?),
    })
}

/// A [ChoiceSpec] compiled against a [FieldRegistry].
#[derive(Clone, Debug)]
pub struct CompiledSpec {
    columns: Vec<String>,
    descriptions: Vec<String>,
    terms: Vec<CompiledExpression>,
    /// Coefficients, indexed by term then by column.
    coefficients: Vec<Vec<f64>>,
    registry: FieldRegistry,
}

impl CompiledSpec {
    /// Compiles all the terms of a specification.
    ///
    /// Returns an error naming the term if one of the expressions cannot be compiled.
    pub fn compile(
        spec: &ChoiceSpec,
        registry: FieldRegistry,
        constants: &BTreeMap<String, f64>,
    ) -> Result<Self, SchedulingError> {
        let terms = spec
            .terms
            .iter()
            .map(|term| {
                compile(&term.expression, &registry, constants).map_err(|e| match e {
                    SchedulingError::SpecEvaluation(msg) => {
                        spec_error(format!("term `{}`: {msg}", term.description))
                    }
                    e => e,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledSpec {
            columns: spec.columns.clone(),
            descriptions: spec.terms.iter().map(|t| t.description.clone()).collect(),
            terms,
            coefficients: spec.terms.iter().map(|t| t.coefficients.clone()).collect(),
            registry,
        })
    }

    /// Returns the labels of the columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the descriptions of the terms.
    pub fn descriptions(&self) -> &[String] {
        &self.descriptions
    }

    /// Returns the number of terms.
    pub fn nb_terms(&self) -> usize {
        self.terms.len()
    }

    /// Returns the coefficient of a term for a column.
    pub fn coefficient(&self, term: usize, column: usize) -> f64 {
        self.coefficients[term][column]
    }

    /// Returns the field registry the choice spec was compiled against.
    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// Evaluates every term at every row of an interaction dataset.
    ///
    /// The result is indexed by term, then by row.
    pub fn eval_interaction_variables(
        &self,
        dataset: &InteractionDataset,
        alternatives: &TddAlternatives,
        columns: &ChooserColumns,
    ) -> Vec<Vec<f64>> {
        self.terms
            .iter()
            .map(|term| {
                let mut values = Vec::with_capacity(dataset.nb_rows());
                for i in 0..dataset.nb_choosers() {
                    let bound = dataset.bound(i);
                    for r in dataset.rows(i) {
                        let row = Row {
                            chooser: i,
                            alternative: Some(alternatives.at(dataset.alternative(r))),
                            bound,
                        };
                        values.push(term.eval(row, columns));
                    }
                }
                values
            })
            .collect()
    }

    /// Evaluates every term for every chooser (chooser fields only).
    ///
    /// The result is indexed by term, then by chooser.
    pub fn eval_variables(&self, nb_choosers: usize, columns: &ChooserColumns, day: Window) -> Vec<Vec<f64>> {
        self.terms
            .iter()
            .map(|term| {
                (0..nb_choosers)
                    .map(|chooser| {
                        term.eval(
                            Row {
                                chooser,
                                alternative: None,
                                bound: day,
                            },
                            columns,
                        )
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tours::TourCategory;
    use crate::units::Bin;

    fn get_choosers() -> Vec<Tour> {
        vec![
            Tour::new(1, 1, 1, TourCategory::Atwork, Some(10))
                .with_attribute("purpose", Value::Text("eat".to_owned()))
                .with_attribute("income", Value::Float(30000.))
                .with_attribute("age", Value::Int(40)),
            Tour::new(2, 2, 1, TourCategory::Atwork, Some(11))
                .with_attribute("purpose", Value::Text("business".to_owned()))
                .with_attribute("income", Value::Int(80000))
                .with_attribute("age", Value::Text("unknown".to_owned())),
        ]
    }

    #[test]
    fn registry_test() {
        let choosers = get_choosers();
        let refs: Vec<_> = choosers.iter().collect();
        let registry = FieldRegistry::for_interaction(&refs);
        assert_eq!(registry.resolve("start").unwrap(), Field::Alternative(WindowField::Start));
        assert_eq!(
            registry.resolve("parent_end").unwrap(),
            Field::Containment(WindowField::End)
        );
        assert!(matches!(registry.resolve("income").unwrap(), Field::ChooserNumeric(_)));
        assert!(matches!(registry.resolve("purpose").unwrap(), Field::ChooserText(_)));
        assert!(matches!(
            registry.resolve("number_of_participants").unwrap(),
            Field::ChooserNumeric(_)
        ));
        // Inconsistent type.
        assert!(registry.resolve("age").is_err());
        assert!(registry.resolve("unknown").is_err());
        // Chooser-only registry.
        let registry = FieldRegistry::for_choosers(&refs);
        assert!(registry.resolve("start").is_err());
    }

    #[test]
    fn compile_errors_test() {
        let choosers = get_choosers();
        let refs: Vec<_> = choosers.iter().collect();
        let registry = FieldRegistry::for_interaction(&refs);
        let constants = BTreeMap::new();
        assert!(compile(&Expression::field("missing"), &registry, &constants).is_err());
        assert!(compile(&Expression::field("purpose"), &registry, &constants).is_err());
        assert!(compile(&Expression::Named("c".to_owned()), &registry, &constants).is_err());
        let expr = Expression::Equals {
            field: "purpose".to_owned(),
            value: Value::Int(1),
        };
        assert!(compile(&expr, &registry, &constants).is_err());
        let expr = Expression::Equals {
            field: "income".to_owned(),
            value: Value::Text("high".to_owned()),
        };
        assert!(compile(&expr, &registry, &constants).is_err());
        // The error names the term.
        let spec = ChoiceSpec::interaction(vec![SpecTerm::new(
            "bad term",
            Expression::field("missing"),
            1.0,
        )])
        .unwrap();
        let err = CompiledSpec::compile(&spec, registry, &constants).unwrap_err();
        assert!(err.to_string().contains("bad term"));
    }

    #[test]
    fn eval_test() {
        let choosers = get_choosers();
        let refs: Vec<_> = choosers.iter().collect();
        let registry = FieldRegistry::for_interaction(&refs);
        let columns = ChooserColumns::gather(&registry, &refs).unwrap();
        let mut constants = BTreeMap::new();
        constants.insert("income_scale".to_owned(), 1e-4);
        let alt = TddAlternative {
            code: 0,
            start: Bin(10),
            end: Bin(13),
        };
        let eval = |expr: Expression, chooser: usize| {
            let compiled = compile(&expr, &registry, &constants).unwrap();
            compiled.eval(
                Row {
                    chooser,
                    alternative: Some(&alt),
                    bound: Window::new(8, 18),
                },
                &columns,
            )
        };
        assert_eq!(eval(Expression::field("duration"), 0), 3.);
        assert_eq!(eval(Expression::field("parent_duration"), 0), 10.);
        let expr = Expression::Product(vec![
            Expression::field("income"),
            Expression::Named("income_scale".to_owned()),
        ]);
        assert!((eval(expr.clone(), 0) - 3.).abs() < 1e-12);
        assert!((eval(expr, 1) - 8.).abs() < 1e-12);
        let eat = Expression::Equals {
            field: "purpose".to_owned(),
            value: Value::Text("eat".to_owned()),
        };
        assert_eq!(eval(eat.clone(), 0), 1.);
        assert_eq!(eval(eat.clone(), 1), 0.);
        assert_eq!(eval(Expression::Not(Box::new(eat)), 1), 1.);
        let early = Expression::compare(
            Comparison::Lt,
            Expression::field("start"),
            Expression::Constant(11.),
        );
        assert_eq!(eval(early, 0), 1.);
        let between = Expression::Between {
            expression: Box::new(Expression::field("end")),
            low: 12.,
            high: 14.,
        };
        assert_eq!(eval(between, 0), 1.);
        let mixed = Expression::Min(vec![
            Expression::field("duration"),
            Expression::Constant(2.),
        ]);
        assert_eq!(eval(mixed, 0), 2.);
    }

    #[test]
    fn spec_validation_test() {
        let term = SpecTerm {
            description: "duration".to_owned(),
            expression: Expression::field("duration"),
            coefficients: vec![1., 2.],
        };
        assert!(ChoiceSpec::interaction(vec![term.clone()]).is_err());
        assert!(ChoiceSpec::new(vec!["a".to_owned(), "b".to_owned()], vec![term.clone()]).is_ok());
        assert!(ChoiceSpec::new(vec!["a".to_owned(), "a".to_owned()], vec![term]).is_err());
        let js = r#"{
            "terms": [
                {"description": "Duration", "expression": {"type": "Field", "value": "duration"},
                 "coefficients": [-0.1]},
                {"description": "Eat", "expression": {"type": "Equals",
                 "value": {"field": "purpose", "value": "eat"}}, "coefficients": [0.5]}
            ]
        }"#;
        let spec: ChoiceSpec = serde_json::from_str(js).unwrap();
        assert_eq!(spec.columns, vec!["coefficient".to_owned()]);
        assert_eq!(spec.terms.len(), 2);
    }
}
