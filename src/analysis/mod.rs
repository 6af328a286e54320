//! Static domain analysis.
//!
//! Finds the values where an expression is undefined (zero denominators,
//! negative radicands, non-positive logarithm arguments) and where it crosses
//! the axes. Everything here is best effort: an expression the analysis cannot
//! see through yields a warning without critical points rather than an error,
//! and over-reporting is preferred to missing a restriction.

use crate::ast::{evaluate, ASTNode, Bindings, Evaluator, Operator, Simplifier};
use crate::functions::FunctionKind;
use log::debug;
use std::fmt;

mod fraction;
mod polynomial;
mod roots;
mod sign;

pub use fraction::{atoms, Factors, Fraction};
pub use polynomial::Polynomial;
pub use roots::{bisect, bracketed_roots};
pub use sign::{is_non_negative, is_positive};

/// Steps of the numeric scan used when no closed form is available.
const SEARCH_STEPS: usize = 2000;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WarningKind {
    DivisionByZero,
    NonNegativeArgument,
    PositiveArgument,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainWarning {
    pub kind: WarningKind,
    pub subexpression: ASTNode,
    /// Real roots of `subexpression`, when it could be solved.
    pub critical_points: Vec<f64>,
    pub description: String,
}

impl DomainWarning {
    pub fn new(kind: WarningKind, subexpression: ASTNode, critical_points: Vec<f64>) -> Self {
        let description = match kind {
            WarningKind::DivisionByZero => format!("{} ≠ 0", subexpression),
            WarningKind::NonNegativeArgument => format!("{} ≥ 0", subexpression),
            WarningKind::PositiveArgument => format!("{} > 0", subexpression),
        };
        Self {
            kind,
            subexpression,
            critical_points,
            description,
        }
    }
}

impl fmt::Display for DomainWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Possible domain restriction: {}", self.description)
    }
}

fn single_variable(node: &ASTNode) -> Option<String> {
    let mut variables = node.free_variables();
    match variables.len() {
        1 => variables.pop(),
        _ => None,
    }
}

fn polynomial_roots(node: &ASTNode) -> Vec<f64> {
    single_variable(node)
        .and_then(|variable| Polynomial::from_ast(node, &variable))
        .map(|polynomial| polynomial.real_roots())
        .unwrap_or_default()
}

/// Collects the domain warnings of `ast`, deduplicated by description.
pub fn analyze_domain(ast: &ASTNode) -> Vec<DomainWarning> {
    let mut warnings = Vec::new();

    for (factor, _) in Fraction::of(ast).restrictions() {
        division_warnings(&factor, &mut warnings);
    }
    argument_warnings(ast, &mut warnings);

    let mut seen = std::collections::HashSet::new();
    warnings.retain(|warning| seen.insert(warning.description.clone()));
    debug!("Domain warnings for '{}': {}", ast, warnings.len());
    warnings
}

fn division_warnings(factor: &ASTNode, warnings: &mut Vec<DomainWarning>) {
    if factor.is_constant() {
        return;
    }

    let polynomial = single_variable(factor)
        .and_then(|variable| Some((Polynomial::from_ast(factor, &variable)?, variable)));
    match polynomial {
        Some((polynomial, variable)) => {
            for piece in polynomial.factor() {
                warnings.push(DomainWarning::new(
                    WarningKind::DivisionByZero,
                    piece.to_ast(&variable),
                    piece.real_roots(),
                ));
            }
        }
        None => warnings.push(DomainWarning::new(
            WarningKind::DivisionByZero,
            factor.clone(),
            Vec::new(),
        )),
    }
}

fn argument_warnings(node: &ASTNode, warnings: &mut Vec<DomainWarning>) {
    match node {
        ASTNode::Constant(_) | ASTNode::Variable(_) => {}
        ASTNode::UnaryOperation { operand, .. } => argument_warnings(operand, warnings),
        ASTNode::BinaryOperation {
            left,
            operator,
            right,
        } => {
            if *operator == Operator::Power && has_fractional_exponent(right) && !is_non_negative(left) {
                warnings.push(DomainWarning::new(
                    WarningKind::NonNegativeArgument,
                    left.as_ref().clone(),
                    polynomial_roots(left),
                ));
            }
            argument_warnings(left, warnings);
            argument_warnings(right, warnings);
        }
        ASTNode::FunctionCall { function, args } => {
            if let [argument] = args.as_slice() {
                match function {
                    FunctionKind::Sqrt if !is_non_negative(argument) => {
                        warnings.push(DomainWarning::new(
                            WarningKind::NonNegativeArgument,
                            argument.clone(),
                            polynomial_roots(argument),
                        ))
                    }
                    FunctionKind::Log if !is_positive(argument) => {
                        warnings.push(DomainWarning::new(
                            WarningKind::PositiveArgument,
                            argument.clone(),
                            polynomial_roots(argument),
                        ))
                    }
                    _ => {}
                }
            }
            for arg in args {
                argument_warnings(arg, warnings);
            }
        }
    }
}

fn has_fractional_exponent(exponent: &ASTNode) -> bool {
    if !exponent.is_constant() {
        return false;
    }
    evaluate(exponent, &Bindings::new()).is_ok_and(|value| value.fract() != 0.0)
}

/// Critical points of `ast` inside `[low, high]`, sorted and deduplicated.
///
/// Besides the solved roots of every warning, restrictions that could not be
/// solved symbolically are scanned numerically over the range.
pub fn critical_points_within(
    ast: &ASTNode,
    variable: &str,
    low: f64,
    high: f64,
    evaluator: &Evaluator,
) -> Vec<f64> {
    let mut points = Vec::new();
    if !(low < high) {
        return points;
    }

    for warning in analyze_domain(ast) {
        if warning.critical_points.is_empty() {
            if single_variable(&warning.subexpression).as_deref() == Some(variable) {
                let subexpression = &warning.subexpression;
                points.extend(bracketed_roots(
                    |x| evaluator.evaluate_at(subexpression, variable, x).ok(),
                    low,
                    high,
                    SEARCH_STEPS,
                ));
            }
        } else {
            points.extend(
                warning
                    .critical_points
                    .iter()
                    .copied()
                    .filter(|x| (low..=high).contains(x)),
            );
        }
    }

    sort_unique(points)
}

fn sort_unique(mut points: Vec<f64>) -> Vec<f64> {
    points.sort_by(f64::total_cmp);
    points.dedup_by(|a, b| (*a - *b).abs() <= 1e-9 * a.abs().max(1.0));
    points
}

/// Where the graph meets the axes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AxisIntersections {
    pub x_axis: Vec<f64>,
    pub y_axis: Option<f64>,
}

impl AxisIntersections {
    /// All intersections as `(x, y)` points, x-axis first.
    pub fn points(&self) -> Vec<(f64, f64)> {
        let mut points: Vec<(f64, f64)> = self.x_axis.iter().map(|x| (*x, 0.0)).collect();
        if let Some(y) = self.y_axis {
            if !points.contains(&(0.0, y)) {
                points.push((0.0, y));
            }
        }
        points
    }
}

/// Solves `ast = 0` in `variable` and evaluates the expression at 0.
///
/// Roots of a polynomial numerator are exact and not limited to
/// `search_range`; any other numerator is scanned numerically over
/// `search_range`. Only roots where `ast` itself is defined are kept.
pub fn intersections(
    ast: &ASTNode,
    variable: &str,
    search_range: (f64, f64),
    evaluator: &Evaluator,
) -> AxisIntersections {
    let numerator = Fraction::of(ast).numerator;
    let numerator = Simplifier::new(evaluator)
        .simplify_verified(&numerator)
        .unwrap_or(numerator);

    let candidates = if single_variable(&numerator).as_deref() != Some(variable) {
        Vec::new()
    } else {
        match Polynomial::from_ast(&numerator, variable) {
            Some(polynomial) => polynomial
                .factor()
                .iter()
                .flat_map(Polynomial::real_roots)
                .collect(),
            None => bracketed_roots(
                |x| evaluator.evaluate_at(&numerator, variable, x).ok(),
                search_range.0,
                search_range.1,
                SEARCH_STEPS,
            ),
        }
    };

    let x_axis = sort_unique(
        candidates
            .into_iter()
            .filter(|x| evaluator.evaluate_at(ast, variable, *x).is_ok())
            .collect(),
    );
    let y_axis = evaluator.evaluate_at(ast, variable, 0.0).ok();

    AxisIntersections { x_axis, y_axis }
}

/// Observed extent of the values over a set of sample points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeEstimate {
    pub min: f64,
    pub max: f64,
    /// Number of sample points where the expression was defined.
    pub evaluated: usize,
}

impl fmt::Display for RangeEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Minimum and maximum over the integers -10..=10; `None` when the
/// expression is undefined at all of them.
pub fn estimate_range(ast: &ASTNode, variable: &str, evaluator: &Evaluator) -> Option<RangeEstimate> {
    let values: Vec<f64> = (-10..=10)
        .filter_map(|x| evaluator.evaluate_at(ast, variable, x as f64).ok())
        .collect();

    let min = values.iter().copied().reduce(f64::min)?;
    let max = values.iter().copied().reduce(f64::max)?;
    Some(RangeEstimate {
        min,
        max,
        evaluated: values.len(),
    })
}

/// Where an expression is defined inside a range, as disjoint open
/// intervals in ascending order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Domain {
    pub intervals: Vec<(f64, f64)>,
}

impl Domain {
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn contains(&self, x: f64) -> bool {
        self.intervals.iter().any(|(low, high)| *low < x && x < *high)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.intervals.is_empty() {
            return write!(f, "∅");
        }
        for (index, (low, high)) in self.intervals.iter().enumerate() {
            if index > 0 {
                write!(f, " ∪ ")?;
            }
            write!(f, "({}, {})", low, high)?;
        }
        Ok(())
    }
}

/// The part of `range` where `ast` is defined.
///
/// The critical points cut the range into pieces on which every radicand,
/// logarithm argument and denominator keeps its sign, so one evaluation per
/// piece decides it. Neighbouring pieces are joined when the expression is
/// also defined at the point between them.
pub fn domain(ast: &ASTNode, variable: &str, range: (f64, f64), evaluator: &Evaluator) -> Domain {
    let (low, high) = range;
    if !(low < high) || !low.is_finite() || !high.is_finite() {
        return Domain::default();
    }

    let mut bounds = vec![low];
    bounds.extend(critical_points_within(ast, variable, low, high, evaluator));
    bounds.push(high);
    bounds.dedup();

    let defined = |x: f64| evaluator.evaluate_at(ast, variable, x).is_ok();
    let mut intervals: Vec<(f64, f64)> = Vec::new();
    for window in bounds.windows(2) {
        let (start, end) = (window[0], window[1]);
        if !defined(0.5 * (start + end)) {
            continue;
        }
        match intervals.last_mut() {
            Some((_, previous_end)) if *previous_end == start && defined(start) => {
                *previous_end = end
            }
            _ => intervals.push((start, end)),
        }
    }

    debug!("Domain of '{}' in [{}, {}]: {:?}", ast, low, high, intervals);
    Domain { intervals }
}
