//! End-to-end plotting: text in, renderer-ready data out.

use crate::analysis::{domain, estimate_range, intersections, Domain, RangeEstimate};
use crate::ast::{Evaluator, ExpressionParser, ParseOptions, ParseOutcome};
use crate::functions::FunctionTable;
use log::{debug, info};

mod sampler;

pub use sampler::{sample, SampleSeries, Sampler, SamplerConfig, Segment};

#[derive(Debug, Clone, PartialEq)]
pub struct PlotRequest {
    pub variable: String,
    pub x_range: (f64, f64),
    /// Vertical window hint for the renderer.
    pub y_range: Option<(f64, f64)>,
    pub resolution: usize,
    pub intersections: bool,
    /// Marks the curve at this x.
    pub evaluate_at: Option<f64>,
}

impl Default for PlotRequest {
    fn default() -> Self {
        Self {
            variable: "x".to_string(),
            x_range: (-10.0, 10.0),
            y_range: None,
            resolution: 1000,
            intersections: true,
            evaluate_at: None,
        }
    }
}

impl PlotRequest {
    pub fn with_variable(mut self, variable: &str) -> Self {
        self.variable = variable.to_string();
        self
    }

    pub fn with_x_range(mut self, low: f64, high: f64) -> Self {
        self.x_range = (low, high);
        self
    }

    pub fn with_y_range(mut self, low: f64, high: f64) -> Self {
        self.y_range = Some((low, high));
        self
    }

    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_intersections(mut self, enabled: bool) -> Self {
        self.intersections = enabled;
        self
    }

    pub fn with_evaluate_at(mut self, x: f64) -> Self {
        self.evaluate_at = Some(x);
        self
    }
}

/// Everything a renderer needs to draw one function.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotData {
    pub series: SampleSeries,
    /// Axis crossings inside the plotted x-range.
    pub intersections: Vec<(f64, f64)>,
    pub evaluated_point: Option<(f64, f64)>,
    /// Where the function is defined inside the x-range.
    pub domain: Domain,
    pub x_range: (f64, f64),
    pub y_range: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotReport {
    pub success: bool,
    pub message: String,
    pub outcome: ParseOutcome,
    pub data: Option<PlotData>,
}

/// Result of evaluating an expression at a single point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointEvaluation {
    pub success: bool,
    pub value: Option<f64>,
    pub message: String,
}

/// Parser and evaluator sharing one function table.
pub struct Plotter {
    parser: ExpressionParser,
    evaluator: Evaluator,
}

impl Default for Plotter {
    fn default() -> Self {
        Self::new(FunctionTable::default())
    }
}

impl Plotter {
    pub fn new(functions: FunctionTable) -> Self {
        Self {
            evaluator: Evaluator::with_functions(functions.clone(), 100),
            parser: ExpressionParser::new(functions),
        }
    }

    pub fn plot(&self, text: &str, request: &PlotRequest) -> PlotReport {
        let variable = request.variable.as_str();
        let outcome = self.parser.parse(text, &ParseOptions::allow(&[variable]));

        let parsed = match &outcome {
            Ok(parsed) => parsed,
            Err(e) => {
                return PlotReport {
                    success: false,
                    message: format!("Could not parse '{}': {}", text, e),
                    outcome,
                    data: None,
                }
            }
        };

        let (low, high) = request.x_range;
        let config = SamplerConfig::default().with_resolution(request.resolution);
        let series = Sampler::new(&self.evaluator, config).sample(&parsed.ast, variable, low, high);

        if series.is_empty() {
            let message = if low < high {
                format!(
                    "f({}) = {} has no real values in [{}, {}]",
                    variable, parsed.ast, low, high
                )
            } else {
                format!("Invalid range: [{}, {}]", low, high)
            };
            return PlotReport {
                success: false,
                message,
                outcome,
                data: None,
            };
        }

        let intersections = if request.intersections {
            intersections(&parsed.ast, variable, (low, high), &self.evaluator)
                .points()
                .into_iter()
                .filter(|(x, _)| (low..=high).contains(x))
                .collect()
        } else {
            Vec::new()
        };

        let evaluated_point = request.evaluate_at.and_then(|x| {
            self.evaluator
                .evaluate_at(&parsed.ast, variable, x)
                .ok()
                .map(|y| (x, y))
        });

        debug!(
            "Plot of '{}': {} points, {} intersections",
            parsed.ast,
            series.len(),
            intersections.len()
        );
        info!("Plotted f({}) = {} over [{}, {}]", variable, parsed.ast, low, high);

        let mut message = format!(
            "Plotted f({}) = {} over [{}, {}]",
            variable, parsed.ast, low, high
        );
        if !parsed.warnings.is_empty() {
            message.push_str(&format!(" ({} domain warning(s))", parsed.warnings.len()));
        }

        let data = PlotData {
            series,
            intersections,
            evaluated_point,
            domain: domain(&parsed.ast, variable, (low, high), &self.evaluator),
            x_range: request.x_range,
            y_range: request.y_range,
        };
        PlotReport {
            success: true,
            message,
            outcome,
            data: Some(data),
        }
    }

    pub fn evaluate_at_point(&self, text: &str, variable: &str, x: f64) -> PointEvaluation {
        let ast = match self.parser.parse(text, &ParseOptions::allow(&[variable])) {
            Ok(parsed) => parsed.ast,
            Err(e) => {
                return PointEvaluation {
                    success: false,
                    value: None,
                    message: format!("Could not parse '{}': {}", text, e),
                }
            }
        };

        match self.evaluator.evaluate_at(&ast, variable, x) {
            Ok(value) => PointEvaluation {
                success: true,
                value: Some(value),
                message: format!("f({}) = {}", x, value),
            },
            Err(e) => PointEvaluation {
                success: false,
                value: None,
                message: format!("f({}) is undefined: {}", x, e),
            },
        }
    }

    /// Open intervals of `range` where `text` is defined.
    pub fn domain(&self, text: &str, variable: &str, range: (f64, f64)) -> Option<Domain> {
        let ast = self
            .parser
            .parse(text, &ParseOptions::allow(&[variable]))
            .ok()?
            .ast;
        Some(domain(&ast, variable, range, &self.evaluator))
    }

    /// The observed value range over the integers -10..=10.
    pub fn estimate_range(&self, text: &str, variable: &str) -> Option<RangeEstimate> {
        let ast = self
            .parser
            .parse(text, &ParseOptions::allow(&[variable]))
            .ok()?
            .ast;
        estimate_range(&ast, variable, &self.evaluator)
    }
}

/// Parses and samples `text` with the default function table.
pub fn plot_expression(text: &str, request: &PlotRequest) -> PlotReport {
    Plotter::default().plot(text, request)
}

/// Parses `text` and evaluates it at `variable = x`.
pub fn evaluate_at_point(text: &str, variable: &str, x: f64) -> PointEvaluation {
    Plotter::default().evaluate_at_point(text, variable, x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ParseError;

    #[test]
    fn test_plot_quadratic() {
        let request = PlotRequest::default().with_x_range(-1.0, 5.0);
        let report = plot_expression("x**2 - 4*x + 3", &request);

        assert!(report.success, "{}", report.message);
        assert_eq!(report.message, "Plotted f(x) = x^2 - 4*x + 3 over [-1, 5]");
        let data = report.data.unwrap();
        assert_eq!(data.series.segments.len(), 1);
        assert_eq!(data.intersections, vec![(1.0, 0.0), (3.0, 0.0), (0.0, 3.0)]);
        assert_eq!(data.x_range, (-1.0, 5.0));
        assert_eq!(data.domain.intervals, vec![(-1.0, 5.0)]);
        assert!(report.outcome.unwrap().warnings.is_empty());
    }

    #[test]
    fn test_plot_reports_parse_errors() {
        let report = plot_expression("y + 1", &PlotRequest::default());
        assert!(!report.success);
        assert!(report.data.is_none());
        assert!(report.message.contains("Variables not allowed"));
        assert!(matches!(
            report.outcome,
            Err(ParseError::InvalidVariable { .. })
        ));
    }

    #[test]
    fn test_plot_with_warnings_and_marker() {
        let request = PlotRequest::default()
            .with_x_range(-5.0, 5.0)
            .with_evaluate_at(3.0)
            .with_y_range(-10.0, 10.0);
        let report = plot_expression("1/(x-2)", &request);

        assert!(report.success);
        assert!(report.message.ends_with("(1 domain warning(s))"));
        let data = report.data.unwrap();
        assert!(data.series.segments.len() >= 2);
        assert_eq!(data.evaluated_point, Some((3.0, 1.0)));
        assert_eq!(data.intersections, vec![(0.0, -0.5)]);
        assert_eq!(data.y_range, Some((-10.0, 10.0)));
        assert_eq!(data.domain.to_string(), "(-5, 2) ∪ (2, 5)");
    }

    #[test]
    fn test_intersections_outside_range_are_dropped() {
        let request = PlotRequest::default().with_x_range(2.0, 5.0);
        let data = plot_expression("x**2 - 4*x + 3", &request).data.unwrap();
        assert_eq!(data.intersections, vec![(3.0, 0.0)]);

        let request = request.with_intersections(false);
        let data = plot_expression("x**2 - 4*x + 3", &request).data.unwrap();
        assert!(data.intersections.is_empty());
    }

    #[test]
    fn test_plot_without_real_values() {
        let report = plot_expression("sqrt(-1 - x^2)", &PlotRequest::default());
        assert!(!report.success);
        assert!(report.outcome.is_ok());
        assert!(report.message.contains("no real values"));
    }

    #[test]
    fn test_plot_invalid_range() {
        let request = PlotRequest::default().with_x_range(3.0, -3.0);
        let report = plot_expression("x", &request);
        assert!(!report.success);
        assert_eq!(report.message, "Invalid range: [3, -3]");
    }

    #[test]
    fn test_plot_in_other_variable() {
        let request = PlotRequest::default().with_variable("t").with_x_range(0.0, 1.0);
        let report = plot_expression("2t + 1", &request);
        assert!(report.success);
        assert_eq!(report.data.unwrap().intersections, vec![(0.0, 1.0)]);
    }

    #[test]
    fn test_evaluate_at_point() {
        let result = evaluate_at_point("x**3 - 2*x + 1", "x", 2.0);
        assert!(result.success);
        assert_eq!(result.value, Some(5.0));
        assert_eq!(result.message, "f(2) = 5");

        let result = evaluate_at_point("1/(x-2)", "x", 2.0);
        assert!(!result.success);
        assert_eq!(result.message, "f(2) is undefined: Division by zero");

        let result = evaluate_at_point("x +", "x", 1.0);
        assert!(!result.success);
        assert!(result.message.starts_with("Could not parse"));
    }

    #[test]
    fn test_domain_summary() {
        let plotter = Plotter::default();
        let found = plotter.domain("log(x - 1)", "x", (-10.0, 10.0)).unwrap();
        assert_eq!(found.to_string(), "(1, 10)");
        assert!(plotter.domain("x + y", "x", (-1.0, 1.0)).is_none());
    }

    #[test]
    fn test_estimate_range() {
        let plotter = Plotter::default();
        let estimate = plotter.estimate_range("x^2 - 1", "x").unwrap();
        assert_eq!((estimate.min, estimate.max), (-1.0, 99.0));
        assert!(plotter.estimate_range("y", "x").is_none());
    }
}
