pub mod analysis;
pub mod ast;
pub mod functions;
pub mod plot;

use ast::{ParseOptions, Evaluator};

pub use analysis::{analyze_domain, domain, intersections, Domain, DomainWarning, WarningKind};
pub use ast::{parse, Bindings, EvaluationError, ParseError, ParseOutcome};
pub use plot::{evaluate_at_point, plot_expression, PlotReport, PlotRequest, PointEvaluation};

/// Parses and evaluates `expression` in one go, with errors as text.
pub fn evaluate_expression(
    expression: &str,
    context: &std::collections::HashMap<String, f64>,
) -> Result<f64, String> {
    let parsed = parse(expression, &ParseOptions::default()).map_err(|e| e.to_string())?;

    let evaluator = Evaluator::new(100);
    evaluator
        .evaluate(&parsed.ast, context)
        .map_err(|e| e.to_string())
}
