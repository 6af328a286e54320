use funcplot_rs::ast::{parse, Evaluator, ParseOptions};
use funcplot_rs::domain;

fn main() {
    pretty_env_logger::init();

    let expressions = ["1/(x-2)", "sqrt(x)", "log(x)", "1/(x**2-4)", "tan(x)", "x^2 + 1"];
    let evaluator = Evaluator::new(100);

    for expression in expressions {
        let parsed = match parse(expression, &ParseOptions::default()) {
            Ok(parsed) => parsed,
            Err(err) => {
                println!("Error in '{}': {}", expression, err);
                continue;
            }
        };

        if parsed.warnings.is_empty() {
            println!("{}: no restrictions", parsed.ast);
        } else {
            println!("{}:", parsed.ast);
            for warning in &parsed.warnings {
                println!("  {}", warning);
                if !warning.critical_points.is_empty() {
                    println!("    critical points: {:?}", warning.critical_points);
                }
            }
        }
        let found = domain(&parsed.ast, "x", (-10.0, 10.0), &evaluator);
        println!("  domain in [-10, 10]: {}", found);
    }
}
