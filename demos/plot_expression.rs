use funcplot_rs::{plot_expression, PlotRequest};

fn main() {
    pretty_env_logger::init();

    let requests = vec![
        ("x**2 - 4*x + 3", PlotRequest::default().with_x_range(-1.0, 5.0)),
        (
            "x**3 - 2*x**2 - x + 2",
            PlotRequest::default().with_x_range(-2.0, 3.0).with_evaluate_at(0.0),
        ),
        ("sin(x)", PlotRequest::default().with_x_range(-6.3, 6.3)),
        ("cos(2x)", PlotRequest::default().with_x_range(-3.2, 3.2)),
        (
            "1/(x-2)",
            PlotRequest::default().with_x_range(-5.0, 5.0).with_y_range(-10.0, 10.0),
        ),
    ];

    for (expression, request) in requests {
        let report = plot_expression(expression, &request);
        println!("{}", report.message);

        let Some(data) = report.data else {
            continue;
        };
        if let Some((low, high)) = data.series.y_bounds() {
            println!(
                "  {} points in {} segment(s), y in [{:.3}, {:.3}]",
                data.series.len(),
                data.series.segments.len(),
                low,
                high
            );
        }
        for (x, y) in &data.intersections {
            println!("  crosses an axis at ({}, {})", x, y);
        }
        if let Some((x, y)) = data.evaluated_point {
            println!("  marked point ({}, {})", x, y);
        }
    }
}
