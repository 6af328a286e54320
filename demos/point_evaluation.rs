use funcplot_rs::evaluate_at_point;

fn main() {
    pretty_env_logger::init();

    let expression = "x**3 - 2*x + 1";
    for x in [-2.0, -1.0, 0.0, 1.0, 2.0] {
        let result = evaluate_at_point(expression, "x", x);
        println!("{}", result.message);
    }

    let result = evaluate_at_point("1/(x-2)", "x", 2.0);
    println!("{}", result.message);
}
