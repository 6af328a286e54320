//! Algebraic clean-up of parsed expressions.
//!
//! Rewrites are deliberately narrow: constant folding, neutral-element removal,
//! like-term combination in sums and merging of repeated variables in
//! products. A rewrite that could widen the domain (`x/x`, `0*sqrt(x)`) is not
//! attempted, and every result is checked against the input at a handful of
//! check points before it is accepted.

use crate::ast::{ASTNode, Bindings, EvaluationError, Evaluator, Operator, UnaryOperator};
use log::trace;

const CHECK_POINTS: [f64; 6] = [-2.3, -0.7, 0.4, 1.9, 3.1, 5.7];
const TOLERANCE: f64 = 1e-9;

pub struct Simplifier<'a> {
    evaluator: &'a Evaluator,
}

impl<'a> Simplifier<'a> {
    pub fn new(evaluator: &'a Evaluator) -> Self {
        Self { evaluator }
    }

    /// Rewrites `ast` and accepts the result only if it evaluates identically
    /// to the input at every check point.
    ///
    /// Returns the reason for rejection otherwise.
    pub fn simplify_verified(&self, ast: &ASTNode) -> Result<ASTNode, String> {
        let simplified = self.rewrite(ast);
        self.verify(ast, &simplified)?;
        trace!("Simplified '{}' to '{}'", ast, simplified);
        Ok(simplified)
    }

    fn verify(&self, original: &ASTNode, simplified: &ASTNode) -> Result<(), String> {
        let variables = original.free_variables();

        for point in 0..CHECK_POINTS.len() {
            let bindings: Bindings = variables
                .iter()
                .enumerate()
                .map(|(offset, name)| {
                    let value = CHECK_POINTS[(point + offset) % CHECK_POINTS.len()];
                    (name.clone(), value)
                })
                .collect();

            let expected = self.evaluator.evaluate(original, &bindings);
            let actual = self.evaluator.evaluate(simplified, &bindings);
            if !agrees(&expected, &actual) {
                return Err(format!(
                    "'{}' and '{}' disagree at check point {}: {:?} vs {:?}",
                    original, simplified, point, expected, actual
                ));
            }
        }

        Ok(())
    }

    fn rewrite(&self, ast: &ASTNode) -> ASTNode {
        match ast {
            ASTNode::Constant(_) | ASTNode::Variable(_) => ast.clone(),

            ASTNode::UnaryOperation {
                operator: UnaryOperator::Negate,
                operand,
            } => match self.rewrite(operand) {
                ASTNode::Constant(value) => ASTNode::Constant(-value),
                ASTNode::UnaryOperation {
                    operator: UnaryOperator::Negate,
                    operand,
                } => *operand,
                inner => ASTNode::negate(inner),
            },

            ASTNode::FunctionCall { function, args } => {
                let args = args.iter().map(|arg| self.rewrite(arg)).collect();
                self.fold(ASTNode::call(function.clone(), args))
            }

            ASTNode::BinaryOperation {
                left,
                operator,
                right,
            } => {
                let left = self.rewrite(left);
                let right = self.rewrite(right);
                match operator {
                    Operator::Add | Operator::Subtract => {
                        combine_sum(&ASTNode::binary(left, *operator, right))
                    }
                    Operator::Multiply => self.combine_product(left, right),
                    Operator::Divide => {
                        if right == ASTNode::Constant(1.0) {
                            left
                        } else {
                            self.fold(ASTNode::binary(left, Operator::Divide, right))
                        }
                    }
                    Operator::Power => {
                        if right == ASTNode::Constant(1.0) {
                            left
                        } else if right == ASTNode::Constant(0.0) && left.is_total() {
                            ASTNode::Constant(1.0)
                        } else {
                            self.fold(ASTNode::binary(left, Operator::Power, right))
                        }
                    }
                }
            }
        }
    }

    /// Replaces a variable-free node by its value when it has one.
    fn fold(&self, node: ASTNode) -> ASTNode {
        if !node.is_constant() {
            return node;
        }
        match self.evaluator.evaluate(&node, &Bindings::new()) {
            Ok(value) => ASTNode::Constant(value),
            Err(_) => node,
        }
    }

    fn combine_product(&self, left: ASTNode, right: ASTNode) -> ASTNode {
        let mut coefficient = 1.0;
        let mut factors = Vec::new();
        collect_factors(left, &mut coefficient, &mut factors);
        collect_factors(right, &mut coefficient, &mut factors);

        let factors = merge_powers(factors);
        if factors.is_empty() {
            return ASTNode::Constant(coefficient);
        }
        if coefficient == 0.0 && factors.iter().all(ASTNode::is_total) {
            return ASTNode::Constant(0.0);
        }

        let mut remaining = factors.into_iter();
        let mut product = match remaining.next() {
            Some(first) => first,
            None => return ASTNode::Constant(coefficient),
        };
        for factor in remaining {
            product = ASTNode::binary(product, Operator::Multiply, factor);
        }
        self.fold(scale(coefficient, product))
    }
}

fn agrees(expected: &Result<f64, EvaluationError>, actual: &Result<f64, EvaluationError>) -> bool {
    match (expected, actual) {
        (Ok(a), Ok(b)) => (a - b).abs() <= TOLERANCE * a.abs().max(1.0),
        (Err(_), Err(_)) => true,
        _ => false,
    }
}

/// `coefficient * node`, with the sign pulled out front.
fn scale(coefficient: f64, node: ASTNode) -> ASTNode {
    let magnitude = coefficient.abs();
    let scaled = if magnitude == 1.0 {
        node
    } else {
        ASTNode::binary(ASTNode::Constant(magnitude), Operator::Multiply, node)
    };
    if coefficient < 0.0 {
        ASTNode::negate(scaled)
    } else {
        scaled
    }
}

/// Splits `c*t`, `t*c` and `-t` into a numeric coefficient and the rest.
fn split_coefficient(node: &ASTNode) -> (f64, ASTNode) {
    match node {
        ASTNode::UnaryOperation {
            operator: UnaryOperator::Negate,
            operand,
        } => {
            let (coefficient, term) = split_coefficient(operand);
            (-coefficient, term)
        }
        ASTNode::BinaryOperation {
            left,
            operator: Operator::Multiply,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (ASTNode::Constant(c), term) | (term, ASTNode::Constant(c)) => (*c, term.clone()),
            _ => (1.0, node.clone()),
        },
        _ => (1.0, node.clone()),
    }
}

fn collect_terms(node: &ASTNode, sign: f64, terms: &mut Vec<(f64, ASTNode)>, constant: &mut f64) {
    match node {
        ASTNode::BinaryOperation {
            left,
            operator: Operator::Add,
            right,
        } => {
            collect_terms(left, sign, terms, constant);
            collect_terms(right, sign, terms, constant);
        }
        ASTNode::BinaryOperation {
            left,
            operator: Operator::Subtract,
            right,
        } => {
            collect_terms(left, sign, terms, constant);
            collect_terms(right, -sign, terms, constant);
        }
        ASTNode::UnaryOperation {
            operator: UnaryOperator::Negate,
            operand,
        } => collect_terms(operand, -sign, terms, constant),
        ASTNode::Constant(value) => *constant += sign * value,
        _ => {
            let (coefficient, term) = split_coefficient(node);
            let coefficient = sign * coefficient;
            // Only terms defined everywhere may cancel.
            let existing = if term.is_total() {
                terms.iter_mut().find(|(_, seen)| *seen == term)
            } else {
                None
            };
            match existing {
                Some((total, _)) => *total += coefficient,
                None => terms.push((coefficient, term)),
            }
        }
    }
}

fn combine_sum(node: &ASTNode) -> ASTNode {
    let mut terms = Vec::new();
    let mut constant = 0.0;
    collect_terms(node, 1.0, &mut terms, &mut constant);

    let mut result: Option<ASTNode> = None;
    for (coefficient, term) in terms {
        if coefficient == 0.0 && term.is_total() {
            continue;
        }
        result = Some(match result {
            None => scale(coefficient, term),
            Some(sum) if coefficient < 0.0 => {
                ASTNode::binary(sum, Operator::Subtract, scale(-coefficient, term))
            }
            Some(sum) => ASTNode::binary(sum, Operator::Add, scale(coefficient, term)),
        });
    }

    match result {
        None => ASTNode::Constant(constant),
        Some(sum) if constant == 0.0 => sum,
        Some(sum) if constant < 0.0 => {
            ASTNode::binary(sum, Operator::Subtract, ASTNode::Constant(-constant))
        }
        Some(sum) => ASTNode::binary(sum, Operator::Add, ASTNode::Constant(constant)),
    }
}

fn collect_factors(node: ASTNode, coefficient: &mut f64, factors: &mut Vec<ASTNode>) {
    match node {
        ASTNode::BinaryOperation {
            left,
            operator: Operator::Multiply,
            right,
        } => {
            collect_factors(*left, coefficient, factors);
            collect_factors(*right, coefficient, factors);
        }
        ASTNode::UnaryOperation {
            operator: UnaryOperator::Negate,
            operand,
        } => {
            *coefficient = -*coefficient;
            collect_factors(*operand, coefficient, factors);
        }
        ASTNode::Constant(value) => *coefficient *= value,
        other => factors.push(other),
    }
}

/// `x`, `x^2` -> `("x", 2)` for non-negative integer exponents.
fn as_variable_power(node: &ASTNode) -> Option<(&str, f64)> {
    match node {
        ASTNode::Variable(name) => Some((name.as_str(), 1.0)),
        ASTNode::BinaryOperation {
            left,
            operator: Operator::Power,
            right,
        } => match (left.as_ref(), right.as_constant()) {
            (ASTNode::Variable(name), Some(exponent))
                if exponent >= 0.0 && exponent.fract() == 0.0 =>
            {
                Some((name.as_str(), exponent))
            }
            _ => None,
        },
        _ => None,
    }
}

fn merge_powers(factors: Vec<ASTNode>) -> Vec<ASTNode> {
    let mut merged: Vec<(Option<(String, f64)>, ASTNode)> = Vec::with_capacity(factors.len());

    for factor in factors {
        let power = as_variable_power(&factor).map(|(name, exponent)| (name.to_string(), exponent));
        match power {
            Some((name, exponent)) => {
                let existing = merged.iter_mut().find_map(|(seen, _)| match seen {
                    Some((seen_name, total)) if *seen_name == name => Some(total),
                    _ => None,
                });
                match existing {
                    Some(total) => *total += exponent,
                    None => merged.push((Some((name, exponent)), factor)),
                }
            }
            None => merged.push((None, factor)),
        }
    }

    merged
        .into_iter()
        .filter_map(|(power, factor)| match power {
            Some((_, exponent)) if exponent == 0.0 => None,
            Some((name, exponent)) if exponent == 1.0 => Some(ASTNode::Variable(name)),
            Some((name, exponent)) => Some(ASTNode::binary(
                ASTNode::Variable(name),
                Operator::Power,
                ASTNode::Constant(exponent),
            )),
            None => Some(factor),
        })
        .collect()
}

/// Simplifies with the default function table, falling back to the input
/// when the rewrite does not verify.
pub fn simplify(ast: &ASTNode) -> ASTNode {
    let evaluator = Evaluator::new(0);
    Simplifier::new(&evaluator)
        .simplify_verified(ast)
        .unwrap_or_else(|_| ast.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{parse, ParseOptions};

    fn simplified(input: &str) -> String {
        let ast = parse(input, &ParseOptions::default()).unwrap().ast;
        simplify(&ast).to_string()
    }

    #[test]
    fn test_constant_folding() {
        assert_eq!(simplified("2*3 + 4"), "10");
        assert_eq!(simplified("2^10"), "1024");
        assert_eq!(simplified("-(-(3))"), "3");
        assert_eq!(simplified("sqrt(16) + x"), "x + 4");
    }

    #[test]
    fn test_failing_constant_is_kept() {
        assert_eq!(simplified("1/0"), "1/0");
        assert_eq!(simplified("sqrt(-1)"), "sqrt(-1)");
    }

    #[test]
    fn test_like_terms() {
        assert_eq!(simplified("x + x + 2*3"), "2*x + 6");
        assert_eq!(simplified("2*x - 5*x"), "-3*x");
        assert_eq!(simplified("x - x"), "0");
        assert_eq!(simplified("x^2 + 3 - x^2*2 + x"), "-x^2 + x + 3");
    }

    #[test]
    fn test_partial_terms_do_not_cancel() {
        assert_eq!(simplified("sin(x) - sin(x)"), "sin(x) - sin(x)");
        assert_eq!(simplified("1/x - 1/x + 1"), "1/x - 1/x + 1");
    }

    #[test]
    fn test_neutral_elements() {
        assert_eq!(simplified("x*1 + 0"), "x");
        assert_eq!(simplified("x^1"), "x");
        assert_eq!(simplified("x/1"), "x");
        assert_eq!(simplified("x^0"), "1");
        assert_eq!(simplified("0*x"), "0");
    }

    #[test]
    fn test_domain_is_not_widened() {
        assert_eq!(simplified("0*sqrt(x)"), "0*sqrt(x)");
        assert_eq!(simplified("(1/x)^0"), "(1/x)^0");
        assert_eq!(simplified("x/x"), "x/x");
    }

    #[test]
    fn test_products_merge_powers() {
        assert_eq!(simplified("x*x*3"), "3*x^2");
        assert_eq!(simplified("x^2*x"), "x^3");
        assert_eq!(simplified("-x*2"), "-2*x");
    }

    #[test]
    fn test_verification_rejects_mismatch() {
        let evaluator = Evaluator::new(0);
        let simplifier = Simplifier::new(&evaluator);
        let original = parse("x + 1", &ParseOptions::default()).unwrap().ast;
        let wrong = ASTNode::variable("x");

        assert!(simplifier.verify(&original, &original).is_ok());
        assert!(simplifier.verify(&original, &wrong).is_err());
    }

    #[test]
    fn test_verification_accepts_matching_errors() {
        let evaluator = Evaluator::new(0);
        let simplifier = Simplifier::new(&evaluator);
        let original = parse("sqrt(-x^2 - 1)", &ParseOptions::default()).unwrap().ast;
        assert!(simplifier.simplify_verified(&original).is_ok());
    }
}
