use std::collections::BTreeSet;
use std::f64::consts::{E, PI};
use std::fmt;

mod evaluator;
pub mod lexer;
mod parser;
mod simplify;

pub use evaluator::*;
pub use lexer::{Token, TokenKind};
pub use parser::*;
pub use simplify::{simplify, Simplifier};

use crate::functions::FunctionKind;

#[derive(Debug, Clone, PartialEq)]
pub enum ASTNode {
    Constant(f64),
    Variable(String),
    BinaryOperation {
        left: Box<ASTNode>,
        operator: Operator,
        right: Box<ASTNode>,
    },
    UnaryOperation {
        operator: UnaryOperator,
        operand: Box<ASTNode>,
    },
    FunctionCall {
        function: FunctionKind,
        args: Vec<ASTNode>,
    },
}

impl ASTNode {
    pub fn variable(name: &str) -> Self {
        ASTNode::Variable(name.to_string())
    }

    pub fn binary(left: ASTNode, operator: Operator, right: ASTNode) -> Self {
        ASTNode::BinaryOperation {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    pub fn negate(operand: ASTNode) -> Self {
        ASTNode::UnaryOperation {
            operator: UnaryOperator::Negate,
            operand: Box::new(operand),
        }
    }

    pub fn call(function: FunctionKind, args: Vec<ASTNode>) -> Self {
        ASTNode::FunctionCall { function, args }
    }

    /// Names of the free variables, sorted lexicographically.
    pub fn free_variables(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names.into_iter().collect()
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            ASTNode::Constant(_) => {}
            ASTNode::Variable(name) => {
                names.insert(name.clone());
            }
            ASTNode::BinaryOperation { left, right, .. } => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            ASTNode::UnaryOperation { operand, .. } => operand.collect_variables(names),
            ASTNode::FunctionCall { args, .. } => {
                for arg in args {
                    arg.collect_variables(names);
                }
            }
        }
    }

    pub fn is_constant(&self) -> bool {
        self.free_variables().is_empty()
    }

    pub fn as_constant(&self) -> Option<f64> {
        match self {
            ASTNode::Constant(value) => Some(*value),
            _ => None,
        }
    }

    /// `true` when the expression is defined for every real input: no division,
    /// no function call and only non-negative integer powers.
    pub fn is_total(&self) -> bool {
        match self {
            ASTNode::Constant(value) => value.is_finite(),
            ASTNode::Variable(_) => true,
            ASTNode::BinaryOperation {
                left,
                operator,
                right,
            } => match operator {
                Operator::Divide => false,
                Operator::Power => {
                    left.is_total()
                        && matches!(
                            right.as_constant(),
                            Some(exponent) if exponent >= 0.0 && exponent.fract() == 0.0
                        )
                }
                _ => left.is_total() && right.is_total(),
            },
            ASTNode::UnaryOperation { operand, .. } => operand.is_total(),
            ASTNode::FunctionCall { .. } => false,
        }
    }

    /// Binding strength used when rendering; higher binds tighter.
    fn precedence(&self) -> u8 {
        match self {
            ASTNode::Constant(value) if value.is_sign_negative() && *value != 0.0 => 2,
            ASTNode::Constant(_) | ASTNode::Variable(_) | ASTNode::FunctionCall { .. } => 5,
            ASTNode::UnaryOperation { .. } => 2,
            ASTNode::BinaryOperation { operator, .. } => operator.precedence(),
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, node: &ASTNode, parenthesize: bool) -> fmt::Result {
    if parenthesize {
        write!(f, "({})", node)
    } else {
        write!(f, "{}", node)
    }
}

/// Renders the tree back to parseable text with the minimum of parentheses
/// needed to keep its shape.
impl fmt::Display for ASTNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ASTNode::Constant(value) => {
                if *value == PI {
                    write!(f, "pi")
                } else if *value == E {
                    write!(f, "e")
                } else {
                    write!(f, "{}", value)
                }
            }
            ASTNode::Variable(name) => write!(f, "{}", name),
            ASTNode::UnaryOperation { operator, operand } => {
                write!(f, "{}", operator)?;
                write_operand(f, operand, operand.precedence() <= 2)
            }
            ASTNode::FunctionCall { function, args } => {
                write!(f, "{}(", function)?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            ASTNode::BinaryOperation {
                left,
                operator,
                right,
            } => {
                let own = operator.precedence();
                let (left_parens, right_parens) = match operator {
                    Operator::Add | Operator::Subtract => {
                        (left.precedence() < own, right.precedence() <= own)
                    }
                    Operator::Multiply | Operator::Divide => {
                        (left.precedence() < own, right.precedence() <= own)
                    }
                    Operator::Power => (left.precedence() <= own, right.precedence() < own),
                };
                write_operand(f, left, left_parens)?;
                match operator {
                    Operator::Add | Operator::Subtract => write!(f, " {} ", operator)?,
                    _ => write!(f, "{}", operator)?,
                }
                write_operand(f, right, right_parens)
            }
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

impl Operator {
    pub fn apply(&self, left: f64, right: f64) -> Result<f64, EvaluationError> {
        match self {
            Operator::Add => Ok(left + right),
            Operator::Subtract => Ok(left - right),
            Operator::Multiply => Ok(left * right),
            Operator::Divide => {
                if right == 0.0 {
                    Err(EvaluationError::DivisionByZero)
                } else {
                    Ok(left / right)
                }
            }
            Operator::Power => {
                if left == 0.0 && right < 0.0 {
                    Err(EvaluationError::DivisionByZero)
                } else if left < 0.0 && right.fract() != 0.0 && right.is_finite() {
                    Err(EvaluationError::DomainError(format!(
                        "{}^{} has no real value",
                        left, right
                    )))
                } else {
                    Ok(left.powf(right))
                }
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Operator::Add | Operator::Subtract => 1,
            Operator::Multiply | Operator::Divide => 3,
            Operator::Power => 4,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Power => "^",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl TryFrom<&str> for Operator {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "+" => Ok(Operator::Add),
            "-" => Ok(Operator::Subtract),
            "*" => Ok(Operator::Multiply),
            "/" => Ok(Operator::Divide),
            "^" | "**" => Ok(Operator::Power),
            _ => Err(format!("Unknown operator: {}", value)),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Negate,
}

impl UnaryOperator {
    pub fn apply(&self, operand: f64) -> f64 {
        match self {
            UnaryOperator::Negate => -operand,
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperator::Negate => f.write_str("-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> ASTNode {
        ASTNode::variable("x")
    }

    #[test]
    fn test_free_variables_sorted_and_unique() {
        let ast = ASTNode::binary(
            ASTNode::binary(ASTNode::variable("y"), Operator::Add, x()),
            Operator::Multiply,
            ASTNode::call(FunctionKind::Sin, vec![x()]),
        );
        assert_eq!(ast.free_variables(), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_constant_has_no_variables() {
        let ast = ASTNode::binary(ASTNode::Constant(2.0), Operator::Add, ASTNode::Constant(PI));
        assert!(ast.is_constant());
    }

    #[test]
    fn test_display_minimal_parentheses() {
        let ast = ASTNode::binary(
            ASTNode::binary(x(), Operator::Power, ASTNode::Constant(2.0)),
            Operator::Subtract,
            ASTNode::binary(ASTNode::Constant(4.0), Operator::Multiply, x()),
        );
        assert_eq!(ast.to_string(), "x^2 - 4*x");
    }

    #[test]
    fn test_display_keeps_grouping() {
        let ast = ASTNode::binary(
            ASTNode::Constant(1.0),
            Operator::Divide,
            ASTNode::binary(x(), Operator::Subtract, ASTNode::Constant(2.0)),
        );
        assert_eq!(ast.to_string(), "1/(x - 2)");

        let nested_power = ASTNode::binary(
            ASTNode::binary(x(), Operator::Power, ASTNode::Constant(2.0)),
            Operator::Power,
            ASTNode::Constant(3.0),
        );
        assert_eq!(nested_power.to_string(), "(x^2)^3");

        let right_sub = ASTNode::binary(
            x(),
            Operator::Subtract,
            ASTNode::binary(x(), Operator::Add, ASTNode::Constant(1.0)),
        );
        assert_eq!(right_sub.to_string(), "x - (x + 1)");
    }

    #[test]
    fn test_display_negation_and_constants() {
        let ast = ASTNode::binary(
            ASTNode::negate(x()),
            Operator::Power,
            ASTNode::Constant(2.0),
        );
        assert_eq!(ast.to_string(), "(-x)^2");

        let power_of_neg = ASTNode::negate(ASTNode::binary(x(), Operator::Power, ASTNode::Constant(2.0)));
        assert_eq!(power_of_neg.to_string(), "-x^2");

        let named = ASTNode::binary(ASTNode::Constant(PI), Operator::Multiply, ASTNode::Constant(E));
        assert_eq!(named.to_string(), "pi*e");

        let negative = ASTNode::binary(x(), Operator::Multiply, ASTNode::Constant(-3.0));
        assert_eq!(negative.to_string(), "x*(-3)");
    }

    #[test]
    fn test_display_function_call() {
        let ast = ASTNode::call(
            FunctionKind::Custom("hypot".to_string()),
            vec![x(), ASTNode::Constant(1.5)],
        );
        assert_eq!(ast.to_string(), "hypot(x, 1.5)");
    }

    #[test]
    fn test_operator_apply() {
        assert_eq!(Operator::Add.apply(1.0, 2.0).unwrap(), 3.0);
        assert_eq!(Operator::Power.apply(2.0, 10.0).unwrap(), 1024.0);
        assert_eq!(Operator::Power.apply(-8.0, 2.0).unwrap(), 64.0);
        assert_eq!(
            Operator::Divide.apply(1.0, 0.0),
            Err(EvaluationError::DivisionByZero)
        );
        assert_eq!(
            Operator::Power.apply(0.0, -1.0),
            Err(EvaluationError::DivisionByZero)
        );
        assert!(matches!(
            Operator::Power.apply(-8.0, 0.5),
            Err(EvaluationError::DomainError(_))
        ));
    }

    #[test]
    fn test_operator_from_str() {
        assert_eq!(Operator::try_from("^"), Ok(Operator::Power));
        assert_eq!(Operator::try_from("**"), Ok(Operator::Power));
        assert!(Operator::try_from("%").is_err());
    }

    #[test]
    fn test_is_total() {
        let polynomial = ASTNode::binary(x(), Operator::Power, ASTNode::Constant(3.0));
        assert!(polynomial.is_total());

        let rational = ASTNode::binary(ASTNode::Constant(1.0), Operator::Divide, x());
        assert!(!rational.is_total());

        let root = ASTNode::binary(x(), Operator::Power, ASTNode::Constant(0.5));
        assert!(!root.is_total());
    }
}
