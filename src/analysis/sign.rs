//! Conservative sign proofs: `true` means the property holds wherever the
//! expression is defined, `false` means "could not prove it".

use crate::ast::{evaluate, ASTNode, Bindings, Operator};
use crate::functions::FunctionKind;

fn constant_value(node: &ASTNode) -> Option<f64> {
    if node.is_constant() {
        evaluate(node, &Bindings::new()).ok()
    } else {
        None
    }
}

fn is_even_integer(node: &ASTNode) -> bool {
    constant_value(node).is_some_and(|value| value.fract() == 0.0 && value % 2.0 == 0.0)
}

pub fn is_non_negative(node: &ASTNode) -> bool {
    if let Some(value) = constant_value(node) {
        return value >= 0.0;
    }

    match node {
        ASTNode::BinaryOperation {
            left,
            operator,
            right,
        } => match operator {
            Operator::Add | Operator::Multiply => is_non_negative(left) && is_non_negative(right),
            Operator::Divide => is_non_negative(left) && is_positive(right),
            Operator::Power => is_even_integer(right) || is_non_negative(left),
            Operator::Subtract => false,
        },
        ASTNode::FunctionCall { function, .. } => matches!(
            function,
            FunctionKind::Abs | FunctionKind::Exp | FunctionKind::Sqrt | FunctionKind::Cosh
        ),
        _ => false,
    }
}

pub fn is_positive(node: &ASTNode) -> bool {
    if let Some(value) = constant_value(node) {
        return value > 0.0;
    }

    match node {
        ASTNode::BinaryOperation {
            left,
            operator,
            right,
        } => match operator {
            Operator::Add => {
                (is_positive(left) && is_non_negative(right))
                    || (is_non_negative(left) && is_positive(right))
            }
            Operator::Multiply | Operator::Divide => is_positive(left) && is_positive(right),
            Operator::Power => is_positive(left),
            Operator::Subtract => false,
        },
        ASTNode::FunctionCall { function, .. } => {
            matches!(function, FunctionKind::Exp | FunctionKind::Cosh)
        }
        _ => false,
    }
}
