use crate::ast::{evaluate, ASTNode, Bindings, Operator, UnaryOperator};
use crate::functions::FunctionKind;

/// Factor list with multiplicities, compared structurally.
pub type Factors = Vec<(ASTNode, u32)>;

/// Multiplicities saturate here; only presence and order matter downstream.
const MAX_MULTIPLICITY: u32 = 32;

fn times(multiplicity: u32, power: u32) -> u32 {
    multiplicity.saturating_mul(power).min(MAX_MULTIPLICITY)
}

/// An expression brought over a common denominator.
///
/// Wherever the expression is defined it equals `numerator` divided by the
/// product of `denominators`. `excluded` holds further factors whose zeros
/// make a sub-expression undefined although they cancel or hide inside a
/// function call, e.g. `x` in `sin(1/x)` or `cos(x)` in `tan(x)`.
///
/// Multiplicities are capped at 32, so for powers beyond that the numerator
/// keeps its zeros but not its exact value.
#[derive(Debug, Clone, PartialEq)]
pub struct Fraction {
    pub numerator: ASTNode,
    pub denominators: Factors,
    pub excluded: Factors,
}

impl Fraction {
    fn whole(numerator: ASTNode) -> Self {
        Self {
            numerator,
            denominators: Vec::new(),
            excluded: Vec::new(),
        }
    }

    pub fn of(ast: &ASTNode) -> Self {
        match ast {
            ASTNode::Constant(_) | ASTNode::Variable(_) => Self::whole(ast.clone()),

            ASTNode::UnaryOperation {
                operator: UnaryOperator::Negate,
                operand,
            } => {
                let inner = Self::of(operand);
                Self {
                    numerator: ASTNode::negate(inner.numerator),
                    ..inner
                }
            }

            ASTNode::FunctionCall { function, args } => {
                let mut excluded = Vec::new();
                for arg in args {
                    for (factor, multiplicity) in Self::of(arg).restrictions() {
                        include_max(&mut excluded, factor, multiplicity);
                    }
                    if *function == FunctionKind::Tan {
                        let cosine = ASTNode::call(FunctionKind::Cos, vec![arg.clone()]);
                        include_max(&mut excluded, cosine, 1);
                    }
                }
                Self {
                    excluded,
                    ..Self::whole(ast.clone())
                }
            }

            ASTNode::BinaryOperation {
                left,
                operator,
                right,
            } => {
                let base = Self::of(left);
                let other = Self::of(right);
                match operator {
                    Operator::Add | Operator::Subtract => base.combine(other, *operator),
                    Operator::Multiply => base.multiply(other),
                    Operator::Divide => base.divide(other),
                    Operator::Power => Self::power(ast, base, other),
                }
            }
        }
    }

    /// Every factor whose zeros leave the expression undefined.
    pub fn restrictions(&self) -> Factors {
        let mut all = self.denominators.clone();
        for (factor, multiplicity) in &self.excluded {
            include_max(&mut all, factor.clone(), *multiplicity);
        }
        all
    }

    fn merge_excluded(&mut self, other: Factors) {
        for (factor, multiplicity) in other {
            include_max(&mut self.excluded, factor, multiplicity);
        }
    }

    fn combine(self, other: Fraction, operator: Operator) -> Fraction {
        let mut common = self.denominators.clone();
        for (factor, multiplicity) in &other.denominators {
            include_max(&mut common, factor.clone(), *multiplicity);
        }

        let left = product(self.numerator, missing_factors(&common, &self.denominators));
        let right = product(other.numerator, missing_factors(&common, &other.denominators));
        let mut combined = Fraction {
            numerator: ASTNode::binary(left, operator, right),
            denominators: common,
            excluded: self.excluded,
        };
        combined.merge_excluded(other.excluded);
        combined
    }

    fn multiply(self, other: Fraction) -> Fraction {
        let mut denominators = self.denominators;
        for (factor, multiplicity) in other.denominators {
            include_sum(&mut denominators, factor, multiplicity);
        }
        let mut combined = Fraction {
            numerator: product(self.numerator, vec![other.numerator]),
            denominators,
            excluded: self.excluded,
        };
        combined.merge_excluded(other.excluded);
        combined
    }

    fn divide(self, other: Fraction) -> Fraction {
        let mut denominators = self.denominators;
        for (factor, multiplicity) in atoms(&other.numerator) {
            include_sum(&mut denominators, factor, multiplicity);
        }
        let mut quotient = Fraction {
            numerator: product(self.numerator, expand(&other.denominators, 1)),
            denominators,
            excluded: self.excluded,
        };
        quotient.merge_excluded(other.excluded);
        quotient.merge_excluded(other.denominators);
        quotient
    }

    fn power(ast: &ASTNode, base: Fraction, exponent: Fraction) -> Fraction {
        let exponent_value = if exponent.numerator.is_constant() {
            evaluate(&exponent.numerator, &Bindings::new()).ok()
        } else {
            None
        };
        let integer_exponent =
            exponent_value.filter(|value| value.fract() == 0.0 && value.abs() <= 32.0);

        match integer_exponent {
            Some(n) if n > 0.0 => {
                let n = n as u32;
                Fraction {
                    numerator: ASTNode::binary(
                        base.numerator,
                        Operator::Power,
                        ASTNode::Constant(n as f64),
                    ),
                    denominators: base
                        .denominators
                        .into_iter()
                        .map(|(factor, multiplicity)| (factor, times(multiplicity, n)))
                        .collect(),
                    excluded: base.excluded,
                }
            }
            Some(n) if n < 0.0 => {
                let n = (-n) as u32;
                let mut denominators = Vec::new();
                for (factor, multiplicity) in atoms(&base.numerator) {
                    include_sum(&mut denominators, factor, times(multiplicity, n));
                }
                let mut inverse = Fraction {
                    numerator: product(ASTNode::Constant(1.0), expand(&base.denominators, n)),
                    denominators,
                    excluded: base.excluded,
                };
                inverse.merge_excluded(base.denominators);
                inverse
            }
            _ => {
                let negative = exponent_value.is_some_and(|value| value < 0.0)
                    || matches!(
                        ast,
                        ASTNode::BinaryOperation { right, .. }
                            if matches!(right.as_ref(), ASTNode::UnaryOperation { .. })
                    );

                let mut opaque = Self::whole(ast.clone());
                opaque.merge_excluded(base.restrictions());
                opaque.merge_excluded(exponent.restrictions());
                if negative {
                    opaque.merge_excluded(atoms(&base.numerator));
                }
                opaque
            }
        }
    }
}

/// Each factor repeated by its multiplicity times `power`.
fn expand(factors: &Factors, power: u32) -> Vec<ASTNode> {
    factors
        .iter()
        .flat_map(|(factor, multiplicity)| {
            std::iter::repeat(factor.clone()).take(times(*multiplicity, power) as usize)
        })
        .collect()
}

/// `base * factors[0] * factors[1] ...`, leaving out neutral ones.
fn product(base: ASTNode, factors: Vec<ASTNode>) -> ASTNode {
    factors.into_iter().fold(base, |acc, factor| {
        if acc == ASTNode::Constant(1.0) {
            factor
        } else if factor == ASTNode::Constant(1.0) {
            acc
        } else {
            ASTNode::binary(acc, Operator::Multiply, factor)
        }
    })
}

/// Factors of `common` that `own` lacks, repeated by the missing multiplicity.
fn missing_factors(common: &Factors, own: &Factors) -> Vec<ASTNode> {
    let mut missing = Vec::new();
    for (factor, multiplicity) in common {
        let present = own
            .iter()
            .find(|(seen, _)| seen == factor)
            .map_or(0, |(_, count)| *count);
        for _ in present..*multiplicity {
            missing.push(factor.clone());
        }
    }
    missing
}

fn include_max(list: &mut Factors, factor: ASTNode, multiplicity: u32) {
    match list.iter_mut().find(|(seen, _)| *seen == factor) {
        Some((_, count)) => *count = (*count).max(multiplicity),
        None => list.push((factor, multiplicity)),
    }
}

fn include_sum(list: &mut Factors, factor: ASTNode, multiplicity: u32) {
    match list.iter_mut().find(|(seen, _)| *seen == factor) {
        Some((_, count)) => *count = count.saturating_add(multiplicity).min(MAX_MULTIPLICITY),
        None => list.push((factor, multiplicity)),
    }
}

/// Splits a product into its non-constant multiplicative atoms.
///
/// Signs and constant factors are dropped; `g^n` counts as `g` with
/// multiplicity `n`.
pub fn atoms(node: &ASTNode) -> Factors {
    let mut found = Vec::new();
    collect_atoms(node, 1, &mut found);
    found
}

fn collect_atoms(node: &ASTNode, multiplicity: u32, found: &mut Factors) {
    if node.is_constant() {
        return;
    }
    match node {
        ASTNode::BinaryOperation {
            left,
            operator: Operator::Multiply,
            right,
        } => {
            collect_atoms(left, multiplicity, found);
            collect_atoms(right, multiplicity, found);
        }
        ASTNode::UnaryOperation { operand, .. } => collect_atoms(operand, multiplicity, found),
        ASTNode::BinaryOperation {
            left,
            operator: Operator::Power,
            right,
        } => match right.as_constant() {
            Some(n) if n > 0.0 && n.fract() == 0.0 && n <= 32.0 => {
                collect_atoms(left, times(multiplicity, n as u32), found)
            }
            _ => include_sum(found, node.clone(), multiplicity),
        },
        _ => include_sum(found, node.clone(), multiplicity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{parse, ParseOptions};

    fn fraction_of(input: &str) -> Fraction {
        Fraction::of(&parse(input, &ParseOptions::default()).unwrap().ast)
    }

    fn rendered(factors: &Factors) -> Vec<(String, u32)> {
        factors
            .iter()
            .map(|(factor, multiplicity)| (factor.to_string(), *multiplicity))
            .collect()
    }

    fn restrictions(input: &str) -> Vec<(String, u32)> {
        rendered(&fraction_of(input).restrictions())
    }

    #[test]
    fn test_no_division() {
        let fraction = fraction_of("x^2 + 3*x");
        assert!(fraction.restrictions().is_empty());
        assert_eq!(fraction.numerator.to_string(), "x^2 + 3*x");
    }

    #[test]
    fn test_simple_quotient() {
        assert_eq!(restrictions("1/(x-2)"), vec![("x - 2".to_string(), 1)]);
        assert_eq!(restrictions("x/x"), vec![("x".to_string(), 1)]);
    }

    #[test]
    fn test_constant_divisors_are_ignored() {
        assert!(restrictions("x/2 + 3/pi").is_empty());
        assert_eq!(restrictions("1/(2*x)"), vec![("x".to_string(), 1)]);
    }

    #[test]
    fn test_common_denominator() {
        let fraction = fraction_of("1/x + 1/(x-1)");
        assert_eq!(
            rendered(&fraction.denominators),
            vec![("x".to_string(), 1), ("x - 1".to_string(), 1)]
        );
        assert_eq!(fraction.numerator.to_string(), "x - 1 + x");
    }

    #[test]
    fn test_powers() {
        assert_eq!(restrictions("1/x^2"), vec![("x".to_string(), 2)]);
        assert_eq!(restrictions("x^-3"), vec![("x".to_string(), 3)]);
        assert_eq!(restrictions("(1/(x+1))^2"), vec![("x + 1".to_string(), 2)]);
        assert_eq!(restrictions("x^(-0.5)"), vec![("x".to_string(), 1)]);
    }

    #[test]
    fn test_multiplicities_saturate() {
        assert_eq!(restrictions("1/(x^16)^4"), vec![("x".to_string(), 32)]);
        assert_eq!(
            restrictions("1/(((((((x^32)^32)^32)^32)^32)^32)^32)"),
            vec![("x".to_string(), 32)]
        );

        let fraction = fraction_of("1/(x^32)^32 + 1");
        assert_eq!(rendered(&fraction.denominators), vec![("x".to_string(), 32)]);
    }

    #[test]
    fn test_nested_in_functions() {
        let fraction = fraction_of("sin(1/x)");
        assert!(fraction.denominators.is_empty());
        assert_eq!(rendered(&fraction.excluded), vec![("x".to_string(), 1)]);

        assert_eq!(restrictions("tan(2*x)"), vec![("cos(2*x)".to_string(), 1)]);
    }

    #[test]
    fn test_quotient_of_quotients() {
        let fraction = fraction_of("(1/x)/(1/(x-3))");
        assert_eq!(rendered(&fraction.denominators), vec![("x".to_string(), 1)]);
        assert_eq!(fraction.numerator.to_string(), "x - 3");
        assert_eq!(
            rendered(&fraction.restrictions()),
            vec![("x".to_string(), 1), ("x - 3".to_string(), 1)]
        );
    }
}
