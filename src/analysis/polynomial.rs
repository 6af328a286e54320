//! Univariate polynomials with `f64` coefficients.
//!
//! Just enough algebra for domain analysis: recognizing a polynomial AST,
//! factoring it over the rationals and locating its real roots.

use crate::analysis::roots::bisect;
use crate::ast::{evaluate, ASTNode, Bindings, Operator, UnaryOperator};
use std::ops::{Add, Mul, Neg, Sub};

const MAX_DEGREE: f64 = 32.0;
const MAX_SCALE: u32 = 120;
const MAX_INTEGER: f64 = 1e12;
const ROOT_TOLERANCE: f64 = 1e-9;

/// Coefficients ordered from the constant term upwards, with no trailing
/// zeros. The zero polynomial has no coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn new(mut coefficients: Vec<f64>) -> Self {
        while coefficients.last() == Some(&0.0) {
            coefficients.pop();
        }
        Self { coefficients }
    }

    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }

    /// The polynomial `x`.
    pub fn identity() -> Self {
        Self::new(vec![0.0, 1.0])
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// `None` for the zero polynomial.
    pub fn degree(&self) -> Option<usize> {
        self.coefficients.len().checked_sub(1)
    }

    fn leading(&self) -> f64 {
        self.coefficients.last().copied().unwrap_or(0.0)
    }

    /// Reads `ast` as a polynomial in `variable`.
    ///
    /// Returns `None` when the expression involves another variable, a
    /// function of the variable, division by a non-constant, a power that is
    /// not a small non-negative integer or a degree above 32.
    pub fn from_ast(ast: &ASTNode, variable: &str) -> Option<Self> {
        if ast.is_constant() {
            return evaluate(ast, &Bindings::new()).ok().map(Self::constant);
        }

        match ast {
            ASTNode::Variable(name) if name == variable => Some(Self::identity()),
            ASTNode::UnaryOperation {
                operator: UnaryOperator::Negate,
                operand,
            } => Some(-Self::from_ast(operand, variable)?),
            ASTNode::BinaryOperation {
                left,
                operator,
                right,
            } => match operator {
                Operator::Add => {
                    Some(Self::from_ast(left, variable)? + Self::from_ast(right, variable)?)
                }
                Operator::Subtract => {
                    Some(Self::from_ast(left, variable)? - Self::from_ast(right, variable)?)
                }
                Operator::Multiply => {
                    let (left, right) = (Self::from_ast(left, variable)?, Self::from_ast(right, variable)?);
                    if left.degree().unwrap_or(0) + right.degree().unwrap_or(0) > MAX_DEGREE as usize {
                        return None;
                    }
                    Some(left * right)
                }
                Operator::Divide => {
                    let divisor = Self::from_ast(right, variable)?;
                    match divisor.degree() {
                        Some(0) => Some(Self::from_ast(left, variable)?.scale(1.0 / divisor.leading())),
                        _ => None,
                    }
                }
                Operator::Power => {
                    let exponent = Self::from_ast(right, variable)?;
                    let exponent = match exponent.degree() {
                        None => 0.0,
                        Some(0) => exponent.leading(),
                        Some(_) => return None,
                    };
                    if exponent < 0.0 || exponent.fract() != 0.0 || exponent > MAX_DEGREE {
                        return None;
                    }
                    let base = Self::from_ast(left, variable)?;
                    if base.degree().unwrap_or(0) as f64 * exponent > MAX_DEGREE {
                        return None;
                    }
                    Some(base.powi(exponent as u32))
                }
            },
            _ => None,
        }
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self::new(self.coefficients.iter().map(|c| c * factor).collect())
    }

    pub fn powi(&self, exponent: u32) -> Self {
        (0..exponent).fold(Self::constant(1.0), |acc, _| acc * self.clone())
    }

    /// Horner evaluation.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, coefficient| acc * x + coefficient)
    }

    pub fn derivative(&self) -> Self {
        Self::new(
            self.coefficients
                .iter()
                .enumerate()
                .skip(1)
                .map(|(power, coefficient)| coefficient * power as f64)
                .collect(),
        )
    }

    /// Renders the polynomial in `variable`, highest power first.
    pub fn to_ast(&self, variable: &str) -> ASTNode {
        let mut result: Option<ASTNode> = None;

        for (power, coefficient) in self.coefficients.iter().enumerate().rev() {
            if *coefficient == 0.0 {
                continue;
            }
            let magnitude = coefficient.abs();
            let monomial = match power {
                0 => None,
                1 => Some(ASTNode::variable(variable)),
                _ => Some(ASTNode::binary(
                    ASTNode::variable(variable),
                    Operator::Power,
                    ASTNode::Constant(power as f64),
                )),
            };
            let term = match monomial {
                None => ASTNode::Constant(magnitude),
                Some(monomial) if magnitude == 1.0 => monomial,
                Some(monomial) => {
                    ASTNode::binary(ASTNode::Constant(magnitude), Operator::Multiply, monomial)
                }
            };

            result = Some(match result {
                None if *coefficient < 0.0 => ASTNode::negate(term),
                None => term,
                Some(sum) if *coefficient < 0.0 => ASTNode::binary(sum, Operator::Subtract, term),
                Some(sum) => ASTNode::binary(sum, Operator::Add, term),
            });
        }

        result.unwrap_or(ASTNode::Constant(0.0))
    }

    /// Splits the polynomial into distinct non-constant factors over the
    /// rationals.
    ///
    /// Rational roots are found on an integer-scaled copy and returned as
    /// primitive linear factors `q*x - p`. Integer quadratic factors are then
    /// split off what is left, and the remainder is returned as one more
    /// factor. Constant factors are dropped.
    ///
    /// The remainder is irreducible up to degree five; a product of two
    /// irreducible cubics stays in one piece.
    pub fn factor(&self) -> Vec<Polynomial> {
        let mut factors = Vec::new();
        if self.degree().unwrap_or(0) == 0 {
            return factors;
        }

        let zero_roots = self.coefficients.iter().take_while(|c| **c == 0.0).count();
        if zero_roots > 0 {
            factors.push(Self::identity());
        }
        let rest = Self::new(self.coefficients[zero_roots..].to_vec());
        if rest.degree().unwrap_or(0) == 0 {
            return factors;
        }

        let Some(mut integers) = rest.integer_coefficients() else {
            factors.push(rest.scale(1.0 / rest.leading()));
            return factors;
        };

        while integers.len() > 2 {
            let Some((p, q)) = rational_root(&integers) else {
                break;
            };
            let linear = Self::new(vec![-(p as f64), q as f64]);
            if !factors.contains(&linear) {
                factors.push(linear);
            }
            integers = divide_by_linear(&integers, p, q);
        }

        while integers.len() > 4 {
            let Some((quadratic, quotient)) = quadratic_factor(&integers) else {
                break;
            };
            let quadratic = Self::new(quadratic.iter().map(|c| *c as f64).collect());
            if !factors.contains(&quadratic) {
                factors.push(quadratic);
            }
            integers = quotient;
        }

        let leftover = Self::new(integers.iter().map(|c| *c as f64).collect());
        if leftover.degree().unwrap_or(0) > 0 && !factors.contains(&leftover) {
            factors.push(leftover);
        }
        factors
    }

    /// Smallest integer multiple with integer coefficients, made primitive and
    /// with a positive leading coefficient.
    fn integer_coefficients(&self) -> Option<Vec<i128>> {
        let scale = (1..=MAX_SCALE).find(|m| {
            self.coefficients.iter().all(|c| {
                let scaled = c * *m as f64;
                scaled.abs() < MAX_INTEGER
                    && (scaled - scaled.round()).abs() <= ROOT_TOLERANCE * scaled.abs().max(1.0)
            })
        })?;

        let mut integers: Vec<i128> = self
            .coefficients
            .iter()
            .map(|c| (c * scale as f64).round() as i128)
            .collect();

        let divisor = integers.iter().fold(0, |acc, c| gcd(acc, *c));
        if divisor > 1 {
            integers.iter_mut().for_each(|c| *c /= divisor);
        }
        if integers.last().is_some_and(|c| *c < 0) {
            integers.iter_mut().for_each(|c| *c = -*c);
        }
        Some(integers)
    }

    /// Real roots in ascending order, without repetition.
    pub fn real_roots(&self) -> Vec<f64> {
        let c = &self.coefficients;
        let mut roots = match self.degree() {
            None | Some(0) => Vec::new(),
            Some(1) => vec![-c[0] / c[1]],
            Some(2) => quadratic_roots(c[2], c[1], c[0]),
            Some(_) => self.isolated_roots(),
        };

        roots.iter_mut().for_each(|root| *root += 0.0);
        roots.sort_by(f64::total_cmp);
        roots.dedup_by(|a, b| (*a - *b).abs() <= ROOT_TOLERANCE * a.abs().max(1.0));
        roots
    }

    /// Roots of degree three and up: the derivative's real roots split the
    /// Cauchy interval into monotonic pieces, each bisected on a sign change.
    fn isolated_roots(&self) -> Vec<f64> {
        let leading = self.leading();
        let bound = 1.0
            + self.coefficients[..self.coefficients.len() - 1]
                .iter()
                .map(|c| (c / leading).abs())
                .fold(0.0, f64::max);
        let magnitude = self.coefficients.iter().map(|c| c.abs()).fold(0.0, f64::max);

        let mut points = vec![-bound];
        points.extend(
            self.derivative()
                .real_roots()
                .into_iter()
                .filter(|x| x.abs() < bound),
        );
        points.push(bound);

        let f = |x: f64| Some(self.evaluate(x));
        let mut roots = Vec::new();
        for window in points.windows(2) {
            let (low, high) = (window[0], window[1]);
            let (f_low, f_high) = (self.evaluate(low), self.evaluate(high));
            if f_low.abs() <= ROOT_TOLERANCE * magnitude {
                roots.push(low);
            } else if f_high != 0.0 && f_low.signum() != f_high.signum() {
                roots.extend(bisect(&f, low, high));
            }
        }
        roots
    }
}

fn quadratic_roots(a: f64, b: f64, c: f64) -> Vec<f64> {
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return Vec::new();
    }
    let q = -0.5 * (b + b.signum() * discriminant.sqrt());
    if q == 0.0 {
        vec![0.0]
    } else {
        vec![q / a, c / q]
    }
}

fn gcd(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn divisors(n: i128) -> Vec<i128> {
    let n = n.abs();
    let mut small = Vec::new();
    let mut large = Vec::new();
    let mut d = 1;
    while d * d <= n {
        if n % d == 0 {
            small.push(d);
            if d * d != n {
                large.push(n / d);
            }
        }
        d += 1;
    }
    small.extend(large.into_iter().rev());
    small
}

/// `sum(a_i * p^i * q^(n-i)) == 0`, computed exactly; overflow counts as no.
fn is_rational_root(integers: &[i128], p: i128, q: i128) -> bool {
    let degree = integers.len() - 1;
    let mut total: i128 = 0;
    for (power, coefficient) in integers.iter().enumerate() {
        let term = p
            .checked_pow(power as u32)
            .and_then(|pp| q.checked_pow((degree - power) as u32).and_then(|qq| pp.checked_mul(qq)))
            .and_then(|pq| pq.checked_mul(*coefficient));
        match term.and_then(|term| total.checked_add(term)) {
            Some(sum) => total = sum,
            None => return false,
        }
    }
    total == 0
}

/// Rational root theorem: candidates `±p/q` with `p | a_0` and `q | a_n`,
/// tried in ascending order of `p`, positive first.
fn rational_root(integers: &[i128]) -> Option<(i128, i128)> {
    let constant = *integers.first()?;
    let leading = *integers.last()?;
    if constant == 0 {
        return Some((0, 1));
    }

    let numerators = divisors(constant);
    let denominators = divisors(leading);
    for p in &numerators {
        for q in &denominators {
            if gcd(*p, *q) != 1 {
                continue;
            }
            for candidate in [*p, -*p] {
                if is_rational_root(integers, candidate, *q) {
                    return Some((candidate, *q));
                }
            }
        }
    }
    None
}

/// Exact quotient of `a(x) / (q*x - p)`.
fn divide_by_linear(integers: &[i128], p: i128, q: i128) -> Vec<i128> {
    let degree = integers.len() - 1;
    let mut quotient = vec![0; degree];
    quotient[degree - 1] = integers[degree] / q;
    for k in (1..degree).rev() {
        quotient[k - 1] = (integers[k] + p * quotient[k]) / q;
    }
    quotient
}

/// Searches a polynomial without rational roots for an integer factor
/// `a*x^2 + b*x + c`, returning it with the exact quotient.
///
/// `a` divides the leading coefficient and `c` the constant term; the factor's
/// values at 1 and -1 must divide the polynomial's values there, which leaves
/// finitely many `b` to try.
fn quadratic_factor(integers: &[i128]) -> Option<(Vec<i128>, Vec<i128>)> {
    let constant = *integers.first()?;
    let leading = *integers.last()?;
    let at_one: i128 = integers.iter().sum();
    let at_minus_one: i128 = integers
        .iter()
        .enumerate()
        .map(|(power, c)| if power % 2 == 0 { *c } else { -*c })
        .sum();
    if at_one == 0 || at_minus_one == 0 {
        return None;
    }

    let signed = |n: i128| -> Vec<i128> {
        divisors(n).into_iter().flat_map(|d| [d, -d]).collect()
    };
    let constants = signed(constant);
    let values = signed(at_one);

    for a in divisors(leading) {
        for c in &constants {
            for value in &values {
                let b = value - a - c;
                let at_minus = a - b + c;
                if at_minus == 0 || at_minus_one % at_minus != 0 {
                    continue;
                }
                let quadratic = vec![*c, b, a];
                if let Some(quotient) = divide_exact(integers, &quadratic) {
                    return Some((quadratic, quotient));
                }
            }
        }
    }
    None
}

/// Integer long division; `None` unless it leaves no remainder.
fn divide_exact(dividend: &[i128], divisor: &[i128]) -> Option<Vec<i128>> {
    let shift = dividend.len().checked_sub(divisor.len())?;
    let leading = *divisor.last()?;
    if leading == 0 {
        return None;
    }

    let mut remainder = dividend.to_vec();
    let mut quotient = vec![0; shift + 1];
    for k in (0..=shift).rev() {
        let top = remainder[k + divisor.len() - 1];
        if top % leading != 0 {
            return None;
        }
        let factor = top / leading;
        quotient[k] = factor;
        for (i, coefficient) in divisor.iter().enumerate() {
            remainder[k + i] = remainder[k + i].checked_sub(factor.checked_mul(*coefficient)?)?;
        }
    }
    remainder.iter().all(|c| *c == 0).then_some(quotient)
}

impl Add for Polynomial {
    type Output = Polynomial;

    fn add(self, other: Polynomial) -> Polynomial {
        let length = self.coefficients.len().max(other.coefficients.len());
        Polynomial::new(
            (0..length)
                .map(|i| {
                    self.coefficients.get(i).unwrap_or(&0.0)
                        + other.coefficients.get(i).unwrap_or(&0.0)
                })
                .collect(),
        )
    }
}

impl Sub for Polynomial {
    type Output = Polynomial;

    fn sub(self, other: Polynomial) -> Polynomial {
        self + (-other)
    }
}

impl Neg for Polynomial {
    type Output = Polynomial;

    fn neg(self) -> Polynomial {
        self.scale(-1.0)
    }
}

impl Mul for Polynomial {
    type Output = Polynomial;

    fn mul(self, other: Polynomial) -> Polynomial {
        if self.coefficients.is_empty() || other.coefficients.is_empty() {
            return Polynomial::new(Vec::new());
        }
        let mut product = vec![0.0; self.coefficients.len() + other.coefficients.len() - 1];
        for (i, a) in self.coefficients.iter().enumerate() {
            for (j, b) in other.coefficients.iter().enumerate() {
                product[i + j] += a * b;
            }
        }
        Polynomial::new(product)
    }
}
