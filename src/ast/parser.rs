use crate::analysis::{analyze_domain, DomainWarning};
use crate::ast::lexer::{check_parentheses, insert_implicit_multiplication, preprocess, tokenize};
use crate::ast::{ASTNode, Evaluator, Operator, Simplifier, Token, TokenKind};
use crate::functions::FunctionTable;
use log::{debug, warn};
use std::collections::BTreeSet;
use thiserror::Error;

fn describe_position(position: &Option<usize>) -> String {
    match position {
        Some(position) => format!(" at position {}", position + 1),
        None => String::new(),
    }
}

/// Why an expression could not be turned into an AST.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("The expression cannot be empty")]
    EmptyExpression,

    #[error("Unbalanced parentheses{}", describe_position(.position))]
    UnbalancedParentheses { position: Option<usize> },

    #[error("Syntax error{}: {message}", describe_position(.position))]
    SyntaxError {
        message: String,
        position: Option<usize>,
    },

    #[error("Variables not allowed: {invalid:?}. Allowed: {allowed:?}")]
    InvalidVariable {
        invalid: Vec<String>,
        allowed: Vec<String>,
    },

    #[error("Function '{function}' expects {expected} argument(s), got {got}")]
    ArityMismatch {
        function: String,
        expected: usize,
        got: usize,
    },
}

impl ParseError {
    pub fn syntax(message: impl Into<String>) -> Self {
        ParseError::SyntaxError {
            message: message.into(),
            position: None,
        }
    }

    pub fn syntax_at(message: impl Into<String>, position: usize) -> Self {
        ParseError::SyntaxError {
            message: message.into(),
            position: Some(position),
        }
    }
}

/// Per-call parsing switches.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
    /// When set, any other free variable is rejected.
    pub allowed_variables: Option<Vec<String>>,
    pub simplify: bool,
    pub implicit_multiplication: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            allowed_variables: None,
            simplify: false,
            implicit_multiplication: true,
        }
    }
}

impl ParseOptions {
    pub fn allow(variables: &[&str]) -> Self {
        Self {
            allowed_variables: Some(variables.iter().map(|name| name.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn with_simplify(mut self, simplify: bool) -> Self {
        self.simplify = simplify;
        self
    }

    pub fn with_implicit_multiplication(mut self, enabled: bool) -> Self {
        self.implicit_multiplication = enabled;
        self
    }
}

/// A successfully parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpression {
    pub ast: ASTNode,
    /// Free variables, sorted.
    pub variables: Vec<String>,
    pub warnings: Vec<DomainWarning>,
    /// Non-fatal remarks, e.g. a simplification that had to be discarded.
    pub notes: Vec<String>,
}

pub type ParseOutcome = Result<ParsedExpression, ParseError>;

/// Parses expression text against a fixed [`FunctionTable`].
#[derive(Debug, Clone, Default)]
pub struct ExpressionParser {
    functions: FunctionTable,
}

impl ExpressionParser {
    pub fn new(functions: FunctionTable) -> Self {
        Self { functions }
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn parse(&self, input: &str, options: &ParseOptions) -> ParseOutcome {
        debug!("Parsing expression: {}", input);
        let ast = self.parse_ast(input, options)?;

        let warnings = analyze_domain(&ast);
        let mut notes = Vec::new();

        let ast = if options.simplify {
            let evaluator = Evaluator::with_functions(self.functions.clone(), 0);
            match Simplifier::new(&evaluator).simplify_verified(&ast) {
                Ok(simplified) => simplified,
                Err(reason) => {
                    warn!("Simplification of '{}' discarded: {}", ast, reason);
                    notes.push(format!("Could not simplify (ignored): {}", reason));
                    ast
                }
            }
        } else {
            ast
        };

        let variables = ast.free_variables();
        debug!("Parsed AST: {} (variables: {:?})", ast, variables);

        Ok(ParsedExpression {
            ast,
            variables,
            warnings,
            notes,
        })
    }

    /// Runs the lexer and parser and validates identifiers, without any
    /// domain analysis or simplification.
    pub fn parse_ast(&self, input: &str, options: &ParseOptions) -> Result<ASTNode, ParseError> {
        let text = preprocess(input)?;
        check_parentheses(&text)?;

        let mut tokens = tokenize(&text)?;
        if options.implicit_multiplication {
            tokens = insert_implicit_multiplication(tokens);
        }

        let mut parser = TokenParser::new(&tokens, &self.functions, text.len());
        let ast = parser.parse_expression()?;

        let mut invalid = parser.unknown;
        if let Some(allowed) = &options.allowed_variables {
            invalid.extend(
                ast.free_variables()
                    .into_iter()
                    .filter(|name| !allowed.contains(name)),
            );
        }

        if !invalid.is_empty() {
            let mut allowed = match &options.allowed_variables {
                Some(allowed) => allowed.clone(),
                None => self.functions.known_names(),
            };
            allowed.sort();
            allowed.dedup();
            return Err(ParseError::InvalidVariable {
                invalid: invalid.into_iter().collect(),
                allowed,
            });
        }

        Ok(ast)
    }
}

/// Parses `input` with the default function table.
pub fn parse(input: &str, options: &ParseOptions) -> ParseOutcome {
    ExpressionParser::default().parse(input, options)
}

/// Recursive descent over the token stream.
///
/// Precedence, lowest first: `+ -`, unary minus, `* /`, `^` (right
/// associative), primaries.
struct TokenParser<'a> {
    tokens: &'a [Token],
    current: usize,
    functions: &'a FunctionTable,
    end: usize,
    unknown: BTreeSet<String>,
}

impl<'a> TokenParser<'a> {
    fn new(tokens: &'a [Token], functions: &'a FunctionTable, end: usize) -> Self {
        Self {
            tokens,
            current: 0,
            functions,
            end,
            unknown: BTreeSet::new(),
        }
    }

    fn parse_expression(&mut self) -> Result<ASTNode, ParseError> {
        let node = self.parse_sum()?;
        if let Some(token) = self.peek() {
            return Err(ParseError::syntax_at(
                format!("Unexpected token '{}' (missing operator?)", token.text),
                token.position,
            ));
        }
        Ok(node)
    }

    fn parse_sum(&mut self) -> Result<ASTNode, ParseError> {
        let mut node = self.parse_signed()?;
        while let Some(operator) = self.peek_operator(&[Operator::Add, Operator::Subtract]) {
            self.current += 1;
            let right = self.parse_signed()?;
            node = ASTNode::binary(node, operator, right);
        }
        Ok(node)
    }

    fn parse_signed(&mut self) -> Result<ASTNode, ParseError> {
        if self.consume_operator("-") {
            return Ok(ASTNode::negate(self.parse_signed()?));
        }
        if self.consume_operator("+") {
            return self.parse_signed();
        }
        self.parse_product()
    }

    fn parse_product(&mut self) -> Result<ASTNode, ParseError> {
        let mut node = self.parse_power()?;
        while let Some(operator) = self.peek_operator(&[Operator::Multiply, Operator::Divide]) {
            self.current += 1;
            let right = self.parse_unary_operand()?;
            node = ASTNode::binary(node, operator, right);
        }
        Ok(node)
    }

    /// Operand of `*`, `/` or `^`: may carry its own sign (`2*-x`, `x^-2`).
    fn parse_unary_operand(&mut self) -> Result<ASTNode, ParseError> {
        if self.consume_operator("-") {
            return Ok(ASTNode::negate(self.parse_unary_operand()?));
        }
        if self.consume_operator("+") {
            return self.parse_unary_operand();
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<ASTNode, ParseError> {
        let base = self.parse_primary()?;
        if self.consume_operator("^") {
            let exponent = self.parse_unary_operand()?;
            return Ok(ASTNode::binary(base, Operator::Power, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<ASTNode, ParseError> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(ParseError::syntax_at("Unexpected end of input", self.end)),
        };

        match token.kind {
            TokenKind::Number => {
                self.current += 1;
                match token.text.parse::<f64>() {
                    Ok(value) if value.is_finite() => Ok(ASTNode::Constant(value)),
                    Ok(_) => Err(ParseError::syntax_at(
                        format!("Number out of range: '{}'", token.text),
                        token.position,
                    )),
                    Err(_) => Err(ParseError::syntax_at(
                        format!("Invalid number: '{}'", token.text),
                        token.position,
                    )),
                }
            }
            TokenKind::Identifier => {
                self.current += 1;
                if self.peek_kind() == Some(TokenKind::LParen) {
                    self.parse_call(&token)
                } else {
                    self.resolve_identifier(&token)
                }
            }
            TokenKind::LParen => {
                self.current += 1;
                let inner = self.parse_sum()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(ParseError::syntax_at(
                format!("Unexpected token '{}'", token.text),
                token.position,
            )),
        }
    }

    fn resolve_identifier(&mut self, token: &Token) -> Result<ASTNode, ParseError> {
        if let Some(value) = self.functions.constant(&token.text) {
            return Ok(ASTNode::Constant(value));
        }
        if self.functions.is_function(&token.text) {
            return Err(ParseError::syntax_at(
                format!("Function '{}' must be followed by '('", token.text),
                token.position,
            ));
        }
        Ok(ASTNode::Variable(token.text.clone()))
    }

    fn parse_call(&mut self, name: &Token) -> Result<ASTNode, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;

        let mut args = Vec::new();
        if self.peek_kind() == Some(TokenKind::RParen) {
            self.current += 1;
        } else {
            loop {
                args.push(self.parse_sum()?);
                match self.peek_kind() {
                    Some(TokenKind::Comma) => self.current += 1,
                    _ => {
                        self.expect(TokenKind::RParen, "',' or ')'")?;
                        break;
                    }
                }
            }
        }

        match self.functions.resolve(&name.text) {
            Some(signature) if signature.arity != args.len() => Err(ParseError::ArityMismatch {
                function: name.text.clone(),
                expected: signature.arity,
                got: args.len(),
            }),
            Some(signature) => Ok(ASTNode::call(signature.kind, args)),
            None => {
                // Keep going so every unknown name ends up in one error.
                self.unknown.insert(name.text.clone());
                Ok(ASTNode::Constant(0.0))
            }
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|token| token.kind)
    }

    fn peek_operator(&self, accepted: &[Operator]) -> Option<Operator> {
        let token = self.peek().filter(|token| token.kind == TokenKind::Operator)?;
        Operator::try_from(token.text.as_str())
            .ok()
            .filter(|operator| accepted.contains(operator))
    }

    fn consume_operator(&mut self, symbol: &str) -> bool {
        if self.peek().is_some_and(|token| token.is_operator(symbol)) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<(), ParseError> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                self.current += 1;
                Ok(())
            }
            Some(token) => Err(ParseError::syntax_at(
                format!("Expected {}, found '{}'", expected, token.text),
                token.position,
            )),
            None => Err(ParseError::syntax_at(
                format!("Expected {}, found end of input", expected),
                self.end,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::WarningKind;
    use crate::ast::{evaluate, Bindings, EvaluationError, UnaryOperator};
    use crate::functions::{CustomFunction, FunctionKind};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn ast_of(input: &str) -> ASTNode {
        parse(input, &ParseOptions::default()).unwrap().ast
    }

    fn at(x: f64) -> Bindings {
        Bindings::from([("x".to_string(), x)])
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            parse("", &ParseOptions::default()),
            Err(ParseError::EmptyExpression)
        );
        assert_eq!(
            parse("   ", &ParseOptions::default()),
            Err(ParseError::EmptyExpression)
        );
    }

    #[test]
    fn test_unbalanced_parentheses() {
        let inputs = vec!["(x + 1", "x + 1)", "((x)", ")x("];
        for input in inputs {
            assert!(
                matches!(
                    parse(input, &ParseOptions::default()),
                    Err(ParseError::UnbalancedParentheses { .. })
                ),
                "Input '{}' should be rejected as unbalanced",
                input
            );
        }
    }

    #[test]
    fn test_quadratic_with_allowed_variable() {
        let parsed = parse("x**2 - 4*x + 3", &ParseOptions::allow(&["x"])).unwrap();
        assert_eq!(parsed.variables, vec!["x".to_string()]);
        assert_eq!(evaluate(&parsed.ast, &at(1.0)).unwrap(), 0.0);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_simple_binary_expression() {
        let expected = ASTNode::binary(
            ASTNode::variable("x"),
            Operator::Add,
            ASTNode::Constant(100.0),
        );
        assert_eq!(ast_of("x + 100"), expected);
    }

    #[test]
    fn test_precedence() {
        let expected = ASTNode::binary(
            ASTNode::Constant(1.0),
            Operator::Add,
            ASTNode::binary(
                ASTNode::Constant(2.0),
                Operator::Multiply,
                ASTNode::binary(ASTNode::Constant(3.0), Operator::Power, ASTNode::Constant(2.0)),
            ),
        );
        assert_eq!(ast_of("1 + 2 * 3 ^ 2"), expected);
    }

    #[test]
    fn test_power_is_right_associative() {
        let expected = ASTNode::binary(
            ASTNode::Constant(2.0),
            Operator::Power,
            ASTNode::binary(ASTNode::Constant(3.0), Operator::Power, ASTNode::Constant(2.0)),
        );
        assert_eq!(ast_of("2^3^2"), expected);
        assert_eq!(evaluate(&ast_of("2^3^2"), &Bindings::new()).unwrap(), 512.0);
    }

    #[test]
    fn test_unary_minus_binds_looser_than_power_and_product() {
        let expected = ASTNode::negate(ASTNode::binary(
            ASTNode::variable("x"),
            Operator::Power,
            ASTNode::Constant(2.0),
        ));
        assert_eq!(ast_of("-x^2"), expected);

        let expected = ASTNode::negate(ASTNode::binary(
            ASTNode::Constant(2.0),
            Operator::Multiply,
            ASTNode::variable("x"),
        ));
        assert_eq!(ast_of("-2*x"), expected);
    }

    #[test]
    fn test_signed_operands() {
        assert_eq!(evaluate(&ast_of("2*-x"), &at(3.0)).unwrap(), -6.0);
        assert_eq!(evaluate(&ast_of("x^-2"), &at(2.0)).unwrap(), 0.25);
        assert_eq!(evaluate(&ast_of("x - -1"), &at(2.0)).unwrap(), 3.0);
        assert_eq!(evaluate(&ast_of("+x"), &at(2.0)).unwrap(), 2.0);
    }

    #[test]
    fn test_implicit_multiplication() {
        assert_eq!(ast_of("2x"), ast_of("2*x"));
        assert_eq!(ast_of("2(x+1)"), ast_of("2*(x+1)"));
        assert_eq!(ast_of("(x+1)(x-1)"), ast_of("(x+1)*(x-1)"));
        assert_eq!(ast_of("3x^2"), ast_of("3*x^2"));
        assert_eq!(ast_of("2sin(x)"), ast_of("2*sin(x)"));
    }

    #[test]
    fn test_implicit_multiplication_can_be_disabled() {
        let options = ParseOptions::default().with_implicit_multiplication(false);
        assert!(matches!(
            parse("2x", &options),
            Err(ParseError::SyntaxError { .. })
        ));
    }

    #[test]
    fn test_constants_resolve_to_values() {
        assert_eq!(ast_of("pi"), ASTNode::Constant(std::f64::consts::PI));
        assert_eq!(ast_of("2e"), ast_of("2*e"));
        let parsed = parse("pi*x + e", &ParseOptions::default()).unwrap();
        assert_eq!(parsed.variables, vec!["x".to_string()]);
    }

    #[test]
    fn test_function_call() {
        let expected = ASTNode::call(FunctionKind::Sin, vec![ASTNode::variable("x")]);
        assert_eq!(ast_of("sin(x)"), expected);
        assert_eq!(ast_of("ln(x)"), ast_of("log(x)"));
        assert_eq!(ast_of("√x"), ast_of("sqrt(x)"));
        assert_eq!(ast_of("√ x"), ast_of("sqrt(x)"));
        assert_eq!(evaluate(&ast_of("√-x"), &at(-4.0)).unwrap(), 2.0);
    }

    #[test]
    fn test_trig_sum_has_no_warnings() {
        let parsed = parse("sin(x) + cos(2*x)", &ParseOptions::allow(&["x"])).unwrap();
        assert_eq!(parsed.variables, vec!["x".to_string()]);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_arity_mismatch() {
        assert_eq!(
            parse("sin(x, 2)", &ParseOptions::default()),
            Err(ParseError::ArityMismatch {
                function: "sin".to_string(),
                expected: 1,
                got: 2,
            })
        );
        assert!(matches!(
            parse("cos()", &ParseOptions::default()),
            Err(ParseError::ArityMismatch { got: 0, .. })
        ));
    }

    #[test]
    fn test_disallowed_variable() {
        match parse("y + 1", &ParseOptions::allow(&["x"])) {
            Err(ParseError::InvalidVariable { invalid, allowed }) => {
                assert_eq!(invalid, vec!["y".to_string()]);
                assert_eq!(allowed, vec!["x".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_functions_are_collected() {
        match parse("foo(x) + bar(2) + x", &ParseOptions::default()) {
            Err(ParseError::InvalidVariable { invalid, .. }) => {
                assert_eq!(invalid, vec!["bar".to_string(), "foo".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_function_name_without_call() {
        assert!(matches!(
            parse("sin + 1", &ParseOptions::default()),
            Err(ParseError::SyntaxError { .. })
        ));
    }

    #[test]
    fn test_invalid_syntax() {
        let inputs = vec!["x +", "* x", "x y", "2 3", "()", "sin(x,)", "x ^", "1 $ 2"];
        for input in inputs {
            assert!(
                matches!(
                    parse(input, &ParseOptions::default()),
                    Err(ParseError::SyntaxError { .. })
                ),
                "Input '{}' should fail to parse, but it succeeded",
                input
            );
        }
    }

    #[test]
    fn test_overflowing_literal_is_rejected() {
        match parse("1e999 + x", &ParseOptions::default()) {
            Err(ParseError::SyntaxError { message, position }) => {
                assert_eq!(message, "Number out of range: '1e999'");
                assert_eq!(position, Some(0));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(parse("1e300 * x", &ParseOptions::default()).is_ok());
    }

    #[test]
    fn test_syntax_error_position() {
        match parse("x + * 2", &ParseOptions::default()) {
            Err(ParseError::SyntaxError { position, .. }) => assert_eq!(position, Some(4)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_error_messages_are_readable() {
        let error = parse("y", &ParseOptions::allow(&["x"])).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Variables not allowed: [\"y\"]. Allowed: [\"x\"]"
        );
        let error = parse("(x", &ParseOptions::default()).unwrap_err();
        assert_eq!(error.to_string(), "Unbalanced parentheses at position 1");
    }

    #[test]
    fn test_division_warning_attached() {
        let parsed = parse("1/(x-2)", &ParseOptions::default()).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].kind, WarningKind::DivisionByZero);
        assert_eq!(parsed.warnings[0].critical_points, vec![2.0]);
        assert_eq!(
            evaluate(&parsed.ast, &at(2.0)),
            Err(EvaluationError::DivisionByZero)
        );
    }

    #[test]
    fn test_deeply_nested_powers_in_denominator() {
        let parsed = parse(
            "1/(((((((x^32)^32)^32)^32)^32)^32)^32)",
            &ParseOptions::default(),
        )
        .unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].description, "x ≠ 0");
        assert_eq!(parsed.warnings[0].critical_points, vec![0.0]);
    }

    #[test]
    fn test_simplify_option() {
        let parsed = parse("x + x + 2*3", &ParseOptions::default().with_simplify(true)).unwrap();
        assert_eq!(parsed.ast.to_string(), "2*x + 6");
        assert!(parsed.notes.is_empty());

        let cancelled = parse("x - x + y", &ParseOptions::default().with_simplify(true)).unwrap();
        assert_eq!(cancelled.variables, vec!["y".to_string()]);
    }

    #[test]
    fn test_warnings_come_from_unsimplified_tree() {
        let parsed = parse("x/x", &ParseOptions::default().with_simplify(true)).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].critical_points, vec![0.0]);
    }

    #[test]
    fn test_custom_function_table() {
        let table = FunctionTable::default()
            .with_function("hypot", CustomFunction::new(2, |args| args[0].hypot(args[1])))
            .with_constant("tau", 2.0 * std::f64::consts::PI);
        let parser = ExpressionParser::new(table);

        let parsed = parser.parse("hypot(x, 4) + tau", &ParseOptions::default()).unwrap();
        assert_eq!(parsed.variables, vec!["x".to_string()]);
        assert!(matches!(
            parser.parse("hypot(x)", &ParseOptions::default()),
            Err(ParseError::ArityMismatch { expected: 2, got: 1, .. })
        ));
    }

    #[test]
    fn test_unary_node_shape() {
        match ast_of("-x") {
            ASTNode::UnaryOperation { operator, operand } => {
                assert_eq!(operator, UnaryOperator::Negate);
                assert_eq!(*operand, ASTNode::variable("x"));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_render_and_reparse_evaluates_identically() {
        let inputs = vec![
            "x**2 - 4*x + 3",
            "1/(x-2)",
            "-x^2 + 2(x-1)(x+1)",
            "sin(x) + cos(2*x)",
            "x^-2 - -x",
            "exp(-x^2/2)/sqrt(2*pi)",
            "(x+1)^(1/3)^2",
            "2*-x/(3*(x+4))",
            "log(abs(x) + 1) - tanh(x)*e",
            "x - (x - (x - 1))",
            "1e300*x + 2.5e-300",
        ];
        let mut rng = StdRng::seed_from_u64(7);

        for input in inputs {
            let original = ast_of(input);
            let rendered = original.to_string();
            let reparsed = parse(&rendered, &ParseOptions::default())
                .unwrap_or_else(|e| panic!("'{}' rendered as '{}': {}", input, rendered, e))
                .ast;

            for _ in 0..25 {
                let bindings = at(rng.random_range(-5.0..5.0));
                match (evaluate(&original, &bindings), evaluate(&reparsed, &bindings)) {
                    (Ok(a), Ok(b)) => assert!(
                        (a - b).abs() <= 1e-12 * a.abs().max(1.0),
                        "{} vs {} for '{}'",
                        a,
                        b,
                        input
                    ),
                    (Err(_), Err(_)) => {}
                    (a, b) => panic!("'{}' diverged: {:?} vs {:?}", input, a, b),
                }
            }
        }
    }
}
