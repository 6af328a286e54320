//! Textual normalization and tokenization.
//!
//! Raw input goes through three stages before the parser sees it:
//! [`preprocess`] folds notational variants into one canonical spelling,
//! [`check_parentheses`] rejects unbalanced input, and [`tokenize`] turns the
//! normalized text into [`Token`]s using the pest grammar in `expression.pest`.
//! [`insert_implicit_multiplication`] then makes `2x` and `2(x+1)` explicit.

use crate::ast::ParseError;
use log::trace;
use pest::error::InputLocation;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "./expression.pest"]
struct ExpressionLexer;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Number,
    Identifier,
    Operator,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset in the normalized text.
    pub position: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: &str, position: usize) -> Self {
        Self {
            kind,
            text: text.to_string(),
            position,
        }
    }

    pub fn is_operator(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == symbol
    }
}

const LOOKALIKES: [(char, &str); 10] = [
    ('\u{2212}', "-"),
    ('\u{2013}', "-"),
    ('\u{00d7}', "*"),
    ('\u{00b7}', "*"),
    ('\u{22c5}', "*"),
    ('\u{2217}', "*"),
    ('\u{00f7}', "/"),
    ('\u{03c0}', "pi"),
    ('\u{00b2}', "^2"),
    ('\u{00b3}', "^3"),
];

/// Trims the input and folds notational variants into canonical text.
///
/// `**` becomes `^`, `√` becomes a `sqrt` call and Unicode lookalikes are
/// replaced by their ASCII spelling. Fails with `EmptyExpression` when nothing
/// but whitespace is left.
pub fn preprocess(input: &str) -> Result<String, ParseError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(ParseError::EmptyExpression);
    }

    let mut normalized = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut depth = 0usize;
    // Depths at which a `√-(...)` argument still needs its closing `)`.
    let mut closers: Vec<usize> = Vec::new();

    while let Some(c) = chars.next() {
        if c == '√' {
            normalized.push_str("sqrt");
            while chars.next_if(|next| next.is_whitespace()).is_some() {}

            // `√x`, `√2` and `√-x` take the following operand run as the
            // argument; `√-(...)` takes the signed group.
            let sign = chars.next_if(|next| matches!(next, '-' | '+' | '\u{2212}'));
            let mut operand = String::new();
            while let Some(next) = chars.next_if(|ch| is_operand_char(*ch)) {
                operand.push(next);
            }

            match sign {
                Some(sign) => {
                    normalized.push('(');
                    normalized.push(if sign == '+' { '+' } else { '-' });
                    normalized.push_str(&operand);
                    if operand.is_empty() && chars.peek() == Some(&'(') {
                        closers.push(depth);
                    } else {
                        normalized.push(')');
                    }
                }
                None if !operand.is_empty() => {
                    normalized.push('(');
                    normalized.push_str(&operand);
                    normalized.push(')');
                }
                None => {}
            }
            continue;
        }

        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                normalized.push(')');
                if closers.last() == Some(&depth) {
                    closers.pop();
                    normalized.push(')');
                }
                continue;
            }
            _ => {}
        }

        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();
            normalized.push('^');
            continue;
        }

        match LOOKALIKES.iter().find(|(lookalike, _)| *lookalike == c) {
            Some((_, replacement)) => normalized.push_str(replacement),
            None => normalized.push(c),
        }
    }

    Ok(normalized)
}

fn is_operand_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Verifies that every `)` closes an earlier `(` and nothing is left open.
pub fn check_parentheses(text: &str) -> Result<(), ParseError> {
    let mut open = Vec::new();
    for (position, c) in text.char_indices() {
        match c {
            '(' => open.push(position),
            ')' => {
                if open.pop().is_none() {
                    return Err(ParseError::UnbalancedParentheses {
                        position: Some(position),
                    });
                }
            }
            _ => {}
        }
    }

    match open.first() {
        Some(position) => Err(ParseError::UnbalancedParentheses {
            position: Some(*position),
        }),
        None => Ok(()),
    }
}

/// Splits normalized text into tokens.
pub fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let stream = ExpressionLexer::parse(Rule::tokens, text)
        .map_err(|e| {
            let position = match e.location {
                InputLocation::Pos(position) => position,
                InputLocation::Span((start, _)) => start,
            };
            let found = text[position..].chars().next();
            let message = match found {
                Some(c) => format!("Unexpected character '{}'", c),
                None => "Unexpected end of input".to_string(),
            };
            ParseError::syntax_at(message, position)
        })?
        .next()
        .ok_or_else(|| ParseError::syntax("Failed to tokenize expression"))?;

    let mut tokens = Vec::new();
    for pair in stream.into_inner() {
        let kind = match pair.as_rule() {
            Rule::number => TokenKind::Number,
            Rule::identifier => TokenKind::Identifier,
            Rule::operator => TokenKind::Operator,
            Rule::lparen => TokenKind::LParen,
            Rule::rparen => TokenKind::RParen,
            Rule::comma => TokenKind::Comma,
            Rule::EOI => continue,
            rule => {
                return Err(ParseError::syntax_at(
                    format!("Unexpected rule: {:?}", rule),
                    pair.as_span().start(),
                ))
            }
        };
        tokens.push(Token::new(kind, pair.as_str(), pair.as_span().start()));
    }

    trace!("Tokens: {:?}", tokens);
    Ok(tokens)
}

/// Inserts `*` where a number or `)` is directly followed by an identifier
/// or `(`.
pub fn insert_implicit_multiplication(tokens: Vec<Token>) -> Vec<Token> {
    let mut result: Vec<Token> = Vec::with_capacity(tokens.len());

    for token in tokens {
        let implied = result.last().is_some_and(|previous| {
            matches!(previous.kind, TokenKind::Number | TokenKind::RParen)
                && matches!(token.kind, TokenKind::Identifier | TokenKind::LParen)
        });
        if implied {
            result.push(Token::new(TokenKind::Operator, "*", token.position));
        }
        result.push(token);
    }

    result
}
