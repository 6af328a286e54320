use crate::ast::ASTNode;
use crate::functions::{FunctionKind, FunctionTable};
use log::trace;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Variable name to value.
pub type Bindings = HashMap<String, f64>;

/// Why an expression has no real value at a point.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("Missing values for: {}", .0.join(", "))]
    MissingBinding(Vec<String>),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Domain error: {0}")]
    DomainError(String),

    #[error("Undefined result (NaN or infinity)")]
    UndefinedResult,

    #[error("Function {0} not registered")]
    UnknownFunction(String),
}

/// Evaluates ASTs against variable bindings.
///
/// Expressions without free variables are cached by their rendered text, so
/// repeated queries on the same constant expression are computed once.
pub struct Evaluator {
    functions: FunctionTable,
    cache: Option<Mutex<LruCache<String, f64>>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Evaluator {
    /// Creates a new `Evaluator` with a given maximum cache size; 0 disables
    /// the cache.
    pub fn new(max_cache_size: usize) -> Self {
        Self::with_functions(FunctionTable::default(), max_cache_size)
    }

    pub fn with_functions(functions: FunctionTable, max_cache_size: usize) -> Self {
        Self {
            functions,
            cache: NonZeroUsize::new(max_cache_size).map(|size| Mutex::new(LruCache::new(size))),
        }
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Evaluates `ast` with every free variable taken from `bindings`.
    ///
    /// # Returns
    ///
    /// * `Ok(f64)` for a finite real result.
    /// * `Err(EvaluationError::MissingBinding)` naming every unbound variable.
    /// * Any other `EvaluationError` when the expression is undefined there.
    pub fn evaluate(&self, ast: &ASTNode, bindings: &Bindings) -> Result<f64, EvaluationError> {
        let variables = ast.free_variables();
        let missing: Vec<String> = variables
            .iter()
            .filter(|name| !bindings.contains_key(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(EvaluationError::MissingBinding(missing));
        }

        match (&self.cache, variables.is_empty()) {
            (Some(cache), true) => self.evaluate_cached(cache, ast),
            _ => self.evaluate_unchecked(ast, bindings),
        }
    }

    /// Evaluates with a single variable bound to `value`.
    pub fn evaluate_at(
        &self,
        ast: &ASTNode,
        variable: &str,
        value: f64,
    ) -> Result<f64, EvaluationError> {
        let bindings = Bindings::from([(variable.to_string(), value)]);
        self.evaluate(ast, &bindings)
    }

    /// Skips the upfront scan for unbound variables. An unbound variable still
    /// fails, naming only the first one reached.
    pub fn evaluate_unchecked(
        &self,
        ast: &ASTNode,
        bindings: &Bindings,
    ) -> Result<f64, EvaluationError> {
        let value = self.evaluate_node(ast, bindings)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvaluationError::UndefinedResult)
        }
    }

    fn evaluate_cached(
        &self,
        cache: &Mutex<LruCache<String, f64>>,
        ast: &ASTNode,
    ) -> Result<f64, EvaluationError> {
        let key = ast.to_string();
        if let Some(value) = cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
        {
            trace!("Constant cache hit: {}", key);
            return Ok(value);
        }

        let value = self.evaluate_unchecked(ast, &Bindings::new())?;
        cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, value);
        Ok(value)
    }

    fn evaluate_node(&self, ast: &ASTNode, bindings: &Bindings) -> Result<f64, EvaluationError> {
        match ast {
            ASTNode::Constant(value) => Ok(*value),

            ASTNode::Variable(name) => bindings
                .get(name)
                .copied()
                .ok_or_else(|| EvaluationError::MissingBinding(vec![name.clone()])),

            ASTNode::BinaryOperation {
                left,
                operator,
                right,
            } => {
                let left_value = self.evaluate_node(left, bindings)?;
                let right_value = self.evaluate_node(right, bindings)?;
                operator.apply(left_value, right_value)
            }

            ASTNode::UnaryOperation { operator, operand } => {
                Ok(operator.apply(self.evaluate_node(operand, bindings)?))
            }

            ASTNode::FunctionCall { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.evaluate_node(arg, bindings))
                    .collect::<Result<Vec<f64>, EvaluationError>>()?;
                self.call(function, &values)
            }
        }
    }

    fn call(&self, function: &FunctionKind, args: &[f64]) -> Result<f64, EvaluationError> {
        if let FunctionKind::Custom(name) = function {
            let custom = self
                .functions
                .custom(name)
                .ok_or_else(|| EvaluationError::UnknownFunction(name.clone()))?;
            if let Some(guard) = &custom.guard {
                if !guard(args) {
                    return Err(EvaluationError::DomainError(format!(
                        "{}({}) is outside the domain",
                        name,
                        join_values(args)
                    )));
                }
            }
            return Ok((custom.rule)(args));
        }

        let [x] = args else {
            return Err(EvaluationError::DomainError(format!(
                "{} takes one argument, got {}",
                function,
                args.len()
            )));
        };
        let x = *x;

        match function {
            FunctionKind::Sin => Ok(x.sin()),
            FunctionKind::Cos => Ok(x.cos()),
            FunctionKind::Tan => Ok(x.tan()),
            FunctionKind::Asin | FunctionKind::Acos if !(-1.0..=1.0).contains(&x) => Err(
                EvaluationError::DomainError(format!("{}({}) has no real value", function, x)),
            ),
            FunctionKind::Asin => Ok(x.asin()),
            FunctionKind::Acos => Ok(x.acos()),
            FunctionKind::Atan => Ok(x.atan()),
            FunctionKind::Sinh => Ok(x.sinh()),
            FunctionKind::Cosh => Ok(x.cosh()),
            FunctionKind::Tanh => Ok(x.tanh()),
            FunctionKind::Exp => Ok(x.exp()),
            FunctionKind::Log if x <= 0.0 => Err(EvaluationError::DomainError(format!(
                "log of non-positive number {}",
                x
            ))),
            FunctionKind::Log => Ok(x.ln()),
            FunctionKind::Sqrt if x < 0.0 => Err(EvaluationError::DomainError(format!(
                "sqrt of negative number {}",
                x
            ))),
            FunctionKind::Sqrt => Ok(x.sqrt()),
            FunctionKind::Abs => Ok(x.abs()),
            FunctionKind::Custom(name) => Err(EvaluationError::UnknownFunction(name.clone())),
        }
    }
}

fn join_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Evaluates `ast` with the default function table.
pub fn evaluate(ast: &ASTNode, bindings: &Bindings) -> Result<f64, EvaluationError> {
    Evaluator::new(0).evaluate(ast, bindings)
}
