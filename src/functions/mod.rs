use std::collections::BTreeMap;
use std::f64::consts::{E, PI};
use std::fmt;
use std::sync::Arc;

/// Evaluation rule of a user-registered function.
pub type FunctionRule = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Returns `true` when the arguments lie inside the function's real domain.
pub type DomainGuard = Arc<dyn Fn(&[f64]) -> bool + Send + Sync>;

/// Every function an expression may call.
///
/// The built-in kinds are evaluated by a single `match` in the evaluator;
/// `Custom` defers to a [`FunctionTable`] entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Log,
    Sqrt,
    Abs,
    Custom(String),
}

impl FunctionKind {
    /// Canonical name used when an expression is rendered back to text.
    pub fn name(&self) -> &str {
        match self {
            FunctionKind::Sin => "sin",
            FunctionKind::Cos => "cos",
            FunctionKind::Tan => "tan",
            FunctionKind::Asin => "asin",
            FunctionKind::Acos => "acos",
            FunctionKind::Atan => "atan",
            FunctionKind::Sinh => "sinh",
            FunctionKind::Cosh => "cosh",
            FunctionKind::Tanh => "tanh",
            FunctionKind::Exp => "exp",
            FunctionKind::Log => "log",
            FunctionKind::Sqrt => "sqrt",
            FunctionKind::Abs => "abs",
            FunctionKind::Custom(name) => name,
        }
    }
}

impl TryFrom<&str> for FunctionKind {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "sin" => Ok(FunctionKind::Sin),
            "cos" => Ok(FunctionKind::Cos),
            "tan" => Ok(FunctionKind::Tan),
            "asin" => Ok(FunctionKind::Asin),
            "acos" => Ok(FunctionKind::Acos),
            "atan" => Ok(FunctionKind::Atan),
            "sinh" => Ok(FunctionKind::Sinh),
            "cosh" => Ok(FunctionKind::Cosh),
            "tanh" => Ok(FunctionKind::Tanh),
            "exp" => Ok(FunctionKind::Exp),
            "log" | "ln" => Ok(FunctionKind::Log),
            "sqrt" => Ok(FunctionKind::Sqrt),
            "abs" => Ok(FunctionKind::Abs),
            _ => Err(format!("Unknown function: {}", value)),
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A function registered on top of the built-in set.
#[derive(Clone)]
pub struct CustomFunction {
    pub arity: usize,
    pub rule: FunctionRule,
    pub guard: Option<DomainGuard>,
}

impl CustomFunction {
    pub fn new<F>(arity: usize, rule: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            arity,
            rule: Arc::new(rule),
            guard: None,
        }
    }

    /// Attaches a domain guard; arguments it rejects evaluate to a domain error.
    pub fn with_guard<G>(mut self, guard: G) -> Self
    where
        G: Fn(&[f64]) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }
}

impl fmt::Debug for CustomFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFunction")
            .field("arity", &self.arity)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

/// A resolved function name: its kind plus the number of arguments it takes.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub kind: FunctionKind,
    pub arity: usize,
}

/// Immutable set of named constants and callable functions.
///
/// Built once and handed to the parser and evaluator; extending it produces a
/// new table instead of mutating shared state.
#[derive(Debug, Clone)]
pub struct FunctionTable {
    constants: BTreeMap<String, f64>,
    aliases: BTreeMap<String, FunctionKind>,
    custom: BTreeMap<String, CustomFunction>,
}

const BUILTIN_NAMES: [&str; 14] = [
    "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "exp", "log", "ln",
    "sqrt", "abs",
];

impl Default for FunctionTable {
    fn default() -> Self {
        let aliases = BUILTIN_NAMES
            .iter()
            .filter_map(|name| {
                FunctionKind::try_from(*name)
                    .ok()
                    .map(|kind| (name.to_string(), kind))
            })
            .collect();

        Self {
            constants: BTreeMap::from([("pi".to_string(), PI), ("e".to_string(), E)]),
            aliases,
            custom: BTreeMap::new(),
        }
    }
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the table with an extra named constant.
    pub fn with_constant(mut self, name: &str, value: f64) -> Self {
        self.constants.insert(name.to_string(), value);
        self
    }

    /// Returns a copy of the table with an extra function.
    ///
    /// Registering a built-in name replaces the built-in for this table.
    pub fn with_function(mut self, name: &str, function: CustomFunction) -> Self {
        self.aliases.remove(name);
        self.custom.insert(name.to_string(), function);
        self
    }

    pub fn constant(&self, name: &str) -> Option<f64> {
        self.constants.get(name).copied()
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.aliases.contains_key(name) || self.custom.contains_key(name)
    }

    /// Resolves a call target by name.
    pub fn resolve(&self, name: &str) -> Option<FunctionSignature> {
        if let Some(kind) = self.aliases.get(name) {
            return Some(FunctionSignature {
                kind: kind.clone(),
                arity: 1,
            });
        }
        self.custom.get(name).map(|function| FunctionSignature {
            kind: FunctionKind::Custom(name.to_string()),
            arity: function.arity,
        })
    }

    pub fn custom(&self, name: &str) -> Option<&CustomFunction> {
        self.custom.get(name)
    }

    /// Names of every constant and function, sorted.
    pub fn known_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .constants
            .keys()
            .chain(self.aliases.keys())
            .chain(self.custom.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
