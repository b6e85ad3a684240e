//! Domain error types.
//!
//! Compile errors are fatal to a single call and carry line/column, evaluation
//! errors are always surfaced to the caller, and validation problems are
//! reported as lists (see `validator`) rather than through this module.

use std::path::{Path, PathBuf};

/// A syntax error with position information.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("compile error at line {line}, column {column}: {message}")]
pub struct CompileError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    /// Byte offset into the source.
    pub offset: usize,
}

impl CompileError {
    /// Format the error with a caret pointing at the error column of the failing line.
    pub fn display_with_context(&self, input: &str) -> String {
        let source_line = input.lines().nth(self.line.saturating_sub(1)).unwrap_or("");
        let caret = " ".repeat(self.column.saturating_sub(1)) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = source_line,
            caret = caret,
            err = self
        )
    }
}

/// Argument count or type mismatch detected before a function body runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{function}(): expected {expected}, got {actual}")]
pub struct ArgumentError {
    pub function: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("type mismatch in {operation}: expected {expected}, found {found}")]
    TypeMismatch {
        operation: String,
        expected: String,
        found: String,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error("function {name}() failed: {detail}")]
    Function { name: String, detail: String },

    #[error("evaluation exceeded {limit_ms} ms")]
    Timeout { limit_ms: u64 },
}

impl EvaluationError {
    pub fn type_mismatch(operation: &str, expected: &str, found: &str) -> Self {
        EvaluationError::TypeMismatch {
            operation: operation.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn function(name: &str, detail: impl Into<String>) -> Self {
        EvaluationError::Function {
            name: name.to_string(),
            detail: detail.into(),
        }
    }
}

/// Malformed project-variable definition (file structure or a single variable).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid project variables{}: {reason}", location(.path, .variable))]
pub struct VariableValidationError {
    pub path: Option<PathBuf>,
    pub variable: Option<String>,
    pub reason: String,
}

fn location(path: &Option<PathBuf>, variable: &Option<String>) -> String {
    match (path, variable) {
        (Some(p), Some(v)) => format!(" in {} (variable '{}')", p.display(), v),
        (Some(p), None) => format!(" in {}", p.display()),
        (None, Some(v)) => format!(" (variable '{}')", v),
        (None, None) => String::new(),
    }
}

impl VariableValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            path: None,
            variable: None,
            reason: reason.into(),
        }
    }

    pub fn for_variable(variable: &str, reason: impl Into<String>) -> Self {
        Self {
            path: None,
            variable: Some(variable.to_string()),
            reason: reason.into(),
        }
    }

    pub fn at_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("function '{name}' is already registered")]
pub struct DuplicateFunctionError {
    pub name: String,
}

/// Failure to obtain project variables from disk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectStoreError {
    #[error("project variable file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("i/o error on {}: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },

    #[error(transparent)]
    Invalid(#[from] VariableValidationError),
}

/// Top-level error type for tradecel.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid regime configuration: {reason}")]
    RegimeConfig { reason: String },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    ProjectStore(#[from] ProjectStoreError),

    #[error(transparent)]
    VariableValidation(#[from] VariableValidationError),

    #[error(transparent)]
    DuplicateFunction(#[from] DuplicateFunctionError),

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. }
            | EngineError::RegimeConfig { .. } => 2,
            EngineError::ProjectStore(_) | EngineError::VariableValidation(_) => 3,
            EngineError::Compile(_) | EngineError::DuplicateFunction(_) => 4,
            EngineError::Evaluation(_) => 5,
            EngineError::Data { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
