//! Compiler errors and warnings.

use tempera_carton::CompactString;
use thiserror::Error;

use crate::ast::SourceLocation;

/// Fatal compilation error. Aborts the current compilation unit.
#[derive(Debug, Error)]
pub enum CompileError {
    /// No grammar rule could be applied at the current position
    #[error("{loc}: {message}; near: '{near}'")]
    Lex {
        loc: SourceLocation,
        message: CompactString,
        near: String,
    },

    /// Input ended with a token still open
    #[error("{loc}: {kind} not terminated")]
    UnterminatedToken { kind: &'static str, loc: SourceLocation },

    /// Input ended in a lexer state that requires more input
    #[error("{loc}: unexpected end of input in state '{state}'")]
    UnterminatedState { state: &'static str, loc: SourceLocation },

    /// A bracketing construct never saw its terminator
    #[error("{loc}: {kind} tag not terminated")]
    UnterminatedConstruct { kind: &'static str, loc: SourceLocation },

    /// Script scope structure could not be understood
    #[error("{loc}: {message}")]
    Scope {
        loc: SourceLocation,
        message: CompactString,
    },

    /// Template-level semantic error
    #[error("{loc}: {message}")]
    Template {
        loc: SourceLocation,
        message: CompactString,
    },

    /// A referenced template could not be loaded
    #[error("{loc}: template '{name}' could not be loaded: {source}")]
    Load {
        name: CompactString,
        loc: SourceLocation,
        #[source]
        source: LoadError,
    },

    #[error("{loc}: No such template preprocessor option: {option}")]
    UnknownOption {
        option: CompactString,
        loc: SourceLocation,
    },

    /// Broken grammar table
    #[error("invalid grammar: {0}")]
    Grammar(String),
}

impl CompileError {
    /// Location the error points at, if it has one.
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            CompileError::Lex { loc, .. }
            | CompileError::UnterminatedToken { loc, .. }
            | CompileError::UnterminatedState { loc, .. }
            | CompileError::UnterminatedConstruct { loc, .. }
            | CompileError::Scope { loc, .. }
            | CompileError::Template { loc, .. }
            | CompileError::Load { loc, .. }
            | CompileError::UnknownOption { loc, .. } => Some(loc),
            CompileError::Grammar(_) => None,
        }
    }

    pub fn template(loc: &SourceLocation, message: impl Into<CompactString>) -> Self {
        CompileError::Template {
            loc: loc.clone(),
            message: message.into(),
        }
    }

    pub fn scope(loc: &SourceLocation, message: impl Into<CompactString>) -> Self {
        CompileError::Scope {
            loc: loc.clone(),
            message: message.into(),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Failure of a template loader.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("template not found")]
    NotFound,

    #[error("loader does not support template loading")]
    Unsupported,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Non-fatal diagnostic collected during compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileWarning {
    pub loc: SourceLocation,
    pub message: CompactString,
}

impl std::fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.loc, self.message)
    }
}
