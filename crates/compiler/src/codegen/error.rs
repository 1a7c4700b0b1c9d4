//! Code generation error types.

/// Error type for code generation operations.
///
/// Allows proper error propagation using `?` for both internal-consistency
/// errors (which indicate a checker bug, never a user error) and formatting
/// errors when writing into the emission buffer.
#[derive(Debug)]
pub enum CodeGenError {
    /// A broken invariant reached the generator (e.g. an untyped
    /// expression). These are compiler bugs.
    Internal(String),
    /// A formatting error when writing C text.
    Format(std::fmt::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Internal(s) => write!(f, "internal: {}", s),
            CodeGenError::Format(e) => write!(f, "C generation error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Internal(s)
    }
}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}
