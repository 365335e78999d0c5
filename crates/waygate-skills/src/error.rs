//! Skill compiler error types.

use thiserror::Error;

/// Errors from compiling skills into roles.
#[derive(Debug, Error)]
pub enum SkillError {
    /// The requested role is not in the compiled table.
    #[error("role not found: {role}")]
    RoleNotFound {
        /// The role that was requested.
        role: String,
    },

    /// A skill declared a tool pattern the grammar does not recognize.
    #[error("skill {skill} has an invalid tool pattern: {pattern}")]
    InvalidToolPattern {
        /// The skill carrying the pattern.
        skill: String,
        /// The offending pattern.
        pattern: String,
    },
}

/// Result type for skill operations.
pub type SkillResult<T> = Result<T, SkillError>;
