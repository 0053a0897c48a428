use thiserror::Error;

/// Rejections raised by a [`Zone`](crate::Zone) while accounting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    #[error("zone '{zone}' over budget: requested {requested} bytes with {active} active of {budget}")]
    BudgetExceeded {
        zone: String,
        requested: usize,
        active: usize,
        budget: usize,
    },
}

/// Errors surfaced by allocators to their callers.
///
/// Only these are recoverable. Double frees, leaks and corrupted headers are
/// programming defects and panic instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error(transparent)]
    BudgetExceeded(#[from] ZoneError),

    #[error("heap could not satisfy {size} bytes aligned to {alignment}")]
    OutOfMemory { size: usize, alignment: usize },

    #[error("invalid layout: {size} bytes aligned to {alignment}")]
    InvalidLayout { size: usize, alignment: usize },
}

impl AllocError {
    /// True when the owning zone refused the request; the heap itself was fine.
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, AllocError::BudgetExceeded(_))
    }
}
