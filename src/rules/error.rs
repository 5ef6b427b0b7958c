//! Error types for rule management.

use thiserror::Error;

use crate::Amount;
use crate::formula::FormulaError;
use crate::model::RuleId;

/// Error returned by [`RuleBook`](super::RuleBook) operations.
#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("rule {0} not found")]
    NotFound(RuleId),

    #[error("invalid rule: {0}")]
    Invalid(#[from] ValidationError),
}

/// Why a rule was refused at the creation/update boundary.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("name is empty")]
    EmptyName,

    #[error("source account is empty")]
    EmptySource,

    #[error("no target accounts")]
    NoTargets,

    #[error("target account name is empty")]
    BlankTarget,

    #[error("driver name is empty")]
    EmptyDriver,

    #[error("percentage {0} is outside 0..=100")]
    InvalidPercentage(f64),

    #[error("fixed amount {0} is negative")]
    NegativeFixedAmount(Amount),

    #[error("formula: {0}")]
    Formula(#[from] FormulaError),
}
