//! Error types for allocation evaluation.

use thiserror::Error;

use crate::Amount;
use crate::formula::FormulaError;
use crate::model::RuleId;

/// Error returned by [`evaluate`](super::evaluate).
#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
    #[error("rule {0} has no targets")]
    NoTargets(RuleId),

    #[error("no driver value for target '{0}'")]
    MissingDriver(String),

    #[error("driver value {1} for target '{0}' is negative or not finite")]
    InvalidDriver(String, f64),

    #[error("formula weight {1} for target '{0}' is negative")]
    InvalidWeight(String, f64),

    #[error("rule {0}: driver values sum to zero")]
    ZeroDriverTotal(RuleId),

    #[error("percentage {0} is outside 0..=100")]
    InvalidPercentage(f64),

    #[error("fixed amount {0} is negative")]
    NegativeFixedAmount(Amount),

    #[error("formula: {0}")]
    Formula(#[from] FormulaError),
}
