pub mod allocation;
pub mod amount;
pub mod csv;
pub mod formula;
pub mod model;
pub mod rules;
pub mod scenario;
pub mod variance;

pub use allocation::{AllocationError, ZeroDriverPolicy, evaluate};
pub use amount::{Amount, AmountError};
pub use model::{AccountKind, AllocationResult, AllocationRule, RuleDraft, RuleId, RuleKind};
pub use rules::{RuleBook, RuleError};
pub use scenario::{Driver, DriverCategory, Scenario};
pub use variance::{Variance, VarianceError, VarianceRecord, VarianceReport, compute_variance};
