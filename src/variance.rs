//! Actual-versus-reference variance.

use thiserror::Error;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::Amount;
use crate::model::AccountKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VarianceError {
    #[error("variance of {actual} against {reference} overflows the amount range")]
    Overflow { actual: Amount, reference: Amount },

    #[error("report totals overflow the amount range")]
    TotalOverflow,
}

/// Difference between an actual value and a reference value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variance {
    /// `actual - reference`.
    pub variance: Amount,
    /// `variance / |reference| * 100`, `None` when the reference is zero.
    pub variance_percent: Option<f64>,
}

/// Compute the variance of `actual` against `budget`.
pub fn compute_variance(actual: Amount, budget: Amount) -> Result<Variance, VarianceError> {
    let variance = actual
        .checked_sub(budget)
        .ok_or(VarianceError::Overflow {
            actual,
            reference: budget,
        })?;
    let variance_percent = if budget.is_zero() {
        None
    } else {
        Some(variance.scaled() as f64 / (budget.scaled() as f64).abs() * 100.0)
    };
    Ok(Variance {
        variance,
        variance_percent,
    })
}

/// Render a variance percentage with one decimal and an explicit sign.
pub fn format_percent(percent: Option<f64>) -> String {
    match percent {
        Some(p) => format!("{p:+.1}%"),
        None => "n/a".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarianceStatus {
    Favorable,
    Unfavorable,
    OnBudget,
}

impl VarianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VarianceStatus::Favorable => "favorable",
            VarianceStatus::Unfavorable => "unfavorable",
            VarianceStatus::OnBudget => "on_budget",
        }
    }
}

/// One account line of a budget-versus-actual report.
///
/// Variances are computed when the line is built, so a record that exists
/// always has a representable variance.
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceRecord {
    pub account: String,
    pub kind: AccountKind,
    actual: Amount,
    budget: Amount,
    variance: Variance,
    prior_year: Option<(Amount, Variance)>,
}

impl VarianceRecord {
    pub fn new(
        account: impl Into<String>,
        kind: AccountKind,
        actual: Amount,
        budget: Amount,
    ) -> Result<Self, VarianceError> {
        Ok(Self {
            account: account.into(),
            kind,
            actual,
            budget,
            variance: compute_variance(actual, budget)?,
            prior_year: None,
        })
    }

    pub fn with_prior_year(mut self, prior_year: Amount) -> Result<Self, VarianceError> {
        self.prior_year = Some((prior_year, compute_variance(self.actual, prior_year)?));
        Ok(self)
    }

    pub fn actual(&self) -> Amount {
        self.actual
    }

    pub fn budget(&self) -> Amount {
        self.budget
    }

    pub fn prior_year(&self) -> Option<Amount> {
        self.prior_year.map(|(amount, _)| amount)
    }

    pub fn variance(&self) -> Variance {
        self.variance
    }

    pub fn vs_prior_year(&self) -> Option<Variance> {
        self.prior_year.map(|(_, variance)| variance)
    }

    /// Overspending an expense budget is unfavorable, beating a revenue budget is favorable.
    pub fn status(&self) -> VarianceStatus {
        let variance = self.variance.variance;
        let favorable = match self.kind {
            AccountKind::Revenue => variance > Amount::ZERO,
            AccountKind::Expense => variance < Amount::ZERO,
        };
        if variance.is_zero() {
            VarianceStatus::OnBudget
        } else if favorable {
            VarianceStatus::Favorable
        } else {
            VarianceStatus::Unfavorable
        }
    }

    /// Whether the line deviates from budget by more than `threshold_percent`.
    ///
    /// A line with no budget is an anomaly as soon as anything was booked on it.
    pub fn is_anomaly(&self, threshold_percent: f64) -> bool {
        match self.variance.variance_percent {
            Some(percent) => percent.abs() > threshold_percent,
            None => !self.actual.is_zero(),
        }
    }
}

/// Collection of variance lines with report-level totals.
#[derive(Debug, Default)]
pub struct VarianceReport {
    records: Vec<VarianceRecord>,
}

impl VarianceReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: VarianceRecord) {
        debug!(
            account = %record.account,
            variance = %record.variance.variance,
            variance_percent = %format_percent(record.variance.variance_percent),
            "variance line added"
        );
        self.records.push(record);
    }

    /// Collect every record of the given stream
    pub async fn run(&mut self, mut stream: impl Stream<Item = VarianceRecord> + Unpin) {
        while let Some(record) = stream.next().await {
            self.push(record);
        }
    }

    pub fn records(&self) -> &[VarianceRecord] {
        &self.records
    }

    pub fn total_actual(&self) -> Result<Amount, VarianceError> {
        Amount::checked_sum(self.records.iter().map(|r| r.actual)).ok_or(VarianceError::TotalOverflow)
    }

    pub fn total_budget(&self) -> Result<Amount, VarianceError> {
        Amount::checked_sum(self.records.iter().map(|r| r.budget)).ok_or(VarianceError::TotalOverflow)
    }

    pub fn total_variance(&self) -> Result<Variance, VarianceError> {
        compute_variance(self.total_actual()?, self.total_budget()?)
    }

    /// Lines whose variance exceeds `threshold_percent`, in report order.
    pub fn flagged(&self, threshold_percent: f64) -> Vec<&VarianceRecord> {
        self.records
            .iter()
            .filter(|r| r.is_anomaly(threshold_percent))
            .collect()
    }

    /// Every line paired with its anomaly flag, in report order.
    ///
    /// Flagged lines are logged at `warn`.
    pub fn review(&self, threshold_percent: f64) -> Vec<(&VarianceRecord, bool)> {
        self.records
            .iter()
            .map(|record| {
                let flagged = record.is_anomaly(threshold_percent);
                if flagged {
                    warn!(
                        account = %record.account,
                        actual = %record.actual,
                        budget = %record.budget,
                        variance_percent = %format_percent(record.variance.variance_percent),
                        "variance above threshold"
                    );
                }
                (record, flagged)
            })
            .collect()
    }
}
