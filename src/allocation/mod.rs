//! Allocation evaluation.
//!
//! Splits a source amount across a rule's targets in proportion to per-target
//! weights. Driver-based, percentage and fixed-amount rules weight targets by
//! their driver value; formula rules compute the weight from an expression.
//! Amounts are reconciled so that they always add up to the allocated pool.

use std::collections::HashMap;

use crate::Amount;
use crate::formula::Formula;
use crate::model::{AllocationResult, AllocationRule, RuleKind};

mod error;
pub use error::AllocationError;

/// What to do when every target's weight is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroDriverPolicy {
    /// Fail with [`AllocationError::ZeroDriverTotal`].
    #[default]
    Reject,
    /// Give every target the same share.
    EqualSplit,
}

/// Evaluate `rule` against `total`, the current balance of the rule's source
/// account.
///
/// `drivers` must hold a non-negative value for every target of the rule.
/// Percentages add up to 100 and amounts add up exactly to the allocated
/// pool: the sub-unit remainders left after truncating each share are handed
/// out one unit at a time, largest remainder first. Weights whose sum does not
/// fit in an `f64` are rescaled by the largest weight first.
pub fn evaluate(
    rule: &AllocationRule,
    total: Amount,
    drivers: &HashMap<String, f64>,
    policy: ZeroDriverPolicy,
) -> Result<Vec<AllocationResult>, AllocationError> {
    if rule.targets.is_empty() {
        return Err(AllocationError::NoTargets(rule.id));
    }

    let driver_values = rule
        .targets
        .iter()
        .map(|target| {
            let value = *drivers
                .get(target)
                .ok_or_else(|| AllocationError::MissingDriver(target.clone()))?;
            if !value.is_finite() || value < 0.0 {
                return Err(AllocationError::InvalidDriver(target.clone(), value));
            }
            Ok(value)
        })
        .collect::<Result<Vec<f64>, _>>()?;

    let pool = pool(&rule.kind, total)?;
    let mut weights = weights(rule, total, &driver_values)?;

    let mut weight_total: f64 = weights.iter().sum();
    if !weight_total.is_finite() {
        let largest = weights.iter().copied().fold(0.0, f64::max);
        weights.iter_mut().for_each(|w| *w /= largest);
        weight_total = weights.iter().sum();
    }
    if weight_total == 0.0 {
        match policy {
            ZeroDriverPolicy::Reject => return Err(AllocationError::ZeroDriverTotal(rule.id)),
            ZeroDriverPolicy::EqualSplit => {
                weights.iter_mut().for_each(|w| *w = 1.0);
                weight_total = weights.len() as f64;
            }
        }
    }

    let amounts = split(pool, &weights, weight_total);

    Ok(rule
        .targets
        .iter()
        .zip(driver_values)
        .zip(weights.iter().zip(amounts))
        .map(|((target, driver_value), (weight, amount))| AllocationResult {
            target: target.clone(),
            driver_value,
            percentage: weight / weight_total * 100.0,
            amount,
        })
        .collect())
}

/// The part of `total` a rule hands out.
fn pool(kind: &RuleKind, total: Amount) -> Result<Amount, AllocationError> {
    match kind {
        RuleKind::Percentage(percent) => {
            if !percent.is_finite() || !(0.0..=100.0).contains(percent) {
                return Err(AllocationError::InvalidPercentage(*percent));
            }
            let scaled = (total.scaled() as f64 * percent / 100.0).round() as i64;
            Ok(Amount::from_scaled(scaled))
        }
        RuleKind::FixedAmount(amount) => {
            if amount.is_negative() {
                return Err(AllocationError::NegativeFixedAmount(*amount));
            }
            Ok(*amount)
        }
        RuleKind::DriverBased { .. } | RuleKind::Formula { .. } => Ok(total),
    }
}

fn weights(
    rule: &AllocationRule,
    total: Amount,
    driver_values: &[f64],
) -> Result<Vec<f64>, AllocationError> {
    let RuleKind::Formula { expression } = &rule.kind else {
        return Ok(driver_values.to_vec());
    };

    let formula = Formula::parse(expression)?;
    let driver_total: f64 = driver_values.iter().sum();
    let mut vars = HashMap::from([
        ("driver", 0.0),
        ("driver_total", driver_total),
        ("total", total.to_float()),
        ("targets", driver_values.len() as f64),
    ]);

    rule.targets
        .iter()
        .zip(driver_values)
        .map(|(target, value)| {
            vars.insert("driver", *value);
            let weight = formula.eval(&vars)?;
            if weight < 0.0 {
                return Err(AllocationError::InvalidWeight(target.clone(), weight));
            }
            Ok(weight)
        })
        .collect()
}

/// Largest-remainder split of `pool` in proportion to `weights`.
///
/// Runs in `O(n log n)` for `n` weights whatever the size of the pool.
fn split(pool: Amount, weights: &[f64], weight_total: f64) -> Vec<Amount> {
    let pool_units = pool.scaled();
    let exact: Vec<f64> = weights
        .iter()
        .map(|w| pool_units as f64 * w / weight_total)
        .collect();
    // i128 so that float rounding near the i64 bounds cannot overflow the sum
    let mut units: Vec<i128> = exact.iter().map(|e| e.floor() as i128).collect();

    // Only targets with a positive weight may receive leftover units
    let mut order: Vec<usize> = (0..weights.len()).filter(|&i| weights[i] > 0.0).collect();
    let fraction = |i: usize| exact[i] - exact[i].floor();
    order.sort_by(|&a, &b| fraction(b).total_cmp(&fraction(a)));

    if !order.is_empty() {
        let remainder = pool_units as i128 - units.iter().sum::<i128>();
        let eligible = order.len() as i128;
        let (every, leftover) = (remainder.div_euclid(eligible), remainder.rem_euclid(eligible));
        for (rank, &i) in order.iter().enumerate() {
            units[i] += every + i128::from((rank as i128) < leftover);
        }
    }

    units
        .into_iter()
        .map(|u| Amount::from_scaled(u as i64))
        .collect()
}
