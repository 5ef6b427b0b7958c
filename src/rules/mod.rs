//! Allocation rule book.
//!
//! Holds the user's allocation rules in insertion order and guards the
//! create/update boundary: a rule that reaches the book always has a name, a
//! source account, at least one target and a usable method-specific field.

use std::collections::HashMap;
use std::fmt;

use tracing::{info, warn};

use crate::Amount;
use crate::allocation::{self, ZeroDriverPolicy};
use crate::formula::Formula;
use crate::model::{AllocationResult, AllocationRule, RuleDraft, RuleId, RuleKind};

mod error;
pub use error::{RuleError, ValidationError};

/// In-memory store of allocation rules.
pub struct RuleBook {
    rules: Vec<AllocationRule>,
    /// Ids are never reused, even after a delete
    next_id: RuleId,
}

/// Public API
impl RuleBook {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            next_id: 1,
        }
    }

    /// All rules in insertion order.
    pub fn rules(&self) -> &[AllocationRule] {
        &self.rules
    }

    pub fn get(&self, id: RuleId) -> Option<&AllocationRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Validate and append a new rule, returning its id.
    pub fn create(&mut self, draft: RuleDraft) -> Result<RuleId, RuleError> {
        let result = validate(&draft.name, &draft.kind, &draft.source, &draft.targets)
            .map(|()| {
                let id = self.allocate_id();
                self.rules.push(draft.into_rule(id));
                id
            })
            .map_err(RuleError::from);
        Self::log_result("create", result.as_ref().ok().copied(), &result);
        result
    }

    /// Replace the rule with the same id.
    pub fn update(&mut self, rule: AllocationRule) -> Result<(), RuleError> {
        let id = rule.id;
        let result = self.apply_update(rule);
        Self::log_result("update", Some(id), &result);
        result
    }

    /// Remove a rule. Other rules are left untouched.
    pub fn delete(&mut self, id: RuleId) -> Result<AllocationRule, RuleError> {
        let result = self
            .position(id)
            .map(|idx| self.rules.remove(idx));
        Self::log_result("delete", Some(id), &result);
        result
    }

    /// Append a copy of a rule under a fresh id.
    pub fn duplicate(&mut self, id: RuleId) -> Result<RuleId, RuleError> {
        let result = self.position(id).map(|idx| {
            let mut copy = self.rules[idx].clone();
            copy.id = self.allocate_id();
            copy.name = format!("{} (Copy)", copy.name);
            let new_id = copy.id;
            self.rules.push(copy);
            new_id
        });
        Self::log_result("duplicate", Some(id), &result);
        result
    }

    pub fn set_active(&mut self, id: RuleId, active: bool) -> Result<(), RuleError> {
        let idx = self.position(id)?;
        self.rules[idx].active = active;
        info!(rule = %id, active, "rule toggled");
        Ok(())
    }

    /// Active rules by ascending priority; ties keep insertion order.
    pub fn by_priority(&self) -> Vec<&AllocationRule> {
        let mut active: Vec<_> = self.rules.iter().filter(|r| r.active).collect();
        active.sort_by_key(|r| r.priority);
        active
    }

    /// Case-insensitive substring search over name, source and targets.
    pub fn filter(&self, query: &str) -> Vec<&AllocationRule> {
        let query = query.to_lowercase();
        self.rules
            .iter()
            .filter(|r| {
                r.name.to_lowercase().contains(&query)
                    || r.source.to_lowercase().contains(&query)
                    || r.targets.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .collect()
    }

    /// Evaluate every active rule drawing from `source`, in priority order.
    ///
    /// A rule that fails to evaluate is logged and skipped; the remaining
    /// rules still run.
    pub fn apply_active(
        &self,
        source: &str,
        total: Amount,
        drivers: &HashMap<String, f64>,
        policy: ZeroDriverPolicy,
    ) -> Vec<(RuleId, Vec<AllocationResult>)> {
        self.by_priority()
            .into_iter()
            .filter(|r| r.source == source)
            .filter_map(|rule| match allocation::evaluate(rule, total, drivers, policy) {
                Ok(results) => {
                    info!(rule = %rule.id, source, total = %total, "allocation applied");
                    Some((rule.id, results))
                }
                Err(e) => {
                    warn!(rule = %rule.id, source, reason = %e, "allocation skipped");
                    None
                }
            })
            .collect()
    }
}

/// Private API
impl RuleBook {
    fn log_result<T, E: fmt::Display>(op: &str, rule: Option<RuleId>, result: &Result<T, E>) {
        match (result, rule) {
            (Ok(_), Some(id)) => info!(rule = %id, "{op} applied"),
            (Ok(_), None) => info!("{op} applied"),
            (Err(e), Some(id)) => info!(rule = %id, reason = %e, "{op} rejected"),
            (Err(e), None) => info!(reason = %e, "{op} rejected"),
        }
    }

    fn allocate_id(&mut self) -> RuleId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn position(&self, id: RuleId) -> Result<usize, RuleError> {
        self.rules
            .iter()
            .position(|r| r.id == id)
            .ok_or(RuleError::NotFound(id))
    }

    fn apply_update(&mut self, rule: AllocationRule) -> Result<(), RuleError> {
        let idx = self.position(rule.id)?;
        validate(&rule.name, &rule.kind, &rule.source, &rule.targets)?;
        self.rules[idx] = rule;
        Ok(())
    }
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(
    name: &str,
    kind: &RuleKind,
    source: &str,
    targets: &[String],
) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if source.trim().is_empty() {
        return Err(ValidationError::EmptySource);
    }
    if targets.is_empty() {
        return Err(ValidationError::NoTargets);
    }
    if targets.iter().any(|t| t.trim().is_empty()) {
        return Err(ValidationError::BlankTarget);
    }

    match kind {
        RuleKind::Percentage(percent) if !(0.0..=100.0).contains(percent) => {
            Err(ValidationError::InvalidPercentage(*percent))
        }
        RuleKind::FixedAmount(amount) if amount.is_negative() => {
            Err(ValidationError::NegativeFixedAmount(*amount))
        }
        RuleKind::DriverBased { driver } if driver.trim().is_empty() => {
            Err(ValidationError::EmptyDriver)
        }
        RuleKind::Formula { expression } => {
            Formula::parse(expression)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::FormulaError;

    // test utils

    fn headcount_rule(name: &str, targets: &[&str]) -> RuleDraft {
        RuleDraft::new(
            name,
            RuleKind::DriverBased {
                driver: "Headcount".into(),
            },
            "IT Department",
            targets.iter().copied(),
        )
    }

    fn drivers(values: &[(&str, f64)]) -> HashMap<String, f64> {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn new_book_is_empty() {
        let book = RuleBook::new();
        assert!(book.is_empty());
        assert_eq!(book.len(), 0);
    }

    // Create

    #[test]
    fn create_appends_with_increasing_ids() {
        let mut book = RuleBook::new();
        let a = book.create(headcount_rule("IT", &["Sales"])).unwrap();
        let b = book.create(headcount_rule("HR", &["Sales"])).unwrap();

        assert!(b > a);
        let names: Vec<_> = book.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["IT", "HR"]);
        assert_eq!(book.get(a).unwrap().targets, vec!["Sales"]);
    }

    #[test]
    fn create_with_empty_targets_fails() {
        let mut book = RuleBook::new();
        let result = book.create(headcount_rule("IT", &[]));
        assert_eq!(
            result,
            Err(RuleError::Invalid(ValidationError::NoTargets))
        );
        assert!(book.is_empty());
    }

    #[test]
    fn create_requires_name_and_source() {
        let mut book = RuleBook::new();
        assert_eq!(
            book.create(headcount_rule("  ", &["Sales"])),
            Err(RuleError::Invalid(ValidationError::EmptyName))
        );

        let mut draft = headcount_rule("IT", &["Sales"]);
        draft.source = String::new();
        assert_eq!(
            book.create(draft),
            Err(RuleError::Invalid(ValidationError::EmptySource))
        );

        assert_eq!(
            book.create(headcount_rule("IT", &["Sales", ""])),
            Err(RuleError::Invalid(ValidationError::BlankTarget))
        );
    }

    #[test]
    fn create_validates_method_fields() {
        let mut book = RuleBook::new();
        let invalid = [
            (
                RuleKind::Percentage(101.0),
                ValidationError::InvalidPercentage(101.0),
            ),
            (
                RuleKind::FixedAmount(Amount::from_whole(-1)),
                ValidationError::NegativeFixedAmount(Amount::from_whole(-1)),
            ),
            (
                RuleKind::DriverBased {
                    driver: String::new(),
                },
                ValidationError::EmptyDriver,
            ),
            (
                RuleKind::Formula {
                    expression: "driver *".into(),
                },
                ValidationError::Formula(FormulaError::UnexpectedEnd),
            ),
            (
                RuleKind::Formula {
                    expression: format!("{}driver{}", "(".repeat(100), ")".repeat(100)),
                },
                ValidationError::Formula(FormulaError::TooDeep),
            ),
            (
                RuleKind::Formula {
                    expression: format!("{}driver{}", "(".repeat(200_000), ")".repeat(200_000)),
                },
                ValidationError::Formula(FormulaError::TooLong),
            ),
        ];

        for (kind, expected) in invalid {
            let draft = RuleDraft::new("r", kind, "IT Department", ["Sales"]);
            assert_eq!(book.create(draft), Err(RuleError::Invalid(expected)));
        }
        assert!(book.is_empty());
    }

    // Update

    #[test]
    fn update_replaces_rule() {
        let mut book = RuleBook::new();
        let id = book.create(headcount_rule("IT", &["Sales"])).unwrap();

        let mut rule = book.get(id).unwrap().clone();
        rule.targets.push("Marketing".into());
        rule.priority = 5;
        book.update(rule).unwrap();

        let stored = book.get(id).unwrap();
        assert_eq!(stored.targets, vec!["Sales", "Marketing"]);
        assert_eq!(stored.priority, 5);
    }

    #[test]
    fn update_unknown_rule_fails() {
        let mut book = RuleBook::new();
        let rule = headcount_rule("IT", &["Sales"]).into_rule(42);
        assert_eq!(book.update(rule), Err(RuleError::NotFound(42)));
    }

    #[test]
    fn update_rejects_invalid_rule() {
        let mut book = RuleBook::new();
        let id = book.create(headcount_rule("IT", &["Sales"])).unwrap();

        let mut rule = book.get(id).unwrap().clone();
        rule.targets.clear();
        assert_eq!(
            book.update(rule),
            Err(RuleError::Invalid(ValidationError::NoTargets))
        );
        // Stored rule unchanged
        assert_eq!(book.get(id).unwrap().targets, vec!["Sales"]);
    }

    // Delete

    #[test]
    fn delete_removes_rule() {
        let mut book = RuleBook::new();
        let a = book.create(headcount_rule("IT", &["Sales"])).unwrap();
        let b = book.create(headcount_rule("HR", &["Sales"])).unwrap();

        let removed = book.delete(a).unwrap();
        assert_eq!(removed.name, "IT");
        assert!(book.get(a).is_none());
        assert!(book.get(b).is_some());
        assert_eq!(book.delete(a), Err(RuleError::NotFound(a)));
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let mut book = RuleBook::new();
        let a = book.create(headcount_rule("IT", &["Sales"])).unwrap();
        book.delete(a).unwrap();
        let b = book.create(headcount_rule("IT", &["Sales"])).unwrap();
        assert_ne!(a, b);
    }

    // Duplicate

    #[test]
    fn duplicate_creates_copy_with_new_id() {
        let mut book = RuleBook::new();
        let id = book.create(headcount_rule("IT", &["Sales", "R&D"])).unwrap();
        let copy_id = book.duplicate(id).unwrap();

        assert_ne!(copy_id, id);
        let original = book.get(id).unwrap();
        let copy = book.get(copy_id).unwrap();
        assert_eq!(copy.name, "IT (Copy)");
        assert_eq!(copy.targets, original.targets);
        assert_eq!(copy.kind, original.kind);
        assert_eq!(book.rules().last().unwrap().id, copy_id);
    }

    #[test]
    fn duplicate_unknown_rule_fails() {
        let mut book = RuleBook::new();
        assert_eq!(book.duplicate(3), Err(RuleError::NotFound(3)));
    }

    // Toggle, ordering, search

    #[test]
    fn set_active_toggles_any_rule() {
        let mut book = RuleBook::new();
        let id = book.create(headcount_rule("IT", &["Sales"])).unwrap();
        book.set_active(id, false).unwrap();
        assert!(!book.get(id).unwrap().active);
        book.set_active(id, true).unwrap();
        assert!(book.get(id).unwrap().active);
        assert_eq!(book.set_active(99, true), Err(RuleError::NotFound(99)));
    }

    #[test]
    fn by_priority_skips_inactive_and_keeps_ties_stable() {
        let mut book = RuleBook::new();
        let mut low = headcount_rule("low", &["Sales"]);
        low.priority = 3;
        let mut first = headcount_rule("first", &["Sales"]);
        first.priority = 1;
        let mut second = headcount_rule("second", &["Sales"]);
        second.priority = 1;
        let mut off = headcount_rule("off", &["Sales"]);
        off.priority = 0;
        off.active = false;

        for draft in [low, first, second, off] {
            book.create(draft).unwrap();
        }

        let names: Vec<_> = book.by_priority().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "low"]);
    }

    #[test]
    fn filter_matches_name_source_and_targets() {
        let mut book = RuleBook::new();
        book.create(headcount_rule("IT Costs", &["Sales"])).unwrap();
        book.create(RuleDraft::new(
            "Rent",
            RuleKind::Percentage(100.0),
            "Facilities",
            ["Operations"],
        ))
        .unwrap();

        assert_eq!(book.filter("it costs").len(), 1);
        assert_eq!(book.filter("FACIL").len(), 1);
        assert_eq!(book.filter("operations")[0].name, "Rent");
        assert_eq!(book.filter("").len(), 2);
        assert!(book.filter("payroll").is_empty());
    }

    // apply_active

    #[test]
    fn apply_active_runs_matching_rules_in_priority_order() {
        let mut book = RuleBook::new();
        let mut second = headcount_rule("second", &["Sales", "R&D"]);
        second.priority = 2;
        let mut first = RuleDraft::new("first", RuleKind::Percentage(50.0), "IT Department", ["Sales"]);
        first.priority = 1;
        let other = RuleDraft::new("other", RuleKind::Percentage(50.0), "Facilities", ["Sales"]);

        let second_id = book.create(second).unwrap();
        let first_id = book.create(first).unwrap();
        book.create(other).unwrap();

        let results = book.apply_active(
            "IT Department",
            Amount::from_whole(1_000),
            &drivers(&[("Sales", 1.0), ("R&D", 3.0)]),
            ZeroDriverPolicy::Reject,
        );

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, first_id);
        assert_eq!(results[0].1[0].amount, Amount::from_whole(500));
        assert_eq!(results[1].0, second_id);
        assert_eq!(results[1].1[1].amount, Amount::from_whole(750));
    }

    #[test]
    fn apply_active_skips_failing_rules() {
        let mut book = RuleBook::new();
        book.create(headcount_rule("broken", &["Legal"])).unwrap();
        let ok = book.create(headcount_rule("ok", &["Sales"])).unwrap();

        let results = book.apply_active(
            "IT Department",
            Amount::from_whole(10),
            &drivers(&[("Sales", 1.0)]),
            ZeroDriverPolicy::Reject,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, ok);
    }
}
