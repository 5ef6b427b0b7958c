//! Core domain types for cost allocation.

use crate::Amount;

/// Allocation rule identifier.
pub type RuleId = u32;

/// How a rule splits its source amount across the targets.
///
/// Each variant carries the field that only makes sense for that method, so a
/// percentage rule can never be missing its percentage.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    /// Allocate this percent (0..=100) of the source amount, split by driver values.
    Percentage(f64),
    /// Allocate the whole source amount proportionally to a named driver.
    DriverBased { driver: String },
    /// Allocate the whole source amount by a weight expression evaluated per target.
    Formula { expression: String },
    /// Allocate a fixed pool, split by driver values.
    FixedAmount(Amount),
}

impl RuleKind {
    pub fn label(&self) -> &'static str {
        match self {
            RuleKind::Percentage(_) => "percentage",
            RuleKind::DriverBased { .. } => "driver-based",
            RuleKind::Formula { .. } => "formula",
            RuleKind::FixedAmount(_) => "fixed-amount",
        }
    }
}

/// A rule as entered by the user, before it is given an id.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDraft {
    pub name: String,
    pub kind: RuleKind,
    pub source: String,
    pub targets: Vec<String>,
    pub conditions: Vec<String>,
    pub priority: u32,
    pub active: bool,
}

impl RuleDraft {
    /// Active, priority 1, no conditions.
    pub fn new(
        name: impl Into<String>,
        kind: RuleKind,
        source: impl Into<String>,
        targets: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            source: source.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            conditions: Vec::new(),
            priority: 1,
            active: true,
        }
    }

    pub fn into_rule(self, id: RuleId) -> AllocationRule {
        AllocationRule {
            id,
            name: self.name,
            kind: self.kind,
            source: self.source,
            targets: self.targets,
            conditions: self.conditions,
            priority: self.priority,
            active: self.active,
        }
    }
}

/// A stored allocation rule.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRule {
    pub id: RuleId,
    pub name: String,
    pub kind: RuleKind,
    /// Source cost pool account.
    pub source: String,
    pub targets: Vec<String>,
    pub conditions: Vec<String>,
    /// Lower runs first.
    pub priority: u32,
    pub active: bool,
}

/// One target's share of an allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationResult {
    pub target: String,
    pub driver_value: f64,
    /// Share of the pool, 0..=100.
    pub percentage: f64,
    pub amount: Amount,
}

/// Which direction of variance is good news for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccountKind {
    /// Actual above budget is favorable.
    #[default]
    Revenue,
    /// Actual below budget is favorable.
    Expense,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_defaults() {
        let draft = RuleDraft::new(
            "IT Costs",
            RuleKind::DriverBased {
                driver: "Headcount".into(),
            },
            "IT Department",
            ["Sales", "Marketing"],
        );
        assert!(draft.active);
        assert_eq!(draft.priority, 1);
        assert!(draft.conditions.is_empty());
        assert_eq!(draft.targets, vec!["Sales", "Marketing"]);
    }

    #[test]
    fn draft_into_rule_keeps_fields() {
        let mut draft = RuleDraft::new("Rent", RuleKind::Percentage(50.0), "Facilities", ["Ops"]);
        draft.conditions.push("Region = EMEA".into());
        let rule = draft.clone().into_rule(7);
        assert_eq!(rule.id, 7);
        assert_eq!(rule.name, draft.name);
        assert_eq!(rule.kind, draft.kind);
        assert_eq!(rule.conditions, draft.conditions);
    }

    #[test]
    fn kind_labels() {
        assert_eq!(RuleKind::Percentage(10.0).label(), "percentage");
        assert_eq!(
            RuleKind::FixedAmount(Amount::from_whole(5)).label(),
            "fixed-amount"
        );
        assert_eq!(
            RuleKind::Formula {
                expression: "driver".into()
            }
            .label(),
            "formula"
        );
    }

    #[test]
    fn account_kind_default() {
        assert_eq!(AccountKind::default(), AccountKind::Revenue);
    }
}
