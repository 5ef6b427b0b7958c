//! What-if scenario drivers.
//!
//! Each driver carries its own linear impact estimate. Drivers do not
//! interact: the scenario total is the plain sum of per-driver impacts.

use thiserror::Error;
use tracing::info;

use crate::Amount;

pub type DriverId = u32;

#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("driver {0} not found")]
    NotFound(DriverId),

    #[error("driver {0} already exists")]
    DuplicateDriver(DriverId),

    #[error("value {0} is not a finite number")]
    InvalidValue(f64),

    #[error("bounds [{0}, {1}] are empty or not finite")]
    InvalidBounds(f64, f64),

    #[error("original value {0} is outside [{1}, {2}]")]
    OriginalOutOfBounds(f64, f64, f64),

    #[error("impact of driver {0} at value {1} does not fit in an amount")]
    ImpactOutOfRange(DriverId, f64),

    #[error("total impact does not fit in an amount")]
    TotalOverflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCategory {
    Revenue,
    Cost,
    Headcount,
    Market,
}

impl DriverCategory {
    /// Revenue and expense moved by a 100-unit change of a driver in this category.
    pub fn magnitude(&self) -> (f64, f64) {
        match self {
            DriverCategory::Revenue => (1_000_000.0, 0.0),
            DriverCategory::Cost => (0.0, 1_000_000.0),
            DriverCategory::Headcount => (250_000.0, 750_000.0),
            DriverCategory::Market => (500_000.0, 100_000.0),
        }
    }
}

/// Estimated change caused by moving a driver away from its original value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Impact {
    pub revenue: Amount,
    pub expense: Amount,
    pub net_income: Amount,
}

impl Impact {
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        Some(Impact {
            revenue: self.revenue.checked_add(rhs.revenue)?,
            expense: self.expense.checked_add(rhs.expense)?,
            net_income: self.net_income.checked_add(rhs.net_income)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Driver {
    pub id: DriverId,
    pub name: String,
    pub category: DriverCategory,
    pub unit: String,
    current_value: f64,
    original_value: f64,
    min: f64,
    max: f64,
    impact: Impact,
}

impl Driver {
    pub fn new(
        id: DriverId,
        name: impl Into<String>,
        category: DriverCategory,
        original_value: f64,
        (min, max): (f64, f64),
        unit: impl Into<String>,
    ) -> Result<Self, ScenarioError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(ScenarioError::InvalidBounds(min, max));
        }
        if !original_value.is_finite() {
            return Err(ScenarioError::InvalidValue(original_value));
        }
        if !(min..=max).contains(&original_value) {
            return Err(ScenarioError::OriginalOutOfBounds(original_value, min, max));
        }
        Ok(Self {
            id,
            name: name.into(),
            category,
            unit: unit.into(),
            current_value: original_value,
            original_value,
            min,
            max,
            impact: Impact::default(),
        })
    }

    pub fn current_value(&self) -> f64 {
        self.current_value
    }

    pub fn original_value(&self) -> f64 {
        self.original_value
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    pub fn impact(&self) -> Impact {
        self.impact
    }

    /// Clamp `value` into the driver's bounds, store it and recompute the impact.
    ///
    /// The driver is left untouched when the impact cannot be represented.
    fn set_value(&mut self, value: f64) -> Result<Impact, ScenarioError> {
        if !value.is_finite() {
            return Err(ScenarioError::InvalidValue(value));
        }
        let clamped = value.clamp(self.min, self.max);
        let impact = self
            .impact_at(clamped)
            .ok_or(ScenarioError::ImpactOutOfRange(self.id, clamped))?;

        self.current_value = clamped;
        self.impact = impact;
        Ok(impact)
    }

    fn impact_at(&self, value: f64) -> Option<Impact> {
        let (revenue_magnitude, expense_magnitude) = self.category.magnitude();
        let change = (value - self.original_value) / 100.0;
        let revenue = Amount::from_float(change * revenue_magnitude).ok()?;
        let expense = Amount::from_float(change * expense_magnitude).ok()?;
        Some(Impact {
            revenue,
            expense,
            net_income: revenue.checked_sub(expense)?,
        })
    }
}

/// A named set of what-if drivers.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    pub name: String,
    drivers: Vec<Driver>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            drivers: Vec::new(),
        }
    }

    pub fn add_driver(&mut self, driver: Driver) -> Result<(), ScenarioError> {
        if self.get(driver.id).is_some() {
            return Err(ScenarioError::DuplicateDriver(driver.id));
        }
        self.drivers.push(driver);
        Ok(())
    }

    pub fn drivers(&self) -> &[Driver] {
        &self.drivers
    }

    pub fn get(&self, id: DriverId) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id == id)
    }

    pub fn set_driver_value(&mut self, id: DriverId, value: f64) -> Result<Impact, ScenarioError> {
        let driver = self
            .drivers
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(ScenarioError::NotFound(id))?;
        let impact = driver.set_value(value)?;
        info!(
            scenario = %self.name,
            driver = %driver.name,
            requested = value,
            value = driver.current_value,
            net_income = %impact.net_income,
            "driver adjusted"
        );
        Ok(impact)
    }

    /// Sum of every driver's impact.
    pub fn total_impact(&self) -> Result<Impact, ScenarioError> {
        self.drivers
            .iter()
            .try_fold(Impact::default(), |acc, d| acc.checked_add(d.impact))
            .ok_or(ScenarioError::TotalOverflow)
    }

    /// Put every driver back to its original value.
    pub fn reset(&mut self) {
        for driver in &mut self.drivers {
            driver.current_value = driver.original_value;
            driver.impact = Impact::default();
        }
    }
}
