//! Per-request spending ledger.
//!
//! A `Budget` is created once per inbound call and owned by that call's flow. Spend only
//! ever grows, and a charge that would cross the ceiling is refused without touching it.

pub mod cost;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::errors::BudgetError;

pub use cost::{CharacterHeuristic, CostEstimator, RateCard};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Charge {
    pub amount: Decimal,
    pub reason: String,
    pub spent_after: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Budget {
    ceiling: Decimal,
    spent: Decimal,
    charges: Vec<Charge>,
}

impl Budget {
    pub fn new(ceiling: Decimal) -> Self {
        Self { ceiling, spent: Decimal::ZERO, charges: Vec::new() }
    }

    pub fn ceiling(&self) -> Decimal {
        self.ceiling
    }

    pub fn spent(&self) -> Decimal {
        self.spent
    }

    pub fn remaining(&self) -> Decimal {
        (self.ceiling - self.spent).max(Decimal::ZERO)
    }

    pub fn charges(&self) -> &[Charge] {
        &self.charges
    }

    /// Commits `amount` and returns the new total, or fails leaving `spent` unchanged.
    pub fn charge(
        &mut self,
        amount: Decimal,
        reason: impl Into<String>,
    ) -> Result<Decimal, BudgetError> {
        let reason = reason.into();
        if amount < Decimal::ZERO {
            return Err(BudgetError::NegativeCharge { amount, reason });
        }

        let attempted = self.spent + amount;
        if attempted > self.ceiling {
            return Err(BudgetError::Exceeded { attempted, ceiling: self.ceiling, reason });
        }

        self.spent = attempted;
        self.charges.push(Charge { amount, reason, spent_after: attempted });
        Ok(attempted)
    }
}
