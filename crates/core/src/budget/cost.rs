use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Approximates how many billable units a piece of text represents.
pub trait CostEstimator: Send + Sync {
    fn estimate_units(&self, text: &str) -> u64;
}

/// One unit per `chars_per_unit` characters, rounded up, never less than one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharacterHeuristic {
    pub chars_per_unit: u32,
}

impl Default for CharacterHeuristic {
    fn default() -> Self {
        Self { chars_per_unit: 4 }
    }
}

impl CostEstimator for CharacterHeuristic {
    fn estimate_units(&self, text: &str) -> u64 {
        let per_unit = u64::from(self.chars_per_unit.max(1));
        let chars = text.chars().count() as u64;
        chars.div_ceil(per_unit).max(1)
    }
}

/// Price per 1000 units, split by direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCard {
    pub input_per_thousand: Decimal,
    pub output_per_thousand: Decimal,
}

impl RateCard {
    pub fn new(input_per_thousand: Decimal, output_per_thousand: Decimal) -> Self {
        Self { input_per_thousand, output_per_thousand }
    }

    pub fn input_cost(&self, units: u64) -> Decimal {
        per_thousand(units, self.input_per_thousand)
    }

    pub fn output_cost(&self, units: u64) -> Decimal {
        per_thousand(units, self.output_per_thousand)
    }
}

fn per_thousand(units: u64, rate: Decimal) -> Decimal {
    Decimal::from(units) / Decimal::from(1000) * rate
}
