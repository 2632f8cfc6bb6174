use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::payment::{Processor, deserialize_amount, serialize_amount};

/// Totals of one processor over the summarized range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorTotals {
    /// Number of payments handled by the processor.
    #[serde(rename = "totalRequests")]
    pub count: u64,
    /// Sum of the payments' amounts.
    #[serde(
        rename = "totalAmount",
        serialize_with = "serialize_amount",
        deserialize_with = "deserialize_amount"
    )]
    pub total_amount: BigDecimal,
}

impl ProcessorTotals {
    /// Totals of a processor without matching payments.
    pub fn zero() -> Self {
        Self {
            count: 0,
            total_amount: BigDecimal::zero(),
        }
    }

    /// Creates totals from a count and amount.
    pub fn new(count: u64, total_amount: BigDecimal) -> Self {
        Self {
            count,
            total_amount,
        }
    }

    /// Adds one payment of `amount`.
    pub fn record(&mut self, amount: &BigDecimal) {
        self.count += 1;
        self.total_amount += amount;
    }
}

impl Default for ProcessorTotals {
    fn default() -> Self {
        Self::zero()
    }
}

/// Per-processor summary returned to callers.
///
/// Both processors are always present, with zero totals when they had no matching payments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub default: ProcessorTotals,
    pub fallback: ProcessorTotals,
}

impl SummaryResponse {
    /// Returns the mutable totals of `processor`.
    pub fn totals_mut(&mut self, processor: Processor) -> &mut ProcessorTotals {
        match processor {
            Processor::Default => &mut self.default,
            Processor::Fallback => &mut self.fallback,
        }
    }
}

/// Optional inclusive bounds on a payment's request time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl SummaryRange {
    /// Range without bounds.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Range with the given optional bounds.
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    /// Returns `true` when `instant` lies within both supplied bounds, each inclusive.
    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| *instant >= from) && self.to.is_none_or(|to| *instant <= to)
    }
}
