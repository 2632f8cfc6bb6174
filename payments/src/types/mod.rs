//! Payment records read from the queue and the summary returned to callers.

mod payment;
mod summary;

pub use payment::{PaymentRecord, Processor};
pub use summary::{ProcessorTotals, SummaryRange, SummaryResponse};
