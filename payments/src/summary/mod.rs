//! Summary reads over the live payment queue.

mod aggregator;
mod handler;

pub use aggregator::aggregate;
pub use handler::SummaryRequestHandler;
