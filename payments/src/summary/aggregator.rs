use bytes::Bytes;
use tracing::{debug, warn};

use crate::types::{PaymentRecord, SummaryRange, SummaryResponse};

/// Sums a queue snapshot per processor, keeping only payments requested within `range`.
///
/// Entries that fail to deserialize are skipped and entries naming a processor other than the
/// two fixed ones are ignored. Both processors are always present in the result.
pub fn aggregate(entries: &[Bytes], range: &SummaryRange) -> SummaryResponse {
    let mut response = SummaryResponse::default();
    let mut malformed = 0usize;
    let mut unknown_processor = 0usize;

    for entry in entries {
        let record: PaymentRecord = match serde_json::from_slice(entry) {
            Ok(record) => record,
            Err(err) => {
                malformed += 1;
                debug!(error = %err, "skipping malformed payment entry");
                continue;
            }
        };

        let Some(processor) = record.processor() else {
            unknown_processor += 1;
            continue;
        };

        if range.contains(&record.requested_at) {
            response.totals_mut(processor).record(&record.amount);
        }
    }

    if malformed > 0 {
        warn!(malformed, "skipped malformed payment entries while summarizing");
    }
    if unknown_processor > 0 {
        debug!(unknown_processor, "ignored payments of unknown processors");
    }

    response
}
