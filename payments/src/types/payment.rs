use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Payment processing backend that handled a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Processor {
    Default,
    Fallback,
}

impl Processor {
    /// Returns the wire name of the processor.
    pub fn as_str(&self) -> &'static str {
        match self {
            Processor::Default => "default",
            Processor::Fallback => "fallback",
        }
    }

    /// Resolves a wire name, returning `None` for processors outside the two fixed roles.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Processor::Default),
            "fallback" => Some(Processor::Fallback),
            _ => None,
        }
    }
}

impl fmt::Display for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment record as enqueued by the producer.
///
/// The processor is kept as its wire name so that records naming an unknown processor still
/// deserialize and can be skipped by the reader instead of being treated as malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub processor: String,
    #[serde(
        serialize_with = "serialize_amount",
        deserialize_with = "deserialize_amount"
    )]
    pub amount: BigDecimal,
    pub requested_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Creates a record for one of the fixed processors.
    pub fn new(processor: Processor, amount: BigDecimal, requested_at: DateTime<Utc>) -> Self {
        Self {
            processor: processor.as_str().to_string(),
            amount,
            requested_at,
        }
    }

    /// Returns the processor if it is one of the fixed roles.
    pub fn processor(&self) -> Option<Processor> {
        Processor::from_name(&self.processor)
    }
}

/// Writes a decimal as a JSON number parsed from its decimal text.
pub(crate) fn serialize_amount<S>(amount: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let number = serde_json::Number::from_str(&amount.to_string())
        .map_err(serde::ser::Error::custom)?;
    number.serialize(serializer)
}

/// Reads a decimal from a JSON number or string.
///
/// Numbers keep their literal text, so `19.9` becomes exactly `19.9` and long amounts keep every
/// digit.
pub(crate) fn deserialize_amount<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::String(text) => text,
        other => {
            return Err(de::Error::custom(format!(
                "expected a decimal number or string, found `{other}`"
            )));
        }
    };

    BigDecimal::from_str(text.trim()).map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn deserializes_wire_record() {
        let record: PaymentRecord = serde_json::from_str(
            r#"{"processor":"fallback","amount":19.9,"requestedAt":"2025-07-15T12:34:56.000Z"}"#,
        )
        .unwrap();

        assert_eq!(record.processor(), Some(Processor::Fallback));
        assert_eq!(record.amount, BigDecimal::from_str("19.9").unwrap());
        assert_eq!(
            record.requested_at,
            Utc.with_ymd_and_hms(2025, 7, 15, 12, 34, 56).unwrap()
        );
    }

    #[test]
    fn accepts_string_amounts() {
        let record: PaymentRecord = serde_json::from_str(
            r#"{"processor":"default","amount":"0.10","requestedAt":"2025-07-15T00:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(record.amount, BigDecimal::from_str("0.1").unwrap());
    }

    #[test]
    fn long_amounts_keep_every_digit() {
        let raw = r#"{"processor":"default","amount":12345678901234567.89,"requestedAt":"2025-07-15T00:00:00Z"}"#;
        let record: PaymentRecord = serde_json::from_str(raw).unwrap();

        assert_eq!(
            record.amount,
            BigDecimal::from_str("12345678901234567.89").unwrap()
        );
        let written = serde_json::to_string(&record).unwrap();
        assert!(written.contains(r#""amount":12345678901234567.89"#));
    }

    #[test]
    fn rejects_non_numeric_amounts() {
        let result = serde_json::from_str::<PaymentRecord>(
            r#"{"processor":"default","amount":true,"requestedAt":"2025-07-15T00:00:00Z"}"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn unknown_processor_still_deserializes() {
        let record: PaymentRecord = serde_json::from_str(
            r#"{"processor":"backup","amount":1,"requestedAt":"2025-07-15T00:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(record.processor(), None);
    }

    #[test]
    fn serialized_record_uses_camel_case_and_numeric_amount() {
        let record = PaymentRecord::new(
            Processor::Default,
            BigDecimal::from_str("19.90").unwrap(),
            Utc.with_ymd_and_hms(2025, 7, 15, 0, 0, 0).unwrap(),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["processor"], "default");
        assert_eq!(json["amount"].as_f64(), Some(19.9));
        assert!(json.get("requestedAt").is_some());
    }
}
