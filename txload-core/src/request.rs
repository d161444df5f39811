use serde::Serialize;

use crate::record::NormalizedRecord;
use crate::{Currency, CurrencyCodeTable};

/// How each request gets its payment id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum IdStrategy {
    /// `PAY-<unix_ms>-<worker>-<iteration>`, unique per call.
    Fresh,
    /// The record's own id, repeated whenever the record is drawn again.
    Record,
}

/// Identifiers local to one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationIds {
    pub worker: u64,
    pub iteration: u64,
    pub unix_ms: u64,
}

impl IterationIds {
    pub fn now(worker: u64, iteration: u64) -> Self {
        let unix_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        Self {
            worker,
            iteration,
            unix_ms,
        }
    }

    pub fn payment_id(&self) -> String {
        format!("PAY-{}-{}-{}", self.unix_ms, self.worker, self.iteration)
    }
}

/// Protocol-neutral payment built from one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub id: String,
    pub currency: Currency,
    pub amount_minor: i64,
    pub source_account: String,
    pub destination_account: String,
}

impl PaymentRequest {
    /// Falls back to a fresh id when the record has none.
    pub fn build(record: &NormalizedRecord, strategy: IdStrategy, ids: IterationIds) -> Self {
        let id = match strategy {
            IdStrategy::Record if !record.id.is_empty() => record.id.clone(),
            _ => ids.payment_id(),
        };
        Self {
            id,
            currency: record.currency.clone(),
            amount_minor: record.amount_minor,
            source_account: record.source_account.clone(),
            destination_account: record.destination_account.clone(),
        }
    }

    pub fn to_http_body(&self) -> HttpPaymentBody<'_> {
        HttpPaymentBody {
            id: &self.id,
            currency: self.currency.code(),
            amount: self.amount_minor as f64 / 100.0,
            source_account: &self.source_account,
            destination_account: &self.destination_account,
        }
    }

    /// `payments.v1.CreatePaymentRequest` as JSON.
    pub fn to_grpc_json(&self, currencies: &CurrencyCodeTable) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "amount_minor": self.amount_minor,
            "currency": currencies.code(&self.currency),
            "user_id": self.source_account,
            "destination_account": self.destination_account,
        })
    }
}

/// JSON body of `POST /payments`. `amount` is in major units.
#[derive(Debug, Clone, Serialize)]
pub struct HttpPaymentBody<'a> {
    pub id: &'a str,
    pub currency: &'a str,
    pub amount: f64,
    pub source_account: &'a str,
    pub destination_account: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> NormalizedRecord {
        NormalizedRecord {
            id: id.to_string(),
            currency: Currency::Usd,
            amount_minor: 1050,
            source_account: "A".to_string(),
            destination_account: "B".to_string(),
        }
    }

    const IDS: IterationIds = IterationIds {
        worker: 3,
        iteration: 17,
        unix_ms: 1_700_000_000_000,
    };

    #[test]
    fn id_strategy_picks_record_or_fresh_id() {
        let rec = record("T1");
        assert_eq!(
            PaymentRequest::build(&rec, IdStrategy::Record, IDS).id,
            "T1"
        );
        assert_eq!(
            PaymentRequest::build(&rec, IdStrategy::Fresh, IDS).id,
            "PAY-1700000000000-3-17"
        );
        assert_eq!(
            PaymentRequest::build(&record(""), IdStrategy::Record, IDS).id,
            "PAY-1700000000000-3-17"
        );
    }

    #[test]
    fn http_body_uses_major_units() {
        let req = PaymentRequest::build(&record("T1"), IdStrategy::Record, IDS);
        let body = serde_json::to_value(req.to_http_body()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            body,
            serde_json::json!({
                "id": "T1",
                "currency": "USD",
                "amount": 10.5,
                "source_account": "A",
                "destination_account": "B",
            })
        );
    }

    #[test]
    fn grpc_json_maps_currency_and_accounts() {
        let mut rec = record("T1");
        rec.currency = Currency::Other("JPY".to_string());
        let req = PaymentRequest::build(&rec, IdStrategy::Fresh, IDS);
        let json = req.to_grpc_json(&CurrencyCodeTable::default());
        assert_eq!(json["currency"], 0);
        assert_eq!(json["amount_minor"], 1050);
        assert_eq!(json["user_id"], "A");
        assert_eq!(json["id"], "PAY-1700000000000-3-17");
    }
}
