//! Versioned JSON envelope for ledger records.
//!
//! Every value written to the store has the shape
//! `{"schema_version": 1, "kind": "<record kind>", "record": {...}}`.
//! Decoding checks the version and kind before touching the record body.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use collateral_common::AppError;
use collateral_common::types::{Account, Deal, Security, Transaction};

pub const SCHEMA_VERSION: u32 = 1;

/// A record type that can live in the ledger.
pub trait LedgerRecord: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

impl LedgerRecord for Account {
    const KIND: &'static str = "account";
}

impl LedgerRecord for Security {
    const KIND: &'static str = "holding";
}

impl LedgerRecord for Deal {
    const KIND: &'static str = "deal";
}

impl LedgerRecord for Transaction {
    const KIND: &'static str = "transaction";
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    schema_version: u32,
    kind: &'a str,
    record: &'a T,
}

#[derive(serde::Deserialize)]
struct Envelope {
    schema_version: u32,
    kind: String,
    record: Value,
}

pub fn encode<T: LedgerRecord>(record: &T) -> Result<Vec<u8>, AppError> {
    let envelope = EnvelopeRef {
        schema_version: SCHEMA_VERSION,
        kind: T::KIND,
        record,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

pub fn decode<T: LedgerRecord>(bytes: &[u8]) -> Result<T, AppError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;

    if envelope.schema_version != SCHEMA_VERSION {
        return Err(AppError::Decode(format!(
            "unsupported schema version {} for {} record",
            envelope.schema_version,
            T::KIND
        )));
    }
    if envelope.kind != T::KIND {
        return Err(AppError::Decode(format!(
            "expected {} record, found {}",
            T::KIND,
            envelope.kind
        )));
    }

    Ok(serde_json::from_value(envelope.record)?)
}
