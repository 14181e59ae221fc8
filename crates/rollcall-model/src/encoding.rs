//! Versioned binary encoding for stored records.
//!
//! A stored record is one format byte followed by a protobuf body:
//!
//! ```text
//! ┌────────┬──────────────────────────────────────┐
//! │ 0x01   │ protobuf message (fields by number)  │
//! └────────┴──────────────────────────────────────┘
//! ```
//!
//! Fields are keyed by tag number, never by position, so a record written by
//! an older build decodes against the current schema and the reverse also
//! holds. Unknown fields are skipped on decode and are not carried over when
//! the record is encoded again.
//!
//! After every successful decode the record's [`Versioned::upgrade`] hook
//! runs, which is where legacy shapes are rewritten in memory.

use prost::Message;

use crate::error::{ModelError, ModelResult};

/// Format byte for protobuf-bodied records.
pub const FORMAT_V1: u8 = 1;

/// A record type that can be stored with [`encode`] and read with [`decode`].
pub trait Versioned: Message + Default {
    /// Rewrite legacy shapes in memory after a decode.
    ///
    /// Must be idempotent. Returns `true` if anything changed. Nothing is
    /// persisted until the caller saves the record.
    fn upgrade(&mut self) -> bool {
        false
    }
}

/// Encode a record into its stored byte form.
pub fn encode<T: Versioned>(record: &T) -> Vec<u8> {
    let body = record.encode_to_vec();
    let mut buf = Vec::with_capacity(body.len() + 1);
    buf.push(FORMAT_V1);
    buf.extend_from_slice(&body);
    buf
}

/// Decode a record from its stored byte form and run its upgrade hook.
pub fn decode<T: Versioned>(bytes: &[u8]) -> ModelResult<T> {
    let (&format, body) = bytes.split_first().ok_or_else(|| ModelError::Corrupt {
        reason: "empty record".into(),
    })?;

    if format != FORMAT_V1 {
        return Err(ModelError::Corrupt {
            reason: format!("unsupported format byte {format:#04x}"),
        });
    }

    let mut record = T::decode(body).map_err(|e| ModelError::Corrupt {
        reason: e.to_string(),
    })?;
    record.upgrade();
    Ok(record)
}

// ── tests ────────────────────────────────────────────────────────────
