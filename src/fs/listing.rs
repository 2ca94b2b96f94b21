//! Directory listing encode/decode.
//!
//! The specification leaves the wire encoding of a directory's payload as an open question,
//! requiring only a lossless round trip and a bounded size. This implementation resolves
//! that question with `bincode` over a `BTreeMap<String, u64>` (name -> child ino) — the
//! same `serde` + `bincode` pairing the teacher crate already carries as a dev-dependency
//! for its own `serializable` feature, generalized here to an always-on payload codec
//! instead of an opt-in debug aid.

use std::collections::BTreeMap;

use crate::error::{raise, Result};

/// A directory's entries: name -> child ino. `BTreeMap` rather than `HashMap` so encoding
/// is deterministic, which keeps store-level tests and fixtures reproducible even though
/// the specification does not require observable ordering.
pub type Listing = BTreeMap<String, u64>;

/// Serialize a listing to bytes.
pub fn encode(listing: &Listing) -> Vec<u8> {
    bincode::serialize(listing).expect("in-memory listings always serialize")
}

/// Deserialize bytes produced by [`encode`]. A corrupt or foreign payload raises `EIO`
/// against `syscall`, the caller's own operation name (mirroring `engine::unpack`), so the
/// structured error reports the operation that actually triggered the corrupt read rather
/// than a fixed label.
pub fn decode(bytes: &[u8], syscall: &'static str) -> Result<Listing> {
    bincode::deserialize(bytes).map_err(|e| raise::eio(syscall, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty_and_populated_listings() {
        let empty = Listing::new();
        assert_eq!(decode(&encode(&empty), "readdir").unwrap(), empty);

        let mut listing = Listing::new();
        listing.insert("a".to_string(), 2);
        listing.insert("b".to_string(), 3);
        assert_eq!(decode(&encode(&listing), "readdir").unwrap(), listing);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(&[0xff, 0x00, 0x01], "readdir").is_err());
    }

    #[test]
    fn decode_reports_the_callers_syscall_on_corruption() {
        let err = decode(&[0xff, 0x00, 0x01], "createFile").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrCode::Eio);
    }
}
