//! # Macaroon Core
//!
//! Core primitives shared by the macaroon token implementation.
//!
//! This crate provides the low-level pieces a macaroon is built from:
//!
//! - The append-only packet codec backing every macaroon's binary form
//! - HMAC-SHA256 signature chaining and discharge binding
//! - XSalsa20Poly1305 sealing of delegated discharge keys
//! - Common error types
//! - Base64 token encoding/decoding utilities
//! - Schema-described structured caveat payloads

pub mod crypto;
pub mod error;
pub mod packet;
pub mod payload;
pub mod utils;

pub use crypto::{
    KeyedHasher, NONCE_LEN, SIGNATURE_LEN, Signature, bind_for_request, keyed_hash, keyed_hasher,
};
pub use error::{BoxError, MacaroonError};
pub use packet::{Field, MAX_PACKET_LEN, Packet, PacketBuf};
pub use payload::{
    CaveatPayload, FieldKind, FieldValue, PayloadFields, decode_payload, encode_payload,
};
pub use utils::{decode_token, encode_token};
