//! # Macaroon Token
//!
//! Attenuable bearer tokens with contextual caveats.
//!
//! A macaroon is a location hint, an identifier, an ordered list of caveats
//! and a signature. The signature chains every caveat to a root key with
//! HMAC-SHA256, so anyone holding a macaroon can add caveats but nobody can
//! remove one without the root key.
//!
//! ## Caveats
//!
//! - A first-party caveat is a condition checked by the verifier's checker
//!   closure.
//! - A third-party caveat names a discharge macaroon that must be presented
//!   alongside the primary. Its root key is sealed into the caveat so the
//!   verifier can recover it from the primary's signature chain.
//!
//! Discharges are bound to the primary with [`Macaroon::bind`] before being
//! sent, so they cannot be reused with a different primary.
//!
//! ```rust
//! use macaroon_token::{Macaroon, MacaroonVerifier};
//!
//! let mut primary = Macaroon::new(b"root key", "primary id", "https://service").unwrap();
//! primary.add_first_party_caveat("op = read").unwrap();
//! primary
//!     .add_third_party_caveat(b"auth root key", "user = alice", "https://auth")
//!     .unwrap();
//!
//! let mut discharge = Macaroon::new(b"auth root key", "user = alice", "https://auth").unwrap();
//! discharge.bind(&primary.signature());
//!
//! let discharges = [discharge];
//! MacaroonVerifier::new(&primary, b"root key")
//!     .with_discharges(&discharges)
//!     .verify(|condition: &str| match condition {
//!         "op = read" => Ok(()),
//!         other => Err(format!("unknown condition {other:?}").into()),
//!     })
//!     .unwrap();
//! ```

mod attenuate;
mod inspect;
mod json;
mod marshal;
mod mint;
mod verify;

pub use inspect::{CaveatKind, CaveatSummary, InspectResult, inspect_macaroon, inspect_token};
pub use json::{EncodingConfig, JsonCaveatFormat};
pub use marshal::Slice;
pub use mint::{Caveat, Macaroon};
pub use verify::MacaroonVerifier;

// Re-export commonly needed types from core
pub use macaroon_core::{
    BoxError, CaveatPayload, FieldKind, FieldValue, MacaroonError, PayloadFields, Signature,
    decode_token, encode_token,
};
