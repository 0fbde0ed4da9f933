//! Keyed-hash chaining and authenticated encryption primitives
//!
//! A macaroon signature is an HMAC-SHA256 chain: the root key signs the
//! identifier, and each caveat is signed with the previous signature as key.
//! Third-party caveats seal the discharge root key with XSalsa20Poly1305
//! under a key derived from the signature at that point in the chain.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use xsalsa20poly1305::XSalsa20Poly1305;
use xsalsa20poly1305::aead::generic_array::GenericArray;
use xsalsa20poly1305::aead::{Aead, KeyInit};
use zeroize::Zeroizing;

use crate::error::MacaroonError;

type HmacSha256 = Hmac<Sha256>;

/// Length of a keyed-hash output and therefore of every signature.
pub const SIGNATURE_LEN: usize = 32;

/// Length of the random nonce prefixed to a verification id.
pub const NONCE_LEN: usize = 24;

/// Length of the authentication tag added by the secretbox construction.
pub const TAG_LEN: usize = 16;

/// Context hashed with the running signature to derive a caveat encryption key.
pub const THIRD_PARTY_KEY_CONTEXT: &[u8] = b"macaroon-third-party-caveat-key";

/// A macaroon signature
pub type Signature = [u8; SIGNATURE_LEN];

/// HMAC-SHA256 of `message` under `key`.
pub fn keyed_hash(key: &[u8], message: &[u8]) -> Signature {
    let mut hasher = keyed_hasher(key);
    hasher.update(message);
    hasher.finalize()
}

/// Starts an incremental HMAC-SHA256 under `key`.
pub fn keyed_hasher(key: &[u8]) -> KeyedHasher {
    KeyedHasher {
        // infallible: HMAC accepts keys of any length
        mac: <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC can take key of any size"),
    }
}

/// Incremental keyed hash. Several writes produce the same output as one
/// write of their concatenation.
#[derive(Clone)]
pub struct KeyedHasher {
    mac: HmacSha256,
}

impl KeyedHasher {
    pub fn update(&mut self, chunk: &[u8]) {
        self.mac.update(chunk);
    }

    pub fn finalize(self) -> Signature {
        self.mac.finalize().into_bytes().into()
    }
}

/// Advances a signature chain over one caveat.
///
/// The verification id is written before the caveat id; an empty
/// verification id (first-party caveat) contributes nothing.
pub fn chain_caveat(sig: &Signature, verification_id: &[u8], caveat_id: &[u8]) -> Signature {
    let mut hasher = keyed_hasher(sig);
    hasher.update(verification_id);
    hasher.update(caveat_id);
    hasher.finalize()
}

/// Binds a discharge signature to the signature of the primary macaroon.
///
/// Equal signatures are returned unchanged; otherwise the result is
/// `SHA256(root_sig || discharge_sig)`.
pub fn bind_for_request(root_sig: &Signature, discharge_sig: &Signature) -> Signature {
    if root_sig == discharge_sig {
        return *root_sig;
    }
    let mut hasher = Sha256::new();
    hasher.update(root_sig);
    hasher.update(discharge_sig);
    hasher.finalize().into()
}

/// Constant-time signature comparison.
pub fn signatures_equal(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Derives the key that seals a third-party caveat's discharge root key.
fn caveat_encryption_key(sig: &Signature) -> Zeroizing<Signature> {
    Zeroizing::new(keyed_hash(sig, THIRD_PARTY_KEY_CONTEXT))
}

/// Seals `discharge_root_key` under the running signature, returning
/// `nonce || ciphertext`.
pub fn seal_verification_id(
    sig: &Signature,
    nonce: &[u8; NONCE_LEN],
    discharge_root_key: &[u8],
) -> Result<Vec<u8>, MacaroonError> {
    let key = caveat_encryption_key(sig);
    let cipher = XSalsa20Poly1305::new(GenericArray::from_slice(key.as_slice()));
    let sealed = cipher
        .encrypt(GenericArray::from_slice(nonce), discharge_root_key)
        .map_err(|e| MacaroonError::Decryption {
            reason: format!("cannot seal discharge root key: {e}"),
        })?;

    let mut verification_id = Vec::with_capacity(NONCE_LEN + sealed.len());
    verification_id.extend_from_slice(nonce);
    verification_id.extend_from_slice(&sealed);
    Ok(verification_id)
}

/// Opens a verification id produced by [`seal_verification_id`] under the
/// same running signature, yielding the discharge root key.
pub fn open_verification_id(
    sig: &Signature,
    verification_id: &[u8],
) -> Result<Zeroizing<Vec<u8>>, MacaroonError> {
    if verification_id.len() < NONCE_LEN + TAG_LEN {
        return Err(MacaroonError::Decryption {
            reason: format!(
                "verification id too short: {} bytes",
                verification_id.len()
            ),
        });
    }
    let (nonce, sealed) = verification_id.split_at(NONCE_LEN);
    let key = caveat_encryption_key(sig);
    let cipher = XSalsa20Poly1305::new(GenericArray::from_slice(key.as_slice()));
    cipher
        .decrypt(GenericArray::from_slice(nonce), sealed)
        .map(Zeroizing::new)
        .map_err(|_| MacaroonError::Decryption {
            reason: "authentication failed".to_string(),
        })
}

/// Size of a verification id sealing a key of `key_len` bytes.
pub fn verification_id_len(key_len: usize) -> usize {
    NONCE_LEN + key_len + TAG_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_hash_matches_incremental() {
        let whole = keyed_hash(b"key", b"verification-idcaveat-id");
        let mut hasher = keyed_hasher(b"key");
        hasher.update(b"verification-id");
        hasher.update(b"caveat-id");
        assert_eq!(hasher.finalize(), whole);
    }

    #[test]
    fn test_keyed_hasher_accepts_any_key_length() {
        for key in [Vec::new(), vec![0xaa; 16], vec![0xaa; 131]] {
            let mut hasher = keyed_hasher(&key);
            hasher.update(b"message");
            assert_eq!(hasher.finalize(), keyed_hash(&key, b"message"));
        }
    }

    #[test]
    fn test_keyed_hash_known_vector() {
        // RFC 4231 test case 2
        let sig = keyed_hash(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(sig),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_chain_caveat_first_party_ignores_empty_vid() {
        let sig = keyed_hash(b"root", b"id");
        assert_eq!(chain_caveat(&sig, b"", b"a caveat"), keyed_hash(&sig, b"a caveat"));
    }

    #[test]
    fn test_bind_for_request() {
        let root = keyed_hash(b"root", b"primary");
        let discharge = keyed_hash(b"other", b"discharge");

        assert_eq!(bind_for_request(&root, &root), root);

        let bound = bind_for_request(&root, &discharge);
        let mut expected = Sha256::new();
        expected.update(root);
        expected.update(discharge);
        let expected: Signature = expected.finalize().into();
        assert_eq!(bound, expected);
        assert_ne!(bind_for_request(&discharge, &bound), bound);
    }

    #[test]
    fn test_seal_and_open_verification_id() {
        let sig = keyed_hash(b"root", b"id");
        let nonce = [7u8; NONCE_LEN];
        let vid = seal_verification_id(&sig, &nonce, b"shared root key").unwrap();
        assert_eq!(vid.len(), verification_id_len(b"shared root key".len()));
        assert_eq!(&vid[..NONCE_LEN], &nonce);

        let key = open_verification_id(&sig, &vid).unwrap();
        assert_eq!(key.as_slice(), b"shared root key");
    }

    #[test]
    fn test_open_with_wrong_signature_fails() {
        let sig = keyed_hash(b"root", b"id");
        let vid = seal_verification_id(&sig, &[1u8; NONCE_LEN], b"secret").unwrap();

        let other = keyed_hash(b"root", b"other id");
        let err = open_verification_id(&other, &vid).unwrap_err();
        assert!(matches!(err, MacaroonError::Decryption { .. }));

        let err = open_verification_id(&sig, &vid[..NONCE_LEN]).unwrap_err();
        assert!(matches!(err, MacaroonError::Decryption { .. }));
    }

    #[test]
    fn test_signatures_equal() {
        let a = keyed_hash(b"k", b"m");
        let b = keyed_hash(b"k", b"n");
        assert!(signatures_equal(&a, &a));
        assert!(!signatures_equal(&a, &b));
        assert!(!signatures_equal(&a, &a[..16]));
    }
}
