use macaroon_core::crypto::{
    NONCE_LEN, chain_caveat, keyed_hash, seal_verification_id, verification_id_len,
};
use macaroon_core::packet::fits;
use macaroon_core::{CaveatPayload, Field, MacaroonError, Packet, encode_payload};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;

use crate::mint::{CaveatPackets, Macaroon};

impl Macaroon {
    /// Adds a caveat that is checked locally by the verifier's condition
    /// checker.
    ///
    /// The signature becomes the keyed hash of `condition` under the
    /// previous signature.
    pub fn add_first_party_caveat(
        &mut self,
        condition: impl AsRef<[u8]>,
    ) -> Result<(), MacaroonError> {
        let condition = condition.as_ref();
        let id = self
            .data
            .append(Field::CaveatId, condition, "caveat identifier")?;
        self.caveats.push(CaveatPackets {
            id,
            verification_id: Packet::EMPTY,
            location: Packet::EMPTY,
        });
        self.sig = keyed_hash(&self.sig, condition);
        debug!(caveats = self.caveats.len(), "added first party caveat");
        Ok(())
    }

    /// Adds a first-party caveat holding a structured payload.
    ///
    /// The condition checker receives the payload bytes as lossy text; use
    /// [`Caveat::payload`](crate::Caveat::payload) to decode them.
    pub fn add_payload_caveat<T: CaveatPayload>(
        &mut self,
        payload: &T,
    ) -> Result<(), MacaroonError> {
        let encoded = encode_payload(payload)?;
        self.add_first_party_caveat(encoded)
    }

    /// Adds a caveat that must be discharged by a macaroon minted by a
    /// third party with `discharge_root_key` and identifier `caveat_id`.
    ///
    /// # Arguments
    /// * `discharge_root_key` - Root key shared with the discharging party
    /// * `caveat_id` - Identifier the discharge macaroon must carry
    /// * `location` - Hint for where to obtain the discharge
    pub fn add_third_party_caveat(
        &mut self,
        discharge_root_key: &[u8],
        caveat_id: impl AsRef<[u8]>,
        location: impl AsRef<[u8]>,
    ) -> Result<(), MacaroonError> {
        self.add_third_party_caveat_with_rand(
            discharge_root_key,
            caveat_id,
            location,
            &mut OsRng,
        )
    }

    /// Like [`Macaroon::add_third_party_caveat`], drawing the nonce from
    /// `rng`.
    ///
    /// The macaroon is left untouched on any error.
    pub fn add_third_party_caveat_with_rand<R: RngCore + ?Sized>(
        &mut self,
        discharge_root_key: &[u8],
        caveat_id: impl AsRef<[u8]>,
        location: impl AsRef<[u8]>,
        rng: &mut R,
    ) -> Result<(), MacaroonError> {
        let caveat_id = caveat_id.as_ref();
        let location = location.as_ref();

        if !fits(caveat_id.len()) {
            return Err(MacaroonError::too_big("caveat identifier"));
        }
        if !fits(verification_id_len(discharge_root_key.len())) {
            return Err(MacaroonError::too_big("caveat verification id"));
        }
        if !fits(location.len()) {
            return Err(MacaroonError::too_big("caveat location"));
        }

        let mut nonce = [0u8; NONCE_LEN];
        rng.try_fill_bytes(&mut nonce)?;
        let verification_id = seal_verification_id(&self.sig, &nonce, discharge_root_key)?;

        let id = self
            .data
            .append(Field::CaveatId, caveat_id, "caveat identifier")?;
        let vid = self.data.append(
            Field::VerificationId,
            &verification_id,
            "caveat verification id",
        )?;
        let loc = self
            .data
            .append(Field::CaveatLocation, location, "caveat location")?;
        self.caveats.push(CaveatPackets {
            id,
            verification_id: vid,
            location: loc,
        });
        self.sig = chain_caveat(&self.sig, &verification_id, caveat_id);

        debug!(
            caveats = self.caveats.len(),
            location = %String::from_utf8_lossy(location),
            "added third party caveat"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use macaroon_core::payload::{FieldKind, FieldValue, PayloadFields};

    struct FailingRng;

    impl RngCore for FailingRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {}

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new("fail"))
        }
    }

    #[derive(Debug, PartialEq)]
    struct Quota {
        account: u32,
        readonly: bool,
    }

    impl CaveatPayload for Quota {
        const SCHEMA: &'static [(u8, FieldKind)] = &[(0, FieldKind::U32), (1, FieldKind::Bool)];

        fn to_fields(&self) -> Vec<(u8, FieldValue)> {
            vec![
                (0, FieldValue::U32(self.account)),
                (1, FieldValue::Bool(self.readonly)),
            ]
        }

        fn from_fields(mut fields: PayloadFields) -> Result<Self, MacaroonError> {
            Ok(Quota {
                account: fields.require_u32(0)?,
                readonly: fields.require_bool(1)?,
            })
        }
    }

    #[test]
    fn test_first_party_caveat_chains_signature() {
        let mut m = Macaroon::new(b"secret", "some id", "a location").unwrap();
        let before = m.signature();
        m.add_first_party_caveat("a caveat").unwrap();

        assert_eq!(m.signature(), keyed_hash(&before, b"a caveat"));
        let caveat = m.caveats().next().unwrap();
        assert_eq!(caveat.id(), b"a caveat");
        assert!(!caveat.is_third_party());
        assert!(caveat.location().is_empty());
    }

    #[test]
    fn test_third_party_caveat_layout() {
        let mut m = Macaroon::new(b"secret", "some id", "a location").unwrap();
        let before = m.signature();
        m.add_third_party_caveat(b"shared root key", "3rd party caveat", "remote.com")
            .unwrap();

        let caveat = m.caveats().next().unwrap();
        assert!(caveat.is_third_party());
        assert_eq!(caveat.id(), b"3rd party caveat");
        assert_eq!(caveat.location(), b"remote.com");
        assert_eq!(
            caveat.verification_id().len(),
            verification_id_len(b"shared root key".len())
        );
        assert_eq!(
            m.signature(),
            chain_caveat(&before, caveat.verification_id(), caveat.id())
        );
    }

    #[test]
    fn test_third_party_nonces_differ() {
        let mut a = Macaroon::new(b"secret", "some id", "").unwrap();
        let mut b = a.clone();
        a.add_third_party_caveat(b"key", "cav", "").unwrap();
        b.add_third_party_caveat(b"key", "cav", "").unwrap();
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn test_third_party_caveat_bad_random() {
        let mut m = Macaroon::new(b"secret", "some id", "a location").unwrap();
        let before = m.clone();

        let err = m
            .add_third_party_caveat_with_rand(
                b"shared root key",
                "3rd party caveat",
                "remote.com",
                &mut FailingRng,
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot generate random bytes: fail");
        assert_eq!(m, before, "failed caveat must not mutate the macaroon");
    }

    #[test]
    fn test_third_party_fields_too_big() {
        let too_big = vec![0x5au8; macaroon_core::MAX_PACKET_LEN];
        let mut m = Macaroon::new(b"secret", "some id", "a location").unwrap();
        let before = m.clone();

        let err = m
            .add_third_party_caveat(&too_big, "3rd party caveat", "remote.com")
            .unwrap_err();
        assert_eq!(err.to_string(), "caveat verification id too big");

        let err = m
            .add_third_party_caveat(b"shared root key", &too_big, "remote.com")
            .unwrap_err();
        assert_eq!(err.to_string(), "caveat identifier too big");

        let err = m
            .add_third_party_caveat(b"shared root key", "3rd party caveat", &too_big)
            .unwrap_err();
        assert_eq!(err.to_string(), "caveat location too big");

        let err = m.add_first_party_caveat(&too_big).unwrap_err();
        assert_eq!(err.to_string(), "caveat identifier too big");

        assert_eq!(m, before);
    }

    #[test]
    fn test_payload_caveat() {
        let mut m = Macaroon::new(b"secret", "some id", "").unwrap();
        let quota = Quota {
            account: 3735928559,
            readonly: true,
        };
        m.add_payload_caveat(&quota).unwrap();

        let caveat = m.caveats().next().unwrap();
        assert_eq!(caveat.payload::<Quota>().unwrap(), quota);
        assert_eq!(caveat.id(), encode_payload(&quota).unwrap().as_slice());
    }
}
