use std::borrow::Cow;

use macaroon_core::crypto::{Signature, bind_for_request, keyed_hash};
use macaroon_core::{CaveatPayload, Field, MacaroonError, Packet, PacketBuf, decode_payload};
use tracing::debug;

/// A macaroon: location hint, identifier, ordered caveats and a signature
/// chaining all of them to a root key.
///
/// Location, identifier and caveats live as packets in one owned buffer that
/// only ever grows. The signature is kept apart and written last when the
/// macaroon is marshaled. `Clone` is a deep copy, so a clone can be
/// attenuated without affecting the original.
///
/// # Example
/// ```rust
/// use macaroon_token::Macaroon;
///
/// let root_key = b"secret";
/// let mut m = Macaroon::new(root_key, "some id", "a location").unwrap();
/// m.add_first_party_caveat("account = 3735928559").unwrap();
///
/// m.verify(root_key, |condition: &str| {
///     if condition == "account = 3735928559" {
///         Ok(())
///     } else {
///         Err(format!("unexpected caveat {condition:?}").into())
///     }
/// }, &[])
/// .unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macaroon {
    pub(crate) data: PacketBuf,
    pub(crate) location: Packet,
    pub(crate) id: Packet,
    pub(crate) caveats: Vec<CaveatPackets>,
    pub(crate) sig: Signature,
}

/// The packets making up one caveat. Absent packets are [`Packet::EMPTY`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CaveatPackets {
    pub(crate) id: Packet,
    pub(crate) verification_id: Packet,
    pub(crate) location: Packet,
}

/// A borrowed view of one caveat of a [`Macaroon`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caveat<'a> {
    id: &'a [u8],
    verification_id: &'a [u8],
    location: &'a [u8],
}

impl<'a> Caveat<'a> {
    /// The caveat identifier: the condition for a first-party caveat, the
    /// discharge macaroon's identifier for a third-party one.
    pub fn id(&self) -> &'a [u8] {
        self.id
    }

    /// Sealed discharge root key; empty for first-party caveats.
    pub fn verification_id(&self) -> &'a [u8] {
        self.verification_id
    }

    /// Location hint of the discharging party. Not covered by the signature.
    pub fn location(&self) -> &'a [u8] {
        self.location
    }

    pub fn is_third_party(&self) -> bool {
        !self.verification_id.is_empty()
    }

    /// The caveat identifier as text, as handed to condition checkers.
    pub fn condition(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.id)
    }

    /// Decodes a structured payload stored by [`Macaroon::add_payload_caveat`].
    pub fn payload<T: CaveatPayload>(&self) -> Result<T, MacaroonError> {
        decode_payload(self.id)
    }
}

impl Macaroon {
    /// Creates a macaroon whose signature is the keyed hash of `id` under
    /// `root_key`.
    ///
    /// # Arguments
    /// * `root_key` - Secret the macaroon is verified against
    /// * `id` - Identifier; arbitrary bytes, typically naming the root key
    /// * `location` - Location hint, not covered by the signature
    pub fn new(
        root_key: &[u8],
        id: impl AsRef<[u8]>,
        location: impl AsRef<[u8]>,
    ) -> Result<Self, MacaroonError> {
        let (data, location, id) = Self::init(id.as_ref(), location.as_ref())?;
        let sig = keyed_hash(root_key, data.payload(id));
        let m = Self {
            data,
            location,
            id,
            caveats: Vec::new(),
            sig,
        };
        debug!(id = %m.id_str(), "minted macaroon");
        Ok(m)
    }

    fn init(id: &[u8], location: &[u8]) -> Result<(PacketBuf, Packet, Packet), MacaroonError> {
        let mut data = PacketBuf::new();
        let location = data.append(Field::Location, location, "macaroon location")?;
        let id = data.append(Field::Identifier, id, "macaroon identifier")?;
        Ok((data, location, id))
    }

    /// The location hint. This is not verified as part of the macaroon.
    pub fn location(&self) -> &[u8] {
        self.data.payload(self.location)
    }

    /// The identifier. This can hold arbitrary information.
    pub fn id(&self) -> &[u8] {
        self.data.payload(self.id)
    }

    pub(crate) fn id_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.id())
    }

    /// A copy of the current signature.
    pub fn signature(&self) -> Signature {
        self.sig
    }

    /// The caveats in the order they were added.
    pub fn caveats(&self) -> impl ExactSizeIterator<Item = Caveat<'_>> + '_ {
        self.caveats.iter().map(|packets| self.caveat_view(packets))
    }

    pub fn caveat_count(&self) -> usize {
        self.caveats.len()
    }

    pub(crate) fn caveat_view(&self, packets: &CaveatPackets) -> Caveat<'_> {
        Caveat {
            id: self.data.payload(packets.id),
            verification_id: self.data.payload(packets.verification_id),
            location: self.data.payload(packets.location),
        }
    }

    /// Raw packet bytes of all caveats, in append order.
    pub fn caveat_bytes(&self) -> &[u8] {
        self.data.tail(self.id.end())
    }

    /// Binds this discharge macaroon to the primary macaroon with signature
    /// `root_sig`. Must be called on every discharge before it is passed to
    /// [`Macaroon::verify`].
    pub fn bind(&mut self, root_sig: &Signature) {
        self.sig = bind_for_request(root_sig, &self.sig);
        debug!(id = %self.id_str(), "bound discharge macaroon");
    }
}
