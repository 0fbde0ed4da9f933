//! Binary marshaling of macaroons and macaroon slices
//!
//! A macaroon's binary form is its packet buffer followed by a signature
//! packet:
//!
//! ```text
//! location identifier (cid vid? cl?)* signature
//! ```
//!
//! A [`Slice`] is the concatenation of its members' binary forms.

use std::ops::{Deref, DerefMut};

use macaroon_core::crypto::SIGNATURE_LEN;
use macaroon_core::packet::{append_raw, field_at, packet_size, parse_at, payload_at};
use macaroon_core::{
    BoxError, Field, MacaroonError, Packet, PacketBuf, Signature, decode_token, encode_token,
};
use tracing::debug;

use crate::mint::{CaveatPackets, Macaroon};

impl Macaroon {
    /// Length of the binary form.
    pub fn marshal_len(&self) -> usize {
        self.data.len() + packet_size(SIGNATURE_LEN)
    }

    /// Appends the binary form to `out`.
    pub fn append_binary(&self, out: &mut Vec<u8>) -> Result<(), MacaroonError> {
        out.extend_from_slice(self.data.as_bytes());
        append_raw(out, Field::Signature, &self.sig)
            .map(|_| ())
            .ok_or_else(|| MacaroonError::too_big("macaroon signature"))
    }

    /// Returns the binary form.
    pub fn marshal_binary(&self) -> Result<Vec<u8>, MacaroonError> {
        let mut out = Vec::with_capacity(self.marshal_len());
        self.append_binary(&mut out)?;
        Ok(out)
    }

    /// Parses a single macaroon occupying all of `data`.
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self, MacaroonError> {
        let (m, consumed) = Self::parse_binary(data)?;
        if consumed != data.len() {
            return Err(MacaroonError::malformed(format!(
                "{} unexpected bytes after macaroon",
                data.len() - consumed
            )));
        }
        Ok(m)
    }

    /// Base64 form of [`Macaroon::marshal_binary`].
    pub fn to_base64(&self) -> Result<String, MacaroonError> {
        Ok(encode_token(&self.marshal_binary()?))
    }

    pub fn from_base64(token: &str) -> Result<Self, MacaroonError> {
        Self::unmarshal_binary(&decode_token(token)?)
    }

    /// Parses the macaroon at the start of `data`, returning it and the
    /// number of bytes it occupied.
    ///
    /// The macaroon receives its own copy of exactly those bytes, so later
    /// appends to it never reach bytes of whatever followed it in `data`.
    pub(crate) fn parse_binary(data: &[u8]) -> Result<(Self, usize), MacaroonError> {
        let location = expect_at(data, 0, Field::Location)?;
        let id = expect_at(data, location.end(), Field::Identifier)?;

        let mut caveats: Vec<CaveatPackets> = Vec::new();
        let mut start = id.end();
        let sig_packet = loop {
            let packet = parse_at(data, start)?;
            start = packet.end();
            match field_at(data, packet) {
                Field::Signature => break packet,
                Field::CaveatId => caveats.push(CaveatPackets {
                    id: packet,
                    ..CaveatPackets::default()
                }),
                Field::VerificationId => match caveats.last_mut() {
                    Some(cav) if cav.verification_id.is_empty() && cav.location.is_empty() => {
                        cav.verification_id = packet
                    }
                    _ => {
                        return Err(MacaroonError::UnexpectedField {
                            found: Field::VerificationId,
                            expected: Field::CaveatId,
                        });
                    }
                },
                Field::CaveatLocation => match caveats.last_mut() {
                    Some(cav) if cav.location.is_empty() => cav.location = packet,
                    _ => {
                        return Err(MacaroonError::UnexpectedField {
                            found: Field::CaveatLocation,
                            expected: Field::CaveatId,
                        });
                    }
                },
                found => {
                    return Err(MacaroonError::UnexpectedField {
                        found,
                        expected: Field::Signature,
                    });
                }
            }
        };

        let sig_bytes = payload_at(data, sig_packet);
        let sig: Signature = sig_bytes
            .try_into()
            .map_err(|_| MacaroonError::InvalidSignatureLength {
                expected: SIGNATURE_LEN,
                actual: sig_bytes.len(),
            })?;

        let m = Macaroon {
            data: PacketBuf::from_slice(&data[..sig_packet.start()]),
            location,
            id,
            caveats,
            sig,
        };
        Ok((m, sig_packet.end()))
    }
}

fn expect_at(data: &[u8], start: usize, expected: Field) -> Result<Packet, MacaroonError> {
    let packet = parse_at(data, start)?;
    let found = field_at(data, packet);
    if found != expected {
        return Err(MacaroonError::UnexpectedField { found, expected });
    }
    Ok(packet)
}

/// An ordered collection of macaroons. By convention the first is the
/// primary macaroon and the rest are discharges for its third-party caveats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slice(Vec<Macaroon>);

impl Slice {
    pub fn new(macaroons: Vec<Macaroon>) -> Self {
        Self(macaroons)
    }

    pub fn primary(&self) -> Option<&Macaroon> {
        self.0.first()
    }

    pub fn discharges(&self) -> &[Macaroon] {
        self.0.get(1..).unwrap_or_default()
    }

    pub fn push(&mut self, m: Macaroon) {
        self.0.push(m);
    }

    pub fn into_inner(self) -> Vec<Macaroon> {
        self.0
    }

    /// Binds every discharge to the primary's signature.
    pub fn bind_discharges(&mut self) {
        if let Some((primary, discharges)) = self.0.split_first_mut() {
            let root_sig = primary.signature();
            for discharge in discharges {
                discharge.bind(&root_sig);
            }
        }
    }

    /// Verifies the primary against `root_key` using the rest as discharges.
    pub fn verify<F>(&self, root_key: &[u8], checker: F) -> Result<(), MacaroonError>
    where
        F: FnMut(&str) -> Result<(), BoxError>,
    {
        let primary = self.primary().ok_or(MacaroonError::EmptySlice)?;
        primary.verify(root_key, checker, self.discharges())
    }

    /// Concatenated binary forms of every macaroon.
    pub fn marshal_binary(&self) -> Result<Vec<u8>, MacaroonError> {
        let size = self.0.iter().map(Macaroon::marshal_len).sum();
        let mut out = Vec::with_capacity(size);
        for m in &self.0 {
            m.append_binary(&mut out)?;
        }
        Ok(out)
    }

    /// Parses macaroons until `data` is exhausted.
    pub fn unmarshal_binary(mut data: &[u8]) -> Result<Self, MacaroonError> {
        let mut macaroons = Vec::new();
        while !data.is_empty() {
            let (m, consumed) = Macaroon::parse_binary(data)?;
            macaroons.push(m);
            data = &data[consumed..];
        }
        debug!(count = macaroons.len(), "unmarshaled macaroon slice");
        Ok(Self(macaroons))
    }

    pub fn to_base64(&self) -> Result<String, MacaroonError> {
        Ok(encode_token(&self.marshal_binary()?))
    }

    pub fn from_base64(token: &str) -> Result<Self, MacaroonError> {
        Self::unmarshal_binary(&decode_token(token)?)
    }
}

impl Deref for Slice {
    type Target = [Macaroon];

    fn deref(&self) -> &[Macaroon] {
        &self.0
    }
}

impl DerefMut for Slice {
    fn deref_mut(&mut self) -> &mut [Macaroon] {
        &mut self.0
    }
}

impl From<Vec<Macaroon>> for Slice {
    fn from(macaroons: Vec<Macaroon>) -> Self {
        Self(macaroons)
    }
}

impl FromIterator<Macaroon> for Slice {
    fn from_iter<I: IntoIterator<Item = Macaroon>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Slice {
    type Item = Macaroon;
    type IntoIter = std::vec::IntoIter<Macaroon>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Slice {
    type Item = &'a Macaroon;
    type IntoIter = std::slice::Iter<'a, Macaroon>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
