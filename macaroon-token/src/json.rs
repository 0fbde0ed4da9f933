//! JSON transcoding of macaroons
//!
//! The JSON object carries `location`, `identifier`, hex `signature` and
//! `caveats`. Caveats are either one hex blob of the raw caveat packets
//! (compact) or an array of `{cid, vid, cl}` objects with a base64 `vid`
//! (per-caveat). Both forms decode to the same binary macaroon, so a round
//! trip reproduces the caveat packet bytes exactly.

use macaroon_core::crypto::SIGNATURE_LEN;
use macaroon_core::packet::{append_raw, packet_size};
use macaroon_core::{Field, MacaroonError, decode_token, encode_token};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::marshal::Slice;
use crate::mint::Macaroon;

/// How caveats are written by [`Macaroon::to_json`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JsonCaveatFormat {
    /// A single hex string of the raw caveat packets
    #[default]
    Compact,
    /// An array of `{cid, vid, cl}` objects
    PerCaveat,
}

/// Encoding options for a deployment.
///
/// Decoding always accepts either caveat form; the config only picks the one
/// that is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodingConfig {
    pub json_caveats: JsonCaveatFormat,
}

impl EncodingConfig {
    pub fn per_caveat() -> Self {
        Self {
            json_caveats: JsonCaveatFormat::PerCaveat,
        }
    }

    pub fn with_json_caveats(mut self, format: JsonCaveatFormat) -> Self {
        self.json_caveats = format;
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MacaroonJson {
    location: String,
    identifier: String,
    caveats: CaveatsJson,
    signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum CaveatsJson {
    Compact(String),
    PerCaveat(Vec<CaveatJson>),
}

#[derive(Debug, Serialize, Deserialize)]
struct CaveatJson {
    cid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cl: Option<String>,
}

fn utf8(bytes: &[u8], what: &str) -> Result<String, MacaroonError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| MacaroonError::json(format!("{what} is not valid UTF-8")))
}

fn push_packet(
    buf: &mut Vec<u8>,
    field: Field,
    payload: &[u8],
    what: &'static str,
) -> Result<(), MacaroonError> {
    append_raw(buf, field, payload)
        .map(|_| ())
        .ok_or(MacaroonError::TooBig { what })
}

impl Macaroon {
    fn to_json_repr(&self, config: &EncodingConfig) -> Result<MacaroonJson, MacaroonError> {
        let caveats = match config.json_caveats {
            JsonCaveatFormat::Compact => CaveatsJson::Compact(hex::encode(self.caveat_bytes())),
            JsonCaveatFormat::PerCaveat => {
                let mut out = Vec::with_capacity(self.caveats.len());
                for packets in &self.caveats {
                    let caveat = self.caveat_view(packets);
                    let vid = (!packets.verification_id.is_empty())
                        .then(|| encode_token(caveat.verification_id()));
                    let cl = if packets.location.is_empty() {
                        None
                    } else {
                        Some(utf8(caveat.location(), "caveat location")?)
                    };
                    out.push(CaveatJson {
                        cid: utf8(caveat.id(), "caveat identifier")?,
                        vid,
                        cl,
                    });
                }
                CaveatsJson::PerCaveat(out)
            }
        };
        Ok(MacaroonJson {
            location: utf8(self.location(), "macaroon location")?,
            identifier: utf8(self.id(), "macaroon identifier")?,
            caveats,
            signature: hex::encode(self.sig),
        })
    }

    fn from_json_repr(repr: MacaroonJson) -> Result<Self, MacaroonError> {
        let caveat_bytes = match repr.caveats {
            CaveatsJson::Compact(blob) => hex::decode(blob)?,
            CaveatsJson::PerCaveat(caveats) => {
                let mut buf = Vec::new();
                for caveat in caveats {
                    push_packet(
                        &mut buf,
                        Field::CaveatId,
                        caveat.cid.as_bytes(),
                        "caveat identifier",
                    )?;
                    if let Some(vid) = caveat.vid {
                        let vid = decode_token(&vid)?;
                        push_packet(
                            &mut buf,
                            Field::VerificationId,
                            &vid,
                            "caveat verification id",
                        )?;
                    }
                    if let Some(cl) = caveat.cl {
                        push_packet(
                            &mut buf,
                            Field::CaveatLocation,
                            cl.as_bytes(),
                            "caveat location",
                        )?;
                    }
                }
                buf
            }
        };
        let signature = hex::decode(&repr.signature)?;
        if signature.len() != SIGNATURE_LEN {
            return Err(MacaroonError::InvalidSignatureLength {
                expected: SIGNATURE_LEN,
                actual: signature.len(),
            });
        }

        let mut binary = Vec::with_capacity(
            packet_size(repr.location.len())
                + packet_size(repr.identifier.len())
                + caveat_bytes.len()
                + packet_size(SIGNATURE_LEN),
        );
        push_packet(
            &mut binary,
            Field::Location,
            repr.location.as_bytes(),
            "macaroon location",
        )?;
        push_packet(
            &mut binary,
            Field::Identifier,
            repr.identifier.as_bytes(),
            "macaroon identifier",
        )?;
        binary.extend_from_slice(&caveat_bytes);
        push_packet(&mut binary, Field::Signature, &signature, "macaroon signature")?;
        Macaroon::unmarshal_binary(&binary)
    }

    /// Encodes the macaroon as JSON using the caveat form chosen by `config`.
    ///
    /// Fails if the location, identifier or any written caveat field is not
    /// valid UTF-8.
    pub fn to_json(&self, config: &EncodingConfig) -> Result<String, MacaroonError> {
        let repr = self.to_json_repr(config)?;
        serde_json::to_string(&repr).map_err(|e| MacaroonError::json(e.to_string()))
    }

    /// Decodes a macaroon from either JSON caveat form.
    pub fn from_json(json: &str) -> Result<Self, MacaroonError> {
        let repr: MacaroonJson =
            serde_json::from_str(json).map_err(|e| MacaroonError::json(e.to_string()))?;
        Self::from_json_repr(repr)
    }
}

impl Serialize for Macaroon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_repr(&EncodingConfig::default())
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Macaroon {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = MacaroonJson::deserialize(deserializer)?;
        Macaroon::from_json_repr(repr).map_err(serde::de::Error::custom)
    }
}

impl Slice {
    /// Encodes the slice as a JSON array of macaroons.
    pub fn to_json(&self, config: &EncodingConfig) -> Result<String, MacaroonError> {
        let reprs = self
            .iter()
            .map(|m| m.to_json_repr(config))
            .collect::<Result<Vec<_>, _>>()?;
        serde_json::to_string(&reprs).map_err(|e| MacaroonError::json(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, MacaroonError> {
        let macaroons: Vec<Macaroon> =
            serde_json::from_str(json).map_err(|e| MacaroonError::json(e.to_string()))?;
        Ok(Slice::from(macaroons))
    }
}

impl Serialize for Slice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for Slice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Macaroon>::deserialize(deserializer).map(Slice::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample() -> Macaroon {
        let mut m = Macaroon::new(b"secret", "some id", "a location").unwrap();
        m.add_first_party_caveat("first caveat").unwrap();
        m.add_third_party_caveat(b"shared root key", "3rd party caveat", "remote.com")
            .unwrap();
        m.add_first_party_caveat("last caveat").unwrap();
        m
    }

    #[test]
    fn test_compact_round_trip() {
        let m = sample();
        let json = m.to_json(&EncodingConfig::default()).unwrap();

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["location"], "a location");
        assert_eq!(value["identifier"], "some id");
        assert_eq!(value["signature"], hex::encode(m.signature()));
        assert_eq!(value["caveats"], hex::encode(m.caveat_bytes()));

        let decoded = Macaroon::from_json(&json).unwrap();
        assert_eq!(decoded, m);
        assert_eq!(decoded.caveat_bytes(), m.caveat_bytes());
    }

    #[test]
    fn test_per_caveat_round_trip() {
        let m = sample();
        let json = m.to_json(&EncodingConfig::per_caveat()).unwrap();

        let value: Value = serde_json::from_str(&json).unwrap();
        let caveats = value["caveats"].as_array().unwrap();
        assert_eq!(caveats.len(), 3);
        assert_eq!(caveats[0], serde_json::json!({"cid": "first caveat"}));
        assert_eq!(caveats[1]["cid"], "3rd party caveat");
        assert_eq!(caveats[1]["cl"], "remote.com");
        assert!(caveats[1]["vid"].is_string());

        let decoded = Macaroon::from_json(&json).unwrap();
        assert_eq!(decoded.caveat_bytes(), m.caveat_bytes());
        assert_eq!(decoded, m);
    }

    #[test]
    fn test_per_caveat_keeps_empty_third_party_location() {
        let mut m = Macaroon::new(b"secret", "some id", "").unwrap();
        m.add_third_party_caveat(b"key", "cav", "").unwrap();

        let json = m.to_json(&EncodingConfig::per_caveat()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["caveats"][0]["cl"], "");

        let decoded = Macaroon::from_json(&json).unwrap();
        assert_eq!(decoded.caveat_bytes(), m.caveat_bytes());
    }

    #[test]
    fn test_serde_impls_use_compact_form() {
        let m = sample();
        let value = serde_json::to_value(&m).unwrap();
        assert!(value["caveats"].is_string());

        let decoded: Macaroon = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn test_slice_json_round_trip() {
        let primary = sample();
        let mut discharge =
            Macaroon::new(b"shared root key", "3rd party caveat", "remote.com").unwrap();
        discharge.bind(&primary.signature());
        let slice = Slice::new(vec![primary, discharge]);

        for config in [EncodingConfig::default(), EncodingConfig::per_caveat()] {
            let json = slice.to_json(&config).unwrap();
            let decoded = Slice::from_json(&json).unwrap();
            assert_eq!(decoded, slice, "{config:?}");
        }
    }

    #[test]
    fn test_non_utf8_fields_are_rejected() {
        let m = Macaroon::new(b"secret", [0xffu8, 0xfe], "").unwrap();
        let err = m.to_json(&EncodingConfig::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "json error: macaroon identifier is not valid UTF-8"
        );

        let mut m = Macaroon::new(b"secret", "some id", "").unwrap();
        m.add_first_party_caveat([0xc3u8, 0x28]).unwrap();
        // compact form carries raw bytes
        assert!(m.to_json(&EncodingConfig::default()).is_ok());
        let err = m.to_json(&EncodingConfig::per_caveat()).unwrap_err();
        assert!(matches!(err, MacaroonError::Json { .. }));
    }

    #[test]
    fn test_bad_json_inputs() {
        let m = Macaroon::new(b"secret", "some id", "").unwrap();
        let json = m.to_json(&EncodingConfig::default()).unwrap();

        let mut value: Value = serde_json::from_str(&json).unwrap();
        value["signature"] = Value::from("not hex");
        let err = Macaroon::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, MacaroonError::Hex(_)));

        let mut value: Value = serde_json::from_str(&json).unwrap();
        value["signature"] = Value::from(hex::encode([1u8; 20]));
        let err = Macaroon::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(
            err,
            MacaroonError::InvalidSignatureLength { actual: 20, .. }
        ));

        let mut value: Value = serde_json::from_str(&json).unwrap();
        value["signature"] = Value::from("");
        let err = Macaroon::from_json(&value.to_string()).unwrap_err();
        assert!(
            matches!(
                err,
                MacaroonError::InvalidSignatureLength {
                    expected: SIGNATURE_LEN,
                    actual: 0
                }
            ),
            "{err:?}"
        );

        let err = Macaroon::from_json("{\"location\": 1}").unwrap_err();
        assert!(matches!(err, MacaroonError::Json { .. }));
    }
}
