//! Inspection of macaroons without verification
//!
//! Useful for debugging and for clients deciding which discharges to fetch.
//! Nothing here checks a signature, so the output must not be trusted for
//! authorization.

use std::fmt;

use macaroon_core::MacaroonError;
use tracing::debug;

use crate::marshal::Slice;
use crate::mint::Macaroon;

/// Whether a caveat is checked locally or discharged by a third party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaveatKind {
    FirstParty,
    ThirdParty,
}

impl fmt::Display for CaveatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaveatKind::FirstParty => write!(f, "first-party"),
            CaveatKind::ThirdParty => write!(f, "third-party"),
        }
    }
}

/// One caveat as seen by [`inspect_macaroon`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaveatSummary {
    pub kind: CaveatKind,
    /// Caveat identifier as lossy text
    pub id: String,
    /// Location hint, `None` when the caveat carries no location packet
    pub location: Option<String>,
}

/// Result of inspecting a macaroon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectResult {
    pub location: String,
    pub identifier: String,
    pub caveats: Vec<CaveatSummary>,
    /// Identifiers of the discharge macaroons needed to satisfy the
    /// third-party caveats, in caveat order
    pub required_discharges: Vec<String>,
    /// Hex-encoded signature
    pub signature: String,
}

/// Summarizes a macaroon's contents.
pub fn inspect_macaroon(m: &Macaroon) -> InspectResult {
    let caveats: Vec<CaveatSummary> = m
        .caveats
        .iter()
        .map(|packets| {
            let caveat = m.caveat_view(packets);
            CaveatSummary {
                kind: if caveat.is_third_party() {
                    CaveatKind::ThirdParty
                } else {
                    CaveatKind::FirstParty
                },
                id: caveat.condition().into_owned(),
                location: (!packets.location.is_empty())
                    .then(|| String::from_utf8_lossy(caveat.location()).into_owned()),
            }
        })
        .collect();

    let required_discharges = caveats
        .iter()
        .filter(|c| c.kind == CaveatKind::ThirdParty)
        .map(|c| c.id.clone())
        .collect();

    InspectResult {
        location: String::from_utf8_lossy(m.location()).into_owned(),
        identifier: m.id_str().into_owned(),
        caveats,
        required_discharges,
        signature: hex::encode(m.signature()),
    }
}

/// Decodes a base64 slice token and inspects every macaroon in it, primary
/// first.
pub fn inspect_token(token: &str) -> Result<Vec<InspectResult>, MacaroonError> {
    let slice = Slice::from_base64(token)?;
    debug!(count = slice.len(), "inspecting macaroon token");
    Ok(slice.iter().map(inspect_macaroon).collect())
}
