use macaroon_core::crypto::{
    Signature, bind_for_request, chain_caveat, keyed_hash, open_verification_id, signatures_equal,
};
use macaroon_core::{BoxError, MacaroonError};
use tracing::{debug, warn};

use crate::mint::{Caveat, Macaroon};

/// Builder for verifying a macaroon together with its discharges.
///
/// # Example
/// ```rust
/// use macaroon_token::{Macaroon, MacaroonVerifier};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut primary = Macaroon::new(b"root key", "root-id", "")?;
/// primary.add_third_party_caveat(b"bob key", "bob-is-great", "bob")?;
///
/// let mut discharge = Macaroon::new(b"bob key", "bob-is-great", "bob")?;
/// discharge.add_first_party_caveat("splendid")?;
/// discharge.bind(&primary.signature());
///
/// MacaroonVerifier::new(&primary, b"root key")
///     .with_discharges(std::slice::from_ref(&discharge))
///     .verify(|condition: &str| {
///         if condition == "splendid" {
///             Ok(())
///         } else {
///             Err(format!("condition {condition:?} not met").into())
///         }
///     })?;
/// # Ok(())
/// # }
/// ```
pub struct MacaroonVerifier<'a> {
    primary: &'a Macaroon,
    root_key: &'a [u8],
    discharges: &'a [Macaroon],
}

impl<'a> MacaroonVerifier<'a> {
    /// Creates a verifier for `primary` minted with `root_key`.
    pub fn new(primary: &'a Macaroon, root_key: &'a [u8]) -> Self {
        Self {
            primary,
            root_key,
            discharges: &[],
        }
    }

    /// Supplies discharge macaroons for third-party caveats.
    ///
    /// Each discharge must already be bound to the primary's signature, and
    /// every one must be consumed by exactly one caveat.
    pub fn with_discharges(mut self, discharges: &'a [Macaroon]) -> Self {
        self.discharges = discharges;
        self
    }

    /// Performs the verification.
    ///
    /// `checker` is called with the text of each first-party caveat reached.
    /// An error it returns ends verification and is surfaced unchanged as
    /// [`MacaroonError::Condition`].
    ///
    /// # Returns
    /// * `Ok(())` - If the signature chain holds, every first-party caveat was
    ///   accepted and every discharge was used exactly once
    /// * `Err(MacaroonError)` - The first failure encountered
    pub fn verify<F>(self, checker: F) -> Result<(), MacaroonError>
    where
        F: FnMut(&str) -> Result<(), BoxError>,
    {
        let mut state = Verification {
            checker,
            discharges: self.discharges,
            used: vec![false; self.discharges.len()],
        };
        let root_sig = self.primary.signature();
        state.verify_chain(self.primary, &root_sig, self.root_key)?;

        if let Some(unused) = state.used.iter().position(|used| !used) {
            return Err(MacaroonError::DischargeNotUsed {
                id: self.discharges[unused].id_str().into_owned(),
            });
        }
        debug!(
            id = %self.primary.id_str(),
            discharges = self.discharges.len(),
            "macaroon verified"
        );
        Ok(())
    }
}

struct Verification<'a, F> {
    checker: F,
    discharges: &'a [Macaroon],
    used: Vec<bool>,
}

/// A macaroon whose signature chain is partway replayed.
struct Frame<'a> {
    macaroon: &'a Macaroon,
    caveat_sig: Signature,
    next_caveat: usize,
}

impl<'a> Frame<'a> {
    fn new(macaroon: &'a Macaroon, key: &[u8]) -> Self {
        Self {
            macaroon,
            caveat_sig: keyed_hash(key, macaroon.id()),
            next_caveat: 0,
        }
    }
}

impl<'a, F> Verification<'a, F>
where
    F: FnMut(&str) -> Result<(), BoxError>,
{
    /// Replays the signature chain of `primary` from `key` and of every
    /// discharge reached from it, depth first. Every macaroon is bound
    /// against the primary's signature `root_sig`.
    ///
    /// Discharges are walked with an explicit stack; its depth is bounded by
    /// the number of discharges since each is consumed at most once.
    fn verify_chain(
        &mut self,
        primary: &'a Macaroon,
        root_sig: &Signature,
        key: &[u8],
    ) -> Result<(), MacaroonError> {
        let mut stack = vec![Frame::new(primary, key)];

        while let Some(frame) = stack.last_mut() {
            let m = frame.macaroon;
            let Some(packets) = m.caveats.get(frame.next_caveat) else {
                let bound_sig = bind_for_request(root_sig, &frame.caveat_sig);
                if !signatures_equal(&bound_sig, &m.signature()) {
                    warn!(id = %m.id_str(), "macaroon signature verification failed");
                    return Err(MacaroonError::SignatureMismatch);
                }
                stack.pop();
                continue;
            };
            frame.next_caveat += 1;

            let caveat = m.caveat_view(packets);
            let child = if caveat.is_third_party() {
                let discharge = self.claim_discharge(&caveat)?;
                let discharge_key =
                    open_verification_id(&frame.caveat_sig, caveat.verification_id())?;
                Some(Frame::new(discharge, &discharge_key))
            } else {
                (self.checker)(&caveat.condition()).map_err(MacaroonError::Condition)?;
                None
            };
            frame.caveat_sig =
                chain_caveat(&frame.caveat_sig, caveat.verification_id(), caveat.id());

            if let Some(child) = child {
                stack.push(child);
            }
        }
        Ok(())
    }

    /// Marks the first discharge carrying the caveat's identifier as used.
    fn claim_discharge(&mut self, caveat: &Caveat<'_>) -> Result<&'a Macaroon, MacaroonError> {
        let discharges = self.discharges;
        let index = discharges
            .iter()
            .position(|d| d.id() == caveat.id())
            .ok_or_else(|| MacaroonError::DischargeNotFound {
                caveat_id: caveat.condition().into_owned(),
            })?;
        if self.used[index] {
            return Err(MacaroonError::DischargeUsedTwice {
                id: discharges[index].id_str().into_owned(),
            });
        }
        self.used[index] = true;
        debug!(caveat = %caveat.condition(), index, "resolving discharge macaroon");
        Ok(&discharges[index])
    }
}

impl Macaroon {
    /// Verifies this macaroon as the primary of a request.
    ///
    /// # Arguments
    /// * `root_key` - The key the macaroon was minted with
    /// * `checker` - Called for each first-party caveat reached
    /// * `discharges` - Bound discharge macaroons for third-party caveats
    pub fn verify<F>(
        &self,
        root_key: &[u8],
        checker: F,
        discharges: &[Macaroon],
    ) -> Result<(), MacaroonError>
    where
        F: FnMut(&str) -> Result<(), BoxError>,
    {
        MacaroonVerifier::new(self, root_key)
            .with_discharges(discharges)
            .verify(checker)
    }

    /// Verifies only the signature chain of a macaroon with no caveats to
    /// satisfy. Any first-party caveat is rejected and any third-party
    /// caveat fails for lack of a discharge.
    pub fn verify_signature(&self, root_key: &[u8]) -> Result<(), MacaroonError> {
        self.verify(
            root_key,
            |condition: &str| Err(format!("no checker for caveat {condition:?}").into()),
            &[],
        )
    }
}
