//! Attestation verification: recover, match, check membership.

use crate::observation::SignedAttestation;
use warden_crypto::recover_address;
use warden_types::ParticipantSet;

/// Why an attestation was rejected. Used as a metrics label, so variants map
/// to short static strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The signature did not yield a recoverable public key.
    InvalidSignature,
    /// The recovered address differs from the claimed one.
    AddressMismatch,
    /// The recovered address is not in the participant set.
    UnknownParticipant,
    /// A signature from this participant was already collected.
    Duplicate,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::AddressMismatch => "address_mismatch",
            RejectReason::UnknownParticipant => "unknown_participant",
            RejectReason::Duplicate => "duplicate",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verify a signed attestation against a participant set.
///
/// Checks, in order: the signature recovers to a public key, the recovered
/// address equals the claimed `addr`, and that address is a member of
/// `participants`. The claimed address is never trusted; only the recovered
/// one counts.
pub fn verify_attestation(
    attestation: &SignedAttestation,
    participants: &ParticipantSet,
) -> Result<(), RejectReason> {
    let recovered = recover_address(&attestation.digest, &attestation.signature)
        .map_err(|_| RejectReason::InvalidSignature)?;

    if recovered != attestation.addr {
        return Err(RejectReason::AddressMismatch);
    }
    if !participants.contains(&recovered) {
        return Err(RejectReason::UnknownParticipant);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_crypto::{keccak256, sign_digest, SecretKey};
    use warden_types::{Digest, Signature};

    fn setup() -> (Vec<SecretKey>, ParticipantSet, Digest) {
        let keys: Vec<SecretKey> = (0..3).map(|_| SecretKey::random()).collect();
        let set = ParticipantSet::new(keys.iter().map(|k| k.address()).collect(), 0);
        let digest = Digest::new(keccak256(b"verify tests"));
        (keys, set, digest)
    }

    fn attest(key: &SecretKey, digest: Digest) -> SignedAttestation {
        SignedAttestation {
            addr: key.address(),
            digest,
            signature: sign_digest(key, &digest).unwrap(),
            message_id: "test/1".into(),
            tx_metadata: vec![],
        }
    }

    #[test]
    fn valid_attestation_passes() {
        let (keys, set, digest) = setup();
        assert_eq!(verify_attestation(&attest(&keys[0], digest), &set), Ok(()));
    }

    #[test]
    fn garbage_signature_rejected() {
        let (keys, set, digest) = setup();
        let mut att = attest(&keys[0], digest);
        att.signature = Signature([0xFF; 65]);
        assert_eq!(
            verify_attestation(&att, &set),
            Err(RejectReason::InvalidSignature)
        );
    }

    #[test]
    fn claimed_address_must_match_recovered() {
        let (keys, set, digest) = setup();
        let mut att = attest(&keys[0], digest);
        // Signed by keys[0] but claiming to be keys[1].
        att.addr = keys[1].address();
        assert_eq!(
            verify_attestation(&att, &set),
            Err(RejectReason::AddressMismatch)
        );
    }

    #[test]
    fn non_member_rejected() {
        let (_, set, digest) = setup();
        let outsider = SecretKey::random();
        assert_eq!(
            verify_attestation(&attest(&outsider, digest), &set),
            Err(RejectReason::UnknownParticipant)
        );
    }

    #[test]
    fn signature_over_other_digest_rejected() {
        let (keys, set, digest) = setup();
        let mut att = attest(&keys[0], digest);
        att.digest = Digest::new(keccak256(b"something else"));
        // Recovery over the wrong digest yields a different address (or fails).
        assert!(verify_attestation(&att, &set).is_err());
    }
}
