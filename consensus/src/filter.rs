//! Admission filters: what has to hold before the manager creates a reactor.

use crate::error::ConsensusError;
use crate::observation::{Observation, SignedAttestation};
use crate::storage::ConsensusStorage;
use crate::verify::verify_attestation;
use std::sync::Arc;
use warden_types::{Digest, ParticipantSet};

/// Everything known about a digest at creation time.
pub struct AdmissionRequest<'a> {
    pub digest: &'a Digest,
    pub message_id: &'a str,
    /// Set only when creation is triggered by a foreign attestation.
    pub attestation: Option<&'a SignedAttestation>,
    pub participants: &'a ParticipantSet,
}

/// Decides whether a new reactor may be created for a digest. Filters run in
/// order; the first refusal wins and is reported to the caller.
pub trait AdmissionFilter<O: Observation>: Send + Sync {
    fn name(&self) -> &'static str;

    fn admit(&self, request: &AdmissionRequest<'_>) -> Result<(), ConsensusError>;
}

/// Refuses digests whose message id is already present in storage, so a
/// finalized round cannot be re-run after its reactor was evicted.
pub struct DedupFilter<O: Observation> {
    storage: Arc<dyn ConsensusStorage<O>>,
}

impl<O: Observation> DedupFilter<O> {
    pub fn new(storage: Arc<dyn ConsensusStorage<O>>) -> Self {
        Self { storage }
    }
}

impl<O: Observation> AdmissionFilter<O> for DedupFilter<O> {
    fn name(&self) -> &'static str {
        "dedup"
    }

    fn admit(&self, request: &AdmissionRequest<'_>) -> Result<(), ConsensusError> {
        match self.storage.lookup(request.message_id) {
            Ok(Some(_)) => Err(ConsensusError::CreationRefused {
                filter: self.name(),
                reason: format!("message {} already concluded", request.message_id),
            }),
            Ok(None) => Ok(()),
            // A read failure must not stall consensus; the reactor itself
            // stays correct either way.
            Err(e) => {
                tracing::warn!(
                    message_id = request.message_id,
                    error = %e,
                    "dedup lookup failed, admitting digest"
                );
                Ok(())
            }
        }
    }
}

/// Refuses foreign-triggered creations whose attestation does not verify, so
/// unverifiable gossip cannot mint reactors. Local observations pass through.
pub struct SignatureFilter;

impl<O: Observation> AdmissionFilter<O> for SignatureFilter {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn admit(&self, request: &AdmissionRequest<'_>) -> Result<(), ConsensusError> {
        let Some(attestation) = request.attestation else {
            return Ok(());
        };
        verify_attestation(attestation, request.participants).map_err(|reason| {
            ConsensusError::CreationRefused {
                filter: "signature",
                reason: reason.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use warden_crypto::{keccak256, sign_digest, SecretKey};
    use warden_types::Signature;

    #[derive(Clone, Debug)]
    struct Obs(u64);

    impl Observation for Obs {
        fn message_id(&self) -> String {
            format!("filter/{}", self.0)
        }
        fn signing_digest(&self) -> Digest {
            Digest::new(keccak256(&self.0.to_be_bytes()))
        }
    }

    fn request<'a>(
        digest: &'a Digest,
        message_id: &'a str,
        attestation: Option<&'a SignedAttestation>,
        participants: &'a ParticipantSet,
    ) -> AdmissionRequest<'a> {
        AdmissionRequest {
            digest,
            message_id,
            attestation,
            participants,
        }
    }

    #[test]
    fn dedup_refuses_stored_message() {
        let storage = Arc::new(MemoryStorage::new());
        storage.store(&Obs(1), &[]).unwrap();
        let filter = DedupFilter::new(storage.clone() as Arc<dyn ConsensusStorage<Obs>>);

        let set = ParticipantSet::new(vec![], 0);
        let digest = Obs(1).signing_digest();
        assert!(filter
            .admit(&request(&digest, "filter/1", None, &set))
            .is_err());
        assert!(filter
            .admit(&request(&digest, "filter/2", None, &set))
            .is_ok());
    }

    #[test]
    fn signature_filter_checks_foreign_trigger() {
        let key = SecretKey::random();
        let set = ParticipantSet::new(vec![key.address()], 0);
        let digest = Obs(3).signing_digest();

        let good = SignedAttestation {
            addr: key.address(),
            digest,
            signature: sign_digest(&key, &digest).unwrap(),
            message_id: "filter/3".into(),
            tx_metadata: vec![],
        };
        let mut bad = good.clone();
        bad.signature = Signature([0x11; 65]);

        let filter = SignatureFilter;
        assert!(AdmissionFilter::<Obs>::admit(
            &filter,
            &request(&digest, "filter/3", Some(&good), &set)
        )
        .is_ok());
        assert!(AdmissionFilter::<Obs>::admit(
            &filter,
            &request(&digest, "filter/3", Some(&bad), &set)
        )
        .is_err());
        // Locally triggered creation carries no attestation to check.
        assert!(
            AdmissionFilter::<Obs>::admit(&filter, &request(&digest, "filter/3", None, &set))
                .is_ok()
        );
    }
}
