//! Persistence seam for quorum results.

use crate::error::StorageError;
use crate::observation::{IndexedSignature, Observation};
use std::collections::HashMap;
use std::sync::Mutex;

/// Stores observations that reached quorum, keyed by message id.
///
/// Doubles as the manager's duplicate-protection record: a message id that
/// [`lookup`](ConsensusStorage::lookup) resolves will not get a new reactor.
pub trait ConsensusStorage<O: Observation>: Send + Sync {
    /// Persist an observation with the signatures collected so far. Called at
    /// quorum and again at finalization; the later write supersedes.
    fn store(&self, observation: &O, signatures: &[IndexedSignature])
        -> Result<(), StorageError>;

    /// Fetch a previously stored observation by message id.
    fn lookup(&self, message_id: &str)
        -> Result<Option<(O, Vec<IndexedSignature>)>, StorageError>;
}

/// Map-backed storage for tests and single-process deployments.
pub struct MemoryStorage<O: Observation> {
    entries: Mutex<HashMap<String, (O, Vec<IndexedSignature>)>>,
}

impl<O: Observation> MemoryStorage<O> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(message_id)
    }
}

impl<O: Observation> Default for MemoryStorage<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Observation> ConsensusStorage<O> for MemoryStorage<O> {
    fn store(
        &self,
        observation: &O,
        signatures: &[IndexedSignature],
    ) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                observation.message_id(),
                (observation.clone(), signatures.to_vec()),
            );
        Ok(())
    }

    fn lookup(
        &self,
        message_id: &str,
    ) -> Result<Option<(O, Vec<IndexedSignature>)>, StorageError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(message_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::{Digest, Signature};

    #[derive(Clone, Debug)]
    struct Obs(String);

    impl Observation for Obs {
        fn message_id(&self) -> String {
            self.0.clone()
        }
        fn signing_digest(&self) -> Digest {
            Digest::ZERO
        }
    }

    #[test]
    fn store_then_lookup() {
        let storage = MemoryStorage::new();
        let sigs = vec![IndexedSignature {
            index: 2,
            signature: Signature([1u8; 65]),
        }];
        storage.store(&Obs("a/1".into()), &sigs).unwrap();

        let (obs, stored) = storage.lookup("a/1").unwrap().unwrap();
        assert_eq!(obs.0, "a/1");
        assert_eq!(stored, sigs);
        assert!(storage.lookup("a/2").unwrap().is_none());
    }

    #[test]
    fn later_store_supersedes() {
        let storage = MemoryStorage::new();
        let obs = Obs("a/1".into());
        storage.store(&obs, &[]).unwrap();
        let sigs = vec![IndexedSignature {
            index: 0,
            signature: Signature([2u8; 65]),
        }];
        storage.store(&obs, &sigs).unwrap();

        assert_eq!(storage.len(), 1);
        let (_, stored) = storage.lookup("a/1").unwrap().unwrap();
        assert_eq!(stored, sigs);
    }
}
