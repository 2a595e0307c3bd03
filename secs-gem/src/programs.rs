//! Process program storage (stream 7)

use crate::ack::{AckC7, PpGnt};
use secs_core::{GemId, SecsError, SecsResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Decides a program sent by the host (S7F3); only `Accepted` lets the
/// store keep it
pub type ProgramUploadHandler = Arc<dyn Fn(&GemId, &[u8]) -> AckC7 + Send + Sync>;

/// Serves S7F5 in place of the store; `None` denies the request
pub type ProgramRequestHandler = Arc<dyn Fn(&GemId) -> Option<Vec<u8>> + Send + Sync>;

/// In-memory process program store keyed by PPID
#[derive(Debug, Clone, Default)]
pub struct ProgramStore {
    programs: BTreeMap<GemId, Vec<u8>>,
    max_size: Option<usize>,
}

impl ProgramStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            programs: BTreeMap::new(),
            max_size: Some(max_size),
        }
    }

    /// Store a program, replacing any previous body
    pub fn store(&mut self, id: GemId, body: Vec<u8>) -> SecsResult<()> {
        if let Some(limit) = self.max_size.filter(|max| body.len() > *max) {
            return Err(SecsError::ProgramTooLarge {
                id: id.to_string(),
                size: body.len(),
                limit,
            });
        }
        self.programs.insert(id, body);
        Ok(())
    }

    pub fn load(&self, id: &GemId) -> SecsResult<&[u8]> {
        self.programs
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| SecsError::UnknownProgram(id.to_string()))
    }

    /// Delete the given programs, or all of them when `ids` is empty.
    ///
    /// Nothing is deleted if any id is unknown.
    pub fn delete(&mut self, ids: &[GemId]) -> SecsResult<()> {
        if ids.is_empty() {
            self.programs.clear();
            return Ok(());
        }
        if let Some(missing) = ids.iter().find(|id| !self.programs.contains_key(*id)) {
            return Err(SecsError::UnknownProgram(missing.to_string()));
        }
        for id in ids {
            self.programs.remove(id);
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<GemId> {
        self.programs.keys().cloned().collect()
    }

    /// Answer to a load inquire (S7F1)
    pub fn grant(&self, length: usize) -> PpGnt {
        match self.max_size {
            Some(max) if length > max => PpGnt::NoSpace,
            _ => PpGnt::Granted,
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_load_overwrite() {
        let mut store = ProgramStore::new();
        let id = GemId::from("SAMPLE");
        store.store(id.clone(), b"GDSCRIPT-001".to_vec()).unwrap();
        assert_eq!(store.load(&id).unwrap(), b"GDSCRIPT-001");
        store.store(id.clone(), b"GDSCRIPT-002".to_vec()).unwrap();
        assert_eq!(store.load(&id).unwrap(), b"GDSCRIPT-002");
        assert!(matches!(
            store.load(&GemId::from("MISSING")),
            Err(SecsError::UnknownProgram(_))
        ));
    }

    #[test]
    fn test_delete_is_all_or_nothing() {
        let mut store = ProgramStore::new();
        store.store(GemId::from("A"), vec![1]).unwrap();
        store.store(GemId::from("B"), vec![2]).unwrap();
        assert!(store.delete(&[GemId::from("A"), GemId::from("C")]).is_err());
        assert_eq!(store.len(), 2);
        store.delete(&[GemId::from("A")]).unwrap();
        assert_eq!(store.list(), vec![GemId::from("B")]);
        store.delete(&[]).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_size_limit() {
        let mut store = ProgramStore::with_max_size(4);
        assert_eq!(store.grant(4), PpGnt::Granted);
        assert_eq!(store.grant(5), PpGnt::NoSpace);
        assert!(matches!(
            store.store(GemId::from("BIG"), vec![0; 5]),
            Err(SecsError::ProgramTooLarge { size: 5, limit: 4, .. })
        ));
    }
}
