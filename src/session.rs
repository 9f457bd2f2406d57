//! Per-connection session state.

use crate::resp::ProtoVer;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    List,
    SortedSet,
    Stream,
}

#[derive(Debug, Clone)]
pub struct BlockState {
    pub kind: BlockKind,
    pub keys: Vec<Vec<u8>>,
    pub deadline_ms: Option<u64>,
    pub original_args: Vec<Vec<u8>>,
}

#[derive(Debug, Default, Clone)]
pub struct TxState {
    pub active: bool,
    pub dirty: bool,
    pub queue: Vec<Vec<Vec<u8>>>,
    pub watched: HashMap<(usize, Vec<u8>), u64>,
}

pub struct Session {
    pub id: u64,
    pub proto: ProtoVer,
    pub db_index: usize,
    pub tx: TxState,
    pub authenticated: bool,
    pub asking: bool,
    pub is_replica: bool,
    pub replica_ack_offset: u64,
    pub block: Option<BlockState>,
    pub name: Option<String>,
}

impl Session {
    pub fn new(id: u64, needs_auth: bool) -> Session {
        Session {
            id,
            proto: ProtoVer::Resp2,
            db_index: 0,
            tx: TxState::default(),
            authenticated: !needs_auth,
            asking: false,
            is_replica: false,
            replica_ack_offset: 0,
            block: None,
            name: None,
        }
    }

    pub fn begin_multi(&mut self) {
        self.tx.active = true;
        self.tx.dirty = false;
        self.tx.queue.clear();
    }

    pub fn discard_multi(&mut self) {
        self.tx = TxState::default();
    }

    pub fn watch(&mut self, db_index: usize, key: Vec<u8>, digest: u64) {
        self.tx.watched.insert((db_index, key), digest);
    }

    pub fn unwatch(&mut self) {
        self.tx.watched.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_requires_auth_when_configured() {
        let s = Session::new(1, true);
        assert!(!s.authenticated);
        let s2 = Session::new(2, false);
        assert!(s2.authenticated);
    }

    #[test]
    fn begin_multi_resets_queue() {
        let mut s = Session::new(1, false);
        s.tx.queue.push(vec![b"GET".to_vec()]);
        s.begin_multi();
        assert!(s.tx.queue.is_empty());
        assert!(s.tx.active);
    }
}
