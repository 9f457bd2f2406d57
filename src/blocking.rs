//! Blocking-client arbiter (component G): parks sessions whose blocking
//! command found no data, and retries them on every dispatcher tick.
//! Grounded on `server.rs`'s `blpop_blocked_clients` counter and
//! `RedisDB::blocking_keys`, built out into a full wake registry.

use crate::session::BlockState;
use std::collections::VecDeque;

pub struct Parked {
    pub session_id: u64,
    pub state: BlockState,
}

#[derive(Default)]
pub struct BlockingArbiter {
    waiters: VecDeque<Parked>,
}

impl BlockingArbiter {
    pub fn new() -> BlockingArbiter {
        BlockingArbiter { waiters: VecDeque::new() }
    }

    pub fn park(&mut self, session_id: u64, state: BlockState) {
        self.waiters.push_back(Parked { session_id, state });
    }

    pub fn cancel(&mut self, session_id: u64) {
        self.waiters.retain(|p| p.session_id != session_id);
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Returns (and removes) the first parked session touching `key`,
    /// in FIFO insertion order.
    pub fn take_waiter_for_key(&mut self, key: &[u8]) -> Option<Parked> {
        let pos = self.waiters.iter().position(|p| p.state.keys.iter().any(|k| k == key))?;
        self.waiters.remove(pos)
    }

    /// Returns session ids whose deadline has elapsed as of `now_ms`,
    /// removing them from the registry.
    pub fn take_expired(&mut self, now_ms: u64) -> Vec<Parked> {
        let mut expired = Vec::new();
        let mut remaining = VecDeque::new();
        while let Some(p) = self.waiters.pop_front() {
            if matches!(p.state.deadline_ms, Some(d) if d <= now_ms) {
                expired.push(p);
            } else {
                remaining.push_back(p);
            }
        }
        self.waiters = remaining;
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::BlockKind;

    fn state(keys: &[&[u8]], deadline: Option<u64>) -> BlockState {
        BlockState {
            kind: BlockKind::List,
            keys: keys.iter().map(|k| k.to_vec()).collect(),
            deadline_ms: deadline,
            original_args: Vec::new(),
        }
    }

    #[test]
    fn fifo_wake_order_per_key() {
        let mut arb = BlockingArbiter::new();
        arb.park(1, state(&[b"k"], None));
        arb.park(2, state(&[b"k"], None));
        let first = arb.take_waiter_for_key(b"k").unwrap();
        assert_eq!(first.session_id, 1);
        let second = arb.take_waiter_for_key(b"k").unwrap();
        assert_eq!(second.session_id, 2);
    }

    #[test]
    fn expired_waiters_are_collected() {
        let mut arb = BlockingArbiter::new();
        arb.park(1, state(&[b"k"], Some(100)));
        arb.park(2, state(&[b"k"], Some(1000)));
        let expired = arb.take_expired(500);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].session_id, 1);
        assert_eq!(arb.len(), 1);
    }

    #[test]
    fn cancel_removes_session_regardless_of_key() {
        let mut arb = BlockingArbiter::new();
        arb.park(1, state(&[b"k"], None));
        arb.cancel(1);
        assert_eq!(arb.len(), 0);
    }
}
