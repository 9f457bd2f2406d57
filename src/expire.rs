//! Expiry scheduler (component F): lazy-on-touch is implemented in
//! `db::Database`; this module is the bounded active sweep, grounded on
//! `handler::server_cron`'s "bounded work per tick" shape.

use crate::db::Keyspace;

pub const ACTIVE_SWEEP_HZ: u64 = 10;
pub const SAMPLES_PER_TICK: usize = 64;

/// Runs one active-expiry sweep across every database. Returns the keys
/// removed per database index, so the caller can append synthetic `DEL`
/// replication events.
pub fn sweep(keyspace: &mut Keyspace, now_ms: u64) -> Vec<(usize, Vec<Vec<u8>>)> {
    let mut removed = Vec::new();
    for (idx, db) in keyspace.dbs.iter_mut().enumerate() {
        let candidates: Vec<Vec<u8>> = db
            .dict
            .iter()
            .filter(|(_, e)| e.expire_at_ms.is_some())
            .take(SAMPLES_PER_TICK)
            .map(|(k, _)| k.clone())
            .collect();
        let mut expired_here = Vec::new();
        for key in candidates {
            if db.expire_if_needed(&key, now_ms) {
                expired_here.push(key);
            }
        }
        if !expired_here.is_empty() {
            removed.push((idx, expired_here));
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Entry, Value};

    #[test]
    fn sweep_removes_expired_keys_and_reports_them() {
        let mut ks = Keyspace::new(1);
        ks.db(0).set(
            b"k".to_vec(),
            Entry { value: Value::String(b"v".to_vec()), expire_at_ms: Some(5) },
        );
        ks.db(0).set(b"live".to_vec(), Entry::new(Value::String(b"v".to_vec())));
        let removed = sweep(&mut ks, 10);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].1, vec![b"k".to_vec()]);
        assert_eq!(ks.db(0).len(), 1);
    }

    #[test]
    fn sweep_is_bounded_per_tick() {
        let mut ks = Keyspace::new(1);
        for i in 0..200 {
            ks.db(0).set(
                format!("k{}", i).into_bytes(),
                Entry { value: Value::String(b"v".to_vec()), expire_at_ms: Some(1) },
            );
        }
        let removed = sweep(&mut ks, 100);
        assert!(removed[0].1.len() <= SAMPLES_PER_TICK);
    }
}
