//! Polymorphic keyspace value: a tagged sum type, one variant per
//! Redis data type, including Hash and Stream.

use crate::skiplist::SkipList;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

pub type Bytes = Vec<u8>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };

    pub fn parse(s: &str) -> Option<StreamId> {
        if s == "-" {
            return Some(StreamId { ms: 0, seq: 0 });
        }
        if s == "+" {
            return Some(StreamId { ms: u64::MAX, seq: u64::MAX });
        }
        let mut parts = s.splitn(2, '-');
        let ms: u64 = parts.next()?.parse().ok()?;
        let seq: u64 = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        Some(StreamId { ms, seq })
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingEntry {
    pub consumer: Bytes,
    pub delivery_time_ms: u64,
    pub delivery_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerGroup {
    pub last_delivered_id: StreamId,
    pub pending: BTreeMap<StreamId, PendingEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stream {
    pub entries: BTreeMap<StreamId, Vec<(Bytes, Bytes)>>,
    pub last_id: StreamId,
    pub max_deleted_id: StreamId,
    pub entries_added: u64,
    pub groups: HashMap<Bytes, ConsumerGroup>,
}

/// Ordered-by-insertion sorted set: a hash index for O(1) score lookup
/// paired with the skiplist for ordered/range access.
#[derive(Debug, Default)]
pub struct SortedSet {
    pub scores: HashMap<Bytes, f64>,
    pub order: SkipList,
}

impl Clone for SortedSet {
    fn clone(&self) -> Self {
        let mut s = SortedSet::default();
        for (m, sc) in &self.scores {
            s.insert(m.clone(), *sc);
        }
        s
    }
}

impl PartialEq for SortedSet {
    fn eq(&self, other: &Self) -> bool {
        self.scores == other.scores
    }
}

impl SortedSet {
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        if let Some(old) = self.scores.get(&member) {
            self.order.delete(*old, &member);
        }
        let is_new = !self.scores.contains_key(&member);
        self.scores.insert(member.clone(), score);
        self.order.insert(score, member);
        is_new
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        if let Some(score) = self.scores.remove(member) {
            self.order.delete(score, member);
            true
        } else {
            false
        }
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Bytes),
    Hash(HashMap<Bytes, Bytes>),
    List(VecDeque<Bytes>),
    Set(HashSet<Bytes>),
    SortedSet(SortedSet),
    Stream(Stream),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Hash(_) => "hash",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::SortedSet(_) => "zset",
            Value::Stream(_) => "stream",
        }
    }

    /// Name reported by `OBJECT ENCODING`.
    pub fn encoding_name(&self) -> &'static str {
        match self {
            Value::String(s) => {
                if s.len() <= 20 && std::str::from_utf8(s).ok().and_then(|t| t.parse::<i64>().ok()).is_some() {
                    "int"
                } else if s.len() <= 44 {
                    "embstr"
                } else {
                    "raw"
                }
            }
            Value::Hash(h) => {
                if h.len() <= 128 {
                    "listpack"
                } else {
                    "hashtable"
                }
            }
            Value::List(l) => {
                if l.len() <= 128 {
                    "listpack"
                } else {
                    "quicklist"
                }
            }
            Value::Set(s) => {
                if s.iter().all(|m| std::str::from_utf8(m).ok().and_then(|t| t.parse::<i64>().ok()).is_some()) && s.len() <= 512 {
                    "intset"
                } else if s.len() <= 128 {
                    "listpack"
                } else {
                    "hashtable"
                }
            }
            Value::SortedSet(z) => {
                if z.len() <= 128 {
                    "listpack"
                } else {
                    "skiplist"
                }
            }
            Value::Stream(_) => "stream",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Value,
    pub expire_at_ms: Option<u64>,
}

impl Entry {
    pub fn new(value: Value) -> Entry {
        Entry { value, expire_at_ms: None }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expire_at_ms, Some(t) if t <= now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_set_insert_updates_rank() {
        let mut z = SortedSet::default();
        z.insert(b"a".to_vec(), 1.0);
        z.insert(b"b".to_vec(), 2.0);
        z.insert(b"a".to_vec(), 3.0);
        assert_eq!(z.score(b"a"), Some(3.0));
        assert_eq!(z.len(), 2);
    }

    #[test]
    fn stream_id_parses_ranges() {
        assert_eq!(StreamId::parse("5-1"), Some(StreamId { ms: 5, seq: 1 }));
        assert_eq!(StreamId::parse("5"), Some(StreamId { ms: 5, seq: 0 }));
        assert_eq!(StreamId::parse("-"), Some(StreamId { ms: 0, seq: 0 }));
    }

    #[test]
    fn entry_expiry_boundary() {
        let mut e = Entry::new(Value::String(b"v".to_vec()));
        e.expire_at_ms = Some(100);
        assert!(e.is_expired(100));
        assert!(!e.is_expired(99));
    }

    #[test]
    fn encoding_name_for_small_int_string() {
        let v = Value::String(b"123".to_vec());
        assert_eq!(v.encoding_name(), "int");
    }
}
