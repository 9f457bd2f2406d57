//! RDB-style snapshotting (component F, persistence half). Adapted
//! from `src/rdb.rs`'s length-encoding scheme and opcode constants
//! (`REDIS_EXPIRETIME`/`REDIS_SELECTDB`/`REDIS_EOF`, the 6/14/32-bit
//! length prefix, the LZF compression marker), generalized to encode
//! the `Value` tagged union instead of `RedisObject`.

use crate::db::Keyspace;
use crate::value::{Bytes, ConsumerGroup, Entry, PendingEntry, SortedSet, Stream, StreamId, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{self, Read, Write};

const MAGIC: &[u8] = b"PEADB0001";
const OP_EXPIRETIME: u8 = 253;
const OP_SELECTDB: u8 = 254;
const OP_EOF: u8 = 255;

const LEN_6BIT: u8 = 0;
const LEN_14BIT: u8 = 1;
const LEN_32BIT: u8 = 2;

const TYPE_STRING: u8 = 0;
const TYPE_LIST: u8 = 1;
const TYPE_SET: u8 = 2;
const TYPE_ZSET: u8 = 3;
const TYPE_HASH: u8 = 4;
const TYPE_STREAM: u8 = 5;

const LZF_MIN_LEN: usize = 32;

fn write_len(out: &mut Vec<u8>, len: usize) {
    if len < (1 << 6) {
        out.push((LEN_6BIT << 6) | (len as u8));
    } else if len < (1 << 14) {
        out.push((LEN_14BIT << 6) | ((len >> 8) as u8 & 0x3f));
        out.push((len & 0xff) as u8);
    } else {
        out.push(LEN_32BIT << 6);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Reader<'a> {
        Reader { buf, pos: 0 }
    }

    fn byte(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return None;
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    fn len(&mut self) -> Option<usize> {
        let first = self.byte()?;
        match first >> 6 {
            0 => Some((first & 0x3f) as usize),
            1 => {
                let second = self.byte()?;
                Some((((first & 0x3f) as usize) << 8) | second as usize)
            }
            2 => {
                let raw = self.bytes(4)?;
                Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
            }
            _ => None,
        }
    }

    fn string(&mut self) -> Option<Bytes> {
        let compressed = self.byte()?;
        let stored_len = self.len()?;
        let raw = self.bytes(stored_len)?;
        if compressed == 1 {
            let original_len = self.len()?;
            lzf::decompress(raw, original_len).ok()
        } else {
            Some(raw.to_vec())
        }
    }

    fn u64(&mut self) -> Option<u64> {
        let raw = self.bytes(8)?;
        Some(u64::from_be_bytes(raw.try_into().ok()?))
    }
}

fn write_string(out: &mut Vec<u8>, s: &[u8]) {
    if s.len() >= LZF_MIN_LEN {
        if let Ok(compressed) = lzf::compress(s) {
            if compressed.len() < s.len() {
                out.push(1);
                write_len(out, compressed.len());
                out.extend_from_slice(&compressed);
                write_len(out, s.len());
                return;
            }
        }
    }
    out.push(0);
    write_len(out, s.len());
    out.extend_from_slice(s);
}

fn write_stream_id(out: &mut Vec<u8>, id: StreamId) {
    out.extend_from_slice(&id.ms.to_be_bytes());
    out.extend_from_slice(&id.seq.to_be_bytes());
}

fn read_stream_id(r: &mut Reader) -> Option<StreamId> {
    Some(StreamId { ms: r.u64()?, seq: r.u64()? })
}

/// Encodes a single value's body, prefixed with its type tag. Used both
/// by the snapshot writer and directly by `DUMP`/`RESTORE`, which have
/// no use for the outer `PEADB0001` framing.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        Value::String(s) => {
            out.push(TYPE_STRING);
            write_string(&mut out, s);
        }
        Value::List(items) => {
            out.push(TYPE_LIST);
            write_len(&mut out, items.len());
            for item in items {
                write_string(&mut out, item);
            }
        }
        Value::Set(members) => {
            out.push(TYPE_SET);
            write_len(&mut out, members.len());
            for m in members {
                write_string(&mut out, m);
            }
        }
        Value::SortedSet(z) => {
            out.push(TYPE_ZSET);
            write_len(&mut out, z.scores.len());
            for (m, score) in &z.scores {
                write_string(&mut out, m);
                out.extend_from_slice(&score.to_bits().to_be_bytes());
            }
        }
        Value::Hash(fields) => {
            out.push(TYPE_HASH);
            write_len(&mut out, fields.len());
            for (k, v) in fields {
                write_string(&mut out, k);
                write_string(&mut out, v);
            }
        }
        Value::Stream(stream) => {
            out.push(TYPE_STREAM);
            write_stream_id(&mut out, stream.last_id);
            write_stream_id(&mut out, stream.max_deleted_id);
            out.extend_from_slice(&stream.entries_added.to_be_bytes());
            write_len(&mut out, stream.entries.len());
            for (id, fields) in &stream.entries {
                write_stream_id(&mut out, *id);
                write_len(&mut out, fields.len());
                for (k, v) in fields {
                    write_string(&mut out, k);
                    write_string(&mut out, v);
                }
            }
            write_len(&mut out, stream.groups.len());
            for (name, group) in &stream.groups {
                write_string(&mut out, name);
                write_stream_id(&mut out, group.last_delivered_id);
                write_len(&mut out, group.pending.len());
                for (id, pending) in &group.pending {
                    write_stream_id(&mut out, *id);
                    write_string(&mut out, &pending.consumer);
                    out.extend_from_slice(&pending.delivery_time_ms.to_be_bytes());
                    out.extend_from_slice(&pending.delivery_count.to_be_bytes());
                }
            }
        }
    }
    out
}

/// Inverse of [`encode_value`]. Returns `None` on any structural
/// mismatch rather than panicking, matching `RESTORE`'s "ERR Bad data
/// format" contract.
pub fn decode_value(bytes: &[u8]) -> Option<Value> {
    let mut r = Reader::new(bytes);
    decode_value_from(&mut r)
}

fn decode_value_from(r: &mut Reader) -> Option<Value> {
    match r.byte()? {
        TYPE_STRING => Some(Value::String(r.string()?)),
        TYPE_LIST => {
            let n = r.len()?;
            let mut items = VecDeque::with_capacity(n);
            for _ in 0..n {
                items.push_back(r.string()?);
            }
            Some(Value::List(items))
        }
        TYPE_SET => {
            let n = r.len()?;
            let mut members = HashSet::with_capacity(n);
            for _ in 0..n {
                members.insert(r.string()?);
            }
            Some(Value::Set(members))
        }
        TYPE_ZSET => {
            let n = r.len()?;
            let mut z = SortedSet::default();
            for _ in 0..n {
                let member = r.string()?;
                let bits = r.u64()?;
                z.insert(member, f64::from_bits(bits));
            }
            Some(Value::SortedSet(z))
        }
        TYPE_HASH => {
            let n = r.len()?;
            let mut fields = HashMap::with_capacity(n);
            for _ in 0..n {
                let k = r.string()?;
                let v = r.string()?;
                fields.insert(k, v);
            }
            Some(Value::Hash(fields))
        }
        TYPE_STREAM => {
            let last_id = read_stream_id(r)?;
            let max_deleted_id = read_stream_id(r)?;
            let entries_added = r.u64()?;
            let entry_count = r.len()?;
            let mut entries = BTreeMap::new();
            for _ in 0..entry_count {
                let id = read_stream_id(r)?;
                let field_count = r.len()?;
                let mut fields = Vec::with_capacity(field_count);
                for _ in 0..field_count {
                    fields.push((r.string()?, r.string()?));
                }
                entries.insert(id, fields);
            }
            let group_count = r.len()?;
            let mut groups = HashMap::with_capacity(group_count);
            for _ in 0..group_count {
                let name = r.string()?;
                let last_delivered_id = read_stream_id(r)?;
                let pending_count = r.len()?;
                let mut pending = BTreeMap::new();
                for _ in 0..pending_count {
                    let id = read_stream_id(r)?;
                    let consumer = r.string()?;
                    let delivery_time_ms = r.u64()?;
                    let delivery_count = r.u64()?;
                    pending.insert(id, PendingEntry { consumer, delivery_time_ms, delivery_count });
                }
                groups.insert(name, ConsumerGroup { last_delivered_id, pending });
            }
            Some(Value::Stream(Stream { entries, last_id, max_deleted_id, entries_added, groups }))
        }
        _ => None,
    }
}

/// Builds the `PEADB0001` framing for every non-empty database in
/// memory: magic, then per populated db a `SELECTDB` opcode followed by
/// each key (with an optional `EXPIRETIME` opcode ahead of keys that
/// carry one), terminated by a single `EOF` opcode. Shared by
/// [`save_snapshot`] and the replication full-sync handshake, which
/// ships the same bytes over a socket instead of a file.
pub fn encode_snapshot(keyspace: &Keyspace) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    for (idx, db) in keyspace.dbs.iter().enumerate() {
        if db.dict.is_empty() {
            continue;
        }
        out.push(OP_SELECTDB);
        write_len(&mut out, idx);
        for (key, entry) in &db.dict {
            if let Some(expire_at) = entry.expire_at_ms {
                out.push(OP_EXPIRETIME);
                out.extend_from_slice(&expire_at.to_be_bytes());
            }
            write_string(&mut out, key);
            out.extend_from_slice(&encode_value(&entry.value));
        }
    }
    out.push(OP_EOF);
    out
}

/// Writes [`encode_snapshot`]'s bytes to `path` atomically via a
/// `.tmp` file and rename.
pub fn save_snapshot(keyspace: &Keyspace, path: &str) -> io::Result<()> {
    let out = encode_snapshot(keyspace);
    let tmp_path = format!("{}.tmp", path);
    let mut file = File::create(&tmp_path)?;
    file.write_all(&out)?;
    file.sync_all()?;
    std::fs::rename(tmp_path, path)?;
    Ok(())
}

/// Loads a snapshot written by [`save_snapshot`] into a fresh keyspace
/// sized for `num_databases` logical databases.
pub fn load_snapshot(path: &str, num_databases: usize) -> io::Result<Keyspace> {
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    let mut r = Reader::new(&buf);
    let magic = r.bytes(MAGIC.len()).ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "truncated header"))?;
    if magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic"));
    }
    let mut keyspace = Keyspace::new(num_databases);
    let mut db_idx = 0usize;
    loop {
        let op = r.byte().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unexpected eof"))?;
        match op {
            OP_EOF => break,
            OP_SELECTDB => {
                db_idx = r.len().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad selectdb"))?;
            }
            OP_EXPIRETIME => {
                let expire_at = r.u64().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad expiretime"))?;
                let key = r.string().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad key"))?;
                let value = decode_value_from(&mut r).ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad value"))?;
                keyspace.dbs[db_idx].set(key, Entry { value, expire_at_ms: Some(expire_at) });
            }
            _ => {
                r.pos -= 1;
                let key = r.string().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad key"))?;
                let value = decode_value_from(&mut r).ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad value"))?;
                keyspace.dbs[db_idx].set(key, Entry::new(value));
            }
        }
    }
    Ok(keyspace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Entry;

    #[test]
    fn string_round_trips() {
        let v = Value::String(b"hello".to_vec());
        let encoded = encode_value(&v);
        match decode_value(&encoded) {
            Some(Value::String(s)) => assert_eq!(s, b"hello"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn large_string_round_trips_through_lzf() {
        let payload = vec![b'a'; 500];
        let v = Value::String(payload.clone());
        let encoded = encode_value(&v);
        match decode_value(&encoded) {
            Some(Value::String(s)) => assert_eq!(s, payload),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn hash_round_trips() {
        let mut fields = HashMap::new();
        fields.insert(b"f".to_vec(), b"v".to_vec());
        let v = Value::Hash(fields);
        let encoded = encode_value(&v);
        match decode_value(&encoded) {
            Some(Value::Hash(h)) => assert_eq!(h.get(b"f".as_slice()), Some(&b"v".to_vec())),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn save_then_load_snapshot_round_trips() {
        let mut ks = Keyspace::new(2);
        ks.db(0).set(b"k".to_vec(), Entry::new(Value::String(b"v".to_vec())));
        let path = std::env::temp_dir().join(format!("peadb-rdb-test-{}.rdb", std::process::id()));
        let path = path.to_str().unwrap();
        save_snapshot(&ks, path).unwrap();
        let loaded = load_snapshot(path, 2).unwrap();
        assert!(loaded.dbs[0].dict.contains_key(b"k".as_slice()));
        std::fs::remove_file(path).ok();
    }
}
