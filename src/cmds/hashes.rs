//! Hash commands (HSET/HGET/... family), following the same
//! `_generic` delegation convention used throughout the rest of this
//! package, over `HashMap<Bytes, Bytes>`.

use super::{parse_float, parse_int, plain, HandlerResult};
use crate::error::CommandError;
use crate::resp::Reply;
use crate::server::Server;
use crate::session::Session;
use crate::util::now_ms;
use crate::value::{Entry, Value};
use std::collections::HashMap;

fn is_hash(v: &Value) -> bool {
    matches!(v, Value::Hash(_))
}

pub fn hset(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], is_hmset: bool) -> HandlerResult {
    if argv.len() < 4 || argv.len() % 2 != 0 {
        return Err(CommandError::WrongArity(argv[0].iter().map(|b| *b as char).collect()));
    }
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if db.get_typed(&argv[1], now, is_hash)?.is_none() {
        db.set(argv[1].clone(), Entry::new(Value::Hash(HashMap::new())));
    }
    let entry = db.get_typed_mut(&argv[1], now, is_hash)?.unwrap();
    let h = match &mut entry.value {
        Value::Hash(h) => h,
        _ => unreachable!(),
    };
    let mut added = 0i64;
    let mut i = 2;
    while i + 1 < argv.len() {
        if h.insert(argv[i].clone(), argv[i + 1].clone()).is_none() {
            added += 1;
        }
        i += 2;
    }
    server.keyspace.bump_epoch();
    if is_hmset {
        plain(Reply::ok())
    } else {
        plain(Reply::Integer(added))
    }
}

pub fn hsetnx(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if db.get_typed(&argv[1], now, is_hash)?.is_none() {
        db.set(argv[1].clone(), Entry::new(Value::Hash(HashMap::new())));
    }
    let entry = db.get_typed_mut(&argv[1], now, is_hash)?.unwrap();
    let h = match &mut entry.value {
        Value::Hash(h) => h,
        _ => unreachable!(),
    };
    if h.contains_key(&argv[2]) {
        return plain(Reply::Integer(0));
    }
    h.insert(argv[2].clone(), argv[3].clone());
    server.keyspace.bump_epoch();
    plain(Reply::Integer(1))
}

pub fn hget(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    match db.get_typed(&argv[1], now, is_hash)? {
        Some(e) => {
            let h = match &e.value { Value::Hash(h) => h, _ => unreachable!() };
            match h.get(&argv[2]) {
                Some(v) => plain(Reply::Bulk(v.clone())),
                None => plain(Reply::Nil),
            }
        }
        None => plain(Reply::Nil),
    }
}

pub fn hmget(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let h = db.get_typed(&argv[1], now, is_hash)?.map(|e| match &e.value { Value::Hash(h) => h.clone(), _ => unreachable!() });
    let replies = argv[2..]
        .iter()
        .map(|f| match &h {
            Some(h) => h.get(f).map(|v| Reply::Bulk(v.clone())).unwrap_or(Reply::Nil),
            None => Reply::Nil,
        })
        .collect();
    plain(Reply::Array(replies))
}

pub fn hdel(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_hash)? {
        Some(e) => e,
        None => return super::suppressed(Reply::Integer(0)),
    };
    let h = match &mut entry.value { Value::Hash(h) => h, _ => unreachable!() };
    let mut removed = 0i64;
    for field in &argv[2..] {
        if h.remove(field).is_some() {
            removed += 1;
        }
    }
    let emptied = h.is_empty();
    if emptied {
        db.remove(&argv[1]);
    }
    if removed > 0 {
        server.keyspace.bump_epoch();
        plain(Reply::Integer(removed))
    } else {
        super::suppressed(Reply::Integer(0))
    }
}

pub fn hlen(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let len = db.get_typed(&argv[1], now, is_hash)?.map(|e| match &e.value { Value::Hash(h) => h.len(), _ => unreachable!() }).unwrap_or(0);
    plain(Reply::Integer(len as i64))
}

pub fn hexists(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let exists = db.get_typed(&argv[1], now, is_hash)?.map(|e| match &e.value { Value::Hash(h) => h.contains_key(&argv[2]), _ => unreachable!() }).unwrap_or(false);
    plain(Reply::Integer(exists as i64))
}

pub fn hkeys(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let keys = db.get_typed(&argv[1], now, is_hash)?.map(|e| match &e.value { Value::Hash(h) => h.keys().cloned().map(Reply::Bulk).collect(), _ => unreachable!() }).unwrap_or_default();
    plain(Reply::Array(keys))
}

pub fn hvals(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let vals = db.get_typed(&argv[1], now, is_hash)?.map(|e| match &e.value { Value::Hash(h) => h.values().cloned().map(Reply::Bulk).collect(), _ => unreachable!() }).unwrap_or_default();
    plain(Reply::Array(vals))
}

pub fn hgetall(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let pairs = db.get_typed(&argv[1], now, is_hash)?.map(|e| match &e.value {
        Value::Hash(h) => h.iter().map(|(k, v)| (Reply::Bulk(k.clone()), Reply::Bulk(v.clone()))).collect(),
        _ => unreachable!(),
    }).unwrap_or_default();
    plain(Reply::Map(pairs))
}

fn parse_hash_int(raw: Option<&[u8]>) -> Result<i64, CommandError> {
    match raw {
        None => Ok(0),
        Some(b) => std::str::from_utf8(b).ok().and_then(|s| s.parse().ok()).ok_or(CommandError::Custom("ERR hash value is not an integer".into())),
    }
}

pub fn hincrby(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let delta = parse_int(&argv[3])?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if db.get_typed(&argv[1], now, is_hash)?.is_none() {
        db.set(argv[1].clone(), Entry::new(Value::Hash(HashMap::new())));
    }
    let entry = db.get_typed_mut(&argv[1], now, is_hash)?.unwrap();
    let h = match &mut entry.value { Value::Hash(h) => h, _ => unreachable!() };
    let current = parse_hash_int(h.get(&argv[2]).map(|v| v.as_slice()))?;
    let next = current.checked_add(delta).ok_or(CommandError::OutOfRange)?;
    h.insert(argv[2].clone(), next.to_string().into_bytes());
    server.keyspace.bump_epoch();
    plain(Reply::Integer(next))
}

pub fn hincrbyfloat(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let delta = parse_float(&argv[3])?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if db.get_typed(&argv[1], now, is_hash)?.is_none() {
        db.set(argv[1].clone(), Entry::new(Value::Hash(HashMap::new())));
    }
    let entry = db.get_typed_mut(&argv[1], now, is_hash)?.unwrap();
    let h = match &mut entry.value { Value::Hash(h) => h, _ => unreachable!() };
    let current: f64 = match h.get(&argv[2]) {
        Some(v) => std::str::from_utf8(v).ok().and_then(|s| s.parse().ok()).ok_or(CommandError::NotFloat)?,
        None => 0.0,
    };
    let next = current + delta;
    let repr = crate::resp::format_double(next);
    h.insert(argv[2].clone(), repr.clone().into_bytes());
    server.keyspace.bump_epoch();
    super::rewritten(
        Reply::Bulk(repr.clone().into_bytes()),
        vec![b"HSET".to_vec(), argv[1].clone(), argv[2].clone(), repr.into_bytes()],
    )
}

pub fn hrandfield(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    use rand::seq::IteratorRandom;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let h = match db.get_typed(&argv[1], now, is_hash)? {
        Some(e) => match &e.value { Value::Hash(h) => h.clone(), _ => unreachable!() },
        None => return plain(if argv.len() > 2 { Reply::Array(Vec::new()) } else { Reply::Nil }),
    };
    let mut rng = rand::thread_rng();
    if argv.len() == 2 {
        return plain(h.keys().choose(&mut rng).map(|k| Reply::Bulk(k.clone())).unwrap_or(Reply::Nil));
    }
    let count = parse_int(&argv[2])?;
    let with_values = argv.get(3).map(|a| a.eq_ignore_ascii_case(b"WITHVALUES")).unwrap_or(false);
    let n = count.unsigned_abs() as usize;
    let chosen: Vec<(Vec<u8>, Vec<u8>)> = if count < 0 {
        (0..n).filter_map(|_| h.iter().choose(&mut rng).map(|(k, v)| (k.clone(), v.clone()))).collect()
    } else {
        h.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Vec<_>>().into_iter().take(n).collect()
    };
    let mut out = Vec::new();
    for (k, v) in chosen {
        out.push(Reply::Bulk(k));
        if with_values {
            out.push(Reply::Bulk(v));
        }
    }
    plain(Reply::Array(out))
}

pub fn hscan(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let h = match db.get_typed(&argv[1], now, is_hash)? {
        Some(e) => match &e.value { Value::Hash(h) => h.clone(), _ => unreachable!() },
        None => HashMap::new(),
    };
    let pattern = argv.iter().position(|a| a.eq_ignore_ascii_case(b"MATCH")).and_then(|i| argv.get(i + 1)).map(|p| String::from_utf8_lossy(p).to_string());
    let mut out = Vec::new();
    for (k, v) in h.iter() {
        if let Some(p) = &pattern {
            if !crate::db::glob_match(p, k) {
                continue;
            }
        }
        out.push(Reply::Bulk(k.clone()));
        out.push(Reply::Bulk(v.clone()));
    }
    plain(Reply::Array(vec![Reply::bulk_str("0"), Reply::Array(out)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn setup() -> (Server, Session) {
        (Server::new(Config::default()), Session::new(1, false))
    }

    #[test]
    fn hset_then_hget_round_trips() {
        let (mut s, mut sess) = setup();
        hset(&mut s, &mut sess, &[b"HSET".to_vec(), b"h".to_vec(), b"f".to_vec(), b"v".to_vec()], false).unwrap();
        let (reply, _) = hget(&mut s, &mut sess, &[b"HGET".to_vec(), b"h".to_vec(), b"f".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Bulk(b"v".to_vec()));
    }

    #[test]
    fn hdel_removes_empty_hash() {
        let (mut s, mut sess) = setup();
        hset(&mut s, &mut sess, &[b"HSET".to_vec(), b"h".to_vec(), b"f".to_vec(), b"v".to_vec()], false).unwrap();
        hdel(&mut s, &mut sess, &[b"HDEL".to_vec(), b"h".to_vec(), b"f".to_vec()]).unwrap();
        assert!(!s.keyspace.db(0).exists(b"h", now_ms()));
    }

    #[test]
    fn hincrby_on_missing_field_starts_at_zero() {
        let (mut s, mut sess) = setup();
        let (reply, _) = hincrby(&mut s, &mut sess, &[b"HINCRBY".to_vec(), b"h".to_vec(), b"f".to_vec(), b"5".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Integer(5));
    }

    #[test]
    fn hincrbyfloat_rewrites_as_hset() {
        let (mut s, mut sess) = setup();
        let (_, repl) = hincrbyfloat(&mut s, &mut sess, &[b"HINCRBYFLOAT".to_vec(), b"h".to_vec(), b"f".to_vec(), b"1.5".to_vec()]).unwrap();
        assert_eq!(repl.unwrap()[0], b"HSET".to_vec());
    }

    #[test]
    fn wrongtype_on_non_hash_key() {
        let (mut s, mut sess) = setup();
        s.keyspace.db(0).set(b"s".to_vec(), Entry::new(Value::String(b"x".to_vec())));
        let err = hget(&mut s, &mut sess, &[b"HGET".to_vec(), b"s".to_vec(), b"f".to_vec()]).unwrap_err();
        assert_eq!(err, CommandError::WrongType);
    }
}
