//! Set commands: membership, cardinality, and the inter/union/diff
//! family built on a shared set-combining core.

use super::{parse_int, plain, suppressed, HandlerResult};
use crate::resp::Reply;
use crate::server::Server;
use crate::session::Session;
use crate::util::now_ms;
use crate::value::{Entry, Value};
use std::collections::HashSet;

fn is_set(v: &Value) -> bool {
    matches!(v, Value::Set(_))
}

pub fn sadd(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if db.get_typed(&argv[1], now, is_set)?.is_none() {
        db.set(argv[1].clone(), Entry::new(Value::Set(HashSet::new())));
    }
    let entry = db.get_typed_mut(&argv[1], now, is_set)?.unwrap();
    let s = match &mut entry.value { Value::Set(s) => s, _ => unreachable!() };
    let mut added = 0i64;
    for m in &argv[2..] {
        if s.insert(m.clone()) {
            added += 1;
        }
    }
    if added > 0 {
        server.keyspace.bump_epoch();
        plain(Reply::Integer(added))
    } else {
        suppressed(Reply::Integer(0))
    }
}

pub fn srem(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_set)? {
        Some(e) => e,
        None => return suppressed(Reply::Integer(0)),
    };
    let s = match &mut entry.value { Value::Set(s) => s, _ => unreachable!() };
    let mut removed = 0i64;
    for m in &argv[2..] {
        if s.remove(m) {
            removed += 1;
        }
    }
    let emptied = s.is_empty();
    if emptied {
        db.remove(&argv[1]);
    }
    if removed > 0 {
        server.keyspace.bump_epoch();
        plain(Reply::Integer(removed))
    } else {
        suppressed(Reply::Integer(0))
    }
}

pub fn spop(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    use rand::seq::IteratorRandom;
    let count = match argv.get(2) {
        Some(c) => Some(parse_int(c)? as usize),
        None => None,
    };
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_set)? {
        Some(e) => e,
        None => return suppressed(if count.is_some() { Reply::Array(Vec::new()) } else { Reply::Nil }),
    };
    let s = match &mut entry.value { Value::Set(s) => s, _ => unreachable!() };
    let mut rng = rand::thread_rng();
    let n = count.unwrap_or(1).min(s.len());
    let chosen: Vec<Vec<u8>> = s.iter().cloned().choose_multiple(&mut rng, n);
    for m in &chosen {
        s.remove(m);
    }
    let emptied = s.is_empty();
    if emptied {
        db.remove(&argv[1]);
    }
    if chosen.is_empty() {
        return suppressed(if count.is_some() { Reply::Array(Vec::new()) } else { Reply::Nil });
    }
    server.keyspace.bump_epoch();
    let repl_members: Vec<Vec<u8>> = chosen.clone();
    let reply = match count {
        None => Reply::Bulk(chosen.into_iter().next().unwrap()),
        Some(_) => Reply::Array(chosen.into_iter().map(Reply::Bulk).collect()),
    };
    let mut repl_cmd = vec![b"SREM".to_vec(), argv[1].clone()];
    repl_cmd.extend(repl_members);
    super::rewritten(reply, repl_cmd)
}

pub fn smove(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let removed = match db.get_typed_mut(&argv[1], now, is_set)? {
        Some(e) => {
            let s = match &mut e.value { Value::Set(s) => s, _ => unreachable!() };
            let was = s.remove(&argv[3]);
            if s.is_empty() {
                db.remove(&argv[1]);
            }
            was
        }
        None => false,
    };
    if !removed {
        return suppressed(Reply::Integer(0));
    }
    if db.get_typed(&argv[2], now, is_set)?.is_none() {
        db.set(argv[2].clone(), Entry::new(Value::Set(HashSet::new())));
    }
    let dest_entry = db.get_typed_mut(&argv[2], now, is_set)?.unwrap();
    let ds = match &mut dest_entry.value { Value::Set(s) => s, _ => unreachable!() };
    ds.insert(argv[3].clone());
    server.keyspace.bump_epoch();
    plain(Reply::Integer(1))
}

pub fn scard(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let len = db.get_typed(&argv[1], now, is_set)?.map(|e| match &e.value { Value::Set(s) => s.len(), _ => unreachable!() }).unwrap_or(0);
    plain(Reply::Integer(len as i64))
}

pub fn sismember(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let found = db.get_typed(&argv[1], now, is_set)?.map(|e| match &e.value { Value::Set(s) => s.contains(&argv[2]), _ => unreachable!() }).unwrap_or(false);
    plain(Reply::Integer(found as i64))
}

pub fn smismember(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let s = db.get_typed(&argv[1], now, is_set)?.map(|e| match &e.value { Value::Set(s) => s.clone(), _ => unreachable!() });
    let out = argv[2..].iter().map(|m| Reply::Integer(s.as_ref().map(|s| s.contains(m)).unwrap_or(false) as i64)).collect();
    plain(Reply::Array(out))
}

#[derive(Clone, Copy, PartialEq)]
pub enum SetOp {
    Inter,
    Union,
    Diff,
}

pub fn setop(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], op: SetOp, store: bool) -> HandlerResult {
    let now = now_ms();
    let key_start = if store { 2 } else { 1 };
    let db = server.keyspace.db(session.db_index);
    let mut sets: Vec<HashSet<Vec<u8>>> = Vec::new();
    for key in &argv[key_start..] {
        let s = db.get_typed(key, now, is_set)?.map(|e| match &e.value { Value::Set(s) => s.clone(), _ => unreachable!() }).unwrap_or_default();
        sets.push(s);
    }
    let result: HashSet<Vec<u8>> = match op {
        SetOp::Union => sets.into_iter().flatten().collect(),
        SetOp::Inter => {
            let mut it = sets.into_iter();
            match it.next() {
                Some(first) => it.fold(first, |acc, s| acc.intersection(&s).cloned().collect()),
                None => HashSet::new(),
            }
        }
        SetOp::Diff => {
            let mut it = sets.into_iter();
            match it.next() {
                Some(first) => it.fold(first, |acc, s| acc.difference(&s).cloned().collect()),
                None => HashSet::new(),
            }
        }
    };
    if store {
        let len = result.len();
        if result.is_empty() {
            db.remove(&argv[1]);
        } else {
            db.set(argv[1].clone(), Entry::new(Value::Set(result)));
        }
        server.keyspace.bump_epoch();
        plain(Reply::Integer(len as i64))
    } else {
        plain(Reply::Array(result.into_iter().map(Reply::Bulk).collect()))
    }
}

pub fn srandmember(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    use rand::seq::IteratorRandom;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let s = match db.get_typed(&argv[1], now, is_set)? {
        Some(e) => match &e.value { Value::Set(s) => s.clone(), _ => unreachable!() },
        None => return plain(if argv.len() > 2 { Reply::Array(Vec::new()) } else { Reply::Nil }),
    };
    let mut rng = rand::thread_rng();
    if argv.len() == 2 {
        return plain(s.iter().choose(&mut rng).map(|m| Reply::Bulk(m.clone())).unwrap_or(Reply::Nil));
    }
    let count = parse_int(&argv[2])?;
    let n = count.unsigned_abs() as usize;
    let chosen: Vec<Vec<u8>> = if count < 0 {
        (0..n).filter_map(|_| s.iter().choose(&mut rng).cloned()).collect()
    } else {
        s.into_iter().take(n).collect()
    };
    plain(Reply::Array(chosen.into_iter().map(Reply::Bulk).collect()))
}

pub fn smembers(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let members = db.get_typed(&argv[1], now, is_set)?.map(|e| match &e.value { Value::Set(s) => s.iter().cloned().map(Reply::Bulk).collect(), _ => unreachable!() }).unwrap_or_default();
    plain(Reply::Set(members))
}

pub fn sscan(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let s = db.get_typed(&argv[1], now, is_set)?.map(|e| match &e.value { Value::Set(s) => s.clone(), _ => unreachable!() }).unwrap_or_default();
    let pattern = argv.iter().position(|a| a.eq_ignore_ascii_case(b"MATCH")).and_then(|i| argv.get(i + 1)).map(|p| String::from_utf8_lossy(p).to_string());
    let out: Vec<Reply> = s
        .iter()
        .filter(|m| pattern.as_ref().map(|p| crate::db::glob_match(p, m)).unwrap_or(true))
        .cloned()
        .map(Reply::Bulk)
        .collect();
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
    fn sadd_then_sismember() {
        let (mut s, mut sess) = setup();
        sadd(&mut s, &mut sess, &[b"SADD".to_vec(), b"s".to_vec(), b"a".to_vec()]).unwrap();
        let (reply, _) = sismember(&mut s, &mut sess, &[b"SISMEMBER".to_vec(), b"s".to_vec(), b"a".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Integer(1));
    }

    #[test]
    fn sinter_of_two_sets() {
        let (mut s, mut sess) = setup();
        sadd(&mut s, &mut sess, &[b"SADD".to_vec(), b"a".to_vec(), b"x".to_vec(), b"y".to_vec()]).unwrap();
        sadd(&mut s, &mut sess, &[b"SADD".to_vec(), b"b".to_vec(), b"y".to_vec(), b"z".to_vec()]).unwrap();
        let (reply, _) = setop(&mut s, &mut sess, &[b"SINTER".to_vec(), b"a".to_vec(), b"b".to_vec()], SetOp::Inter, false).unwrap();
        assert_eq!(reply, Reply::Array(vec![Reply::Bulk(b"y".to_vec())]));
    }

    #[test]
    fn srem_removes_empty_set() {
        let (mut s, mut sess) = setup();
        sadd(&mut s, &mut sess, &[b"SADD".to_vec(), b"s".to_vec(), b"a".to_vec()]).unwrap();
        srem(&mut s, &mut sess, &[b"SREM".to_vec(), b"s".to_vec(), b"a".to_vec()]).unwrap();
        assert!(!s.keyspace.db(0).exists(b"s", now_ms()));
    }
}
