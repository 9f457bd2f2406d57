//! List commands: push/pop/range/trim handlers built around a shared
//! push/pop generic core, one per direction.

use super::{parse_int, plain, suppressed, HandlerResult};
use crate::error::CommandError;
use crate::resp::Reply;
use crate::server::Server;
use crate::session::Session;
use crate::util::now_ms;
use crate::value::{Entry, Value};
use std::collections::VecDeque;

fn is_list(v: &Value) -> bool {
    matches!(v, Value::List(_))
}

pub fn push(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], left: bool, require_existing: bool) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if require_existing && db.get_typed(&argv[1], now, is_list)?.is_none() {
        return suppressed(Reply::Integer(0));
    }
    if db.get_typed(&argv[1], now, is_list)?.is_none() {
        db.set(argv[1].clone(), Entry::new(Value::List(VecDeque::new())));
    }
    let entry = db.get_typed_mut(&argv[1], now, is_list)?.unwrap();
    let l = match &mut entry.value { Value::List(l) => l, _ => unreachable!() };
    for v in &argv[2..] {
        if left {
            l.push_front(v.clone());
        } else {
            l.push_back(v.clone());
        }
    }
    let len = l.len();
    server.keyspace.bump_epoch();
    plain(Reply::Integer(len as i64))
}

pub fn pop(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], left: bool) -> HandlerResult {
    let count = match argv.get(2) {
        Some(c) => Some(parse_int(c)? as usize),
        None => None,
    };
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_list)? {
        Some(e) => e,
        None => return suppressed(if count.is_some() { Reply::NilArray } else { Reply::Nil }),
    };
    let l = match &mut entry.value { Value::List(l) => l, _ => unreachable!() };
    let n = count.unwrap_or(1).min(l.len());
    let mut popped = Vec::with_capacity(n);
    for _ in 0..n {
        let item = if left { l.pop_front() } else { l.pop_back() };
        match item {
            Some(v) => popped.push(v),
            None => break,
        }
    }
    let emptied = l.is_empty();
    if emptied {
        db.remove(&argv[1]);
    }
    if popped.is_empty() {
        return suppressed(if count.is_some() { Reply::NilArray } else { Reply::Nil });
    }
    server.keyspace.bump_epoch();
    match count {
        None => plain(Reply::Bulk(popped.into_iter().next().unwrap())),
        Some(_) => plain(Reply::Array(popped.into_iter().map(Reply::Bulk).collect())),
    }
}

pub fn llen(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let len = db.get_typed(&argv[1], now, is_list)?.map(|e| match &e.value { Value::List(l) => l.len(), _ => unreachable!() }).unwrap_or(0);
    plain(Reply::Integer(len as i64))
}

fn normalize_range(start: i64, stop: i64, len: i64) -> Option<(usize, usize)> {
    let mut s = if start < 0 { (len + start).max(0) } else { start };
    let mut e = if stop < 0 { len + stop } else { stop };
    e = e.min(len - 1);
    if s > e || s >= len || len == 0 {
        return None;
    }
    if s < 0 {
        s = 0;
    }
    Some((s as usize, e as usize))
}

pub fn lrange(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let start = parse_int(&argv[2])?;
    let stop = parse_int(&argv[3])?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let l = match db.get_typed(&argv[1], now, is_list)? {
        Some(e) => match &e.value { Value::List(l) => l, _ => unreachable!() },
        None => return plain(Reply::Array(Vec::new())),
    };
    match normalize_range(start, stop, l.len() as i64) {
        None => plain(Reply::Array(Vec::new())),
        Some((s, e)) => plain(Reply::Array(l.iter().skip(s).take(e - s + 1).cloned().map(Reply::Bulk).collect())),
    }
}

pub fn lindex(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let idx = parse_int(&argv[2])?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let l = match db.get_typed(&argv[1], now, is_list)? {
        Some(e) => match &e.value { Value::List(l) => l, _ => unreachable!() },
        None => return plain(Reply::Nil),
    };
    let real = if idx < 0 { l.len() as i64 + idx } else { idx };
    if real < 0 || real as usize >= l.len() {
        return plain(Reply::Nil);
    }
    plain(Reply::Bulk(l[real as usize].clone()))
}

pub fn lset(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let idx = parse_int(&argv[2])?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = db.get_typed_mut(&argv[1], now, is_list)?.ok_or(CommandError::NoSuchKey)?;
    let l = match &mut entry.value { Value::List(l) => l, _ => unreachable!() };
    let real = if idx < 0 { l.len() as i64 + idx } else { idx };
    if real < 0 || real as usize >= l.len() {
        return Err(CommandError::OutOfRange);
    }
    l[real as usize] = argv[3].clone();
    server.keyspace.bump_epoch();
    plain(Reply::ok())
}

pub fn lrem(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let count = parse_int(&argv[2])?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_list)? {
        Some(e) => e,
        None => return suppressed(Reply::Integer(0)),
    };
    let l = match &mut entry.value { Value::List(l) => l, _ => unreachable!() };
    let target = &argv[3];
    let mut removed = 0i64;
    let new: VecDeque<Vec<u8>> = if count >= 0 {
        let limit = if count == 0 { usize::MAX } else { count as usize };
        let mut out = VecDeque::new();
        for item in l.drain(..) {
            if &item == target && (removed as usize) < limit {
                removed += 1;
            } else {
                out.push_back(item);
            }
        }
        out
    } else {
        let limit = (-count) as usize;
        let mut out: VecDeque<Vec<u8>> = VecDeque::new();
        for item in l.drain(..).rev() {
            if &item == target && (removed as usize) < limit {
                removed += 1;
            } else {
                out.push_front(item);
            }
        }
        out
    };
    *l = new;
    let emptied = l.is_empty();
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

pub fn ltrim(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let start = parse_int(&argv[2])?;
    let stop = parse_int(&argv[3])?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_list)? {
        Some(e) => e,
        None => return plain(Reply::ok()),
    };
    let l = match &mut entry.value { Value::List(l) => l, _ => unreachable!() };
    match normalize_range(start, stop, l.len() as i64) {
        None => {
            db.remove(&argv[1]);
        }
        Some((s, e)) => {
            let trimmed: VecDeque<Vec<u8>> = l.iter().skip(s).take(e - s + 1).cloned().collect();
            *l = trimmed;
            if l.is_empty() {
                db.remove(&argv[1]);
            }
        }
    }
    server.keyspace.bump_epoch();
    plain(Reply::ok())
}

pub fn linsert(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let before = argv[2].eq_ignore_ascii_case(b"BEFORE");
    if !before && !argv[2].eq_ignore_ascii_case(b"AFTER") {
        return Err(CommandError::Syntax);
    }
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_list)? {
        Some(e) => e,
        None => return suppressed(Reply::Integer(0)),
    };
    let l = match &mut entry.value { Value::List(l) => l, _ => unreachable!() };
    match l.iter().position(|item| item == &argv[3]) {
        None => suppressed(Reply::Integer(-1)),
        Some(pos) => {
            let insert_at = if before { pos } else { pos + 1 };
            l.insert(insert_at, argv[4].clone());
            let len = l.len();
            server.keyspace.bump_epoch();
            plain(Reply::Integer(len as i64))
        }
    }
}

pub fn lpos(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let l = match db.get_typed(&argv[1], now, is_list)? {
        Some(e) => match &e.value { Value::List(l) => l, _ => unreachable!() },
        None => return plain(Reply::Nil),
    };
    let rank = argv.iter().position(|a| a.eq_ignore_ascii_case(b"RANK")).and_then(|i| argv.get(i + 1)).map(|r| parse_int(r)).transpose()?.unwrap_or(1);
    let count = argv.iter().position(|a| a.eq_ignore_ascii_case(b"COUNT")).and_then(|i| argv.get(i + 1)).map(|c| parse_int(c)).transpose()?;
    let target = &argv[2];
    let indices: Vec<usize> = if rank >= 0 {
        l.iter().enumerate().filter(|(_, v)| *v == target).map(|(i, _)| i).skip((rank.max(1) - 1) as usize).collect()
    } else {
        l.iter().enumerate().filter(|(_, v)| *v == target).map(|(i, _)| i).rev().skip((-rank - 1) as usize).collect()
    };
    match count {
        None => plain(indices.first().map(|i| Reply::Integer(*i as i64)).unwrap_or(Reply::Nil)),
        Some(0) => plain(Reply::Array(indices.into_iter().map(|i| Reply::Integer(i as i64)).collect())),
        Some(n) => plain(Reply::Array(indices.into_iter().take(n as usize).map(|i| Reply::Integer(i as i64)).collect())),
    }
}

fn do_move(server: &mut Server, session: &mut Session, src: &[u8], dst: &[u8], from_left: bool, to_left: bool) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let value = {
        let entry = match db.get_typed_mut(src, now, is_list)? {
            Some(e) => e,
            None => return suppressed(Reply::Nil),
        };
        let l = match &mut entry.value { Value::List(l) => l, _ => unreachable!() };
        let v = if from_left { l.pop_front() } else { l.pop_back() };
        if l.is_empty() {
            db.remove(src);
        }
        v
    };
    let value = match value {
        Some(v) => v,
        None => return suppressed(Reply::Nil),
    };
    if db.get_typed(dst, now, is_list)?.is_none() {
        db.set(dst.to_vec(), Entry::new(Value::List(VecDeque::new())));
    }
    let dest_entry = db.get_typed_mut(dst, now, is_list)?.unwrap();
    let dl = match &mut dest_entry.value { Value::List(l) => l, _ => unreachable!() };
    if to_left {
        dl.push_front(value.clone());
    } else {
        dl.push_back(value.clone());
    }
    server.keyspace.bump_epoch();
    plain(Reply::Bulk(value))
}

pub fn rpoplpush(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let (reply, _) = do_move(server, session, &argv[1], &argv[2], false, true)?;
    super::rewritten(reply, vec![b"LMOVE".to_vec(), argv[1].clone(), argv[2].clone(), b"RIGHT".to_vec(), b"LEFT".to_vec()])
}

pub fn lmove(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let from_left = argv[3].eq_ignore_ascii_case(b"LEFT");
    let to_left = argv[4].eq_ignore_ascii_case(b"LEFT");
    do_move(server, session, &argv[1], &argv[2], from_left, to_left)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn setup() -> (Server, Session) {
        (Server::new(Config::default()), Session::new(1, false))
    }

    #[test]
    fn lpush_then_lrange() {
        let (mut s, mut sess) = setup();
        push(&mut s, &mut sess, &[b"LPUSH".to_vec(), b"l".to_vec(), b"a".to_vec(), b"b".to_vec()], true, false).unwrap();
        let (reply, _) = lrange(&mut s, &mut sess, &[b"LRANGE".to_vec(), b"l".to_vec(), b"0".to_vec(), b"-1".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Array(vec![Reply::Bulk(b"b".to_vec()), Reply::Bulk(b"a".to_vec())]));
    }

    #[test]
    fn rpop_on_missing_key_returns_nil() {
        let (mut s, mut sess) = setup();
        let (reply, repl) = pop(&mut s, &mut sess, &[b"RPOP".to_vec(), b"missing".to_vec()], false).unwrap();
        assert_eq!(reply, Reply::Nil);
        assert_eq!(repl, Some(Vec::new()));
    }

    #[test]
    fn lpop_removes_key_when_emptied() {
        let (mut s, mut sess) = setup();
        push(&mut s, &mut sess, &[b"LPUSH".to_vec(), b"l".to_vec(), b"only".to_vec()], true, false).unwrap();
        pop(&mut s, &mut sess, &[b"LPOP".to_vec(), b"l".to_vec()], true).unwrap();
        assert!(!s.keyspace.db(0).exists(b"l", now_ms()));
    }

    #[test]
    fn lmove_moves_between_lists() {
        let (mut s, mut sess) = setup();
        push(&mut s, &mut sess, &[b"RPUSH".to_vec(), b"src".to_vec(), b"x".to_vec()], false, false).unwrap();
        let (reply, _) = lmove(&mut s, &mut sess, &[b"LMOVE".to_vec(), b"src".to_vec(), b"dst".to_vec(), b"LEFT".to_vec(), b"RIGHT".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Bulk(b"x".to_vec()));
        assert!(!s.keyspace.db(0).exists(b"src", now_ms()));
    }

    #[test]
    fn lpushx_on_missing_key_is_noop() {
        let (mut s, mut sess) = setup();
        let (reply, repl) = push(&mut s, &mut sess, &[b"LPUSHX".to_vec(), b"missing".to_vec(), b"v".to_vec()], true, true).unwrap();
        assert_eq!(reply, Reply::Integer(0));
        assert_eq!(repl, Some(Vec::new()));
    }
}
