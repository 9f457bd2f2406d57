//! Generic key-space commands (DEL/EXISTS/TYPE/TTL/EXPIRE family/
//! KEYS/SCAN/RENAME/COPY/MOVE/SORT/OBJECT/DUMP/RESTORE/FLUSH*).

use super::{parse_int, plain, rewritten, suppressed, HandlerResult};
use crate::db::glob_match;
use crate::error::{CommandError, CommandResult};
use crate::resp::Reply;
use crate::server::Server;
use crate::session::Session;
use crate::util::now_ms;
use crate::value::{Entry, Value};

pub fn del(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], _unlink_name: bool) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let mut removed = 0i64;
    for key in &argv[1..] {
        if db.exists(key, now) {
            db.remove(key);
            removed += 1;
        }
    }
    if removed > 0 {
        server.keyspace.bump_epoch();
        plain(Reply::Integer(removed))
    } else {
        suppressed(Reply::Integer(0))
    }
}

pub fn exists(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let count = argv[1..].iter().filter(|k| db.exists(k, now)).count();
    plain(Reply::Integer(count as i64))
}

pub fn type_cmd(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let name = db.get(&argv[1], now).map(|e| e.value.type_name()).unwrap_or("none");
    plain(Reply::Simple(name.into()))
}

pub fn ttl(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], millis: bool) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let result = match db.get(&argv[1], now) {
        None => -2,
        Some(e) => match e.expire_at_ms {
            None => -1,
            Some(t) => {
                let remaining = t.saturating_sub(now);
                if millis { remaining as i64 } else { (remaining / 1000) as i64 }
            }
        },
    };
    plain(Reply::Integer(result))
}

pub fn expiretime(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], millis: bool) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let result = match db.get(&argv[1], now) {
        None => -2,
        Some(e) => match e.expire_at_ms {
            None => -1,
            Some(t) => if millis { t as i64 } else { (t / 1000) as i64 },
        },
    };
    plain(Reply::Integer(result))
}

#[derive(PartialEq)]
enum ExpireMode {
    Always,
    Nx,
    Xx,
    Gt,
    Lt,
}

fn parse_expire_mode(argv: &[Vec<u8>]) -> CommandResult<ExpireMode> {
    if argv.len() <= 3 {
        return Ok(ExpireMode::Always);
    }
    let tok = String::from_utf8_lossy(&argv[3]).to_ascii_uppercase();
    match tok.as_str() {
        "NX" => Ok(ExpireMode::Nx),
        "XX" => Ok(ExpireMode::Xx),
        "GT" => Ok(ExpireMode::Gt),
        "LT" => Ok(ExpireMode::Lt),
        _ => Err(CommandError::Syntax),
    }
}

pub fn expire(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], millis: bool, absolute: bool) -> HandlerResult {
    let n = parse_int(&argv[2])?;
    let mode = parse_expire_mode(argv)?;
    let now = now_ms();
    let abs = if absolute {
        if millis { n } else { n.saturating_mul(1000) }
    } else {
        now as i64 + if millis { n } else { n.saturating_mul(1000) }
    };
    let db = server.keyspace.db(session.db_index);
    if !db.exists(&argv[1], now) {
        return suppressed(Reply::Integer(0));
    }
    if abs <= now as i64 {
        db.remove(&argv[1]);
        server.keyspace.bump_epoch();
        return rewritten(Reply::Integer(1), vec![b"DEL".to_vec(), argv[1].clone()]);
    }
    let entry = db.dict.get_mut(&argv[1]).unwrap();
    let current = entry.expire_at_ms;
    let allowed = match mode {
        ExpireMode::Always => true,
        ExpireMode::Nx => current.is_none(),
        ExpireMode::Xx => current.is_some(),
        ExpireMode::Gt => current.map(|c| abs as u64 > c).unwrap_or(false),
        ExpireMode::Lt => current.map(|c| (abs as u64) < c).unwrap_or(true),
    };
    if !allowed {
        return suppressed(Reply::Integer(0));
    }
    entry.expire_at_ms = Some(abs as u64);
    server.keyspace.bump_epoch();
    rewritten(Reply::Integer(1), vec![b"PEXPIREAT".to_vec(), argv[1].clone(), abs.to_string().into_bytes()])
}

pub fn persist(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    match db.get_mut(&argv[1], now) {
        Some(e) if e.expire_at_ms.is_some() => {
            e.expire_at_ms = None;
            server.keyspace.bump_epoch();
            plain(Reply::Integer(1))
        }
        _ => suppressed(Reply::Integer(0)),
    }
}

pub fn keys(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let pattern = String::from_utf8_lossy(&argv[1]).to_string();
    let db = server.keyspace.db(session.db_index);
    let matched: Vec<Reply> = db
        .dict
        .iter()
        .filter(|(_, e)| !e.is_expired(now))
        .filter(|(k, _)| glob_match(&pattern, k))
        .map(|(k, _)| Reply::Bulk(k.clone()))
        .collect();
    plain(Reply::Array(matched))
}

pub fn randomkey(server: &mut Server, session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    use rand::seq::IteratorRandom;
    let db = server.keyspace.db(session.db_index);
    let mut rng = rand::thread_rng();
    match db.dict.keys().choose(&mut rng) {
        Some(k) => plain(Reply::Bulk(k.clone())),
        None => plain(Reply::Nil),
    }
}

pub fn scan(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let cursor: u64 = std::str::from_utf8(&argv[1]).ok().and_then(|s| s.parse().ok()).ok_or(CommandError::Custom("ERR invalid cursor".into()))?;
    let mut count = 10usize;
    let mut pattern: Option<String> = None;
    let mut type_filter: Option<String> = None;
    let mut i = 2;
    while i < argv.len() {
        let tok = String::from_utf8_lossy(&argv[i]).to_ascii_uppercase();
        match tok.as_str() {
            "COUNT" => {
                i += 1;
                count = parse_int(argv.get(i).ok_or(CommandError::Syntax)?)? as usize;
            }
            "MATCH" => {
                i += 1;
                pattern = Some(String::from_utf8_lossy(argv.get(i).ok_or(CommandError::Syntax)?).to_string());
            }
            "TYPE" => {
                i += 1;
                type_filter = Some(String::from_utf8_lossy(argv.get(i).ok_or(CommandError::Syntax)?).to_string());
            }
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }
    let db = server.keyspace.db(session.db_index);
    let (next, page) = crate::db::ScanCursor::scan(db, cursor, count, pattern.as_deref(), type_filter.as_deref());
    plain(Reply::Array(vec![
        Reply::bulk_str(next.to_string()),
        Reply::Array(page.into_iter().map(Reply::Bulk).collect()),
    ]))
}

pub fn rename(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], nx: bool) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if !db.exists(&argv[1], now) {
        return Err(CommandError::NoSuchKey);
    }
    if nx && db.exists(&argv[2], now) {
        return plain(Reply::Integer(0));
    }
    let entry = db.remove(&argv[1]).unwrap();
    db.set(argv[2].clone(), entry);
    server.keyspace.bump_epoch();
    if nx {
        plain(Reply::Integer(1))
    } else {
        plain(Reply::ok())
    }
}

pub fn copy(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let mut replace = false;
    let mut dest_db = session.db_index;
    let mut i = 3;
    while i < argv.len() {
        let tok = String::from_utf8_lossy(&argv[i]).to_ascii_uppercase();
        match tok.as_str() {
            "REPLACE" => replace = true,
            "DB" => {
                i += 1;
                dest_db = parse_int(argv.get(i).ok_or(CommandError::Syntax)?)? as usize;
            }
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }
    let now = now_ms();
    let src_entry = match server.keyspace.db(session.db_index).get(&argv[1], now).cloned() {
        Some(e) => e,
        None => return plain(Reply::Integer(0)),
    };
    let dest = server.keyspace.db(dest_db);
    if !replace && dest.exists(&argv[2], now) {
        return plain(Reply::Integer(0));
    }
    dest.set(argv[2].clone(), src_entry);
    server.keyspace.bump_epoch();
    plain(Reply::Integer(1))
}

pub fn move_cmd(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let dest_idx = parse_int(&argv[2])? as usize;
    if dest_idx >= server.config.dbnum {
        return Err(CommandError::Custom("ERR DB index is out of range".into()));
    }
    if dest_idx == session.db_index {
        return Err(CommandError::Custom("ERR source and destination objects are the same".into()));
    }
    let now = now_ms();
    let exists_in_dest = server.keyspace.db(dest_idx).exists(&argv[1], now);
    if exists_in_dest {
        return plain(Reply::Integer(0));
    }
    let entry = server.keyspace.db(session.db_index).get(&argv[1], now).cloned();
    match entry {
        None => plain(Reply::Integer(0)),
        Some(e) => {
            server.keyspace.db(session.db_index).remove(&argv[1]);
            server.keyspace.db(dest_idx).set(argv[1].clone(), e);
            server.keyspace.bump_epoch();
            plain(Reply::Integer(1))
        }
    }
}

pub fn object(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let sub = String::from_utf8_lossy(&argv[1]).to_ascii_uppercase();
    match sub.as_str() {
        "ENCODING" if argv.len() == 3 => {
            let now = now_ms();
            let db = server.keyspace.db(session.db_index);
            match db.get(&argv[2], now) {
                Some(e) => plain(Reply::bulk_str(e.value.encoding_name())),
                None => Err(CommandError::NoSuchKey),
            }
        }
        "REFCOUNT" | "FREQ" if argv.len() == 3 => plain(Reply::Integer(1)),
        "IDLETIME" if argv.len() == 3 => plain(Reply::Integer(0)),
        "HELP" => plain(Reply::Array(Vec::new())),
        _ => Err(CommandError::Syntax),
    }
}

pub fn dbsize(server: &mut Server, session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    plain(Reply::Integer(server.keyspace.db(session.db_index).len() as i64))
}

pub fn flushdb(server: &mut Server, session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    server.keyspace.flush_db(session.db_index);
    server.keyspace.bump_epoch();
    plain(Reply::ok())
}

pub fn flushall(server: &mut Server, _session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    server.keyspace.flush_all();
    server.keyspace.bump_epoch();
    plain(Reply::ok())
}

/// Minimal implementation-defined DUMP payload: a tagged, length-prefixed
/// encoding of the value, not a Redis RDB object encoding.
pub fn dump(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    match db.get(&argv[1], now) {
        Some(e) => plain(Reply::Bulk(crate::rdb::encode_value(&e.value))),
        None => plain(Reply::Nil),
    }
}

pub fn restore(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let ttl_ms = parse_int(&argv[2])?;
    if ttl_ms < 0 {
        return Err(CommandError::Custom("ERR Invalid TTL value, must be >= 0".into()));
    }
    let mut replace = false;
    let mut absttl = false;
    let mut i = 4;
    while i < argv.len() {
        let tok = String::from_utf8_lossy(&argv[i]).to_ascii_uppercase();
        match tok.as_str() {
            "REPLACE" => replace = true,
            "ABSTTL" => absttl = true,
            "IDLETIME" | "FREQ" => i += 1,
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if !replace && db.exists(&argv[1], now) {
        return Err(CommandError::BusyKey);
    }
    let value = crate::rdb::decode_value(&argv[3]).ok_or_else(|| CommandError::Custom("ERR Bad data format".into()))?;
    let expire_at_ms = if ttl_ms == 0 {
        None
    } else if absttl {
        Some(ttl_ms as u64)
    } else {
        Some(now + ttl_ms as u64)
    };
    db.set(argv[1].clone(), Entry { value, expire_at_ms });
    server.keyspace.bump_epoch();
    let repl = if ttl_ms > 0 && !absttl {
        let abs = expire_at_ms.unwrap();
        vec![b"RESTORE".to_vec(), argv[1].clone(), abs.to_string().into_bytes(), argv[3].clone(), b"ABSTTL".to_vec()]
    } else {
        argv.to_vec()
    };
    rewritten(Reply::ok(), repl)
}

/// `SORT` over List/Set/ZSet members, numeric by default, `ALPHA` for
/// lexicographic, optional `LIMIT`/`STORE`. Uses `slice::sort_by` rather
/// than a hand-rolled sort.
pub fn sort(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let mut items: Vec<Vec<u8>> = match db.get(&argv[1], now).map(|e| &e.value) {
        None => Vec::new(),
        Some(Value::List(l)) => l.iter().cloned().collect(),
        Some(Value::Set(s)) => s.iter().cloned().collect(),
        Some(Value::SortedSet(z)) => z.order.iter_all().into_iter().map(|(_, m)| m).collect(),
        Some(_) => return Err(CommandError::WrongType),
    };
    let mut alpha = false;
    let mut desc = false;
    let mut limit: Option<(usize, usize)> = None;
    let mut store: Option<Vec<u8>> = None;
    let mut i = 2;
    while i < argv.len() {
        let tok = String::from_utf8_lossy(&argv[i]).to_ascii_uppercase();
        match tok.as_str() {
            "ALPHA" => alpha = true,
            "DESC" => desc = true,
            "ASC" => desc = false,
            "LIMIT" => {
                let off = parse_int(argv.get(i + 1).ok_or(CommandError::Syntax)?)? as usize;
                let cnt = parse_int(argv.get(i + 2).ok_or(CommandError::Syntax)?)? as usize;
                limit = Some((off, cnt));
                i += 2;
            }
            "STORE" => {
                i += 1;
                store = Some(argv.get(i).ok_or(CommandError::Syntax)?.clone());
            }
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }
    if !alpha {
        let mut parsed: Vec<(f64, Vec<u8>)> = Vec::with_capacity(items.len());
        for it in items {
            let n: f64 = std::str::from_utf8(&it).ok().and_then(|s| s.parse().ok()).ok_or(CommandError::Custom("ERR One or more scores can't be converted into double".into()))?;
            parsed.push((n, it));
        }
        parsed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        if desc {
            parsed.reverse();
        }
        items = parsed.into_iter().map(|(_, v)| v).collect();
    } else {
        items.sort();
        if desc {
            items.reverse();
        }
    }
    if let Some((off, cnt)) = limit {
        items = items.into_iter().skip(off).take(cnt).collect();
    }
    if let Some(dest) = store {
        let len = items.len();
        let db = server.keyspace.db(session.db_index);
        db.set(dest, Entry::new(Value::List(items.into_iter().collect())));
        server.keyspace.bump_epoch();
        plain(Reply::Integer(len as i64))
    } else {
        plain(Reply::Array(items.into_iter().map(Reply::Bulk).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn setup() -> (Server, Session) {
        (Server::new(Config::default()), Session::new(1, false))
    }

    #[test]
    fn del_counts_removed_keys() {
        let (mut s, mut sess) = setup();
        s.keyspace.db(0).set(b"a".to_vec(), Entry::new(Value::String(b"1".to_vec())));
        let (reply, _) = del(&mut s, &mut sess, &[b"DEL".to_vec(), b"a".to_vec(), b"b".to_vec()], true).unwrap();
        assert_eq!(reply, Reply::Integer(1));
    }

    #[test]
    fn expire_with_negative_seconds_deletes_key() {
        let (mut s, mut sess) = setup();
        s.keyspace.db(0).set(b"k".to_vec(), Entry::new(Value::String(b"v".to_vec())));
        let (reply, repl) = expire(&mut s, &mut sess, &[b"EXPIRE".to_vec(), b"k".to_vec(), b"-1".to_vec()], false, false).unwrap();
        assert_eq!(reply, Reply::Integer(1));
        assert_eq!(repl, Some(vec![b"DEL".to_vec(), b"k".to_vec()]));
        assert!(!s.keyspace.db(0).exists(b"k", now_ms()));
    }

    #[test]
    fn ttl_missing_key_returns_minus_two() {
        let (mut s, mut sess) = setup();
        let (reply, _) = ttl(&mut s, &mut sess, &[b"TTL".to_vec(), b"nope".to_vec()], false).unwrap();
        assert_eq!(reply, Reply::Integer(-2));
    }

    #[test]
    fn rename_missing_source_errors() {
        let (mut s, mut sess) = setup();
        let err = rename(&mut s, &mut sess, &[b"RENAME".to_vec(), b"a".to_vec(), b"b".to_vec()], false).unwrap_err();
        assert_eq!(err, CommandError::NoSuchKey);
    }

    #[test]
    fn sort_numeric_ascending() {
        let (mut s, mut sess) = setup();
        s.keyspace.db(0).set(b"l".to_vec(), Entry::new(Value::List(vec![b"3".to_vec(), b"1".to_vec(), b"2".to_vec()].into())));
        let (reply, _) = sort(&mut s, &mut sess, &[b"SORT".to_vec(), b"l".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Array(vec![Reply::Bulk(b"1".to_vec()), Reply::Bulk(b"2".to_vec()), Reply::Bulk(b"3".to_vec())]));
    }
}
