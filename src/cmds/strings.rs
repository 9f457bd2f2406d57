//! String command handlers, following a thin-wrapper-over-a-generic-core
//! convention (e.g. `set` delegates to `set_generic`).

use super::{parse_float, parse_int, plain, rewritten, suppressed, HandlerResult};
use crate::error::{CommandError, CommandResult};
use crate::resp::Reply;
use crate::server::Server;
use crate::session::Session;
use crate::util::now_ms;
use crate::value::{Entry, Value};

fn is_string(v: &Value) -> bool {
    matches!(v, Value::String(_))
}

fn get_string<'a>(server: &'a mut Server, session: &Session, key: &[u8]) -> CommandResult<Option<&'a [u8]>> {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    match db.get_typed(key, now, is_string)? {
        Some(e) => match &e.value {
            Value::String(s) => Ok(Some(s.as_slice())),
            _ => unreachable!(),
        },
        None => Ok(None),
    }
}

pub fn get(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let val = get_string(server, session, &argv[1])?;
    match val {
        Some(bytes) => plain(Reply::Bulk(bytes.to_vec())),
        None => plain(Reply::Nil),
    }
}

struct SetOpts {
    nx: bool,
    xx: bool,
    get: bool,
    keepttl: bool,
    expire_at_ms: Option<u64>,
}

fn parse_set_opts(argv: &[Vec<u8>]) -> CommandResult<SetOpts> {
    let mut opts = SetOpts { nx: false, xx: false, get: false, keepttl: false, expire_at_ms: None };
    let mut i = 3;
    while i < argv.len() {
        let tok = String::from_utf8_lossy(&argv[i]).to_ascii_uppercase();
        match tok.as_str() {
            "NX" => opts.nx = true,
            "XX" => opts.xx = true,
            "GET" => opts.get = true,
            "KEEPTTL" => opts.keepttl = true,
            "EX" | "PX" | "EXAT" | "PXAT" => {
                i += 1;
                let n = argv.get(i).ok_or(CommandError::Syntax)?;
                let n = parse_int(n)?;
                if n <= 0 && (tok == "EX" || tok == "PX") {
                    return Err(CommandError::InvalidExpire("set".into()));
                }
                opts.expire_at_ms = Some(match tok.as_str() {
                    "EX" => now_ms() + (n as u64) * 1000,
                    "PX" => now_ms() + n as u64,
                    "EXAT" => (n as u64) * 1000,
                    "PXAT" => n as u64,
                    _ => unreachable!(),
                });
            }
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }
    if opts.nx && opts.xx {
        return Err(CommandError::Syntax);
    }
    Ok(opts)
}

pub fn set(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let opts = parse_set_opts(argv)?;
    let key = argv[1].clone();
    let value = argv[2].clone();
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let exists = db.exists(&key, now);
    if (opts.nx && exists) || (opts.xx && !exists) {
        return if opts.get {
            let prior = get_string(server, session, &key)?.map(|b| b.to_vec());
            Ok((prior.map(Reply::Bulk).unwrap_or(Reply::Nil), Some(Vec::new())))
        } else {
            plain(Reply::Nil)
        };
    }
    let prior = if opts.get { get_string(server, session, &key)?.map(|b| b.to_vec()) } else { None };
    let db = server.keyspace.db(session.db_index);
    let keep_existing_ttl = opts.keepttl
        && db
            .dict
            .get(&key)
            .and_then(|e| e.expire_at_ms)
            .is_some();
    let expire_at_ms = opts.expire_at_ms.or_else(|| {
        if keep_existing_ttl {
            db.dict.get(&key).and_then(|e| e.expire_at_ms)
        } else {
            None
        }
    });
    db.set(key.clone(), Entry { value: Value::String(value.clone()), expire_at_ms });
    server.keyspace.bump_epoch();

    let repl_cmd = match opts.expire_at_ms {
        Some(abs) => Some(vec![b"SET".to_vec(), key, value, b"PXAT".to_vec(), abs.to_string().into_bytes()]),
        None => None,
    };
    let reply = if opts.get {
        prior.map(Reply::Bulk).unwrap_or(Reply::Nil)
    } else {
        Reply::ok()
    };
    Ok((reply, repl_cmd))
}

pub fn setnx(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if db.exists(&argv[1], now) {
        return plain(Reply::Integer(0));
    }
    db.set(argv[1].clone(), Entry::new(Value::String(argv[2].clone())));
    server.keyspace.bump_epoch();
    plain(Reply::Integer(1))
}

pub fn setex(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], is_px: bool) -> HandlerResult {
    let n = parse_int(&argv[2])?;
    if n <= 0 {
        return Err(CommandError::InvalidExpire(if is_px { "psetex" } else { "setex" }.into()));
    }
    let abs = if is_px { now_ms() + n as u64 } else { now_ms() + (n as u64) * 1000 };
    let db = server.keyspace.db(session.db_index);
    db.set(argv[1].clone(), Entry { value: Value::String(argv[3].clone()), expire_at_ms: Some(abs) });
    server.keyspace.bump_epoch();
    rewritten(Reply::ok(), vec![b"SET".to_vec(), argv[1].clone(), argv[3].clone(), b"PXAT".to_vec(), abs.to_string().into_bytes()])
}

pub fn getset(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let prior = get_string(server, session, &argv[1])?.map(|b| b.to_vec());
    let db = server.keyspace.db(session.db_index);
    db.set(argv[1].clone(), Entry::new(Value::String(argv[2].clone())));
    server.keyspace.bump_epoch();
    plain(prior.map(Reply::Bulk).unwrap_or(Reply::Nil))
}

pub fn getdel(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let prior = get_string(server, session, &argv[1])?.map(|b| b.to_vec());
    if prior.is_some() {
        let db = server.keyspace.db(session.db_index);
        db.remove(&argv[1]);
        server.keyspace.bump_epoch();
        rewritten(Reply::Bulk(prior.unwrap()), vec![b"DEL".to_vec(), argv[1].clone()])
    } else {
        suppressed(Reply::Nil)
    }
}

pub fn getex(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let val = get_string(server, session, &argv[1])?.map(|b| b.to_vec());
    if val.is_none() {
        return plain(Reply::Nil);
    }
    if argv.len() == 2 {
        return suppressed(Reply::Bulk(val.unwrap()));
    }
    let tok = String::from_utf8_lossy(&argv[2]).to_ascii_uppercase();
    let (new_expire, repl): (Option<u64>, Vec<Vec<u8>>) = match tok.as_str() {
        "PERSIST" => (None, vec![b"PERSIST".to_vec(), argv[1].clone()]),
        "EX" | "PX" | "EXAT" | "PXAT" => {
            let n = parse_int(argv.get(3).ok_or(CommandError::Syntax)?)?;
            let abs = match tok.as_str() {
                "EX" => now_ms() + (n as u64) * 1000,
                "PX" => now_ms() + n as u64,
                "EXAT" => (n as u64) * 1000,
                "PXAT" => n as u64,
                _ => unreachable!(),
            };
            (Some(abs), vec![b"PEXPIREAT".to_vec(), argv[1].clone(), abs.to_string().into_bytes()])
        }
        _ => return Err(CommandError::Syntax),
    };
    let db = server.keyspace.db(session.db_index);
    if let Some(e) = db.dict.get_mut(&argv[1]) {
        e.expire_at_ms = new_expire;
    }
    server.keyspace.bump_epoch();
    rewritten(Reply::Bulk(val.unwrap()), repl)
}

pub fn append(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let new_len = match db.get_typed_mut(&argv[1], now, is_string)? {
        Some(e) => match &mut e.value {
            Value::String(s) => {
                s.extend_from_slice(&argv[2]);
                s.len()
            }
            _ => unreachable!(),
        },
        None => {
            db.set(argv[1].clone(), Entry::new(Value::String(argv[2].clone())));
            argv[2].len()
        }
    };
    server.keyspace.bump_epoch();
    plain(Reply::Integer(new_len as i64))
}

pub fn strlen(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let v = get_string(server, session, &argv[1])?;
    plain(Reply::Integer(v.map(|b| b.len()).unwrap_or(0) as i64))
}

pub fn mget(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let mut out = Vec::with_capacity(argv.len() - 1);
    for key in &argv[1..] {
        let now = now_ms();
        let db = server.keyspace.db(session.db_index);
        let val = match db.get(key, now) {
            Some(e) => match &e.value {
                Value::String(s) => Some(Reply::Bulk(s.clone())),
                _ => None,
            },
            None => None,
        };
        out.push(val.unwrap_or(Reply::Nil));
    }
    plain(Reply::Array(out))
}

pub fn mset(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    if (argv.len() - 1) % 2 != 0 {
        return Err(CommandError::WrongArity("MSET".into()));
    }
    let db = server.keyspace.db(session.db_index);
    for pair in argv[1..].chunks(2) {
        db.set(pair[0].clone(), Entry::new(Value::String(pair[1].clone())));
    }
    server.keyspace.bump_epoch();
    plain(Reply::ok())
}

pub fn msetnx(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    if (argv.len() - 1) % 2 != 0 {
        return Err(CommandError::WrongArity("MSETNX".into()));
    }
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let any_exists = argv[1..].chunks(2).any(|pair| db.exists(&pair[0], now));
    if any_exists {
        return plain(Reply::Integer(0));
    }
    for pair in argv[1..].chunks(2) {
        db.set(pair[0].clone(), Entry::new(Value::String(pair[1].clone())));
    }
    server.keyspace.bump_epoch();
    plain(Reply::Integer(1))
}

fn read_int_value(db_val: Option<&[u8]>) -> CommandResult<i64> {
    match db_val {
        None => Ok(0),
        Some(b) => std::str::from_utf8(b).ok().and_then(|s| s.parse::<i64>().ok()).ok_or(CommandError::NotInteger),
    }
}

pub fn incrby(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], delta: i64) -> HandlerResult {
    do_incrby(server, session, &argv[1], delta)
}

pub fn incrby_arg(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], negate: bool) -> HandlerResult {
    let mut n = parse_int(&argv[2])?;
    if negate {
        n = -n;
    }
    do_incrby(server, session, &argv[1], n)
}

fn do_incrby(server: &mut Server, session: &mut Session, key: &[u8], delta: i64) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let current = match db.get_typed(key, now, is_string)? {
        Some(e) => match &e.value {
            Value::String(s) => Some(s.clone()),
            _ => unreachable!(),
        },
        None => None,
    };
    let n = read_int_value(current.as_deref())?;
    let result = n.checked_add(delta).ok_or(CommandError::OutOfRange)?;
    db.set(key.to_vec(), Entry::new(Value::String(result.to_string().into_bytes())));
    server.keyspace.bump_epoch();
    plain(Reply::Integer(result))
}

pub fn incrbyfloat(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let delta = parse_float(&argv[2])?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let current = match db.get_typed(&argv[1], now, is_string)? {
        Some(e) => match &e.value {
            Value::String(s) => Some(s.clone()),
            _ => unreachable!(),
        },
        None => None,
    };
    let n = match current {
        None => 0.0,
        Some(b) => std::str::from_utf8(&b).ok().and_then(|s| s.parse::<f64>().ok()).ok_or(CommandError::NotFloat)?,
    };
    let result = n + delta;
    let formatted = format!("{}", result);
    db.set(argv[1].clone(), Entry::new(Value::String(formatted.clone().into_bytes())));
    server.keyspace.bump_epoch();
    rewritten(
        Reply::bulk_str(formatted.clone()),
        vec![b"SET".to_vec(), argv[1].clone(), formatted.into_bytes(), b"KEEPTTL".to_vec()],
    )
}

pub fn setrange(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let offset = parse_int(&argv[2])?;
    if offset < 0 {
        return Err(CommandError::OutOfRange);
    }
    let offset = offset as usize;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if argv[3].is_empty() && !db.exists(&argv[1], now) {
        return plain(Reply::Integer(0));
    }
    let mut s = match db.get_typed(&argv[1], now, is_string)? {
        Some(e) => match &e.value {
            Value::String(s) => s.clone(),
            _ => unreachable!(),
        },
        None => Vec::new(),
    };
    if s.len() < offset + argv[3].len() {
        s.resize(offset + argv[3].len(), 0);
    }
    s[offset..offset + argv[3].len()].copy_from_slice(&argv[3]);
    let len = s.len();
    db.set(argv[1].clone(), Entry::new(Value::String(s)));
    server.keyspace.bump_epoch();
    plain(Reply::Integer(len as i64))
}

pub fn getrange(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let mut start = parse_int(&argv[2])?;
    let mut end = parse_int(&argv[3])?;
    let s = get_string(server, session, &argv[1])?.unwrap_or(&[]);
    let len = s.len() as i64;
    if len == 0 {
        return plain(Reply::Bulk(Vec::new()));
    }
    if start < 0 {
        start = (len + start).max(0);
    }
    if end < 0 {
        end = len + end;
    }
    end = end.min(len - 1);
    if start > end || start >= len {
        return plain(Reply::Bulk(Vec::new()));
    }
    plain(Reply::Bulk(s[start as usize..=end as usize].to_vec()))
}

pub fn setbit(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let offset = parse_int(&argv[2])?;
    if offset < 0 {
        return Err(CommandError::OutOfRange);
    }
    let bit = parse_int(&argv[3])?;
    if bit != 0 && bit != 1 {
        return Err(CommandError::Custom("ERR bit is not an integer or out of range".into()));
    }
    let byte_idx = offset as usize / 8;
    let bit_idx = 7 - (offset as usize % 8);
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let mut s = match db.get_typed(&argv[1], now, is_string)? {
        Some(e) => match &e.value {
            Value::String(s) => s.clone(),
            _ => unreachable!(),
        },
        None => Vec::new(),
    };
    if s.len() <= byte_idx {
        s.resize(byte_idx + 1, 0);
    }
    let old = (s[byte_idx] >> bit_idx) & 1;
    if bit == 1 {
        s[byte_idx] |= 1 << bit_idx;
    } else {
        s[byte_idx] &= !(1 << bit_idx);
    }
    db.set(argv[1].clone(), Entry::new(Value::String(s)));
    server.keyspace.bump_epoch();
    plain(Reply::Integer(old as i64))
}

pub fn getbit(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let offset = parse_int(&argv[2])?;
    if offset < 0 {
        return Err(CommandError::OutOfRange);
    }
    let s = get_string(server, session, &argv[1])?.unwrap_or(&[]);
    let byte_idx = offset as usize / 8;
    if byte_idx >= s.len() {
        return plain(Reply::Integer(0));
    }
    let bit_idx = 7 - (offset as usize % 8);
    plain(Reply::Integer(((s[byte_idx] >> bit_idx) & 1) as i64))
}

/// `LCS key1 key2 [LEN] [IDX] [MINMATCHLEN len] [WITHMATCHLEN]`: longest
/// common subsequence of two strings, via the standard O(n*m)
/// dynamic-programming table, backtracked into contiguous match runs
/// for `IDX`.
pub fn lcs(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let mut want_len = false;
    let mut want_idx = false;
    let mut min_match_len: i64 = 0;
    let mut with_match_len = false;
    let mut i = 3;
    while i < argv.len() {
        let tok = String::from_utf8_lossy(&argv[i]).to_ascii_uppercase();
        match tok.as_str() {
            "LEN" => want_len = true,
            "IDX" => want_idx = true,
            "WITHMATCHLEN" => with_match_len = true,
            "MINMATCHLEN" => {
                i += 1;
                min_match_len = parse_int(argv.get(i).ok_or(CommandError::Syntax)?)?;
            }
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }
    if want_len && want_idx {
        return Err(CommandError::Custom(
            "ERR If you want both the length and the indexes, please just use IDX.".into(),
        ));
    }

    let a = get_string(server, session, &argv[1])?.unwrap_or(&[]).to_vec();
    let b = get_string(server, session, &argv[2])?.unwrap_or(&[]).to_vec();

    let n = a.len();
    let m = b.len();
    let mut dp = vec![vec![0u32; m + 1]; n + 1];
    for x in 1..=n {
        for y in 1..=m {
            dp[x][y] = if a[x - 1] == b[y - 1] { dp[x - 1][y - 1] + 1 } else { dp[x - 1][y].max(dp[x][y - 1]) };
        }
    }
    let total_len = dp[n][m] as i64;

    if want_len {
        return plain(Reply::Integer(total_len));
    }

    let mut seq = Vec::new();
    let mut matches: Vec<(usize, usize, usize, usize, usize)> = Vec::new();
    let (mut x, mut y) = (n, m);
    let mut run_len = 0usize;
    let (mut a_end, mut b_end) = (0usize, 0usize);
    while x > 0 && y > 0 {
        if a[x - 1] == b[y - 1] {
            if run_len == 0 {
                a_end = x - 1;
                b_end = y - 1;
            }
            seq.push(a[x - 1]);
            run_len += 1;
            x -= 1;
            y -= 1;
        } else {
            if run_len > 0 {
                matches.push((a_end, x, b_end, y, run_len));
                run_len = 0;
            }
            if dp[x - 1][y] >= dp[x][y - 1] {
                x -= 1;
            } else {
                y -= 1;
            }
        }
    }
    if run_len > 0 {
        matches.push((a_end, x, b_end, y, run_len));
    }
    seq.reverse();

    if !want_idx {
        return plain(Reply::Bulk(seq));
    }

    let mut match_replies = Vec::new();
    for (a_end, a_start, b_end, b_start, len) in matches {
        if (len as i64) < min_match_len {
            continue;
        }
        let mut entry = vec![
            Reply::Array(vec![Reply::Integer(a_start as i64), Reply::Integer(a_end as i64)]),
            Reply::Array(vec![Reply::Integer(b_start as i64), Reply::Integer(b_end as i64)]),
        ];
        if with_match_len {
            entry.push(Reply::Integer(len as i64));
        }
        match_replies.push(Reply::Array(entry));
    }
    plain(Reply::Map(vec![
        (Reply::Bulk(b"matches".to_vec()), Reply::Array(match_replies)),
        (Reply::Bulk(b"len".to_vec()), Reply::Integer(total_len)),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn setup() -> (Server, Session) {
        (Server::new(Config::default()), Session::new(1, false))
    }

    #[test]
    fn set_then_get_round_trips() {
        let (mut s, mut sess) = setup();
        set(&mut s, &mut sess, &[b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()]).unwrap();
        let (reply, _) = get(&mut s, &mut sess, &[b"GET".to_vec(), b"k".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Bulk(b"v".to_vec()));
    }

    #[test]
    fn set_nx_on_existing_key_returns_nil() {
        let (mut s, mut sess) = setup();
        set(&mut s, &mut sess, &[b"SET".to_vec(), b"k".to_vec(), b"v1".to_vec()]).unwrap();
        let (reply, _) = set(&mut s, &mut sess, &[b"SET".to_vec(), b"k".to_vec(), b"v2".to_vec(), b"NX".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Nil);
    }

    #[test]
    fn set_with_ex_rewrites_to_pxat() {
        let (mut s, mut sess) = setup();
        let (_, repl) = set(&mut s, &mut sess, &[b"SET".to_vec(), b"k".to_vec(), b"v".to_vec(), b"EX".to_vec(), b"10".to_vec()]).unwrap();
        let repl = repl.unwrap();
        assert_eq!(repl[0], b"SET");
        assert_eq!(repl[3], b"PXAT");
    }

    #[test]
    fn incr_on_non_numeric_errors() {
        let (mut s, mut sess) = setup();
        set(&mut s, &mut sess, &[b"SET".to_vec(), b"k".to_vec(), b"abc".to_vec()]).unwrap();
        let err = incrby(&mut s, &mut sess, &[b"INCR".to_vec(), b"k".to_vec()], 1).unwrap_err();
        assert_eq!(err, CommandError::NotInteger);
    }

    #[test]
    fn getdel_suppresses_when_key_missing() {
        let (mut s, mut sess) = setup();
        let (reply, repl) = getdel(&mut s, &mut sess, &[b"GETDEL".to_vec(), b"missing".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Nil);
        assert_eq!(repl, Some(Vec::new()));
    }

    #[test]
    fn setrange_on_missing_key_with_empty_value_is_noop() {
        let (mut s, mut sess) = setup();
        let (reply, _) = setrange(&mut s, &mut sess, &[b"SETRANGE".to_vec(), b"k".to_vec(), b"0".to_vec(), b"".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Integer(0));
    }

    #[test]
    fn incrbyfloat_rewrites_as_literal_set() {
        let (mut s, mut sess) = setup();
        let (_, repl) = incrbyfloat(&mut s, &mut sess, &[b"INCRBYFLOAT".to_vec(), b"k".to_vec(), b"1.5".to_vec()]).unwrap();
        let repl = repl.unwrap();
        assert_eq!(repl[0], b"SET");
        assert_eq!(repl[3], b"KEEPTTL");
    }

    #[test]
    fn lcs_returns_longest_common_subsequence() {
        let (mut s, mut sess) = setup();
        set(&mut s, &mut sess, &[b"SET".to_vec(), b"k1".to_vec(), b"ohmytext".to_vec()]).unwrap();
        set(&mut s, &mut sess, &[b"SET".to_vec(), b"k2".to_vec(), b"mynewtext".to_vec()]).unwrap();
        let (reply, _) = lcs(&mut s, &mut sess, &[b"LCS".to_vec(), b"k1".to_vec(), b"k2".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Bulk(b"mytext".to_vec()));
    }

    #[test]
    fn lcs_len_returns_integer() {
        let (mut s, mut sess) = setup();
        set(&mut s, &mut sess, &[b"SET".to_vec(), b"k1".to_vec(), b"ohmytext".to_vec()]).unwrap();
        set(&mut s, &mut sess, &[b"SET".to_vec(), b"k2".to_vec(), b"mynewtext".to_vec()]).unwrap();
        let (reply, _) = lcs(&mut s, &mut sess, &[b"LCS".to_vec(), b"k1".to_vec(), b"k2".to_vec(), b"LEN".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Integer(6));
    }

    #[test]
    fn lcs_len_and_idx_together_is_syntax_error() {
        let (mut s, mut sess) = setup();
        let err = lcs(&mut s, &mut sess, &[b"LCS".to_vec(), b"k1".to_vec(), b"k2".to_vec(), b"LEN".to_vec(), b"IDX".to_vec()]).unwrap_err();
        assert!(matches!(err, CommandError::Custom(_)));
    }
}
