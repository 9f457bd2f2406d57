//! Sorted-set commands, backed by `value::SortedSet` (HashMap + skiplist).

use super::{parse_float, parse_int, plain, suppressed, HandlerResult};
use crate::error::CommandError;
use crate::resp::Reply;
use crate::server::Server;
use crate::session::Session;
use crate::util::now_ms;
use crate::value::{Entry, SortedSet, Value};

fn is_zset(v: &Value) -> bool {
    matches!(v, Value::SortedSet(_))
}

struct ZaddOpts {
    nx: bool,
    xx: bool,
    gt: bool,
    lt: bool,
    ch: bool,
    incr: bool,
}

fn parse_zadd_opts(argv: &[Vec<u8>]) -> Result<(ZaddOpts, usize), CommandError> {
    let mut opts = ZaddOpts { nx: false, xx: false, gt: false, lt: false, ch: false, incr: false };
    let mut i = 2;
    while i < argv.len() {
        match String::from_utf8_lossy(&argv[i]).to_ascii_uppercase().as_str() {
            "NX" => { opts.nx = true; i += 1; }
            "XX" => { opts.xx = true; i += 1; }
            "GT" => { opts.gt = true; i += 1; }
            "LT" => { opts.lt = true; i += 1; }
            "CH" => { opts.ch = true; i += 1; }
            "INCR" => { opts.incr = true; i += 1; }
            _ => break,
        }
    }
    if opts.nx && (opts.gt || opts.lt) {
        return Err(CommandError::Syntax);
    }
    Ok((opts, i))
}

pub fn zadd(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let (opts, start) = parse_zadd_opts(argv)?;
    if (argv.len() - start) % 2 != 0 || argv.len() == start {
        return Err(CommandError::Syntax);
    }
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if db.get_typed(&argv[1], now, is_zset)?.is_none() {
        db.set(argv[1].clone(), Entry::new(Value::SortedSet(SortedSet::default())));
    }
    let entry = db.get_typed_mut(&argv[1], now, is_zset)?.unwrap();
    let z = match &mut entry.value { Value::SortedSet(z) => z, _ => unreachable!() };
    let mut added = 0i64;
    let mut changed = 0i64;
    let mut last_score = None;
    let mut i = start;
    while i + 1 < argv.len() {
        let score = parse_float(&argv[i])?;
        let member = argv[i + 1].clone();
        let existing = z.score(&member);
        let apply = match (opts.nx, opts.xx, opts.gt, opts.lt, existing) {
            (true, _, _, _, Some(_)) => false,
            (_, true, _, _, None) => false,
            (_, _, true, _, Some(old)) => score > old,
            (_, _, _, true, Some(old)) => score < old,
            _ => true,
        };
        if apply {
            let final_score = if opts.incr {
                existing.unwrap_or(0.0) + score
            } else {
                score
            };
            let was_new = z.insert(member, final_score);
            if was_new {
                added += 1;
            } else if existing != Some(final_score) {
                changed += 1;
            }
            last_score = Some(final_score);
        }
        i += 2;
    }
    server.keyspace.bump_epoch();
    if opts.incr {
        plain(last_score.map(Reply::Double).unwrap_or(Reply::Nil))
    } else {
        plain(Reply::Integer(if opts.ch { added + changed } else { added }))
    }
}

pub fn zrem(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_zset)? {
        Some(e) => e,
        None => return suppressed(Reply::Integer(0)),
    };
    let z = match &mut entry.value { Value::SortedSet(z) => z, _ => unreachable!() };
    let mut removed = 0i64;
    for m in &argv[2..] {
        if z.remove(m) {
            removed += 1;
        }
    }
    let emptied = z.len() == 0;
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

pub fn zincrby(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let delta = parse_float(&argv[2])?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if db.get_typed(&argv[1], now, is_zset)?.is_none() {
        db.set(argv[1].clone(), Entry::new(Value::SortedSet(SortedSet::default())));
    }
    let entry = db.get_typed_mut(&argv[1], now, is_zset)?.unwrap();
    let z = match &mut entry.value { Value::SortedSet(z) => z, _ => unreachable!() };
    let new_score = z.score(&argv[3]).unwrap_or(0.0) + delta;
    z.insert(argv[3].clone(), new_score);
    server.keyspace.bump_epoch();
    plain(Reply::Double(new_score))
}

pub fn zscore(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let score = db.get_typed(&argv[1], now, is_zset)?.and_then(|e| match &e.value { Value::SortedSet(z) => z.score(&argv[2]), _ => unreachable!() });
    plain(score.map(Reply::Double).unwrap_or(Reply::Nil))
}

pub fn zmscore(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let z = db.get_typed(&argv[1], now, is_zset)?.map(|e| match &e.value { Value::SortedSet(z) => z, _ => unreachable!() });
    let out = argv[2..].iter().map(|m| z.and_then(|z| z.score(m)).map(Reply::Double).unwrap_or(Reply::Nil)).collect();
    plain(Reply::Array(out))
}

pub fn zcard(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let len = db.get_typed(&argv[1], now, is_zset)?.map(|e| match &e.value { Value::SortedSet(z) => z.len(), _ => unreachable!() }).unwrap_or(0);
    plain(Reply::Integer(len as i64))
}

fn parse_score_bound(s: &[u8]) -> Result<(f64, bool), CommandError> {
    let text = std::str::from_utf8(s).map_err(|_| CommandError::Custom("ERR min or max is not a float".into()))?;
    if let Some(rest) = text.strip_prefix('(') {
        let v = rest.parse::<f64>().map_err(|_| CommandError::Custom("ERR min or max is not a float".into()))?;
        Ok((v, true))
    } else {
        let v = text.parse::<f64>().map_err(|_| CommandError::Custom("ERR min or max is not a float".into()))?;
        Ok((v, false))
    }
}

pub fn zcount(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let (min, min_excl) = parse_score_bound(&argv[2])?;
    let (max, max_excl) = parse_score_bound(&argv[3])?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let z = match db.get_typed(&argv[1], now, is_zset)? {
        Some(e) => match &e.value { Value::SortedSet(z) => z, _ => unreachable!() },
        None => return plain(Reply::Integer(0)),
    };
    let count = z
        .order
        .iter_range_by_score(min, max)
        .into_iter()
        .filter(|(score, _)| !(min_excl && *score == min) && !(max_excl && *score == max))
        .count();
    plain(Reply::Integer(count as i64))
}

pub fn zrange(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], rev: bool) -> HandlerResult {
    let start = parse_int(&argv[2])?;
    let stop = parse_int(&argv[3])?;
    let withscores = argv.get(4).map(|a| a.eq_ignore_ascii_case(b"WITHSCORES")).unwrap_or(false);
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let mut members = match db.get_typed(&argv[1], now, is_zset)? {
        Some(e) => match &e.value { Value::SortedSet(z) => z.order.iter_all(), _ => unreachable!() },
        None => return plain(Reply::Array(Vec::new())),
    };
    if rev {
        members.reverse();
    }
    let len = members.len() as i64;
    let mut s = if start < 0 { (len + start).max(0) } else { start };
    let mut e = if stop < 0 { len + stop } else { stop };
    e = e.min(len - 1);
    if s > e || s >= len || len == 0 {
        return plain(Reply::Array(Vec::new()));
    }
    if s < 0 {
        s = 0;
    }
    let mut out = Vec::new();
    for (score, member) in &members[s as usize..=e as usize] {
        out.push(Reply::Bulk(member.clone()));
        if withscores {
            out.push(Reply::Double(*score));
        }
    }
    plain(Reply::Array(out))
}

pub fn zrangebyscore(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], rev: bool) -> HandlerResult {
    let (lo_arg, hi_arg) = if rev { (&argv[3], &argv[2]) } else { (&argv[2], &argv[3]) };
    let (min, min_excl) = parse_score_bound(lo_arg)?;
    let (max, max_excl) = parse_score_bound(hi_arg)?;
    let withscores = argv.iter().any(|a| a.eq_ignore_ascii_case(b"WITHSCORES"));
    let limit = argv.iter().position(|a| a.eq_ignore_ascii_case(b"LIMIT"));
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let z = match db.get_typed(&argv[1], now, is_zset)? {
        Some(e) => match &e.value { Value::SortedSet(z) => z, _ => unreachable!() },
        None => return plain(Reply::Array(Vec::new())),
    };
    let mut members: Vec<(f64, Vec<u8>)> = z
        .order
        .iter_range_by_score(min, max)
        .into_iter()
        .filter(|(score, _)| !(min_excl && *score == min) && !(max_excl && *score == max))
        .collect();
    if rev {
        members.reverse();
    }
    if let Some(i) = limit {
        let offset = parse_int(argv.get(i + 1).ok_or(CommandError::Syntax)?)? as usize;
        let count = parse_int(argv.get(i + 2).ok_or(CommandError::Syntax)?)?;
        members = if count < 0 {
            members.into_iter().skip(offset).collect()
        } else {
            members.into_iter().skip(offset).take(count as usize).collect()
        };
    }
    let mut out = Vec::new();
    for (score, member) in members {
        out.push(Reply::Bulk(member));
        if withscores {
            out.push(Reply::Double(score));
        }
    }
    plain(Reply::Array(out))
}

pub fn zrank(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], rev: bool) -> HandlerResult {
    let withscore = argv.get(3).map(|a| a.eq_ignore_ascii_case(b"WITHSCORE")).unwrap_or(false);
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let z = match db.get_typed(&argv[1], now, is_zset)? {
        Some(e) => match &e.value { Value::SortedSet(z) => z, _ => unreachable!() },
        None => return plain(if withscore { Reply::NilArray } else { Reply::Nil }),
    };
    let score = match z.score(&argv[2]) {
        Some(s) => s,
        None => return plain(if withscore { Reply::NilArray } else { Reply::Nil }),
    };
    let rank0 = z.order.rank_of(score, &argv[2]).map(|r| r - 1);
    let rank = match rank0 {
        Some(r) if rev => z.len() - 1 - r,
        Some(r) => r,
        None => return plain(if withscore { Reply::NilArray } else { Reply::Nil }),
    };
    if withscore {
        plain(Reply::Array(vec![Reply::Integer(rank as i64), Reply::Double(score)]))
    } else {
        plain(Reply::Integer(rank as i64))
    }
}

pub fn zremrangebyscore(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let (min, min_excl) = parse_score_bound(&argv[2])?;
    let (max, max_excl) = parse_score_bound(&argv[3])?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_zset)? {
        Some(e) => e,
        None => return suppressed(Reply::Integer(0)),
    };
    let z = match &mut entry.value { Value::SortedSet(z) => z, _ => unreachable!() };
    let victims: Vec<Vec<u8>> = z
        .order
        .iter_range_by_score(min, max)
        .into_iter()
        .filter(|(score, _)| !(min_excl && *score == min) && !(max_excl && *score == max))
        .map(|(_, m)| m)
        .collect();
    for m in &victims {
        z.remove(m);
    }
    let emptied = z.len() == 0;
    if emptied {
        db.remove(&argv[1]);
    }
    if victims.is_empty() {
        suppressed(Reply::Integer(0))
    } else {
        server.keyspace.bump_epoch();
        plain(Reply::Integer(victims.len() as i64))
    }
}

pub fn zremrangebyrank(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let start = parse_int(&argv[2])?;
    let stop = parse_int(&argv[3])?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_zset)? {
        Some(e) => e,
        None => return suppressed(Reply::Integer(0)),
    };
    let z = match &mut entry.value { Value::SortedSet(z) => z, _ => unreachable!() };
    let all = z.order.iter_all();
    let len = all.len() as i64;
    let mut s = if start < 0 { (len + start).max(0) } else { start };
    let mut e = if stop < 0 { len + stop } else { stop };
    e = e.min(len - 1);
    if s > e || s >= len || len == 0 {
        return suppressed(Reply::Integer(0));
    }
    if s < 0 {
        s = 0;
    }
    let victims: Vec<Vec<u8>> = all[s as usize..=e as usize].iter().map(|(_, m)| m.clone()).collect();
    for m in &victims {
        z.remove(m);
    }
    let emptied = z.len() == 0;
    if emptied {
        db.remove(&argv[1]);
    }
    server.keyspace.bump_epoch();
    plain(Reply::Integer(victims.len() as i64))
}

pub fn zpop(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], min: bool) -> HandlerResult {
    let count = match argv.get(2) {
        Some(c) => parse_int(c)? as usize,
        None => 1,
    };
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_zset)? {
        Some(e) => e,
        None => return suppressed(Reply::Array(Vec::new())),
    };
    let z = match &mut entry.value { Value::SortedSet(z) => z, _ => unreachable!() };
    let mut all = z.order.iter_all();
    if !min {
        all.reverse();
    }
    let taken: Vec<(f64, Vec<u8>)> = all.into_iter().take(count).collect();
    for (_, m) in &taken {
        z.remove(m);
    }
    let emptied = z.len() == 0;
    if emptied {
        db.remove(&argv[1]);
    }
    if taken.is_empty() {
        return suppressed(Reply::Array(Vec::new()));
    }
    server.keyspace.bump_epoch();
    let mut out = Vec::new();
    for (score, member) in taken {
        out.push(Reply::Bulk(member));
        out.push(Reply::Double(score));
    }
    plain(Reply::Array(out))
}

pub fn zscan(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let members = db.get_typed(&argv[1], now, is_zset)?.map(|e| match &e.value { Value::SortedSet(z) => z.order.iter_all(), _ => unreachable!() }).unwrap_or_default();
    let pattern = argv.iter().position(|a| a.eq_ignore_ascii_case(b"MATCH")).and_then(|i| argv.get(i + 1)).map(|p| String::from_utf8_lossy(p).to_string());
    let mut out = Vec::new();
    for (score, member) in members {
        if let Some(p) = &pattern {
            if !crate::db::glob_match(p, &member) {
                continue;
            }
        }
        out.push(Reply::Bulk(member));
        out.push(Reply::Bulk(crate::resp::format_double(score).into_bytes()));
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
    fn zadd_then_zscore() {
        let (mut s, mut sess) = setup();
        zadd(&mut s, &mut sess, &[b"ZADD".to_vec(), b"z".to_vec(), b"1".to_vec(), b"a".to_vec()]).unwrap();
        let (reply, _) = zscore(&mut s, &mut sess, &[b"ZSCORE".to_vec(), b"z".to_vec(), b"a".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Double(1.0));
    }

    #[test]
    fn zadd_nx_skips_existing_member() {
        let (mut s, mut sess) = setup();
        zadd(&mut s, &mut sess, &[b"ZADD".to_vec(), b"z".to_vec(), b"1".to_vec(), b"a".to_vec()]).unwrap();
        zadd(&mut s, &mut sess, &[b"ZADD".to_vec(), b"z".to_vec(), b"NX".to_vec(), b"2".to_vec(), b"a".to_vec()]).unwrap();
        let (reply, _) = zscore(&mut s, &mut sess, &[b"ZSCORE".to_vec(), b"z".to_vec(), b"a".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Double(1.0));
    }

    #[test]
    fn zrange_orders_by_score() {
        let (mut s, mut sess) = setup();
        zadd(&mut s, &mut sess, &[b"ZADD".to_vec(), b"z".to_vec(), b"2".to_vec(), b"b".to_vec(), b"1".to_vec(), b"a".to_vec()]).unwrap();
        let (reply, _) = zrange(&mut s, &mut sess, &[b"ZRANGE".to_vec(), b"z".to_vec(), b"0".to_vec(), b"-1".to_vec()], false).unwrap();
        assert_eq!(reply, Reply::Array(vec![Reply::Bulk(b"a".to_vec()), Reply::Bulk(b"b".to_vec())]));
    }

    #[test]
    fn zrank_reverse_inverts_order() {
        let (mut s, mut sess) = setup();
        zadd(&mut s, &mut sess, &[b"ZADD".to_vec(), b"z".to_vec(), b"1".to_vec(), b"a".to_vec(), b"2".to_vec(), b"b".to_vec()]).unwrap();
        let (reply, _) = zrank(&mut s, &mut sess, &[b"ZREVRANK".to_vec(), b"z".to_vec(), b"a".to_vec()], true).unwrap();
        assert_eq!(reply, Reply::Integer(1));
    }
}
