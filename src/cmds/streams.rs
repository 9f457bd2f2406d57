//! Stream commands (XADD/XRANGE/XREAD/consumer groups), built on
//! `value::Stream`/`ConsumerGroup`/`PendingEntry` with a deterministic
//! XREADGROUP->XCLAIM replication rewrite.

use super::{parse_int, plain, suppressed, HandlerResult};
use crate::error::CommandError;
use crate::resp::Reply;
use crate::server::Server;
use crate::session::Session;
use crate::util::now_ms;
use crate::value::{ConsumerGroup, Entry, PendingEntry, Stream, StreamId, Value};

fn is_stream(v: &Value) -> bool {
    matches!(v, Value::Stream(_))
}

fn next_id(stream: &Stream, requested: &[u8], now: u64) -> Result<StreamId, CommandError> {
    let text = std::str::from_utf8(requested).map_err(|_| CommandError::Custom("ERR Invalid stream ID specified as stream command argument".into()))?;
    if text == "*" {
        let ms = now.max(stream.last_id.ms);
        let seq = if ms == stream.last_id.ms { stream.last_id.seq + 1 } else { 0 };
        return Ok(StreamId { ms, seq });
    }
    if let Some(prefix) = text.strip_suffix("-*") {
        let ms: u64 = prefix.parse().map_err(|_| CommandError::Custom("ERR Invalid stream ID specified as stream command argument".into()))?;
        let seq = if ms == stream.last_id.ms { stream.last_id.seq + 1 } else { 0 };
        return Ok(StreamId { ms, seq });
    }
    let id = StreamId::parse(text).ok_or(CommandError::Custom("ERR Invalid stream ID specified as stream command argument".into()))?;
    if id <= stream.last_id && stream.entries_added > 0 {
        return Err(CommandError::Custom("ERR The ID specified in XADD is equal or smaller than the target stream top item".into()));
    }
    Ok(id)
}

pub fn xadd(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    if db.get_typed(&argv[1], now, is_stream)?.is_none() {
        db.set(argv[1].clone(), Entry::new(Value::Stream(Stream::default())));
    }
    let entry = db.get_typed_mut(&argv[1], now, is_stream)?.unwrap();
    let st = match &mut entry.value { Value::Stream(s) => s, _ => unreachable!() };
    let id = next_id(st, &argv[2], now)?;
    let fields: Vec<(Vec<u8>, Vec<u8>)> = argv[3..].chunks(2).map(|c| (c[0].clone(), c.get(1).cloned().unwrap_or_default())).collect();
    st.entries.insert(id, fields);
    st.last_id = id;
    st.entries_added += 1;
    server.keyspace.bump_epoch();
    let mut repl = vec![b"XADD".to_vec(), argv[1].clone(), id.to_string().into_bytes()];
    repl.extend_from_slice(&argv[3..]);
    super::rewritten(Reply::bulk_str(id.to_string()), repl)
}

pub fn xlen(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let len = db.get_typed(&argv[1], now, is_stream)?.map(|e| match &e.value { Value::Stream(s) => s.entries.len(), _ => unreachable!() }).unwrap_or(0);
    plain(Reply::Integer(len as i64))
}

fn entry_reply(id: StreamId, fields: &[(Vec<u8>, Vec<u8>)]) -> Reply {
    let flat: Vec<Reply> = fields.iter().flat_map(|(k, v)| vec![Reply::Bulk(k.clone()), Reply::Bulk(v.clone())]).collect();
    Reply::Array(vec![Reply::bulk_str(id.to_string()), Reply::Array(flat)])
}

pub fn xrange(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], rev: bool) -> HandlerResult {
    let (lo_arg, hi_arg) = if rev { (&argv[3], &argv[2]) } else { (&argv[2], &argv[3]) };
    let lo = StreamId::parse(&String::from_utf8_lossy(lo_arg)).ok_or(CommandError::Custom("ERR Invalid stream ID specified as stream command argument".into()))?;
    let hi = StreamId::parse(&String::from_utf8_lossy(hi_arg)).ok_or(CommandError::Custom("ERR Invalid stream ID specified as stream command argument".into()))?;
    let count = argv.iter().position(|a| a.eq_ignore_ascii_case(b"COUNT")).and_then(|i| argv.get(i + 1)).map(|c| parse_int(c)).transpose()?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let st = match db.get_typed(&argv[1], now, is_stream)? {
        Some(e) => match &e.value { Value::Stream(s) => s, _ => unreachable!() },
        None => return plain(Reply::Array(Vec::new())),
    };
    let mut items: Vec<Reply> = st.entries.range(lo..=hi).map(|(id, fields)| entry_reply(*id, fields)).collect();
    if rev {
        items.reverse();
    }
    if let Some(n) = count {
        items.truncate(n as usize);
    }
    plain(Reply::Array(items))
}

pub fn xread(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let streams_pos = argv.iter().position(|a| a.eq_ignore_ascii_case(b"STREAMS")).ok_or(CommandError::Syntax)?;
    let rest = &argv[streams_pos + 1..];
    if rest.len() % 2 != 0 {
        return Err(CommandError::Custom("ERR Unbalanced XREAD list of streams: for each stream key an ID or '$' must be specified.".into()));
    }
    let n = rest.len() / 2;
    let count = argv.iter().position(|a| a.eq_ignore_ascii_case(b"COUNT")).and_then(|i| argv.get(i + 1)).map(|c| parse_int(c)).transpose()?;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let mut out = Vec::new();
    for i in 0..n {
        let key = &rest[i];
        let after = StreamId::parse(&String::from_utf8_lossy(&rest[n + i])).ok_or(CommandError::Custom("ERR Invalid stream ID specified as stream command argument".into()))?;
        if let Some(e) = db.get_typed(key, now, is_stream)? {
            let st = match &e.value { Value::Stream(s) => s, _ => unreachable!() };
            let mut items: Vec<Reply> = st.entries.range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded)).map(|(id, fields)| entry_reply(*id, fields)).collect();
            if let Some(c) = count {
                items.truncate(c as usize);
            }
            if !items.is_empty() {
                out.push(Reply::Array(vec![Reply::Bulk(key.clone()), Reply::Array(items)]));
            }
        }
    }
    if out.is_empty() {
        plain(Reply::NilArray)
    } else {
        plain(Reply::Array(out))
    }
}

pub fn xdel(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_stream)? {
        Some(e) => e,
        None => return suppressed(Reply::Integer(0)),
    };
    let st = match &mut entry.value { Value::Stream(s) => s, _ => unreachable!() };
    let mut removed = 0i64;
    for raw in &argv[2..] {
        if let Some(id) = StreamId::parse(&String::from_utf8_lossy(raw)) {
            if st.entries.remove(&id).is_some() {
                removed += 1;
                if id > st.max_deleted_id {
                    st.max_deleted_id = id;
                }
            }
        }
    }
    if removed > 0 {
        server.keyspace.bump_epoch();
        plain(Reply::Integer(removed))
    } else {
        suppressed(Reply::Integer(0))
    }
}

pub fn xgroup(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let sub = String::from_utf8_lossy(&argv[1]).to_ascii_uppercase();
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    match sub.as_str() {
        "CREATE" => {
            if db.get_typed(&argv[2], now, is_stream)?.is_none() {
                if argv.get(5).map(|a| a.eq_ignore_ascii_case(b"MKSTREAM")).unwrap_or(false) {
                    db.set(argv[2].clone(), Entry::new(Value::Stream(Stream::default())));
                } else {
                    return Err(CommandError::Custom("ERR The XGROUP subcommand requires the key to exist. Note that for CREATE you may want to use the MKSTREAM option to create an empty stream automatically.".into()));
                }
            }
            let entry = db.get_typed_mut(&argv[2], now, is_stream)?.unwrap();
            let st = match &mut entry.value { Value::Stream(s) => s, _ => unreachable!() };
            let start_id = if argv[4] == b"$" { st.last_id } else { StreamId::parse(&String::from_utf8_lossy(&argv[4])).ok_or(CommandError::Custom("ERR Invalid stream ID".into()))? };
            if st.groups.contains_key(&argv[3]) {
                return Err(CommandError::BusyKey);
            }
            st.groups.insert(argv[3].clone(), ConsumerGroup { last_delivered_id: start_id, pending: Default::default() });
            server.keyspace.bump_epoch();
            plain(Reply::ok())
        }
        "DESTROY" => {
            let entry = db.get_typed_mut(&argv[2], now, is_stream)?;
            match entry {
                Some(e) => {
                    let st = match &mut e.value { Value::Stream(s) => s, _ => unreachable!() };
                    let existed = st.groups.remove(&argv[3]).is_some();
                    server.keyspace.bump_epoch();
                    plain(Reply::Integer(existed as i64))
                }
                None => plain(Reply::Integer(0)),
            }
        }
        _ => Err(CommandError::Syntax),
    }
}

pub fn xreadgroup(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let group_pos = argv.iter().position(|a| a.eq_ignore_ascii_case(b"GROUP")).ok_or(CommandError::Syntax)?;
    let group = argv[group_pos + 1].clone();
    let consumer = argv[group_pos + 2].clone();
    let streams_pos = argv.iter().position(|a| a.eq_ignore_ascii_case(b"STREAMS")).ok_or(CommandError::Syntax)?;
    let rest = &argv[streams_pos + 1..];
    let n = rest.len() / 2;
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let mut out = Vec::new();
    let mut claimed_ids: Vec<(Vec<u8>, StreamId)> = Vec::new();
    for i in 0..n {
        let key = &rest[i];
        let id_arg = &rest[n + i];
        let entry = db.get_typed_mut(key, now, is_stream)?.ok_or_else(|| CommandError::Custom(format!("NOGROUP No such key '{}' or consumer group '{}'", String::from_utf8_lossy(key), String::from_utf8_lossy(&group))))?;
        let st = match &mut entry.value { Value::Stream(s) => s, _ => unreachable!() };
        let g = st.groups.get_mut(&group).ok_or_else(|| CommandError::Custom(format!("NOGROUP No such key '{}' or consumer group '{}'", String::from_utf8_lossy(key), String::from_utf8_lossy(&group))))?;
        let new_only = id_arg.as_slice() == b">";
        let items: Vec<(StreamId, Vec<(Vec<u8>, Vec<u8>)>)> = if new_only {
            let after = g.last_delivered_id;
            st.entries.range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded)).map(|(id, f)| (*id, f.clone())).collect()
        } else {
            let after = StreamId::parse(&String::from_utf8_lossy(id_arg)).unwrap_or(StreamId::MIN);
            g.pending.range(after..).filter(|(_, p)| p.consumer == consumer).map(|(id, _)| (*id, st.entries.get(id).cloned().unwrap_or_default())).collect()
        };
        for (id, fields) in &items {
            if new_only {
                g.last_delivered_id = *id;
                g.pending.insert(*id, PendingEntry { consumer: consumer.clone(), delivery_time_ms: now, delivery_count: 1 });
                claimed_ids.push((key.clone(), *id));
            }
            out.push((key.clone(), entry_reply(*id, fields)));
        }
    }
    let replies: Vec<Reply> = {
        let mut grouped: Vec<(Vec<u8>, Vec<Reply>)> = Vec::new();
        for (key, reply) in out {
            match grouped.iter_mut().find(|(k, _)| *k == key) {
                Some((_, v)) => v.push(reply),
                None => grouped.push((key, vec![reply])),
            }
        }
        grouped.into_iter().map(|(k, v)| Reply::Array(vec![Reply::Bulk(k), Reply::Array(v)])).collect()
    };
    server.keyspace.bump_epoch();
    if claimed_ids.is_empty() {
        return suppressed(Reply::Array(replies));
    }
    let mut repl = vec![b"XCLAIM".to_vec(), claimed_ids[0].0.clone(), group.clone(), consumer.clone(), b"0".to_vec()];
    for (_, id) in &claimed_ids {
        repl.push(id.to_string().into_bytes());
    }
    super::rewritten(Reply::Array(replies), repl)
}

pub fn xack(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    let db = server.keyspace.db(session.db_index);
    let entry = match db.get_typed_mut(&argv[1], now, is_stream)? {
        Some(e) => e,
        None => return suppressed(Reply::Integer(0)),
    };
    let st = match &mut entry.value { Value::Stream(s) => s, _ => unreachable!() };
    let g = match st.groups.get_mut(&argv[2]) {
        Some(g) => g,
        None => return suppressed(Reply::Integer(0)),
    };
    let mut acked = 0i64;
    for raw in &argv[3..] {
        if let Some(id) = StreamId::parse(&String::from_utf8_lossy(raw)) {
            if g.pending.remove(&id).is_some() {
                acked += 1;
            }
        }
    }
    if acked > 0 {
        server.keyspace.bump_epoch();
        plain(Reply::Integer(acked))
    } else {
        suppressed(Reply::Integer(0))
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
    fn xadd_auto_id_then_xlen() {
        let (mut s, mut sess) = setup();
        xadd(&mut s, &mut sess, &[b"XADD".to_vec(), b"st".to_vec(), b"*".to_vec(), b"f".to_vec(), b"v".to_vec()]).unwrap();
        let (reply, _) = xlen(&mut s, &mut sess, &[b"XLEN".to_vec(), b"st".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Integer(1));
    }

    #[test]
    fn xadd_rejects_id_not_greater_than_last() {
        let (mut s, mut sess) = setup();
        xadd(&mut s, &mut sess, &[b"XADD".to_vec(), b"st".to_vec(), b"5-0".to_vec(), b"f".to_vec(), b"v".to_vec()]).unwrap();
        let err = xadd(&mut s, &mut sess, &[b"XADD".to_vec(), b"st".to_vec(), b"5-0".to_vec(), b"f".to_vec(), b"v".to_vec()]).unwrap_err();
        assert!(matches!(err, CommandError::Custom(_)));
    }

    #[test]
    fn xgroup_create_requires_mkstream_for_missing_key() {
        let (mut s, mut sess) = setup();
        let err = xgroup(&mut s, &mut sess, &[b"XGROUP".to_vec(), b"CREATE".to_vec(), b"st".to_vec(), b"g".to_vec(), b"$".to_vec()]).unwrap_err();
        assert!(matches!(err, CommandError::Custom(_)));
    }

    #[test]
    fn xrange_covers_inclusive_bounds() {
        let (mut s, mut sess) = setup();
        xadd(&mut s, &mut sess, &[b"XADD".to_vec(), b"st".to_vec(), b"1-0".to_vec(), b"f".to_vec(), b"v".to_vec()]).unwrap();
        xadd(&mut s, &mut sess, &[b"XADD".to_vec(), b"st".to_vec(), b"2-0".to_vec(), b"f".to_vec(), b"v".to_vec()]).unwrap();
        let (reply, _) = xrange(&mut s, &mut sess, &[b"XRANGE".to_vec(), b"st".to_vec(), b"-".to_vec(), b"+".to_vec()], false).unwrap();
        match reply {
            Reply::Array(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
