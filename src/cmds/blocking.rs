//! Blocking list/sorted-set commands. Tries the non-blocking path
//! first via `lists`/`zsets`, then parks the session in
//! `blocking::BlockingArbiter` on a miss. The connection loop is
//! expected to interpret a `Reply::NoReply` paired with
//! `session.block.is_some()` as "retry through the arbiter".

use super::{parse_float, plain, HandlerResult};
use crate::resp::Reply;
use crate::server::Server;
use crate::session::{BlockKind, BlockState, Session};
use crate::util::now_ms;

fn parse_deadline(timeout_arg: &[u8]) -> Result<Option<u64>, crate::error::CommandError> {
    let secs = parse_float(timeout_arg)?;
    if secs < 0.0 {
        return Err(crate::error::CommandError::Custom("ERR timeout is negative".into()));
    }
    if secs == 0.0 {
        Ok(None)
    } else {
        Ok(Some(now_ms() + (secs * 1000.0) as u64))
    }
}

pub fn blpop(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], left: bool) -> HandlerResult {
    let keys = &argv[1..argv.len() - 1];
    for key in keys {
        let (reply, rewrite) = super::lists::pop(server, session, &[if left { b"LPOP".to_vec() } else { b"RPOP".to_vec() }, key.clone()], left)?;
        if !matches!(reply, Reply::Nil) {
            return Ok((Reply::Array(vec![Reply::Bulk(key.clone()), reply]), rewrite));
        }
    }
    let deadline = parse_deadline(&argv[argv.len() - 1])?;
    session.block = Some(BlockState {
        kind: BlockKind::List,
        keys: keys.to_vec(),
        deadline_ms: deadline,
        original_args: argv.to_vec(),
    });
    plain(Reply::NoReply)
}

pub fn blmove(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let (reply, rewrite) = super::lists::lmove(server, session, &argv[..5])?;
    if !matches!(reply, Reply::Nil) {
        return Ok((reply, rewrite));
    }
    let deadline = parse_deadline(&argv[5])?;
    session.block = Some(BlockState {
        kind: BlockKind::List,
        keys: vec![argv[1].clone()],
        deadline_ms: deadline,
        original_args: argv.to_vec(),
    });
    plain(Reply::NoReply)
}

pub fn bzpop(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], min: bool) -> HandlerResult {
    let keys = &argv[1..argv.len() - 1];
    for key in keys {
        let cmd_name = if min { b"ZPOPMIN".to_vec() } else { b"ZPOPMAX".to_vec() };
        let (reply, rewrite) = super::zsets::zpop(server, session, &[cmd_name, key.clone()], min)?;
        match reply {
            Reply::Array(items) if !items.is_empty() => {
                let mut out = vec![Reply::Bulk(key.clone())];
                out.extend(items);
                return Ok((Reply::Array(out), rewrite));
            }
            _ => {}
        }
    }
    let deadline = parse_deadline(&argv[argv.len() - 1])?;
    session.block = Some(BlockState {
        kind: BlockKind::SortedSet,
        keys: keys.to_vec(),
        deadline_ms: deadline,
        original_args: argv.to_vec(),
    });
    plain(Reply::NoReply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn setup() -> (Server, Session) {
        (Server::new(Config::default()), Session::new(1, false))
    }

    #[test]
    fn blpop_returns_immediately_when_data_present() {
        let (mut s, mut sess) = setup();
        super::super::lists::push(&mut s, &mut sess, &[b"LPUSH".to_vec(), b"k".to_vec(), b"v".to_vec()], true, false).unwrap();
        let (reply, _) = blpop(&mut s, &mut sess, &[b"BLPOP".to_vec(), b"k".to_vec(), b"0".to_vec()], true).unwrap();
        assert_eq!(reply, Reply::Array(vec![Reply::Bulk(b"k".to_vec()), Reply::Bulk(b"v".to_vec())]));
        assert!(sess.block.is_none());
    }

    #[test]
    fn blpop_parks_session_when_no_data() {
        let (mut s, mut sess) = setup();
        let (reply, _) = blpop(&mut s, &mut sess, &[b"BLPOP".to_vec(), b"missing".to_vec(), b"1".to_vec()], true).unwrap();
        assert_eq!(reply, Reply::NoReply);
        assert!(sess.block.is_some());
    }

    #[test]
    fn bzpopmin_returns_lowest_score_member() {
        let (mut s, mut sess) = setup();
        super::super::zsets::zadd(&mut s, &mut sess, &[b"ZADD".to_vec(), b"z".to_vec(), b"1".to_vec(), b"a".to_vec(), b"2".to_vec(), b"b".to_vec()]).unwrap();
        let (reply, _) = bzpop(&mut s, &mut sess, &[b"BZPOPMIN".to_vec(), b"z".to_vec(), b"0".to_vec()], true).unwrap();
        assert_eq!(reply, Reply::Array(vec![Reply::Bulk(b"z".to_vec()), Reply::Bulk(b"a".to_vec()), Reply::Double(1.0)]));
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let (mut s, mut sess) = setup();
        let err = blpop(&mut s, &mut sess, &[b"BLPOP".to_vec(), b"k".to_vec(), b"-1".to_vec()], true).unwrap_err();
        assert!(matches!(err, crate::error::CommandError::Custom(_)));
    }
}
