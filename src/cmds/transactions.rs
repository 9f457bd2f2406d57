//! Optimistic transaction commands (MULTI/EXEC/DISCARD/WATCH/UNWATCH),
//! built on `session::TxState`, `db::Database::digest`, and
//! `journal::Journal::begin/commit_transaction`.

use super::{journal_effect, plain, HandlerResult};
use crate::error::CommandError;
use crate::resp::Reply;
use crate::server::Server;
use crate::session::Session;
use crate::util::now_ms;

pub fn multi(_server: &mut Server, session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    if session.tx.active {
        return Err(CommandError::NestedMulti);
    }
    session.begin_multi();
    plain(Reply::ok())
}

pub fn discard(_server: &mut Server, session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    if !session.tx.active {
        return Err(CommandError::WithoutMulti);
    }
    session.discard_multi();
    plain(Reply::ok())
}

pub fn watch(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    if session.tx.active {
        return Err(CommandError::WatchInsideMulti);
    }
    let now = now_ms();
    let db_index = session.db_index;
    for key in &argv[1..] {
        let digest = server.keyspace.db(db_index).digest(key, now);
        session.watch(db_index, key.clone(), digest);
    }
    plain(Reply::ok())
}

pub fn unwatch(_server: &mut Server, session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    session.unwatch();
    plain(Reply::ok())
}

/// Runs the queued commands of a transaction the way the connection
/// loop would run them one at a time: invoke, bump nothing extra
/// (handlers already bump the epoch), account replication.
pub fn exec(server: &mut Server, session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    if !session.tx.active {
        return Err(CommandError::WithoutMulti);
    }
    if session.tx.dirty {
        session.discard_multi();
        return Err(CommandError::ExecAbort);
    }
    let now = now_ms();
    let watch_ok = session.tx.watched.iter().all(|((db, key), digest)| server.keyspace.db(*db).digest(key, now) == *digest);
    let queue = std::mem::take(&mut session.tx.queue);
    session.discard_multi();
    if !watch_ok {
        return plain(Reply::NilArray);
    }
    server.journal.begin_transaction();
    let mut replies = Vec::with_capacity(queue.len());
    for cmd in queue {
        let name = String::from_utf8_lossy(&cmd[0]).to_ascii_uppercase();
        match crate::cmds::invoke(server, session, &name, &cmd) {
            Ok((reply, rewrite)) => {
                replies.push(reply);
                journal_effect(server, session.db_index, &name, &cmd, rewrite);
            }
            Err(e) => replies.push(Reply::Error(e.to_string())),
        }
    }
    server.journal.commit_transaction();
    plain(Reply::Array(replies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn setup() -> (Server, Session) {
        (Server::new(Config::default()), Session::new(1, false))
    }

    #[test]
    fn multi_then_exec_runs_queued_writes() {
        let (mut s, mut sess) = setup();
        multi(&mut s, &mut sess, &[b"MULTI".to_vec()]).unwrap();
        sess.tx.queue.push(vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()]);
        let (reply, _) = exec(&mut s, &mut sess, &[b"EXEC".to_vec()]).unwrap();
        match reply {
            Reply::Array(items) => assert_eq!(items.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(s.keyspace.db(0).exists(b"k", now_ms()));
    }

    #[test]
    fn exec_without_multi_errors() {
        let (mut s, mut sess) = setup();
        let err = exec(&mut s, &mut sess, &[b"EXEC".to_vec()]).unwrap_err();
        assert_eq!(err, CommandError::WithoutMulti);
    }

    #[test]
    fn watch_aborts_exec_when_key_changed() {
        let (mut s, mut sess) = setup();
        watch(&mut s, &mut sess, &[b"WATCH".to_vec(), b"k".to_vec()]).unwrap();
        s.keyspace.db(0).set(b"k".to_vec(), crate::value::Entry::new(crate::value::Value::String(b"changed".to_vec())));
        multi(&mut s, &mut sess, &[b"MULTI".to_vec()]).unwrap();
        sess.tx.queue.push(vec![b"GET".to_vec(), b"k".to_vec()]);
        let (reply, _) = exec(&mut s, &mut sess, &[b"EXEC".to_vec()]).unwrap();
        assert_eq!(reply, Reply::NilArray);
    }

    #[test]
    fn multi_nested_errors() {
        let (mut s, mut sess) = setup();
        multi(&mut s, &mut sess, &[b"MULTI".to_vec()]).unwrap();
        let err = multi(&mut s, &mut sess, &[b"MULTI".to_vec()]).unwrap_err();
        assert_eq!(err, CommandError::NestedMulti);
    }
}
