//! Top-level command gate pipeline: lookup, arity check, then execute,
//! wrapped in the gates a real server needs beyond that core: auth,
//! script-busy, transaction queueing, cluster slot routing, OOM, replica
//! read-only, min-replicas, stale-replica reads. Every connection loop
//! iteration should call `dispatch` exactly once per parsed request; it
//! is the only path allowed to mutate `server.journal`/`server.stats`
//! for a live command (`transactions::exec` and `scripting::eval`
//! re-enter `cmds::invoke` directly and share `cmds::journal_effect`
//! for the journal half).

use crate::cmds;
use crate::cmds::journal_effect;
use crate::command::{self, CmdFlags};
use crate::error::CommandError;
use crate::resp::Reply;
use crate::server::Server;
use crate::session::Session;

const ALWAYS_ALLOWED_WHEN_UNAUTHENTICATED: &[&str] = &["AUTH", "HELLO", "QUIT", "RESET"];
const ALWAYS_ALLOWED_WHEN_SCRIPT_BUSY: &[&str] = &["SCRIPT", "SHUTDOWN"];
const TRANSACTION_CONTROL: &[&str] = &["MULTI", "EXEC", "DISCARD", "WATCH", "UNWATCH", "QUIT", "RESET"];

/// Runs one already-parsed request through every gate, then either
/// queues it (inside MULTI), executes it, or rejects it. Returns the
/// reply to write back to the client; `Reply::NoReply` means "say
/// nothing yet" (either a queued blocking command or SHUTDOWN).
pub fn dispatch(server: &mut Server, session: &mut Session, argv: Vec<Vec<u8>>) -> Reply {
    if argv.is_empty() {
        return Reply::Error(CommandError::Syntax.to_string());
    }
    let name = String::from_utf8_lossy(&argv[0]).to_ascii_uppercase();

    let spec = match command::module_overlay(&name).or_else(|| command::lookup(&name)) {
        Some(spec) => spec,
        None => {
            server.record_rejected(&name);
            return Reply::Error(CommandError::UnknownCommand(format!("unknown command '{}'", name.to_lowercase())).to_string());
        }
    };

    if !command::arity_ok(spec, argv.len()) {
        server.record_rejected(&name);
        return Reply::Error(CommandError::WrongArity(name).to_string());
    }

    if !session.authenticated && !spec.flags.has(CmdFlags::NOAUTH) && !ALWAYS_ALLOWED_WHEN_UNAUTHENTICATED.contains(&name.as_str()) {
        server.record_rejected(&name);
        return Reply::Error(CommandError::NoAuth.to_string());
    }

    if server.script_busy && !ALWAYS_ALLOWED_WHEN_SCRIPT_BUSY.contains(&name.as_str()) {
        server.record_rejected(&name);
        return Reply::Error(CommandError::Busy.to_string());
    }

    if session.tx.active && !TRANSACTION_CONTROL.contains(&name.as_str()) {
        session.tx.queue.push(argv);
        return Reply::Simple("QUEUED".into());
    }

    if let Err(e) = check_gates(server, session, spec, &name, &argv) {
        server.record_rejected(&name);
        return Reply::Error(e.to_string());
    }

    match cmds::invoke(server, session, &name, &argv) {
        Ok((reply, rewrite)) => {
            server.record_call(&name);
            journal_effect(server, session.db_index, &name, &argv, rewrite);
            reply
        }
        Err(e) => {
            server.record_error(&name, crate::error::error_code(&e));
            Reply::Error(e.to_string())
        }
    }
}

fn check_gates(server: &mut Server, session: &mut Session, spec: &command::CommandSpec, name: &str, argv: &[Vec<u8>]) -> Result<(), CommandError> {
    let asking = session.asking;
    session.asking = false;
    if server.cluster.is_enabled() && spec.keys.first_key > 0 {
        let last = if spec.keys.last_key < 0 {
            argv.len() as i32 + spec.keys.last_key
        } else {
            spec.keys.last_key
        };
        let mut i = spec.keys.first_key;
        while i <= last && (i as usize) < argv.len() {
            server.cluster.check(&argv[i as usize], asking)?;
            i += spec.keys.step.max(1);
        }
    }

    if spec.flags.has(CmdFlags::DENYOOM) && server.over_memory_budget() {
        return Err(CommandError::Oom);
    }

    if server.is_replica && spec.flags.has(CmdFlags::WRITE) && name != "REPLCONF" {
        return Err(CommandError::ReadOnly);
    }

    if spec.flags.has(CmdFlags::WRITE) && server.config.min_replicas_to_write > 0 {
        let acked = server.acked_replica_count(server.journal.offset());
        if acked < server.config.min_replicas_to_write {
            return Err(CommandError::NoReplicas);
        }
    }

    if server.is_replica
        && !server.config.replica_serve_stale_data
        && server.repl_state != crate::server::ReplState::Connected
        && spec.flags.has(CmdFlags::READONLY)
    {
        return Err(CommandError::MasterDown);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn setup() -> (Server, Session) {
        (Server::new(Config::default()), Session::new(1, false))
    }

    fn argv(parts: &[&str]) -> Vec<Vec<u8>> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    #[test]
    fn unknown_command_is_rejected() {
        let (mut s, mut sess) = setup();
        let reply = dispatch(&mut s, &mut sess, argv(&["FROBNICATE"]));
        assert!(matches!(reply, Reply::Error(msg) if msg.contains("unknown command")));
    }

    #[test]
    fn set_then_get_round_trips() {
        let (mut s, mut sess) = setup();
        dispatch(&mut s, &mut sess, argv(&["SET", "k", "v"]));
        let reply = dispatch(&mut s, &mut sess, argv(&["GET", "k"]));
        assert_eq!(reply, Reply::Bulk(b"v".to_vec()));
    }

    #[test]
    fn multi_queues_until_exec() {
        let (mut s, mut sess) = setup();
        dispatch(&mut s, &mut sess, argv(&["MULTI"]));
        let queued = dispatch(&mut s, &mut sess, argv(&["SET", "k", "v"]));
        assert_eq!(queued, Reply::Simple("QUEUED".into()));
        assert_eq!(sess.tx.queue.len(), 1);
        dispatch(&mut s, &mut sess, argv(&["EXEC"]));
        assert!(s.keyspace.db(0).exists(b"k", crate::util::now_ms()));
    }

    #[test]
    fn write_on_replica_is_rejected() {
        let (mut s, mut sess) = setup();
        s.is_replica = true;
        let reply = dispatch(&mut s, &mut sess, argv(&["SET", "k", "v"]));
        assert!(matches!(reply, Reply::Error(msg) if msg.starts_with("READONLY")));
    }

    #[test]
    fn moved_redirects_to_slot_owner() {
        let (mut s, mut sess) = setup();
        s.cluster = crate::cluster::ClusterRouter::new(true);
        let slot = crate::cluster::key_slot(b"k");
        s.cluster.set_slot(slot, crate::cluster::SlotRoute::Moved("127.0.0.1:7001".into()));
        let reply = dispatch(&mut s, &mut sess, argv(&["GET", "k"]));
        assert!(matches!(reply, Reply::Error(msg) if msg.starts_with("MOVED")));
    }
}
