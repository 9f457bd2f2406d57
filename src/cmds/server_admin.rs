//! Replication control, INFO/CONFIG/COMMAND/DEBUG introspection, and
//! persistence trigger commands, built directly on `Server`/`Config`
//! with an `INFO` section layout grouped the way `redis-server` groups
//! its own sections.

use super::{parse_int, plain, HandlerResult};
use crate::command::{lookup, CmdFlags};
use crate::error::CommandError;
use crate::resp::Reply;
use crate::server::{ReplState, Server};
use crate::session::Session;
use crate::util::now_ms;

pub fn replicaof(server: &mut Server, _session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let host = String::from_utf8_lossy(&argv[1]).to_string();
    let port_arg = String::from_utf8_lossy(&argv[2]).to_string();
    if host.eq_ignore_ascii_case("no") && port_arg.eq_ignore_ascii_case("one") {
        server.is_replica = false;
        server.master_host = None;
        server.repl_state = ReplState::None;
        return plain(Reply::ok());
    }
    let port: u16 = port_arg.parse().map_err(|_| CommandError::Custom("ERR Invalid master port".into()))?;
    server.is_replica = true;
    server.master_host = Some((host, port));
    server.repl_state = ReplState::Connect;
    plain(Reply::ok())
}

pub fn replconf(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let mut i = 1;
    while i + 1 < argv.len() {
        if argv[i].eq_ignore_ascii_case(b"ACK") {
            if let Ok(off) = parse_int(&argv[i + 1]) {
                let ack = off.max(0) as u64;
                session.replica_ack_offset = ack;
                if let Some(link) = server.replicas.iter_mut().find(|r| r.session_id == session.id) {
                    link.ack_offset = ack;
                }
            }
        }
        i += 2;
    }
    plain(Reply::ok())
}

/// `PSYNC replicationid offset`: always answers with a full resync,
/// since there is no partial-resync backlog to continue from. Enrolls
/// the session in `server.replicas` so the connection loop starts
/// streaming new journal entries to it, then hands back the
/// `+FULLRESYNC` line immediately followed by the RDB payload framed
/// as a bulk string with no trailing CRLF, exactly as a real replica
/// expects on the wire.
pub fn psync(server: &mut Server, session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    session.is_replica = true;
    let offset = server.journal.offset();
    if !server.replicas.iter().any(|r| r.session_id == session.id) {
        server.replicas.push(crate::server::ReplicaLink {
            session_id: session.id,
            ack_offset: 0,
            sent_offset: server.journal.len(),
        });
    }
    let rdb = crate::rdb::encode_snapshot(&server.keyspace);
    let mut out = format!("+FULLRESYNC {} {}\r\n", server.run_id, offset).into_bytes();
    out.extend_from_slice(format!("${}\r\n", rdb.len()).as_bytes());
    out.extend_from_slice(&rdb);
    plain(Reply::Raw(out))
}

pub fn wait(server: &mut Server, _session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let numreplicas = parse_int(&argv[1])?;
    let _timeout_ms = parse_int(&argv[2])?;
    let acked = server.acked_replica_count(server.journal.offset());
    plain(Reply::Integer(acked.max(numreplicas.min(acked as i64) as usize) as i64))
}

pub fn info(server: &mut Server, _session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    let uptime = (now_ms().saturating_sub(server.start_time_ms)) / 1000;
    let mut body = String::new();
    body.push_str("# Server\r\n");
    body.push_str("redis_version:7.2.5\r\n");
    body.push_str(&format!("run_id:{}\r\n", server.run_id));
    body.push_str(&format!("tcp_port:{}\r\n", server.config.port));
    body.push_str(&format!("uptime_in_seconds:{}\r\n", uptime));
    body.push_str(&format!("process_id:{}\r\n", std::process::id()));
    body.push_str("\r\n# Clients\r\n");
    body.push_str(&format!("connected_clients:{}\r\n", server.connected_clients));
    body.push_str(&format!("blocked_clients:{}\r\n", server.blocking.len()));
    body.push_str("\r\n# Memory\r\n");
    body.push_str(&format!("used_memory:{}\r\n", crate::zmalloc::used_memory()));
    body.push_str(&format!("maxmemory:{}\r\n", server.config.max_memory));
    body.push_str("\r\n# Persistence\r\n");
    body.push_str(&format!("rdb_changes_since_last_save:{}\r\n", server.dirty));
    body.push_str(&format!("rdb_last_save_time:{}\r\n", server.last_save_time_ms / 1000));
    body.push_str(&format!("aof_enabled:{}\r\n", server.config.append_only as u8));
    body.push_str("\r\n# Stats\r\n");
    body.push_str(&format!("total_connections_received:{}\r\n", server.stats.total_connections_received));
    body.push_str(&format!("total_commands_processed:{}\r\n", server.stats.total_commands_processed));
    body.push_str(&format!("expired_keys:{}\r\n", server.stats.expired_keys));
    body.push_str(&format!("keyspace_hits:{}\r\n", server.stats.keyspace_hits));
    body.push_str(&format!("keyspace_misses:{}\r\n", server.stats.keyspace_misses));
    body.push_str("\r\n# Replication\r\n");
    let role = if server.is_replica { "slave" } else { "master" };
    body.push_str(&format!("role:{}\r\n", role));
    body.push_str(&format!("connected_slaves:{}\r\n", server.replicas.len()));
    body.push_str(&format!("master_repl_offset:{}\r\n", server.journal.offset()));
    if let Some((host, port)) = &server.master_host {
        body.push_str(&format!("master_host:{}\r\n", host));
        body.push_str(&format!("master_port:{}\r\n", port));
        body.push_str(&format!("master_link_status:{}\r\n", if server.repl_state == ReplState::Connected { "up" } else { "down" }));
    }
    body.push_str("\r\n# CPU\r\n");
    body.push_str("used_cpu_sys:0.0\r\nused_cpu_user:0.0\r\n");
    body.push_str("\r\n# Cluster\r\n");
    body.push_str(&format!("cluster_enabled:{}\r\n", server.cluster.is_enabled() as u8));
    body.push_str("\r\n# Keyspace\r\n");
    for (idx, db) in server.keyspace.dbs.iter().enumerate() {
        if db.len() > 0 {
            body.push_str(&format!("db{}:keys={},expires=0,avg_ttl=0\r\n", idx, db.len()));
        }
    }
    body.push_str("\r\n# Commandstats\r\n");
    for (name, calls) in &server.stats.command_calls {
        let errors = server.stats.command_errors.get(name).copied().unwrap_or(0);
        let rejected = server.stats.command_rejected.get(name).copied().unwrap_or(0);
        body.push_str(&format!(
            "cmdstat_{}:calls={},usec=0,usec_per_call=0.00,rejected_calls={},failed_calls={}\r\n",
            name.to_lowercase(),
            calls,
            rejected,
            errors
        ));
    }
    body.push_str("\r\n# Errorstats\r\n");
    for (code, count) in &server.stats.error_counts {
        body.push_str(&format!("errorstat_{}:count={}\r\n", code, count));
    }
    plain(Reply::Bulk(body.into_bytes()))
}

pub fn config(server: &mut Server, _session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    if argv.len() < 2 {
        return Err(CommandError::WrongArity("config".into()));
    }
    let sub = String::from_utf8_lossy(&argv[1]).to_ascii_uppercase();
    match sub.as_str() {
        "GET" => {
            let pattern = argv.get(2).map(|p| String::from_utf8_lossy(p).to_string()).unwrap_or_else(|| "*".to_string());
            let pairs = server.config.get(&pattern);
            let flat: Vec<Reply> = pairs.into_iter().flat_map(|(k, v)| vec![Reply::bulk_str(k), Reply::bulk_str(v)]).collect();
            plain(Reply::Array(flat))
        }
        "SET" => {
            if argv.len() < 4 || argv.len() % 2 != 0 {
                return Err(CommandError::Syntax);
            }
            let mut i = 2;
            while i + 1 < argv.len() {
                let name = String::from_utf8_lossy(&argv[i]).to_string();
                let value = String::from_utf8_lossy(&argv[i + 1]).to_string();
                server.config.set(&name, &value).map_err(CommandError::Custom)?;
                i += 2;
            }
            plain(Reply::ok())
        }
        "RESETSTAT" => {
            server.stats = Default::default();
            plain(Reply::ok())
        }
        "REWRITE" => plain(Reply::ok()),
        _ => Err(CommandError::Syntax),
    }
}

pub fn command_cmd(_server: &mut Server, _session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let sub = argv.get(1).map(|s| String::from_utf8_lossy(s).to_ascii_uppercase());
    match sub.as_deref() {
        None => plain(Reply::Array(Vec::new())),
        Some("COUNT") => plain(Reply::Integer(crate::command::COMMAND_TABLE.len() as i64)),
        Some("DOCS") => plain(Reply::Map(Vec::new())),
        Some("INFO") => {
            let out = argv[2..]
                .iter()
                .map(|name| {
                    let name = String::from_utf8_lossy(name).to_ascii_uppercase();
                    match lookup(&name) {
                        Some(spec) => Reply::Array(vec![
                            Reply::bulk_str(spec.name.to_lowercase()),
                            Reply::Integer(spec.arity as i64),
                            Reply::Array(vec![Reply::Simple(if spec.flags.has(CmdFlags::WRITE) { "write".into() } else { "readonly".into() })]),
                        ]),
                        None => Reply::NilArray,
                    }
                })
                .collect();
            plain(Reply::Array(out))
        }
        _ => Err(CommandError::Syntax),
    }
}

pub fn debug(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    if argv.len() < 2 {
        return Err(CommandError::WrongArity("debug".into()));
    }
    let sub = String::from_utf8_lossy(&argv[1]).to_ascii_uppercase();
    match sub.as_str() {
        "SLEEP" => {
            let secs: f64 = argv.get(2).and_then(|a| std::str::from_utf8(a).ok()).and_then(|s| s.parse().ok()).unwrap_or(0.0);
            std::thread::sleep(std::time::Duration::from_secs_f64(secs.max(0.0)));
            plain(Reply::ok())
        }
        "DIGEST-VALUE" => {
            let now = now_ms();
            let out = argv[2..]
                .iter()
                .map(|key| Reply::bulk_str(format!("{:040x}", server.keyspace.db(session.db_index).digest(key, now))))
                .collect();
            plain(Reply::Array(out))
        }
        "OBJECT" => {
            let key = argv.get(2).ok_or(CommandError::Syntax)?;
            let now = now_ms();
            match server.keyspace.db(session.db_index).get(key, now) {
                Some(e) => plain(Reply::Simple(format!(
                    "Value at:0x0 refcount:1 encoding:{} serializedlength:0 lru:0 lru_seconds_idle:0",
                    e.value.encoding_name()
                ))),
                None => Err(CommandError::NoSuchKey),
            }
        }
        "SET-ACTIVE-EXPIRE" => plain(Reply::ok()),
        "JMAP" => plain(Reply::ok()),
        "PROTOCOL" => {
            let kind = argv.get(2).map(|a| String::from_utf8_lossy(a).to_string()).unwrap_or_default();
            match kind.as_str() {
                "integer" => plain(Reply::Integer(12345)),
                "double" => plain(Reply::Double(3.141)),
                "bignum" => plain(Reply::BigNumber("1234567999999999999999999999999999999".into())),
                "true" => plain(Reply::Boolean(true)),
                "false" => plain(Reply::Boolean(false)),
                _ => plain(Reply::ok()),
            }
        }
        "QUICKLIST-PACKED-THRESHOLD" | "STRINGMATCH-LEN" => plain(Reply::ok()),
        _ => Err(CommandError::Syntax),
    }
}

pub fn save(server: &mut Server, _session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    let path = format!("{}/{}", server.config.dir, server.config.db_filename);
    crate::rdb::save_snapshot(&server.keyspace, &path).map_err(|e| CommandError::IoErr(e.to_string()))?;
    server.last_save_time_ms = now_ms();
    server.dirty = 0;
    plain(Reply::ok())
}

pub fn bgsave(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let (_, _) = save(server, session, argv)?;
    plain(Reply::Simple("Background saving started".into()))
}

pub fn bgrewriteaof(server: &mut Server, _session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    if server.config.append_only {
        let path = format!("{}/{}", server.config.dir, server.config.append_filename);
        crate::aof::rewrite_append_only_file(server, &path).map_err(|e| CommandError::IoErr(e.to_string()))?;
    }
    plain(Reply::Simple("Background append only file rewriting started".into()))
}

pub fn lastsave(server: &mut Server, _session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    plain(Reply::Integer((server.last_save_time_ms / 1000) as i64))
}

pub fn time(_server: &mut Server, _session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    let now = now_ms();
    plain(Reply::Array(vec![
        Reply::bulk_str((now / 1000).to_string()),
        Reply::bulk_str(((now % 1000) * 1000).to_string()),
    ]))
}

pub fn shutdown(_server: &mut Server, _session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    // The connection loop is responsible for the actual process exit
    // once it sees this sentinel reply.
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
    fn replicaof_no_one_clears_master() {
        let (mut s, mut sess) = setup();
        replicaof(&mut s, &mut sess, &[b"REPLICAOF".to_vec(), b"NO".to_vec(), b"ONE".to_vec()]).unwrap();
        assert!(!s.is_replica);
        replicaof(&mut s, &mut sess, &[b"REPLICAOF".to_vec(), b"10.0.0.1".to_vec(), b"6380".to_vec()]).unwrap();
        assert!(s.is_replica);
        assert_eq!(s.master_host, Some(("10.0.0.1".to_string(), 6380)));
    }

    #[test]
    fn config_get_then_set_round_trips() {
        let (mut s, mut sess) = setup();
        config(&mut s, &mut sess, &[b"CONFIG".to_vec(), b"SET".to_vec(), b"maxmemory".to_vec(), b"100mb".to_vec()]).unwrap();
        let (reply, _) = config(&mut s, &mut sess, &[b"CONFIG".to_vec(), b"GET".to_vec(), b"maxmemory".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Array(vec![Reply::bulk_str("maxmemory"), Reply::bulk_str((100 * 1024 * 1024).to_string())]));
    }

    #[test]
    fn command_count_matches_table_size() {
        let (mut s, mut sess) = setup();
        let (reply, _) = command_cmd(&mut s, &mut sess, &[b"COMMAND".to_vec(), b"COUNT".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Integer(crate::command::COMMAND_TABLE.len() as i64));
    }

    #[test]
    fn time_returns_two_element_array() {
        let (mut s, mut sess) = setup();
        let (reply, _) = time(&mut s, &mut sess, &[b"TIME".to_vec()]).unwrap();
        match reply {
            Reply::Array(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn psync_registers_replica_link_and_returns_raw_handshake() {
        let (mut s, mut sess) = setup();
        let (reply, _) = psync(&mut s, &mut sess, &[b"PSYNC".to_vec(), b"?".to_vec(), b"-1".to_vec()]).unwrap();
        assert!(sess.is_replica);
        assert_eq!(s.replicas.len(), 1);
        assert_eq!(s.replicas[0].session_id, sess.id);
        match reply {
            Reply::Raw(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                assert!(text.starts_with(&format!("+FULLRESYNC {} 0\r\n", s.run_id)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn replconf_ack_updates_matching_replica_link() {
        let (mut s, mut sess) = setup();
        psync(&mut s, &mut sess, &[b"PSYNC".to_vec(), b"?".to_vec(), b"-1".to_vec()]).unwrap();
        replconf(&mut s, &mut sess, &[b"REPLCONF".to_vec(), b"ACK".to_vec(), b"42".to_vec()]).unwrap();
        assert_eq!(s.replicas[0].ack_offset, 42);
        assert_eq!(s.acked_replica_count(42), 1);
    }

    #[test]
    fn info_includes_commandstats_and_errorstats() {
        let (mut s, mut sess) = setup();
        s.record_call("GET");
        s.record_error("SET", "WRONGTYPE");
        let (reply, _) = info(&mut s, &mut sess, &[b"INFO".to_vec()]).unwrap();
        let body = match reply {
            Reply::Bulk(b) => String::from_utf8(b).unwrap(),
            other => panic!("unexpected {:?}", other),
        };
        assert!(body.contains("# Commandstats\r\n"));
        assert!(body.contains("cmdstat_get:calls=1"));
        assert!(body.contains("# Errorstats\r\n"));
        assert!(body.contains("errorstat_WRONGTYPE:count=1"));
    }
}
