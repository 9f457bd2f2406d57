//! CLUSTER/ASKING commands, wiring `cluster::ClusterRouter` and
//! `cluster::key_slot` to the client-facing surface.

use super::{parse_int, plain, HandlerResult};
use crate::cluster::{key_slot, SlotRoute, NUM_SLOTS};
use crate::error::CommandError;
use crate::resp::Reply;
use crate::server::Server;
use crate::session::Session;

pub fn asking(_server: &mut Server, session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    session.asking = true;
    plain(Reply::ok())
}

pub fn cluster(server: &mut Server, _session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    if argv.len() < 2 {
        return Err(CommandError::WrongArity("cluster".into()));
    }
    let sub = String::from_utf8_lossy(&argv[1]).to_ascii_uppercase();
    match sub.as_str() {
        "INFO" => {
            let enabled = if server.cluster.is_enabled() { 1 } else { 0 };
            let body = format!(
                "cluster_enabled:{}\r\ncluster_state:ok\r\ncluster_slots_assigned:0\r\ncluster_slots_ok:0\r\ncluster_known_nodes:1\r\ncluster_size:0\r\n",
                enabled
            );
            plain(Reply::Bulk(body.into_bytes()))
        }
        "MYID" => plain(Reply::bulk_str(server.run_id.clone())),
        "KEYSLOT" => {
            let key = argv.get(2).ok_or(CommandError::Syntax)?;
            plain(Reply::Integer(key_slot(key) as i64))
        }
        "SLOTS" => plain(Reply::Array(Vec::new())),
        "SHARDS" => plain(Reply::Array(Vec::new())),
        "NODES" => plain(Reply::Bulk(Vec::new())),
        "SETSLOT" => {
            let slot = parse_int(argv.get(2).ok_or(CommandError::Syntax)?)? as u16;
            if slot >= NUM_SLOTS {
                return Err(CommandError::Custom("ERR Invalid slot".into()));
            }
            let action = argv.get(3).map(|a| String::from_utf8_lossy(a).to_ascii_uppercase()).unwrap_or_default();
            match action.as_str() {
                "STABLE" => server.cluster.set_slot(slot, SlotRoute::Owned),
                "MIGRATING" | "IMPORTING" => {
                    let addr = argv.get(4).map(|a| String::from_utf8_lossy(a).to_string()).unwrap_or_default();
                    server.cluster.set_slot(slot, SlotRoute::Ask(addr));
                }
                "NODE" => server.cluster.set_slot(slot, SlotRoute::Owned),
                _ => return Err(CommandError::Syntax),
            }
            plain(Reply::ok())
        }
        _ => Err(CommandError::Syntax),
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
    fn keyslot_matches_hash_tag() {
        let (mut s, mut sess) = setup();
        let (a, _) = cluster(&mut s, &mut sess, &[b"CLUSTER".to_vec(), b"KEYSLOT".to_vec(), b"{user}.x".to_vec()]).unwrap();
        let (b, _) = cluster(&mut s, &mut sess, &[b"CLUSTER".to_vec(), b"KEYSLOT".to_vec(), b"{user}.y".to_vec()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn asking_sets_session_flag() {
        let (mut s, mut sess) = setup();
        asking(&mut s, &mut sess, &[b"ASKING".to_vec()]).unwrap();
        assert!(sess.asking);
    }

    #[test]
    fn myid_returns_run_id() {
        let (mut s, mut sess) = setup();
        let (reply, _) = cluster(&mut s, &mut sess, &[b"CLUSTER".to_vec(), b"MYID".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Bulk(s.run_id.clone().into_bytes()));
    }
}
