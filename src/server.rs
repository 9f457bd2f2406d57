//! Top-level `Server` aggregate, held behind a single global
//! `Lazy<Arc<Mutex<Server>>>`: a `Mutex` rather than a `RwLock` since
//! every dispatched command and cron tick needs to mutate it, so
//! concurrent readers buy nothing.

use crate::blocking::BlockingArbiter;
use crate::cluster::ClusterRouter;
use crate::config::Config;
use crate::db::Keyspace;
use crate::journal::Journal;
use crate::util::{self, LogLevel};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplState {
    None,
    Connect,
    Connecting,
    Connected,
}

#[derive(Default)]
pub struct Stats {
    pub total_connections_received: u64,
    pub total_commands_processed: u64,
    pub expired_keys: u64,
    pub keyspace_hits: u64,
    pub keyspace_misses: u64,
    pub command_calls: HashMap<String, u64>,
    pub command_errors: HashMap<String, u64>,
    pub command_rejected: HashMap<String, u64>,
    pub error_counts: HashMap<String, u64>,
}

pub struct ReplicaLink {
    pub session_id: u64,
    pub ack_offset: u64,
    pub sent_offset: usize,
}

pub struct Server {
    pub config: Config,
    pub keyspace: Keyspace,
    pub journal: Journal,
    pub cluster: ClusterRouter,
    pub blocking: BlockingArbiter,
    pub stats: Stats,
    pub start_time_ms: u64,
    pub dirty: u64,
    pub last_save_time_ms: u64,
    pub connected_clients: usize,
    pub replicas: Vec<ReplicaLink>,
    pub is_replica: bool,
    pub master_host: Option<(String, u16)>,
    pub repl_state: ReplState,
    pub script_busy: bool,
    pub run_id: String,
}

impl Server {
    pub fn new(config: Config) -> Server {
        let dbnum = config.dbnum;
        let cluster_enabled = config.cluster_enabled;
        Server {
            config,
            keyspace: Keyspace::new(dbnum),
            journal: Journal::new(),
            cluster: ClusterRouter::new(cluster_enabled),
            blocking: BlockingArbiter::new(),
            stats: Stats::default(),
            start_time_ms: util::now_ms(),
            dirty: 0,
            last_save_time_ms: 0,
            connected_clients: 0,
            replicas: Vec::new(),
            is_replica: false,
            master_host: None,
            repl_state: ReplState::None,
            script_busy: false,
            run_id: generate_run_id(),
        }
    }

    pub fn log(&self, level: LogLevel, body: &str) {
        util::log(level, self.config.verbosity, &self.config.logfile, body);
    }

    pub fn record_call(&mut self, cmd: &str) {
        self.stats.total_commands_processed += 1;
        *self.stats.command_calls.entry(cmd.to_string()).or_insert(0) += 1;
    }

    pub fn record_error(&mut self, cmd: &str, code: &str) {
        *self.stats.command_errors.entry(cmd.to_string()).or_insert(0) += 1;
        *self.stats.error_counts.entry(code.to_string()).or_insert(0) += 1;
    }

    pub fn record_rejected(&mut self, cmd: &str) {
        *self.stats.command_rejected.entry(cmd.to_string()).or_insert(0) += 1;
    }

    pub fn over_memory_budget(&self) -> bool {
        self.config.max_memory > 0 && crate::zmalloc::used_memory() as u64 > self.config.max_memory
    }

    pub fn acked_replica_count(&self, min_offset: u64) -> usize {
        self.replicas.iter().filter(|r| r.ack_offset >= min_offset).count()
    }
}

fn generate_run_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..40).map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap()).collect()
}

pub static SERVER: Lazy<Arc<Mutex<Server>>> =
    Lazy::new(|| Arc::new(Mutex::new(Server::new(Config::default()))));

pub fn init_server(config: Config) {
    let mut guard = SERVER.lock().unwrap();
    *guard = Server::new(config);
}

/// Bounded per-tick background work: active expiry sweep, blocked-client
/// wakeup check. Returns the suggested reschedule interval in
/// milliseconds.
pub fn cron_tick() -> u64 {
    let mut server = SERVER.lock().unwrap();
    let now = util::now_ms();
    let expired = crate::expire::sweep(&mut server.keyspace, now);
    for (db_idx, keys) in expired {
        server.stats.expired_keys += keys.len() as u64;
        for key in keys {
            server.keyspace.bump_epoch();
            server.journal.append_write(db_idx, &[b"DEL".to_vec(), key]);
        }
    }
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_server_starts_with_zero_dirty() {
        let server = Server::new(Config::default());
        assert_eq!(server.dirty, 0);
        assert_eq!(server.keyspace.dbs.len(), crate::db::NUM_DATABASES);
    }

    #[test]
    fn run_id_is_forty_hex_chars() {
        let id = generate_run_id();
        assert_eq!(id.len(), 40);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
