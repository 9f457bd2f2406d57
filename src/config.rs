//! Config layer: a directive-by-directive text config parser in the
//! `redis.conf` style, plus a runtime `CONFIG GET/SET` registry.

use crate::util::LogLevel;
use std::fs;

#[derive(Debug, Clone)]
pub struct SaveParam {
    pub seconds: u64,
    pub changes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendFsync {
    Always,
    EverySec,
    No,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_addr: String,
    pub dbnum: usize,
    pub max_clients: usize,
    pub max_memory: u64,
    pub verbosity: LogLevel,
    pub logfile: Option<String>,
    pub daemonize: bool,
    pub require_pass: Option<String>,
    pub append_only: bool,
    pub append_fsync: AppendFsync,
    pub append_filename: String,
    pub db_filename: String,
    pub dir: String,
    pub save_params: Vec<SaveParam>,
    pub min_replicas_to_write: usize,
    pub replica_serve_stale_data: bool,
    pub lua_time_limit_ms: u64,
    pub cluster_enabled: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            port: 6379,
            bind_addr: "127.0.0.1".into(),
            dbnum: crate::db::NUM_DATABASES,
            max_clients: 10000,
            max_memory: 0,
            verbosity: LogLevel::Notice,
            logfile: None,
            daemonize: false,
            require_pass: None,
            append_only: false,
            append_fsync: AppendFsync::EverySec,
            append_filename: "appendonly.aof".into(),
            db_filename: "dump.rdb".into(),
            dir: ".".into(),
            save_params: vec![
                SaveParam { seconds: 900, changes: 1 },
                SaveParam { seconds: 300, changes: 10 },
                SaveParam { seconds: 60, changes: 10000 },
            ],
            min_replicas_to_write: 0,
            replica_serve_stale_data: true,
            lua_time_limit_ms: 5000,
            cluster_enabled: false,
        }
    }
}

#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "*** FATAL CONFIG FILE ERROR ***\n{}", self.0)
    }
}

impl Config {
    pub fn load_file(path: &str) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("Can't open config file '{}': {}", path, e)))?;
        let mut cfg = Config::default();
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let argv: Vec<&str> = line.split_whitespace().collect();
            cfg.apply_directive(&argv)
                .map_err(|msg| ConfigError(format!("line {}: {}", lineno + 1, msg)))?;
        }
        Ok(cfg)
    }

    fn apply_directive(&mut self, argv: &[&str]) -> Result<(), String> {
        let load_err = |msg: String| -> Result<(), String> { Err(msg) };
        match argv[0].to_ascii_lowercase().as_str() {
            "port" if argv.len() == 2 => {
                self.port = argv[1]
                    .parse()
                    .map_err(|_| format!("invalid port: {}", argv[1]))?;
                Ok(())
            }
            "bind" if argv.len() == 2 => {
                self.bind_addr = argv[1].to_string();
                Ok(())
            }
            "databases" if argv.len() == 2 => {
                self.dbnum = argv[1]
                    .parse()
                    .map_err(|_| format!("invalid databases: {}", argv[1]))?;
                Ok(())
            }
            "maxclients" if argv.len() == 2 => {
                self.max_clients = argv[1]
                    .parse()
                    .map_err(|_| format!("invalid maxclients: {}", argv[1]))?;
                Ok(())
            }
            "maxmemory" if argv.len() == 2 => {
                self.max_memory = parse_memory(argv[1])?;
                Ok(())
            }
            "loglevel" if argv.len() == 2 => {
                self.verbosity = match argv[1] {
                    "debug" => LogLevel::Debug,
                    "verbose" => LogLevel::Verbose,
                    "notice" => LogLevel::Notice,
                    "warning" => LogLevel::Warning,
                    other => return load_err(format!("invalid log level: {}", other)),
                };
                Ok(())
            }
            "logfile" if argv.len() == 2 => {
                self.logfile = Some(argv[1].trim_matches('"').to_string());
                Ok(())
            }
            "daemonize" if argv.len() == 2 => {
                self.daemonize = crate::util::yes_no_to_bool(argv[1])
                    .ok_or_else(|| format!("invalid daemonize value: {}", argv[1]))?;
                Ok(())
            }
            "requirepass" if argv.len() == 2 => {
                self.require_pass = Some(argv[1].to_string());
                Ok(())
            }
            "appendonly" if argv.len() == 2 => {
                self.append_only = crate::util::yes_no_to_bool(argv[1])
                    .ok_or_else(|| format!("invalid appendonly value: {}", argv[1]))?;
                Ok(())
            }
            "appendfsync" if argv.len() == 2 => {
                self.append_fsync = match argv[1] {
                    "always" => AppendFsync::Always,
                    "everysec" => AppendFsync::EverySec,
                    "no" => AppendFsync::No,
                    other => return load_err(format!("invalid appendfsync: {}", other)),
                };
                Ok(())
            }
            "appendfilename" if argv.len() == 2 => {
                self.append_filename = argv[1].trim_matches('"').to_string();
                Ok(())
            }
            "dbfilename" if argv.len() == 2 => {
                self.db_filename = argv[1].trim_matches('"').to_string();
                Ok(())
            }
            "dir" if argv.len() == 2 => {
                self.dir = argv[1].to_string();
                Ok(())
            }
            "save" if argv.len() == 3 => {
                let seconds = argv[1]
                    .parse()
                    .map_err(|_| format!("invalid save seconds: {}", argv[1]))?;
                let changes = argv[2]
                    .parse()
                    .map_err(|_| format!("invalid save changes: {}", argv[2]))?;
                self.save_params.push(SaveParam { seconds, changes });
                Ok(())
            }
            "save" if argv.len() == 2 && argv[1] == "\"\"" => {
                self.save_params.clear();
                Ok(())
            }
            "min-replicas-to-write" if argv.len() == 2 => {
                self.min_replicas_to_write = argv[1]
                    .parse()
                    .map_err(|_| format!("invalid min-replicas-to-write: {}", argv[1]))?;
                Ok(())
            }
            "replica-serve-stale-data" if argv.len() == 2 => {
                self.replica_serve_stale_data = crate::util::yes_no_to_bool(argv[1])
                    .ok_or_else(|| format!("invalid replica-serve-stale-data: {}", argv[1]))?;
                Ok(())
            }
            "lua-time-limit" if argv.len() == 2 => {
                self.lua_time_limit_ms = argv[1]
                    .parse()
                    .map_err(|_| format!("invalid lua-time-limit: {}", argv[1]))?;
                Ok(())
            }
            "cluster-enabled" if argv.len() == 2 => {
                self.cluster_enabled = crate::util::yes_no_to_bool(argv[1])
                    .ok_or_else(|| format!("invalid cluster-enabled: {}", argv[1]))?;
                Ok(())
            }
            unknown => load_err(format!("unknown configuration directive '{}'", unknown)),
        }
    }

    /// `CONFIG GET pattern`: flat alternating name/value list.
    pub fn get(&self, pattern: &str) -> Vec<(String, String)> {
        let all: Vec<(String, String)> = vec![
            ("port".into(), self.port.to_string()),
            ("bind".into(), self.bind_addr.clone()),
            ("databases".into(), self.dbnum.to_string()),
            ("maxclients".into(), self.max_clients.to_string()),
            ("maxmemory".into(), self.max_memory.to_string()),
            ("appendonly".into(), bool_str(self.append_only)),
            ("requirepass".into(), self.require_pass.clone().unwrap_or_default()),
            ("min-replicas-to-write".into(), self.min_replicas_to_write.to_string()),
            ("lua-time-limit".into(), self.lua_time_limit_ms.to_string()),
            ("dir".into(), self.dir.clone()),
            ("dbfilename".into(), self.db_filename.clone()),
            ("appendfilename".into(), self.append_filename.clone()),
        ];
        all.into_iter()
            .filter(|(name, _)| crate::db::glob_match(pattern, name.as_bytes()))
            .collect()
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        self.apply_directive(&[name, value])
    }
}

fn bool_str(b: bool) -> String {
    if b { "yes".into() } else { "no".into() }
}

fn parse_memory(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (num, mult) = if let Some(n) = s.strip_suffix("gb") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("kb") {
        (n, 1024)
    } else {
        (s, 1)
    };
    num.parse::<u64>()
        .map(|v| v * mult)
        .map_err(|_| format!("invalid memory value: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_directive_errors() {
        let mut cfg = Config::default();
        assert!(cfg.apply_directive(&["frobnicate", "1"]).is_err());
    }

    #[test]
    fn port_directive_applies() {
        let mut cfg = Config::default();
        cfg.apply_directive(&["port", "7000"]).unwrap();
        assert_eq!(cfg.port, 7000);
    }

    #[test]
    fn memory_suffix_parses() {
        assert_eq!(parse_memory("100mb").unwrap(), 100 * 1024 * 1024);
    }

    #[test]
    fn config_get_matches_glob() {
        let cfg = Config::default();
        let results = cfg.get("max*");
        assert!(results.iter().any(|(n, _)| n == "maxclients"));
        assert!(results.iter().any(|(n, _)| n == "maxmemory"));
    }
}
