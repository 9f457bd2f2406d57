//! Append-only file persistence: a flat RESP-encoded command log,
//! replayed by re-parsing and re-dispatching each request straight
//! through `dispatch::dispatch` against a throwaway `Session`, since
//! that is the single place command execution rules live.

use crate::dispatch::dispatch;
use crate::resp::{decode_request, DecodeError};
use crate::server::Server;
use crate::session::Session;
use crate::util::{self, LogLevel};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};

pub struct AppendLog {
    writer: BufWriter<File>,
}

impl AppendLog {
    pub fn open(path: &str) -> io::Result<AppendLog> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(AppendLog { writer: BufWriter::new(file) })
    }

    /// Appends one already-RESP-encoded command (typically the bytes a
    /// `journal::Journal` write event produced, so AOF and replication
    /// replay the exact same deterministic command).
    pub fn feed(&mut self, encoded_command: &[u8]) -> io::Result<()> {
        self.writer.write_all(encoded_command)?;
        self.writer.flush()
    }
}

/// Replays every command in `path` against a fresh `Server`/`Session`
/// pair built from `config`, returning the populated server. Errors out
/// on a genuinely malformed file; an empty file is not an error.
pub fn load_append_only_file(server: &mut Server, path: &str) -> Result<u64, String> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(format!("can't open the append log file for reading: {}", e)),
    };
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| format!("can't read the append log file: {}", e))?;
    if buf.is_empty() {
        util::log(LogLevel::Notice, server.config.verbosity, &server.config.logfile, "empty aof file");
        return Ok(0);
    }

    let mut session = Session::new(0, false);
    session.authenticated = true;
    let mut pos = 0usize;
    let mut replayed = 0u64;
    while pos < buf.len() {
        match decode_request(&buf[pos..]) {
            Ok((argv, consumed)) => {
                pos += consumed;
                if argv.is_empty() {
                    continue;
                }
                dispatch(server, &mut session, argv);
                replayed += 1;
            }
            Err(DecodeError::Incomplete) => {
                return Err("unexpected end of append log file: truncated request".into());
            }
            Err(DecodeError::Protocol(msg)) => {
                return Err(format!("bad file format reading the append only file: {}", msg));
            }
        }
    }
    Ok(replayed)
}

/// Rewrites the append log from scratch using the current keyspace
/// contents: one `RESTORE` per live key instead of the full history of
/// writes that produced it. Runs inline on the calling thread rather
/// than forking a background worker; true background compaction is
/// left for later.
pub fn rewrite_append_only_file(server: &Server, path: &str) -> io::Result<()> {
    let mut out = Vec::new();
    for (idx, db) in server.keyspace.dbs.iter().enumerate() {
        if db.dict.is_empty() {
            continue;
        }
        out.extend_from_slice(&crate::journal::encode_command(&[b"SELECT".to_vec(), idx.to_string().into_bytes()]));
        for (key, entry) in &db.dict {
            let ttl = entry.expire_at_ms.map(|ms| ms.to_string().into_bytes()).unwrap_or_else(|| b"0".to_vec());
            let payload = crate::rdb::encode_value(&entry.value);
            let mut cmd = vec![b"RESTORE".to_vec(), key.clone(), ttl, payload];
            if entry.expire_at_ms.is_some() {
                cmd.push(b"ABSTTL".to_vec());
            }
            out.extend_from_slice(&crate::journal::encode_command(&cmd));
        }
    }
    let tmp_path = format!("{}.tmp", path);
    let mut file = File::create(&tmp_path)?;
    file.write_all(&out)?;
    file.sync_all()?;
    std::fs::rename(tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn replay_applies_set_command() {
        let mut server = Server::new(Config::default());
        let path = std::env::temp_dir().join(format!("peadb-aof-test-{}.aof", std::process::id()));
        let path = path.to_str().unwrap();
        {
            let mut log = AppendLog::open(path).unwrap();
            log.feed(&crate::journal::encode_command(&[b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()])).unwrap();
        }
        let replayed = load_append_only_file(&mut server, path).unwrap();
        assert_eq!(replayed, 1);
        assert!(server.keyspace.db(0).exists(b"k", crate::util::now_ms()));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_replays_as_empty() {
        let mut server = Server::new(Config::default());
        let replayed = load_append_only_file(&mut server, "/nonexistent/peadb.aof").unwrap();
        assert_eq!(replayed, 0);
    }
}
