//! Connection accept loop and per-connection driver, built on
//! `std::net::{TcpListener, TcpStream}` with one OS thread per
//! connection, each holding the single global `Mutex<Server>` only for
//! the duration of one dispatched request.

use crate::dispatch::dispatch;
use crate::resp::{decode_request, encode, DecodeError, Reply};
use crate::server::SERVER;
use crate::session::Session;
use crate::util::{self, LogLevel};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);
const BLOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub fn tcp_server(port: u16, bind_addr: &str) -> std::io::Result<TcpListener> {
    TcpListener::bind((bind_addr, port))
}

/// Accepts connections forever, spawning one thread per client. Never
/// returns under normal operation.
pub fn serve(listener: TcpListener) {
    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                thread::spawn(move || handle_connection(stream));
            }
            Err(e) => {
                let server = SERVER.lock().unwrap();
                server.log(LogLevel::Warning, &format!("accept: {}", e));
            }
        }
    }
}

fn handle_connection(mut stream: TcpStream) {
    let _ = stream.set_nodelay(true);
    let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
    let needs_auth = {
        let mut server = SERVER.lock().unwrap();
        server.connected_clients += 1;
        server.stats.total_connections_received += 1;
        server.config.require_pass.is_some()
    };
    let mut session = Session::new(session_id, needs_auth);

    let mut buf = Vec::with_capacity(16 * 1024);
    let mut read_chunk = [0u8; 16 * 1024];
    let mut quit = false;
    while !quit && !session.is_replica {
        match read_one_request(&mut stream, &mut buf, &mut read_chunk) {
            Ok(Some(argv)) => {
                if argv.is_empty() {
                    continue;
                }
                let is_quit = argv[0].eq_ignore_ascii_case(b"QUIT");
                let reply = run_with_blocking_retry(&mut session, argv);
                if matches!(reply, Reply::NoReply) {
                    // SHUTDOWN: the gate pipeline already validated the
                    // command; nothing left to reply with.
                    quit = true;
                    continue;
                }
                let proto = session.proto;
                if stream.write_all(&encode(&reply, proto)).is_err() {
                    break;
                }
                quit = is_quit;
            }
            Ok(None) => break,
            Err(msg) => {
                let _ = stream.write_all(format!("-ERR Protocol error: {}\r\n", msg).as_bytes());
                break;
            }
        }
    }

    if session.is_replica && !quit {
        serve_replica(&mut stream, &mut session, buf, read_chunk);
    }

    let mut server = SERVER.lock().unwrap();
    server.connected_clients = server.connected_clients.saturating_sub(1);
    server.blocking.cancel(session_id);
    server.replicas.retain(|r| r.session_id != session_id);
}

/// Entered once a connection completes the `PSYNC` handshake. Alternates
/// a short, timed read for inbound `REPLCONF ACK`s with a push of
/// whatever the journal has accumulated since this replica's
/// `sent_offset`, on the same poll cadence `run_with_blocking_retry`
/// already uses for parked blocking clients.
fn serve_replica(stream: &mut TcpStream, session: &mut Session, mut buf: Vec<u8>, mut read_chunk: [u8; 16 * 1024]) {
    let _ = stream.set_read_timeout(Some(BLOCK_POLL_INTERVAL));
    loop {
        match read_replica_request(stream, &mut buf, &mut read_chunk) {
            ReplicaRead::Request(argv) if !argv.is_empty() => {
                let mut server = SERVER.lock().unwrap();
                dispatch(&mut server, session, argv);
            }
            ReplicaRead::Request(_) | ReplicaRead::WouldBlock => {}
            ReplicaRead::Closed => return,
        }

        let mut server = SERVER.lock().unwrap();
        let sent_offset = match server.replicas.iter().find(|r| r.session_id == session.id) {
            Some(link) => link.sent_offset,
            None => return,
        };
        let pending: Vec<u8> = server
            .journal
            .entries_from(sent_offset)
            .iter()
            .flat_map(|entry| entry.bytes.iter().copied())
            .collect();
        let new_offset = server.journal.len();
        drop(server);
        if !pending.is_empty() && stream.write_all(&pending).is_err() {
            return;
        }
        let mut server = SERVER.lock().unwrap();
        if let Some(link) = server.replicas.iter_mut().find(|r| r.session_id == session.id) {
            link.sent_offset = new_offset;
        }
    }
}

enum ReplicaRead {
    Request(Vec<Vec<u8>>),
    WouldBlock,
    Closed,
}

/// Like [`read_one_request`] but tuned for the replica socket's read
/// timeout: a `WouldBlock`/`TimedOut` error just means the poll interval
/// elapsed with nothing to read, not a protocol error or disconnect.
fn read_replica_request(stream: &mut TcpStream, buf: &mut Vec<u8>, chunk: &mut [u8]) -> ReplicaRead {
    loop {
        match decode_request(buf) {
            Ok((argv, consumed)) => {
                buf.drain(..consumed);
                return ReplicaRead::Request(argv);
            }
            Err(DecodeError::Protocol(_)) => return ReplicaRead::Closed,
            Err(DecodeError::Incomplete) => {}
        }
        match stream.read(chunk) {
            Ok(0) => return ReplicaRead::Closed,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => return ReplicaRead::WouldBlock,
            Err(_) => return ReplicaRead::Closed,
        }
    }
}

/// Reads from `stream` until one full request can be decoded, or the
/// peer closes the connection. Leftover bytes (a second pipelined
/// request) stay buffered for the next call.
fn read_one_request(stream: &mut TcpStream, buf: &mut Vec<u8>, chunk: &mut [u8]) -> Result<Option<Vec<Vec<u8>>>, String> {
    loop {
        match decode_request(buf) {
            Ok((argv, consumed)) => {
                buf.drain(..consumed);
                return Ok(Some(argv));
            }
            Err(DecodeError::Protocol(msg)) => return Err(msg),
            Err(DecodeError::Incomplete) => {}
        }
        match stream.read(chunk) {
            Ok(0) => return Ok(None),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.to_string()),
        }
    }
}

/// Runs `argv` through the dispatcher. If it parks the session on a
/// blocking command, polls the shared server on `BLOCK_POLL_INTERVAL`
/// until the command succeeds or its own deadline elapses (no
/// wake-on-write channel; this re-attempts instead of being notified).
fn run_with_blocking_retry(session: &mut Session, argv: Vec<Vec<u8>>) -> Reply {
    let first = {
        let mut server = SERVER.lock().unwrap();
        dispatch(&mut server, session, argv)
    };
    if !matches!(first, Reply::NoReply) {
        return first;
    }
    let block_state = match session.block.take() {
        Some(state) => state,
        None => return first,
    };
    {
        let mut server = SERVER.lock().unwrap();
        server.blocking.park(session.id, block_state.clone());
    }
    loop {
        thread::sleep(BLOCK_POLL_INTERVAL);
        let mut server = SERVER.lock().unwrap();
        if let Some(deadline) = block_state.deadline_ms {
            if util::now_ms() >= deadline {
                server.blocking.cancel(session.id);
                return Reply::NilArray;
            }
        }
        let retry = dispatch(&mut server, session, block_state.original_args.clone());
        session.block = None;
        if !matches!(retry, Reply::NoReply) {
            server.blocking.cancel(session.id);
            return retry;
        }
    }
}
