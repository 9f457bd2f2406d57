use super::{plain, HandlerResult};
use crate::error::CommandError;
use crate::resp::{ProtoVer, Reply};
use crate::server::Server;
use crate::session::Session;

pub fn ping(_server: &mut Server, _session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    match argv.len() {
        1 => plain(Reply::Simple("PONG".into())),
        2 => plain(Reply::Bulk(argv[1].clone())),
        _ => Err(CommandError::WrongArity("PING".into())),
    }
}

pub fn echo(_server: &mut Server, _session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    plain(Reply::Bulk(argv[1].clone()))
}

pub fn hello(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    if argv.len() >= 2 {
        let ver = std::str::from_utf8(&argv[1]).ok().and_then(|s| s.parse::<u32>().ok());
        match ver {
            Some(2) => session.proto = ProtoVer::Resp2,
            Some(3) => session.proto = ProtoVer::Resp3,
            _ => return Err(CommandError::NoProto),
        }
    }
    let proto_num = match session.proto {
        ProtoVer::Resp2 => 2,
        ProtoVer::Resp3 => 3,
    };
    let pairs = vec![
        (Reply::bulk_str("server"), Reply::bulk_str("peadb")),
        (Reply::bulk_str("version"), Reply::bulk_str("7.2.5")),
        (Reply::bulk_str("proto"), Reply::Integer(proto_num)),
        (Reply::bulk_str("id"), Reply::Integer(session.id as i64)),
        (Reply::bulk_str("mode"), Reply::bulk_str(if server.cluster.is_enabled() { "cluster" } else { "standalone" })),
        (Reply::bulk_str("role"), Reply::bulk_str(if server.is_replica { "replica" } else { "master" })),
        (Reply::bulk_str("modules"), Reply::Array(Vec::new())),
    ];
    plain(Reply::Map(pairs))
}

pub fn auth(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let password = match argv.len() {
        2 => &argv[1],
        3 => &argv[2],
        _ => return Err(CommandError::WrongArity("AUTH".into())),
    };
    match &server.config.require_pass {
        None => Err(CommandError::Custom(
            "ERR Client sent AUTH, but no password is set. Did you mean AUTH <username> <password>?".into(),
        )),
        Some(expected) if expected.as_bytes() == password.as_slice() => {
            session.authenticated = true;
            plain(Reply::ok())
        }
        Some(_) => Err(CommandError::WrongPass),
    }
}

pub fn select(server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let idx = super::parse_int(&argv[1])?;
    if idx < 0 || idx as usize >= server.config.dbnum {
        return Err(CommandError::Custom("ERR DB index is out of range".into()));
    }
    session.db_index = idx as usize;
    plain(Reply::ok())
}

pub fn reset(_server: &mut Server, session: &mut Session, _argv: &[Vec<u8>]) -> HandlerResult {
    session.discard_multi();
    session.db_index = 0;
    session.asking = false;
    plain(Reply::Simple("RESET".into()))
}

pub fn swapdb(server: &mut Server, _session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let a = super::parse_int(&argv[1])?;
    let b = super::parse_int(&argv[2])?;
    if a < 0 || b < 0 || a as usize >= server.config.dbnum || b as usize >= server.config.dbnum {
        return Err(CommandError::Custom("ERR DB index is out of range".into()));
    }
    server.keyspace.swap_db(a as usize, b as usize);
    server.keyspace.bump_epoch();
    plain(Reply::ok())
}

pub fn client(_server: &mut Server, session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    let sub = std::str::from_utf8(&argv[1]).unwrap_or("").to_ascii_uppercase();
    match sub.as_str() {
        "GETNAME" => plain(Reply::Bulk(session.name.clone().unwrap_or_default().into_bytes())),
        "SETNAME" if argv.len() == 3 => {
            session.name = Some(String::from_utf8_lossy(&argv[2]).to_string());
            plain(Reply::ok())
        }
        "ID" => plain(Reply::Integer(session.id as i64)),
        "LIST" => plain(Reply::bulk_str(format!("id={} addr=? cmd=client|list\n", session.id))),
        "NO-EVICT" | "NO-TOUCH" => plain(Reply::ok()),
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
    fn ping_without_arg_returns_pong() {
        let (mut s, mut sess) = setup();
        let (reply, _) = ping(&mut s, &mut sess, &[b"PING".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Simple("PONG".into()));
    }

    #[test]
    fn ping_with_arg_echoes_message() {
        let (mut s, mut sess) = setup();
        let (reply, _) = ping(&mut s, &mut sess, &[b"PING".to_vec(), b"hi".to_vec()]).unwrap();
        assert_eq!(reply, Reply::Bulk(b"hi".to_vec()));
    }

    #[test]
    fn select_rejects_out_of_range_index() {
        let (mut s, mut sess) = setup();
        let err = select(&mut s, &mut sess, &[b"SELECT".to_vec(), b"99".to_vec()]).unwrap_err();
        assert!(matches!(err, CommandError::Custom(_)));
    }

    #[test]
    fn auth_without_requirepass_errors() {
        let (mut s, mut sess) = setup();
        let err = auth(&mut s, &mut sess, &[b"AUTH".to_vec(), b"x".to_vec()]).unwrap_err();
        assert!(matches!(err, CommandError::Custom(_)));
    }
}
