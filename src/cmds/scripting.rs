//! EVAL/EVALSHA/SCRIPT commands. Wires `script::StubEvaluator` into a
//! re-entrant call back through `cmds::invoke` via `ServerCallback`.

use super::{journal_effect, parse_int, plain, HandlerResult};
use crate::command::{CmdFlags, COMMAND_TABLE};
use crate::error::{CommandError, CommandResult};
use crate::resp::Reply;
use crate::script;
use crate::server::Server;
use crate::session::Session;

struct ServerCallback<'a> {
    server: &'a mut Server,
    session: &'a mut Session,
}

impl<'a> script::DispatchCallback for ServerCallback<'a> {
    fn call(&mut self, args: Vec<Vec<u8>>, read_only: bool) -> CommandResult<Reply> {
        if args.is_empty() {
            return Err(CommandError::Syntax);
        }
        let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
        let is_write = COMMAND_TABLE.get(name.as_str()).map(|spec| spec.flags.has(CmdFlags::WRITE)).unwrap_or(false);
        script::check_write_allowed(read_only && is_write)?;
        let (reply, rewrite) = crate::cmds::invoke(self.server, self.session, &name, &args)?;
        journal_effect(self.server, self.session.db_index, &name, &args, rewrite);
        Ok(reply)
    }
}

pub fn eval(server: &mut Server, session: &mut Session, argv: &[Vec<u8>], by_sha: bool, read_only: bool) -> HandlerResult {
    let body = if by_sha {
        let sha = String::from_utf8_lossy(&argv[1]).to_ascii_lowercase();
        script::script_get(&sha).ok_or(CommandError::NoScript)?
    } else {
        String::from_utf8_lossy(&argv[1]).to_string()
    };
    let numkeys = parse_int(&argv[2])?;
    if numkeys < 0 {
        return Err(CommandError::Custom("ERR Number of keys can't be negative".into()));
    }
    let numkeys = numkeys as usize;
    if 3 + numkeys > argv.len() {
        return Err(CommandError::Custom("ERR Number of keys can't be greater than number of args".into()));
    }
    let keys = argv[3..3 + numkeys].to_vec();
    let script_argv = argv[3 + numkeys..].to_vec();
    if !by_sha {
        script::script_load(&body);
    }
    let flags = script::parse_shebang(&body);
    let effective_ro = read_only || flags.no_writes;

    server.script_busy = true;
    server.journal.begin_transaction();
    let evaluator = script::StubEvaluator::default();
    let result = {
        let mut cb = ServerCallback { server: &mut *server, session: &mut *session };
        evaluator.eval(&body, &keys, &script_argv, effective_ro, &mut cb)
    };
    server.script_busy = false;
    match result {
        Ok(reply) => {
            server.journal.commit_transaction();
            plain(reply)
        }
        Err(e) => {
            server.journal.discard_transaction();
            Err(e)
        }
    }
}

pub fn script(_server: &mut Server, _session: &mut Session, argv: &[Vec<u8>]) -> HandlerResult {
    if argv.len() < 2 {
        return Err(CommandError::WrongArity("script".into()));
    }
    let sub = String::from_utf8_lossy(&argv[1]).to_ascii_uppercase();
    match sub.as_str() {
        "LOAD" => {
            let body = argv.get(2).ok_or(CommandError::Syntax)?;
            let sha = script::script_load(&String::from_utf8_lossy(body));
            plain(Reply::bulk_str(sha))
        }
        "EXISTS" => {
            let out = argv[2..]
                .iter()
                .map(|s| Reply::Integer(script::script_exists(&String::from_utf8_lossy(s).to_ascii_lowercase()) as i64))
                .collect();
            plain(Reply::Array(out))
        }
        "FLUSH" => {
            script::script_flush();
            plain(Reply::ok())
        }
        "KILL" => Err(CommandError::NotBusy),
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
    fn eval_runs_redis_call_and_replicates_effect() {
        let (mut s, mut sess) = setup();
        let argv = vec![
            b"EVAL".to_vec(),
            b"redis.call(SET KEYS[1] ARGV[1])".to_vec(),
            b"1".to_vec(),
            b"k".to_vec(),
            b"v".to_vec(),
        ];
        eval(&mut s, &mut sess, &argv, false, false).unwrap();
        assert!(s.keyspace.db(0).exists(b"k", crate::util::now_ms()));
    }

    #[test]
    fn eval_ro_rejects_write_call() {
        let (mut s, mut sess) = setup();
        let argv = vec![
            b"EVAL_RO".to_vec(),
            b"redis.call(SET KEYS[1] ARGV[1])".to_vec(),
            b"1".to_vec(),
            b"k".to_vec(),
            b"v".to_vec(),
        ];
        let err = eval(&mut s, &mut sess, &argv, false, true).unwrap_err();
        assert_eq!(err, CommandError::ScriptWrite);
    }

    #[test]
    fn evalsha_without_cached_script_errors() {
        let (mut s, mut sess) = setup();
        let argv = vec![b"EVALSHA".to_vec(), b"deadbeef".to_vec(), b"0".to_vec()];
        let err = eval(&mut s, &mut sess, &argv, true, false).unwrap_err();
        assert_eq!(err, CommandError::NoScript);
    }

    #[test]
    fn script_load_then_exists() {
        let (mut s, mut sess) = setup();
        let (reply, _) = script(&mut s, &mut sess, &[b"SCRIPT".to_vec(), b"LOAD".to_vec(), b"return 1".to_vec()]).unwrap();
        let sha = match reply { Reply::Bulk(b) => b, _ => panic!("expected bulk") };
        let (exists, _) = script(&mut s, &mut sess, &[b"SCRIPT".to_vec(), b"EXISTS".to_vec(), sha]).unwrap();
        assert_eq!(exists, Reply::Array(vec![Reply::Integer(1)]));
    }
}
