//! Command handler roster. One module per data-type/command category.
//! `strings`/`keys`/`lists`/`sets`/`zsets` follow a shared
//! `_generic` delegation convention with wrongtype-first checks;
//! `hashes`/`streams`/`transactions`/`scripting`/`replication`/`cluster`/
//! `connection`/`server_admin`/`blocking` round out the command surface.

pub mod blocking;
pub mod cluster;
pub mod connection;
pub mod hashes;
pub mod keys;
pub mod lists;
pub mod scripting;
pub mod server_admin;
pub mod sets;
pub mod streams;
pub mod strings;
pub mod transactions;
pub mod zsets;

use crate::error::{CommandError, CommandResult};
use crate::resp::Reply;
use crate::server::Server;
use crate::session::Session;

/// `None` in the second slot means "replicate the original request
/// verbatim if the command is write-flagged"; `Some(vec![])` suppresses
/// replication; `Some(cmd)` substitutes a deterministic rewrite.
pub type HandlerResult = CommandResult<(Reply, Option<Vec<Vec<u8>>>)>;

pub fn plain(reply: Reply) -> HandlerResult {
    Ok((reply, None))
}

pub fn suppressed(reply: Reply) -> HandlerResult {
    Ok((reply, Some(Vec::new())))
}

pub fn rewritten(reply: Reply, cmd: Vec<Vec<u8>>) -> HandlerResult {
    Ok((reply, Some(cmd)))
}

/// Parses a byte-string argument as a UTF-8 integer, matching Redis's
/// `ERR value is not an integer or out of range` error text.
pub fn parse_int(arg: &[u8]) -> CommandResult<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CommandError::NotInteger)
}

/// Shared by the top-level dispatcher and the two places that re-enter
/// it directly (`transactions::exec`, `scripting::eval`'s callback):
/// given a handler's outcome, decide what (if anything) gets appended
/// to the replication journal.
pub fn journal_effect(server: &mut Server, db_index: usize, name: &str, argv: &[Vec<u8>], rewrite: Option<Vec<Vec<u8>>>) {
    let is_write = crate::command::COMMAND_TABLE
        .get(name)
        .map(|spec| spec.flags.has(crate::command::CmdFlags::WRITE))
        .unwrap_or(false);
    server.journal.account_original(argv);
    match rewrite {
        Some(cmd) if cmd.is_empty() => {}
        Some(cmd) => server.journal.append_write(db_index, &cmd),
        None if is_write => server.journal.append_write(db_index, argv),
        None => {}
    }
}

pub fn parse_float(arg: &[u8]) -> CommandResult<f64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| match s {
            "inf" | "+inf" => Some(f64::INFINITY),
            "-inf" => Some(f64::NEG_INFINITY),
            _ => s.parse::<f64>().ok(),
        })
        .ok_or(CommandError::NotFloat)
}

/// Central routing table: command name (already uppercased by the
/// dispatcher) to its handler.
pub fn invoke(server: &mut Server, session: &mut Session, name: &str, argv: &[Vec<u8>]) -> HandlerResult {
    match name {
        "PING" => connection::ping(server, session, argv),
        "ECHO" => connection::echo(server, session, argv),
        "HELLO" => connection::hello(server, session, argv),
        "AUTH" => connection::auth(server, session, argv),
        "SELECT" => connection::select(server, session, argv),
        "RESET" => connection::reset(server, session, argv),
        "SWAPDB" => connection::swapdb(server, session, argv),
        "QUIT" => plain(Reply::ok()),
        "CLIENT" => connection::client(server, session, argv),

        "GET" => strings::get(server, session, argv),
        "SET" => strings::set(server, session, argv),
        "SETNX" => strings::setnx(server, session, argv),
        "SETEX" => strings::setex(server, session, argv, false),
        "PSETEX" => strings::setex(server, session, argv, true),
        "GETSET" => strings::getset(server, session, argv),
        "GETDEL" => strings::getdel(server, session, argv),
        "GETEX" => strings::getex(server, session, argv),
        "APPEND" => strings::append(server, session, argv),
        "STRLEN" => strings::strlen(server, session, argv),
        "MGET" => strings::mget(server, session, argv),
        "MSET" => strings::mset(server, session, argv),
        "MSETNX" => strings::msetnx(server, session, argv),
        "INCR" => strings::incrby(server, session, argv, 1),
        "DECR" => strings::incrby(server, session, argv, -1),
        "INCRBY" => strings::incrby_arg(server, session, argv, false),
        "DECRBY" => strings::incrby_arg(server, session, argv, true),
        "INCRBYFLOAT" => strings::incrbyfloat(server, session, argv),
        "SETRANGE" => strings::setrange(server, session, argv),
        "GETRANGE" | "SUBSTR" => strings::getrange(server, session, argv),
        "SETBIT" => strings::setbit(server, session, argv),
        "GETBIT" => strings::getbit(server, session, argv),
        "LCS" => strings::lcs(server, session, argv),

        "HSET" | "HMSET" => hashes::hset(server, session, argv, name == "HMSET"),
        "HSETNX" => hashes::hsetnx(server, session, argv),
        "HGET" => hashes::hget(server, session, argv),
        "HMGET" => hashes::hmget(server, session, argv),
        "HDEL" => hashes::hdel(server, session, argv),
        "HLEN" => hashes::hlen(server, session, argv),
        "HEXISTS" => hashes::hexists(server, session, argv),
        "HKEYS" => hashes::hkeys(server, session, argv),
        "HVALS" => hashes::hvals(server, session, argv),
        "HGETALL" => hashes::hgetall(server, session, argv),
        "HINCRBY" => hashes::hincrby(server, session, argv),
        "HINCRBYFLOAT" => hashes::hincrbyfloat(server, session, argv),
        "HRANDFIELD" => hashes::hrandfield(server, session, argv),
        "HSCAN" => hashes::hscan(server, session, argv),

        "LPUSH" => lists::push(server, session, argv, true, false),
        "RPUSH" => lists::push(server, session, argv, false, false),
        "LPUSHX" => lists::push(server, session, argv, true, true),
        "RPUSHX" => lists::push(server, session, argv, false, true),
        "LPOP" => lists::pop(server, session, argv, true),
        "RPOP" => lists::pop(server, session, argv, false),
        "LLEN" => lists::llen(server, session, argv),
        "LRANGE" => lists::lrange(server, session, argv),
        "LINDEX" => lists::lindex(server, session, argv),
        "LSET" => lists::lset(server, session, argv),
        "LREM" => lists::lrem(server, session, argv),
        "LTRIM" => lists::ltrim(server, session, argv),
        "LINSERT" => lists::linsert(server, session, argv),
        "LPOS" => lists::lpos(server, session, argv),
        "RPOPLPUSH" => lists::rpoplpush(server, session, argv),
        "LMOVE" => lists::lmove(server, session, argv),

        "SADD" => sets::sadd(server, session, argv),
        "SREM" => sets::srem(server, session, argv),
        "SPOP" => sets::spop(server, session, argv),
        "SMOVE" => sets::smove(server, session, argv),
        "SCARD" => sets::scard(server, session, argv),
        "SISMEMBER" => sets::sismember(server, session, argv),
        "SMISMEMBER" => sets::smismember(server, session, argv),
        "SINTER" => sets::setop(server, session, argv, sets::SetOp::Inter, false),
        "SINTERSTORE" => sets::setop(server, session, argv, sets::SetOp::Inter, true),
        "SUNION" => sets::setop(server, session, argv, sets::SetOp::Union, false),
        "SUNIONSTORE" => sets::setop(server, session, argv, sets::SetOp::Union, true),
        "SDIFF" => sets::setop(server, session, argv, sets::SetOp::Diff, false),
        "SDIFFSTORE" => sets::setop(server, session, argv, sets::SetOp::Diff, true),
        "SRANDMEMBER" => sets::srandmember(server, session, argv),
        "SMEMBERS" => sets::smembers(server, session, argv),
        "SSCAN" => sets::sscan(server, session, argv),

        "ZADD" => zsets::zadd(server, session, argv),
        "ZREM" => zsets::zrem(server, session, argv),
        "ZINCRBY" => zsets::zincrby(server, session, argv),
        "ZSCORE" => zsets::zscore(server, session, argv),
        "ZMSCORE" => zsets::zmscore(server, session, argv),
        "ZCARD" => zsets::zcard(server, session, argv),
        "ZCOUNT" => zsets::zcount(server, session, argv),
        "ZRANGE" => zsets::zrange(server, session, argv, false),
        "ZREVRANGE" => zsets::zrange(server, session, argv, true),
        "ZRANGEBYSCORE" => zsets::zrangebyscore(server, session, argv, false),
        "ZREVRANGEBYSCORE" => zsets::zrangebyscore(server, session, argv, true),
        "ZRANK" => zsets::zrank(server, session, argv, false),
        "ZREVRANK" => zsets::zrank(server, session, argv, true),
        "ZREMRANGEBYSCORE" => zsets::zremrangebyscore(server, session, argv),
        "ZREMRANGEBYRANK" => zsets::zremrangebyrank(server, session, argv),
        "ZPOPMIN" => zsets::zpop(server, session, argv, true),
        "ZPOPMAX" => zsets::zpop(server, session, argv, false),
        "ZSCAN" => zsets::zscan(server, session, argv),

        "XADD" => streams::xadd(server, session, argv),
        "XLEN" => streams::xlen(server, session, argv),
        "XRANGE" => streams::xrange(server, session, argv, false),
        "XREVRANGE" => streams::xrange(server, session, argv, true),
        "XREAD" => streams::xread(server, session, argv),
        "XDEL" => streams::xdel(server, session, argv),
        "XGROUP" => streams::xgroup(server, session, argv),
        "XREADGROUP" => streams::xreadgroup(server, session, argv),
        "XACK" => streams::xack(server, session, argv),

        "DEL" => keys::del(server, session, argv, true),
        "UNLINK" => keys::del(server, session, argv, false),
        "EXISTS" => keys::exists(server, session, argv),
        "TYPE" => keys::type_cmd(server, session, argv),
        "TTL" => keys::ttl(server, session, argv, false),
        "PTTL" => keys::ttl(server, session, argv, true),
        "EXPIRETIME" => keys::expiretime(server, session, argv, false),
        "PEXPIRETIME" => keys::expiretime(server, session, argv, true),
        "EXPIRE" => keys::expire(server, session, argv, false, false),
        "PEXPIRE" => keys::expire(server, session, argv, true, false),
        "EXPIREAT" => keys::expire(server, session, argv, false, true),
        "PEXPIREAT" => keys::expire(server, session, argv, true, true),
        "PERSIST" => keys::persist(server, session, argv),
        "KEYS" => keys::keys(server, session, argv),
        "RANDOMKEY" => keys::randomkey(server, session, argv),
        "SCAN" => keys::scan(server, session, argv),
        "RENAME" => keys::rename(server, session, argv, false),
        "RENAMENX" => keys::rename(server, session, argv, true),
        "COPY" => keys::copy(server, session, argv),
        "MOVE" => keys::move_cmd(server, session, argv),
        "SORT" => keys::sort(server, session, argv),
        "OBJECT" => keys::object(server, session, argv),
        "DBSIZE" => keys::dbsize(server, session, argv),
        "FLUSHDB" => keys::flushdb(server, session, argv),
        "FLUSHALL" => keys::flushall(server, session, argv),
        "DUMP" => keys::dump(server, session, argv),
        "RESTORE" => keys::restore(server, session, argv),

        "MULTI" => transactions::multi(server, session, argv),
        "EXEC" => transactions::exec(server, session, argv),
        "DISCARD" => transactions::discard(server, session, argv),
        "WATCH" => transactions::watch(server, session, argv),
        "UNWATCH" => transactions::unwatch(server, session, argv),

        "EVAL" => scripting::eval(server, session, argv, false, false),
        "EVALSHA" => scripting::eval(server, session, argv, true, false),
        "EVAL_RO" => scripting::eval(server, session, argv, false, true),
        "EVALSHA_RO" => scripting::eval(server, session, argv, true, true),
        "SCRIPT" => scripting::script(server, session, argv),

        "REPLICAOF" | "SLAVEOF" => server_admin::replicaof(server, session, argv),
        "REPLCONF" => server_admin::replconf(server, session, argv),
        "PSYNC" => server_admin::psync(server, session, argv),
        "WAIT" => server_admin::wait(server, session, argv),

        "CLUSTER" => cluster::cluster(server, session, argv),
        "ASKING" => cluster::asking(server, session, argv),
        "READONLY" | "READWRITE" => plain(Reply::ok()),

        "INFO" => server_admin::info(server, session, argv),
        "CONFIG" => server_admin::config(server, session, argv),
        "COMMAND" => server_admin::command_cmd(server, session, argv),
        "DEBUG" => server_admin::debug(server, session, argv),
        "SAVE" => server_admin::save(server, session, argv),
        "BGSAVE" => server_admin::bgsave(server, session, argv),
        "BGREWRITEAOF" => server_admin::bgrewriteaof(server, session, argv),
        "LASTSAVE" => server_admin::lastsave(server, session, argv),
        "TIME" => server_admin::time(server, session, argv),
        "SHUTDOWN" => server_admin::shutdown(server, session, argv),

        "BLPOP" => blocking::blpop(server, session, argv, true),
        "BRPOP" => blocking::blpop(server, session, argv, false),
        "BLMOVE" => blocking::blmove(server, session, argv),
        "BZPOPMIN" => blocking::bzpop(server, session, argv, true),
        "BZPOPMAX" => blocking::bzpop(server, session, argv, false),

        other => Err(CommandError::UnknownCommand(format!(
            "unknown command '{}'",
            other.to_lowercase()
        ))),
    }
}
