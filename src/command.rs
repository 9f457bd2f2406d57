//! Command table: name, arity, flags, and key-position descriptor for
//! every dispatchable command.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::ops::BitOr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdFlags(pub u16);

impl CmdFlags {
    pub const NONE: CmdFlags = CmdFlags(0);
    pub const WRITE: CmdFlags = CmdFlags(1 << 0);
    pub const READONLY: CmdFlags = CmdFlags(1 << 1);
    pub const FAST: CmdFlags = CmdFlags(1 << 2);
    pub const ADMIN: CmdFlags = CmdFlags(1 << 3);
    pub const NOSCRIPT: CmdFlags = CmdFlags(1 << 4);
    pub const PUBSUB: CmdFlags = CmdFlags(1 << 5);
    pub const NOAUTH: CmdFlags = CmdFlags(1 << 6);
    pub const LOADING: CmdFlags = CmdFlags(1 << 7);
    pub const STALE: CmdFlags = CmdFlags(1 << 8);
    pub const DENYOOM: CmdFlags = CmdFlags(1 << 9);
    pub const BLOCKING: CmdFlags = CmdFlags(1 << 10);
    pub const TRANSACTION_CTL: CmdFlags = CmdFlags(1 << 11);

    pub fn has(self, other: CmdFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for CmdFlags {
    type Output = CmdFlags;
    fn bitor(self, rhs: CmdFlags) -> CmdFlags {
        CmdFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    pub first_key: i32,
    pub last_key: i32,
    pub step: i32,
}

pub const NO_KEYS: KeySpec = KeySpec { first_key: 0, last_key: 0, step: 0 };

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    /// Positive = exact arg count (including command name); negative =
    /// minimum arg count.
    pub arity: i32,
    pub flags: CmdFlags,
    pub keys: KeySpec,
}

macro_rules! cmd {
    ($name:expr, $arity:expr, $flags:expr) => {
        cmd!($name, $arity, $flags, NO_KEYS)
    };
    ($name:expr, $arity:expr, $flags:expr, $keys:expr) => {
        CommandSpec { name: $name, arity: $arity, flags: $flags, keys: $keys }
    };
}

const ONE_KEY: KeySpec = KeySpec { first_key: 1, last_key: 1, step: 1 };
const ALL_KEYS_FROM_1: KeySpec = KeySpec { first_key: 1, last_key: -1, step: 1 };

pub static COMMAND_TABLE: Lazy<HashMap<&'static str, CommandSpec>> = Lazy::new(|| {
    use CmdFlags as F;
    let table = vec![
        // Connection
        cmd!("PING", -1, F::FAST),
        cmd!("ECHO", 2, F::FAST),
        cmd!("HELLO", -1, F::FAST | F::NOAUTH),
        cmd!("AUTH", -2, F::FAST | F::NOAUTH),
        cmd!("QUIT", -1, F::FAST | F::NOAUTH),
        cmd!("SELECT", 2, F::FAST | F::LOADING | F::STALE),
        cmd!("RESET", 1, F::FAST | F::NOAUTH),
        cmd!("SWAPDB", 3, F::WRITE | F::FAST),
        cmd!("CLIENT", -2, F::ADMIN),
        // String
        cmd!("GET", 2, F::READONLY | F::FAST, ONE_KEY),
        cmd!("SET", -3, F::WRITE | F::DENYOOM, ONE_KEY),
        cmd!("SETNX", 3, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("SETEX", 4, F::WRITE | F::DENYOOM, ONE_KEY),
        cmd!("PSETEX", 4, F::WRITE | F::DENYOOM, ONE_KEY),
        cmd!("GETSET", 3, F::WRITE | F::DENYOOM, ONE_KEY),
        cmd!("GETDEL", 2, F::WRITE | F::FAST, ONE_KEY),
        cmd!("GETEX", -2, F::WRITE | F::FAST, ONE_KEY),
        cmd!("APPEND", 3, F::WRITE | F::DENYOOM, ONE_KEY),
        cmd!("STRLEN", 2, F::READONLY | F::FAST, ONE_KEY),
        cmd!("MGET", -2, F::READONLY | F::FAST, ALL_KEYS_FROM_1),
        cmd!("MSET", -3, F::WRITE | F::DENYOOM, KeySpec { first_key: 1, last_key: -1, step: 2 }),
        cmd!("MSETNX", -3, F::WRITE | F::DENYOOM, KeySpec { first_key: 1, last_key: -1, step: 2 }),
        cmd!("INCR", 2, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("DECR", 2, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("INCRBY", 3, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("DECRBY", 3, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("INCRBYFLOAT", 3, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("SETRANGE", 4, F::WRITE | F::DENYOOM, ONE_KEY),
        cmd!("GETRANGE", 4, F::READONLY, ONE_KEY),
        cmd!("SETBIT", 4, F::WRITE | F::DENYOOM, ONE_KEY),
        cmd!("GETBIT", 3, F::READONLY, ONE_KEY),
        cmd!("LCS", -3, F::READONLY, KeySpec { first_key: 1, last_key: 2, step: 1 }),
        // Hash
        cmd!("HSET", -4, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("HSETNX", 4, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("HMSET", -4, F::WRITE | F::DENYOOM, ONE_KEY),
        cmd!("HGET", 3, F::READONLY | F::FAST, ONE_KEY),
        cmd!("HMGET", -3, F::READONLY | F::FAST, ONE_KEY),
        cmd!("HDEL", -3, F::WRITE | F::FAST, ONE_KEY),
        cmd!("HLEN", 2, F::READONLY | F::FAST, ONE_KEY),
        cmd!("HEXISTS", 3, F::READONLY | F::FAST, ONE_KEY),
        cmd!("HKEYS", 2, F::READONLY, ONE_KEY),
        cmd!("HVALS", 2, F::READONLY, ONE_KEY),
        cmd!("HGETALL", 2, F::READONLY, ONE_KEY),
        cmd!("HINCRBY", 4, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("HINCRBYFLOAT", 4, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("HRANDFIELD", -2, F::READONLY, ONE_KEY),
        cmd!("HSCAN", -3, F::READONLY, ONE_KEY),
        // List
        cmd!("LPUSH", -3, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("RPUSH", -3, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("LPUSHX", -3, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("RPUSHX", -3, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("LPOP", -2, F::WRITE | F::FAST, ONE_KEY),
        cmd!("RPOP", -2, F::WRITE | F::FAST, ONE_KEY),
        cmd!("LLEN", 2, F::READONLY | F::FAST, ONE_KEY),
        cmd!("LRANGE", 4, F::READONLY, ONE_KEY),
        cmd!("LINDEX", 3, F::READONLY, ONE_KEY),
        cmd!("LSET", 4, F::WRITE | F::DENYOOM, ONE_KEY),
        cmd!("LREM", 4, F::WRITE, ONE_KEY),
        cmd!("LTRIM", 4, F::WRITE, ONE_KEY),
        cmd!("LINSERT", 5, F::WRITE | F::DENYOOM, ONE_KEY),
        cmd!("LPOS", -3, F::READONLY, ONE_KEY),
        cmd!("RPOPLPUSH", 3, F::WRITE | F::DENYOOM, KeySpec { first_key: 1, last_key: 2, step: 1 }),
        cmd!("LMOVE", 5, F::WRITE | F::DENYOOM, KeySpec { first_key: 1, last_key: 2, step: 1 }),
        cmd!("BLPOP", -3, F::WRITE | F::BLOCKING | F::NOSCRIPT, ALL_KEYS_FROM_1),
        cmd!("BRPOP", -3, F::WRITE | F::BLOCKING | F::NOSCRIPT, ALL_KEYS_FROM_1),
        cmd!("BLMOVE", 6, F::WRITE | F::BLOCKING | F::DENYOOM | F::NOSCRIPT, KeySpec { first_key: 1, last_key: 2, step: 1 }),
        // Set
        cmd!("SADD", -3, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("SREM", -3, F::WRITE | F::FAST, ONE_KEY),
        cmd!("SPOP", -2, F::WRITE | F::FAST, ONE_KEY),
        cmd!("SMOVE", 4, F::WRITE | F::FAST, KeySpec { first_key: 1, last_key: 2, step: 1 }),
        cmd!("SCARD", 2, F::READONLY | F::FAST, ONE_KEY),
        cmd!("SISMEMBER", 3, F::READONLY | F::FAST, ONE_KEY),
        cmd!("SMISMEMBER", -3, F::READONLY | F::FAST, ONE_KEY),
        cmd!("SINTER", -2, F::READONLY, ALL_KEYS_FROM_1),
        cmd!("SINTERSTORE", -3, F::WRITE | F::DENYOOM, ALL_KEYS_FROM_1),
        cmd!("SUNION", -2, F::READONLY, ALL_KEYS_FROM_1),
        cmd!("SUNIONSTORE", -3, F::WRITE | F::DENYOOM, ALL_KEYS_FROM_1),
        cmd!("SDIFF", -2, F::READONLY, ALL_KEYS_FROM_1),
        cmd!("SDIFFSTORE", -3, F::WRITE | F::DENYOOM, ALL_KEYS_FROM_1),
        cmd!("SRANDMEMBER", -2, F::READONLY, ONE_KEY),
        cmd!("SMEMBERS", 2, F::READONLY, ONE_KEY),
        cmd!("SSCAN", -3, F::READONLY, ONE_KEY),
        // SortedSet
        cmd!("ZADD", -4, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("ZREM", -3, F::WRITE | F::FAST, ONE_KEY),
        cmd!("ZINCRBY", 4, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("ZSCORE", 3, F::READONLY | F::FAST, ONE_KEY),
        cmd!("ZMSCORE", -3, F::READONLY | F::FAST, ONE_KEY),
        cmd!("ZCARD", 2, F::READONLY | F::FAST, ONE_KEY),
        cmd!("ZCOUNT", 4, F::READONLY | F::FAST, ONE_KEY),
        cmd!("ZRANGE", -4, F::READONLY, ONE_KEY),
        cmd!("ZREVRANGE", -4, F::READONLY, ONE_KEY),
        cmd!("ZRANGEBYSCORE", -4, F::READONLY, ONE_KEY),
        cmd!("ZREVRANGEBYSCORE", -4, F::READONLY, ONE_KEY),
        cmd!("ZRANK", 3, F::READONLY | F::FAST, ONE_KEY),
        cmd!("ZREVRANK", 3, F::READONLY | F::FAST, ONE_KEY),
        cmd!("ZREMRANGEBYSCORE", 4, F::WRITE, ONE_KEY),
        cmd!("ZREMRANGEBYRANK", 4, F::WRITE, ONE_KEY),
        cmd!("ZPOPMIN", -2, F::WRITE | F::FAST, ONE_KEY),
        cmd!("ZPOPMAX", -2, F::WRITE | F::FAST, ONE_KEY),
        cmd!("BZPOPMIN", -3, F::WRITE | F::BLOCKING | F::NOSCRIPT, ALL_KEYS_FROM_1),
        cmd!("BZPOPMAX", -3, F::WRITE | F::BLOCKING | F::NOSCRIPT, ALL_KEYS_FROM_1),
        cmd!("ZSCAN", -3, F::READONLY, ONE_KEY),
        // Stream
        cmd!("XADD", -5, F::WRITE | F::DENYOOM | F::FAST, ONE_KEY),
        cmd!("XLEN", 2, F::READONLY | F::FAST, ONE_KEY),
        cmd!("XRANGE", -4, F::READONLY, ONE_KEY),
        cmd!("XREVRANGE", -4, F::READONLY, ONE_KEY),
        cmd!("XREAD", -4, F::READONLY | F::BLOCKING, NO_KEYS),
        cmd!("XDEL", -3, F::WRITE | F::FAST, ONE_KEY),
        cmd!("XGROUP", -2, F::WRITE, ONE_KEY),
        cmd!("XREADGROUP", -7, F::WRITE | F::BLOCKING, NO_KEYS),
        cmd!("XACK", -4, F::WRITE | F::FAST, ONE_KEY),
        // Key
        cmd!("DEL", -2, F::WRITE, ALL_KEYS_FROM_1),
        cmd!("UNLINK", -2, F::WRITE | F::FAST, ALL_KEYS_FROM_1),
        cmd!("EXISTS", -2, F::READONLY | F::FAST, ALL_KEYS_FROM_1),
        cmd!("TYPE", 2, F::READONLY | F::FAST, ONE_KEY),
        cmd!("TTL", 2, F::READONLY | F::FAST, ONE_KEY),
        cmd!("PTTL", 2, F::READONLY | F::FAST, ONE_KEY),
        cmd!("EXPIRETIME", 2, F::READONLY | F::FAST, ONE_KEY),
        cmd!("PEXPIRETIME", 2, F::READONLY | F::FAST, ONE_KEY),
        cmd!("EXPIRE", -3, F::WRITE | F::FAST, ONE_KEY),
        cmd!("PEXPIRE", -3, F::WRITE | F::FAST, ONE_KEY),
        cmd!("EXPIREAT", -3, F::WRITE | F::FAST, ONE_KEY),
        cmd!("PEXPIREAT", -3, F::WRITE | F::FAST, ONE_KEY),
        cmd!("PERSIST", 2, F::WRITE | F::FAST, ONE_KEY),
        cmd!("KEYS", 2, F::READONLY, NO_KEYS),
        cmd!("RANDOMKEY", 1, F::READONLY, NO_KEYS),
        cmd!("SCAN", -2, F::READONLY, NO_KEYS),
        cmd!("RENAME", 3, F::WRITE, KeySpec { first_key: 1, last_key: 2, step: 1 }),
        cmd!("RENAMENX", 3, F::WRITE | F::FAST, KeySpec { first_key: 1, last_key: 2, step: 1 }),
        cmd!("COPY", -3, F::WRITE, KeySpec { first_key: 1, last_key: 2, step: 1 }),
        cmd!("MOVE", 3, F::WRITE | F::FAST, ONE_KEY),
        cmd!("DUMP", 2, F::READONLY, ONE_KEY),
        cmd!("RESTORE", -4, F::WRITE | F::DENYOOM, ONE_KEY),
        cmd!("SORT", -2, F::WRITE | F::DENYOOM, ONE_KEY),
        cmd!("OBJECT", -2, F::READONLY, NO_KEYS),
        cmd!("DBSIZE", 1, F::READONLY | F::FAST, NO_KEYS),
        cmd!("FLUSHDB", -1, F::WRITE, NO_KEYS),
        cmd!("FLUSHALL", -1, F::WRITE, NO_KEYS),
        // Transaction
        cmd!("MULTI", 1, F::FAST | F::TRANSACTION_CTL | F::NOSCRIPT),
        cmd!("EXEC", 1, F::TRANSACTION_CTL | F::NOSCRIPT),
        cmd!("DISCARD", 1, F::FAST | F::TRANSACTION_CTL | F::NOSCRIPT),
        cmd!("WATCH", -2, F::FAST | F::TRANSACTION_CTL | F::NOSCRIPT, ALL_KEYS_FROM_1),
        cmd!("UNWATCH", 1, F::FAST | F::TRANSACTION_CTL | F::NOSCRIPT),
        // Scripting
        cmd!("EVAL", -3, F::WRITE | F::DENYOOM | F::NOSCRIPT),
        cmd!("EVALSHA", -3, F::WRITE | F::DENYOOM | F::NOSCRIPT),
        cmd!("EVAL_RO", -3, F::READONLY | F::NOSCRIPT),
        cmd!("EVALSHA_RO", -3, F::READONLY | F::NOSCRIPT),
        cmd!("SCRIPT", -2, F::NOSCRIPT),
        // Replication
        cmd!("REPLICAOF", 3, F::ADMIN | F::NOSCRIPT | F::STALE),
        cmd!("SLAVEOF", 3, F::ADMIN | F::NOSCRIPT | F::STALE),
        cmd!("REPLCONF", -1, F::ADMIN | F::LOADING | F::STALE),
        cmd!("PSYNC", -3, F::ADMIN | F::NOSCRIPT),
        cmd!("WAIT", 3, F::NOSCRIPT),
        // Cluster
        cmd!("CLUSTER", -2, F::ADMIN | F::STALE),
        cmd!("ASKING", 1, F::FAST),
        cmd!("READONLY", 1, F::FAST),
        cmd!("READWRITE", 1, F::FAST),
        // Server
        cmd!("INFO", -1, F::LOADING | F::STALE),
        cmd!("CONFIG", -2, F::ADMIN | F::LOADING | F::STALE),
        cmd!("COMMAND", -1, F::LOADING | F::STALE),
        cmd!("DEBUG", -2, F::ADMIN),
        cmd!("SAVE", 1, F::ADMIN),
        cmd!("BGSAVE", -1, F::ADMIN),
        cmd!("BGREWRITEAOF", 1, F::ADMIN),
        cmd!("LASTSAVE", 1, F::FAST | F::LOADING | F::STALE),
        cmd!("TIME", 1, F::FAST | F::LOADING | F::STALE),
        cmd!("SHUTDOWN", -1, F::ADMIN | F::NOSCRIPT),
    ];
    table.into_iter().map(|c| (c.name, c)).collect()
});

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_TABLE.get(name.to_ascii_uppercase().as_str())
}

pub fn arity_ok(spec: &CommandSpec, argc: usize) -> bool {
    if spec.arity >= 0 {
        argc as i32 == spec.arity
    } else {
        argc as i32 >= -spec.arity
    }
}

/// Always-empty module command overlay; a seam kept for dispatch order
/// fidelity even though no module loader exists.
pub fn module_overlay(_name: &str) -> Option<&'static CommandSpec> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup("get").is_some());
        assert!(lookup("GET").is_some());
    }

    #[test]
    fn unknown_command_is_none() {
        assert!(lookup("FROBNICATE").is_none());
    }

    #[test]
    fn arity_checks_exact_and_minimum() {
        let get = lookup("GET").unwrap();
        assert!(arity_ok(get, 2));
        assert!(!arity_ok(get, 3));
        let mset = lookup("MSET").unwrap();
        assert!(arity_ok(mset, 5));
        assert!(!arity_ok(mset, 2));
    }

    #[test]
    fn write_commands_carry_write_flag() {
        let set = lookup("SET").unwrap();
        assert!(set.flags.has(CmdFlags::WRITE));
        let get = lookup("GET").unwrap();
        assert!(!get.flags.has(CmdFlags::WRITE));
    }
}
