//! Script integration shim. No Lua VM is embedded; the dispatch
//! callback seam is real, but `StubEvaluator` plays the VM's role,
//! a tiny directive language sufficient to exercise the isolation rules
//! (no-writes scripts, re-entrant dispatch) without pulling in an
//! external scripting crate.

use crate::error::{CommandError, CommandResult};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShebangFlags {
    pub allow_oom: bool,
    pub no_writes: bool,
}

impl Default for ShebangFlags {
    fn default() -> Self {
        ShebangFlags { allow_oom: false, no_writes: false }
    }
}

pub fn parse_shebang(script: &str) -> ShebangFlags {
    let mut flags = ShebangFlags::default();
    if let Some(first_line) = script.lines().next() {
        if let Some(rest) = first_line.strip_prefix("#!lua") {
            if let Some(flag_list) = rest.trim().strip_prefix("flags=") {
                for f in flag_list.split(',') {
                    match f.trim() {
                        "allow-oom" => flags.allow_oom = true,
                        "no-writes" => flags.no_writes = true,
                        _ => {}
                    }
                }
            }
        }
    }
    flags
}

fn sha1_hex(data: &[u8]) -> String {
    // Minimal SHA-1 implementation, sufficient for the cache key, not
    // for cryptographic use.
    let mut h: [u32; 5] = [0x67452301, 0xEFCDAB89, 0x98BADCFE, 0x10325476, 0xC3D2E1F0];
    let ml = (data.len() as u64) * 8;
    let mut msg = data.to_vec();
    msg.push(0x80);
    while msg.len() % 64 != 56 {
        msg.push(0);
    }
    msg.extend_from_slice(&ml.to_be_bytes());

    for chunk in msg.chunks(64) {
        let mut w = [0u32; 80];
        for i in 0..16 {
            w[i] = u32::from_be_bytes([chunk[i * 4], chunk[i * 4 + 1], chunk[i * 4 + 2], chunk[i * 4 + 3]]);
        }
        for i in 16..80 {
            w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
        }
        let (mut a, mut b, mut c, mut d, mut e) = (h[0], h[1], h[2], h[3], h[4]);
        for (i, &wi) in w.iter().enumerate() {
            let (f, k) = match i {
                0..=19 => ((b & c) | ((!b) & d), 0x5A827999u32),
                20..=39 => (b ^ c ^ d, 0x6ED9EBA1),
                40..=59 => ((b & c) | (b & d) | (c & d), 0x8F1BBCDC),
                _ => (b ^ c ^ d, 0xCA62C1D6),
            };
            let temp = a
                .rotate_left(5)
                .wrapping_add(f)
                .wrapping_add(e)
                .wrapping_add(k)
                .wrapping_add(wi);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = temp;
        }
        h[0] = h[0].wrapping_add(a);
        h[1] = h[1].wrapping_add(b);
        h[2] = h[2].wrapping_add(c);
        h[3] = h[3].wrapping_add(d);
        h[4] = h[4].wrapping_add(e);
    }
    h.iter().map(|x| format!("{:08x}", x)).collect()
}

pub static SCRIPT_CACHE: Lazy<Mutex<HashMap<String, String>>> = Lazy::new(|| Mutex::new(HashMap::new()));

pub fn script_load(body: &str) -> String {
    let sha = sha1_hex(body.as_bytes());
    SCRIPT_CACHE.lock().unwrap().insert(sha.clone(), body.to_string());
    sha
}

pub fn script_exists(sha: &str) -> bool {
    SCRIPT_CACHE.lock().unwrap().contains_key(&sha.to_lowercase())
}

pub fn script_get(sha: &str) -> Option<String> {
    SCRIPT_CACHE.lock().unwrap().get(&sha.to_lowercase()).cloned()
}

pub fn script_flush() {
    SCRIPT_CACHE.lock().unwrap().clear();
}

/// Callback the shim re-enters the engine through. `read_only` mirrors
/// the `_RO` variant / `no-writes` shebang restriction.
pub trait DispatchCallback {
    fn call(&mut self, args: Vec<Vec<u8>>, read_only: bool) -> CommandResult<crate::resp::Reply>;
}

/// A deterministic stand-in for an embedded scripting VM. Supports a
/// minimal directive language:
///   `redis.call(CMD arg1 arg2 ...)`: one call per line
///   `return <literal>`: literal string/integer reply
#[derive(Default)]
pub struct StubEvaluator;

impl StubEvaluator {
    pub fn eval(
        &self,
        body: &str,
        keys: &[Vec<u8>],
        argv: &[Vec<u8>],
        read_only: bool,
        callback: &mut dyn DispatchCallback,
    ) -> CommandResult<crate::resp::Reply> {
        let mut last = crate::resp::Reply::Nil;
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(inner) = line.strip_prefix("redis.call(").and_then(|s| s.strip_suffix(')')) {
                let args = substitute_tokens(inner, keys, argv);
                last = callback.call(args, read_only)?;
            } else if let Some(val) = line.strip_prefix("return ") {
                let args = substitute_tokens(val, keys, argv);
                last = crate::resp::Reply::bulk_str(String::from_utf8_lossy(&args.concat()).to_string());
            }
        }
        Ok(last)
    }
}

fn substitute_tokens(text: &str, keys: &[Vec<u8>], argv: &[Vec<u8>]) -> Vec<Vec<u8>> {
    text.split_whitespace()
        .map(|tok| {
            if let Some(rest) = tok.strip_prefix("KEYS[").and_then(|s| s.strip_suffix(']')) {
                rest.parse::<usize>()
                    .ok()
                    .and_then(|i| keys.get(i.wrapping_sub(1)))
                    .cloned()
                    .unwrap_or_default()
            } else if let Some(rest) = tok.strip_prefix("ARGV[").and_then(|s| s.strip_suffix(']')) {
                rest.parse::<usize>()
                    .ok()
                    .and_then(|i| argv.get(i.wrapping_sub(1)))
                    .cloned()
                    .unwrap_or_default()
            } else {
                tok.trim_matches('\'').as_bytes().to_vec()
            }
        })
        .collect()
}

pub fn check_write_allowed(read_only: bool) -> CommandResult<()> {
    if read_only {
        Err(CommandError::ScriptWrite)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::Reply;

    struct NullCallback;
    impl DispatchCallback for NullCallback {
        fn call(&mut self, args: Vec<Vec<u8>>, _read_only: bool) -> CommandResult<Reply> {
            Ok(Reply::Array(args.into_iter().map(Reply::Bulk).collect()))
        }
    }

    #[test]
    fn parses_shebang_flags() {
        let flags = parse_shebang("#!lua flags=allow-oom,no-writes\nreturn 1");
        assert!(flags.allow_oom);
        assert!(flags.no_writes);
    }

    #[test]
    fn sha1_is_deterministic_and_expected_length() {
        let sha = sha1_hex(b"return 1");
        assert_eq!(sha.len(), 40);
        assert_eq!(sha, sha1_hex(b"return 1"));
    }

    #[test]
    fn script_cache_round_trips() {
        let sha = script_load("return 1");
        assert!(script_exists(&sha));
        assert_eq!(script_get(&sha), Some("return 1".to_string()));
    }

    #[test]
    fn stub_evaluator_substitutes_keys_and_argv() {
        let ev = StubEvaluator::default();
        let mut cb = NullCallback;
        let reply = ev
            .eval("redis.call(SET KEYS[1] ARGV[1])", &[b"k".to_vec()], &[b"v".to_vec()], false, &mut cb)
            .unwrap();
        assert_eq!(reply, Reply::Array(vec![Reply::Bulk(b"SET".to_vec()), Reply::Bulk(b"k".to_vec()), Reply::Bulk(b"v".to_vec())]));
    }

    #[test]
    fn read_only_scripts_reject_writes() {
        assert_eq!(check_write_allowed(true), Err(CommandError::ScriptWrite));
        assert_eq!(check_write_allowed(false), Ok(()));
    }
}
