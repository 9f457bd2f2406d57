//! RESP2/RESP3 request decoding and reply encoding (component A).

use std::fmt;

/// A reply value the dispatcher hands back to the connection loop for
/// encoding. Kept separate from `CommandError` so a handler can return
/// either a success payload or an error through one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    Nil,
    NilArray,
    Array(Vec<Reply>),
    Double(f64),
    Boolean(bool),
    BigNumber(String),
    Map(Vec<(Reply, Reply)>),
    Set(Vec<Reply>),
    Verbatim(String, Vec<u8>),
    Push(Vec<Reply>),
    NoReply,
    /// Pre-framed bytes written to the socket exactly as given, bypassing
    /// RESP encoding entirely. Used for the replication handshake, whose
    /// wire format (a `+FULLRESYNC` line followed by a length-prefixed RDB
    /// payload with no trailing CRLF) isn't a reply type RESP has a name for.
    Raw(Vec<u8>),
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Simple("OK".into())
    }

    pub fn from_bytes(v: impl Into<Vec<u8>>) -> Reply {
        Reply::Bulk(v.into())
    }

    pub fn bulk_str(s: impl Into<String>) -> Reply {
        Reply::Bulk(s.into().into_bytes())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

/// Protocol version negotiated via `HELLO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoVer {
    Resp2,
    Resp3,
}

pub fn encode(reply: &Reply, proto: ProtoVer) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(reply, proto, &mut out);
    out
}

fn encode_into(reply: &Reply, proto: ProtoVer, out: &mut Vec<u8>) {
    match reply {
        Reply::NoReply => {}
        Reply::Raw(bytes) => out.extend_from_slice(bytes),
        Reply::Simple(s) => {
            out.push(b'+');
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Reply::Error(s) => {
            out.push(b'-');
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Reply::Integer(n) => {
            out.push(b':');
            out.extend_from_slice(n.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Reply::Bulk(b) => {
            out.push(b'$');
            out.extend_from_slice(b.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(b);
            out.extend_from_slice(b"\r\n");
        }
        Reply::Nil => {
            if proto == ProtoVer::Resp3 {
                out.extend_from_slice(b"_\r\n");
            } else {
                out.extend_from_slice(b"$-1\r\n");
            }
        }
        Reply::NilArray => {
            if proto == ProtoVer::Resp3 {
                out.extend_from_slice(b"_\r\n");
            } else {
                out.extend_from_slice(b"*-1\r\n");
            }
        }
        Reply::Array(items) => {
            out.push(b'*');
            out.extend_from_slice(items.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            for item in items {
                encode_into(item, proto, out);
            }
        }
        Reply::Double(d) => {
            if proto == ProtoVer::Resp3 {
                out.push(b',');
                out.extend_from_slice(format_double(*d).as_bytes());
                out.extend_from_slice(b"\r\n");
            } else {
                encode_into(&Reply::bulk_str(format_double(*d)), proto, out);
            }
        }
        Reply::Boolean(b) => {
            if proto == ProtoVer::Resp3 {
                out.extend_from_slice(if *b { b"#t\r\n" } else { b"#f\r\n" });
            } else {
                encode_into(&Reply::Integer(if *b { 1 } else { 0 }), proto, out);
            }
        }
        Reply::BigNumber(s) => {
            if proto == ProtoVer::Resp3 {
                out.push(b'(');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            } else {
                encode_into(&Reply::bulk_str(s.clone()), proto, out);
            }
        }
        Reply::Map(pairs) => {
            if proto == ProtoVer::Resp3 {
                out.push(b'%');
                out.extend_from_slice(pairs.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for (k, v) in pairs {
                    encode_into(k, proto, out);
                    encode_into(v, proto, out);
                }
            } else {
                let flat: Vec<Reply> = pairs
                    .iter()
                    .flat_map(|(k, v)| vec![k.clone(), v.clone()])
                    .collect();
                encode_into(&Reply::Array(flat), proto, out);
            }
        }
        Reply::Set(items) => {
            if proto == ProtoVer::Resp3 {
                out.push(b'~');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    encode_into(item, proto, out);
                }
            } else {
                encode_into(&Reply::Array(items.clone()), proto, out);
            }
        }
        Reply::Verbatim(fmt_tag, body) => {
            if proto == ProtoVer::Resp3 {
                out.push(b'=');
                out.extend_from_slice((body.len() + 4).to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(fmt_tag.as_bytes());
                out.push(b':');
                out.extend_from_slice(body);
                out.extend_from_slice(b"\r\n");
            } else {
                encode_into(&Reply::Bulk(body.clone()), proto, out);
            }
        }
        Reply::Push(items) => {
            if proto == ProtoVer::Resp3 {
                out.push(b'>');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    encode_into(item, proto, out);
                }
            } else {
                encode_into(&Reply::Array(items.clone()), proto, out);
            }
        }
    }
}

pub fn format_double(d: f64) -> String {
    if d.is_infinite() {
        if d > 0.0 { "inf".into() } else { "-inf".into() }
    } else if d.fract() == 0.0 && d.abs() < 1e17 {
        format!("{}", d as i64)
    } else {
        format!("{:.17}", d)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

#[derive(Debug, PartialEq)]
pub enum DecodeError {
    Incomplete,
    Protocol(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Incomplete => write!(f, "incomplete"),
            DecodeError::Protocol(s) => write!(f, "{}", s),
        }
    }
}

/// Attempts to extract one full request from `buf`. Returns
/// `(args, consumed_bytes)` on success.
pub fn decode_request(buf: &[u8]) -> Result<(Vec<Vec<u8>>, usize), DecodeError> {
    if buf.is_empty() {
        return Err(DecodeError::Incomplete);
    }
    if buf[0] == b'*' {
        decode_multibulk(buf)
    } else {
        decode_inline(buf)
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|p| p + from)
}

fn decode_inline(buf: &[u8]) -> Result<(Vec<Vec<u8>>, usize), DecodeError> {
    let nl = match buf.iter().position(|&b| b == b'\n') {
        Some(p) => p,
        None => {
            if buf.len() > 64 * 1024 {
                return Err(DecodeError::Protocol("too big inline request".into()));
            }
            return Err(DecodeError::Incomplete);
        }
    };
    let line_end = if nl > 0 && buf[nl - 1] == b'\r' { nl - 1 } else { nl };
    let line = &buf[..line_end];
    let args: Vec<Vec<u8>> = line
        .split(|&b| b == b' ')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_vec())
        .collect();
    Ok((args, nl + 1))
}

fn decode_multibulk(buf: &[u8]) -> Result<(Vec<Vec<u8>>, usize), DecodeError> {
    let mut pos = 0usize;
    let line_end = find_crlf(buf, pos).ok_or(DecodeError::Incomplete)?;
    let count_str = std::str::from_utf8(&buf[pos + 1..line_end])
        .map_err(|_| DecodeError::Protocol("invalid multibulk length".into()))?;
    let count: i64 = count_str
        .parse()
        .map_err(|_| DecodeError::Protocol("invalid multibulk length".into()))?;
    pos = line_end + 2;
    if count < 0 {
        return Ok((Vec::new(), pos));
    }
    if count > 1024 * 1024 {
        return Err(DecodeError::Protocol("invalid multibulk length".into()));
    }
    let mut args = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if pos >= buf.len() {
            return Err(DecodeError::Incomplete);
        }
        if buf[pos] != b'$' {
            return Err(DecodeError::Protocol(format!(
                "expected '$', got '{}'",
                buf[pos] as char
            )));
        }
        let len_end = find_crlf(buf, pos).ok_or(DecodeError::Incomplete)?;
        let len_str = std::str::from_utf8(&buf[pos + 1..len_end])
            .map_err(|_| DecodeError::Protocol("invalid bulk length".into()))?;
        let len: i64 = len_str
            .parse()
            .map_err(|_| DecodeError::Protocol("invalid bulk length".into()))?;
        if len < 0 || len > 512 * 1024 * 1024 {
            return Err(DecodeError::Protocol("invalid bulk length".into()));
        }
        let data_start = len_end + 2;
        let data_end = data_start + len as usize;
        if data_end + 2 > buf.len() {
            return Err(DecodeError::Incomplete);
        }
        if &buf[data_end..data_end + 2] != b"\r\n" {
            return Err(DecodeError::Protocol("expected CRLF after bulk data".into()));
        }
        args.push(buf[data_start..data_end].to_vec());
        pos = data_end + 2;
    }
    Ok((args, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_multibulk() {
        let raw = b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n";
        let (args, consumed) = decode_request(raw).unwrap();
        assert_eq!(consumed, raw.len());
        assert_eq!(args, vec![b"GET".to_vec(), b"k".to_vec()]);
    }

    #[test]
    fn reports_incomplete_on_partial_frame() {
        let raw = b"*2\r\n$3\r\nGET\r\n$3\r\nfo";
        assert_eq!(decode_request(raw), Err(DecodeError::Incomplete));
    }

    #[test]
    fn decodes_inline_command() {
        let raw = b"PING\r\n";
        let (args, consumed) = decode_request(raw).unwrap();
        assert_eq!(consumed, raw.len());
        assert_eq!(args, vec![b"PING".to_vec()]);
    }

    #[test]
    fn encodes_nil_resp2_vs_resp3() {
        assert_eq!(encode(&Reply::Nil, ProtoVer::Resp2), b"$-1\r\n");
        assert_eq!(encode(&Reply::Nil, ProtoVer::Resp3), b"_\r\n");
    }

    #[test]
    fn encodes_array_of_bulks() {
        let r = Reply::Array(vec![Reply::bulk_str("a"), Reply::Integer(2)]);
        assert_eq!(encode(&r, ProtoVer::Resp2), b"*2\r\n$1\r\na\r\n:2\r\n");
    }

    #[test]
    fn protocol_error_on_bad_type_byte() {
        let raw = b"*1\r\n#bad\r\n";
        match decode_request(raw) {
            Err(DecodeError::Protocol(_)) => {}
            other => panic!("expected protocol error, got {:?}", other),
        }
    }
}
