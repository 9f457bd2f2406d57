use std::fmt;

/// Every error a command handler can return. Display produces the exact
/// wire text that follows the `-` type byte (without the trailing CRLF).
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    WrongType,
    WrongArity(String),
    NotInteger,
    NotFloat,
    Syntax,
    InvalidExpire(String),
    Oom,
    Busy,
    NoScript,
    NotBusy,
    NoReplicas,
    ReadOnly,
    MasterDown,
    ExecAbort,
    Moved { slot: u16, addr: String },
    Ask { slot: u16, addr: String },
    BusyKey,
    NoProto,
    IoErr(String),
    UnknownCommand(String),
    NoAuth,
    WrongPass,
    OutOfRange,
    NestedMulti,
    WithoutMulti,
    WatchInsideMulti,
    ScriptWrite,
    NoSuchKey,
    Custom(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::WrongType => write!(
                f,
                "WRONGTYPE Operation against a key holding the wrong kind of value"
            ),
            CommandError::WrongArity(cmd) => write!(
                f,
                "ERR wrong number of arguments for '{}' command",
                cmd.to_lowercase()
            ),
            CommandError::NotInteger => write!(f, "ERR value is not an integer or out of range"),
            CommandError::NotFloat => write!(f, "ERR value is not a valid float"),
            CommandError::Syntax => write!(f, "ERR syntax error"),
            CommandError::InvalidExpire(cmd) => {
                write!(f, "ERR invalid expire time in '{}' command", cmd.to_lowercase())
            }
            CommandError::Oom => write!(
                f,
                "OOM command not allowed when used memory > 'maxmemory'."
            ),
            CommandError::Busy => write!(
                f,
                "BUSY Redis is busy running a script. You can only call SCRIPT KILL or SHUTDOWN NOSAVE."
            ),
            CommandError::NoScript => write!(f, "NOSCRIPT No matching script. Please use EVAL."),
            CommandError::NotBusy => write!(f, "NOTBUSY No scripts in execution right now."),
            CommandError::NoReplicas => write!(f, "NOREPLICAS Not enough good replicas to write."),
            CommandError::ReadOnly => write!(f, "READONLY You can't write against a read only replica."),
            CommandError::MasterDown => write!(
                f,
                "MASTERDOWN Link with MASTER is down and replica-serve-stale-data is set to 'no'."
            ),
            CommandError::ExecAbort => write!(
                f,
                "EXECABORT Transaction discarded because of previous errors."
            ),
            CommandError::Moved { slot, addr } => write!(f, "MOVED {} {}", slot, addr),
            CommandError::Ask { slot, addr } => write!(f, "ASK {} {}", slot, addr),
            CommandError::BusyKey => write!(f, "BUSYKEY Target key name already exists."),
            CommandError::NoProto => write!(f, "NOPROTO unsupported protocol version"),
            CommandError::IoErr(msg) => write!(f, "IOERR {}", msg),
            CommandError::UnknownCommand(msg) => write!(f, "ERR {}", msg),
            CommandError::NoAuth => write!(f, "NOAUTH Authentication required."),
            CommandError::WrongPass => write!(f, "ERR invalid password"),
            CommandError::OutOfRange => write!(f, "ERR index out of range"),
            CommandError::NestedMulti => write!(f, "ERR MULTI calls can not be nested"),
            CommandError::WithoutMulti => write!(f, "ERR {} without MULTI", "EXEC/DISCARD"),
            CommandError::WatchInsideMulti => write!(f, "ERR WATCH inside MULTI is not allowed"),
            CommandError::ScriptWrite => write!(
                f,
                "ERR Write commands are not allowed from read-only scripts"
            ),
            CommandError::NoSuchKey => write!(f, "ERR no such key"),
            CommandError::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CommandError {}

/// The error code prefix used for errorstats bucketing.
pub fn error_code(err: &CommandError) -> &'static str {
    match err {
        CommandError::WrongType => "WRONGTYPE",
        CommandError::WrongArity(_) => "ERR",
        CommandError::NotInteger | CommandError::NotFloat => "ERR",
        CommandError::Syntax => "ERR",
        CommandError::InvalidExpire(_) => "ERR",
        CommandError::Oom => "OOM",
        CommandError::Busy => "BUSY",
        CommandError::NoScript => "NOSCRIPT",
        CommandError::NotBusy => "NOTBUSY",
        CommandError::NoReplicas => "NOREPLICAS",
        CommandError::ReadOnly => "READONLY",
        CommandError::MasterDown => "MASTERDOWN",
        CommandError::ExecAbort => "EXECABORT",
        CommandError::Moved { .. } => "MOVED",
        CommandError::Ask { .. } => "ASK",
        CommandError::BusyKey => "BUSYKEY",
        CommandError::NoProto => "NOPROTO",
        CommandError::IoErr(_) => "IOERR",
        CommandError::UnknownCommand(_) => "ERR",
        CommandError::NoAuth => "NOAUTH",
        CommandError::WrongPass => "ERR",
        CommandError::OutOfRange => "ERR",
        CommandError::NestedMulti => "ERR",
        CommandError::WithoutMulti => "ERR",
        CommandError::WatchInsideMulti => "ERR",
        CommandError::ScriptWrite => "ERR",
        CommandError::NoSuchKey => "ERR",
        CommandError::Custom(_) => "ERR",
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrongtype_text_is_exact() {
        assert_eq!(
            CommandError::WrongType.to_string(),
            "WRONGTYPE Operation against a key holding the wrong kind of value"
        );
    }

    #[test]
    fn arity_lowercases_command() {
        assert_eq!(
            CommandError::WrongArity("GET".into()).to_string(),
            "ERR wrong number of arguments for 'get' command"
        );
    }

    #[test]
    fn moved_formats_slot_and_addr() {
        let e = CommandError::Moved { slot: 42, addr: "127.0.0.1:7001".into() };
        assert_eq!(e.to_string(), "MOVED 42 127.0.0.1:7001");
    }
}
