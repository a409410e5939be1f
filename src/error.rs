//! Error types for relay control and program execution

use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// An event token could not be parsed or broke a construction rule.
    #[error("invalid event {spec:?}: bad {field}: {reason}")]
    InvalidEventSpec {
        field: &'static str,
        spec: String,
        reason: String,
    },

    #[error("program has no events")]
    EmptyProgram,

    #[error("invalid board number {0}: boards are numbered 1-8")]
    InvalidBoard(u8),

    #[error("can't open i2c bus device {}: {source}", path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't select board at slave address {address:#04x}: {source}")]
    BoardSelect {
        address: u16,
        #[source]
        source: io::Error,
    },

    /// The last board selection failed, so no board is addressed.
    #[error("no board is addressed")]
    NoBoardSelected,

    #[error("relay channel is closed")]
    ChannelClosed,

    #[error("{op} failed: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{op} failed: {done} of {expected} bytes transferred")]
    PartialTransfer {
        op: &'static str,
        done: usize,
        expected: usize,
    },

    #[error("relays already in use (mask={mask:#04x})")]
    AlreadyActive { mask: u8 },

    #[error("can't start signal watcher: {0}")]
    Watcher(#[source] io::Error),

    #[error("interrupted by termination signal")]
    Interrupted,
}

impl Error {
    pub(crate) fn event(field: &'static str, spec: &str, reason: impl ToString) -> Self {
        Error::InvalidEventSpec {
            field,
            spec: spec.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// Configuration problems are detected before any hardware is touched.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::InvalidEventSpec { .. } | Error::EmptyProgram | Error::InvalidBoard(_)
        )
    }

    /// Errors after which the relay state can no longer be trusted.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. }
                | Error::PartialTransfer { .. }
                | Error::NoBoardSelected
                | Error::ChannelClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_one_line() {
        let err = Error::event("duration", "1:1s", "must be at least 3s");
        assert_eq!(
            err.to_string(),
            r#"invalid event "1:1s": bad duration: must be at least 3s"#
        );
        assert_eq!(
            Error::AlreadyActive { mask: 5 }.to_string(),
            "relays already in use (mask=0x05)"
        );
    }

    #[test]
    fn classification() {
        assert!(Error::EmptyProgram.is_config());
        assert!(Error::InvalidBoard(9).is_config());
        assert!(!Error::Interrupted.is_config());
        assert!(Error::PartialTransfer { op: "set", done: 1, expected: 2 }.is_transport());
        assert!(!Error::AlreadyActive { mask: 1 }.is_transport());
    }
}
