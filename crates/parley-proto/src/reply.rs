//! Server-to-client reply tokens.
//!
//! Every line the server can emit is a [`Reply`]; `Display` renders the
//! exact wire form (without the trailing newline, which the transport codec
//! appends). Keeping the full vocabulary in one enum means a session can
//! queue typed replies and the write loop is the only place lines are
//! serialized.

use std::fmt;

use crate::{Body, Identifier};

/// A line the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Authorization challenge; also re-sent after every rejected attempt.
    Who,
    /// Positive acknowledgement (successful `NAME` or delivered `MESG`).
    Ok,
    /// Graceful goodbye before the server closes the connection.
    Bye,
    /// Heartbeat probe.
    Ping,
    /// A delivered direct message.
    From {
        /// Identifier of the sending session.
        sender: Identifier,
        /// Normalized message body.
        body: Body,
    },
    /// One roster line of a `LIST` response.
    RosterEntry(Identifier),
    /// Roster terminator. Cannot collide with a roster line: identifiers
    /// are exactly 8 characters and this marker is 3.
    RosterEnd,
    /// A protocol error report.
    Error(ErrorReply),
}

/// The protocol error vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReply {
    /// Malformed or state-inappropriate request.
    BadRequest,
    /// Unrecognized verb.
    NoSuchCommand,
    /// `NAME` without a usable identifier (missing or wrong length).
    NoNicknameGiven,
    /// The requested identifier is already claimed.
    NicknameInUse,
    /// Message body over the size cap.
    MessageTooLarge,
    /// Delivery to the recipient failed.
    Timeout,
}

impl ErrorReply {
    /// The wire token for this error.
    pub fn token(self) -> &'static str {
        match self {
            Self::BadRequest => "ERR_BADREQUEST",
            Self::NoSuchCommand => "ERR_NOSUCHCOMMAND",
            Self::NoNicknameGiven => "ERR_NONICKNAMEGIVEN",
            Self::NicknameInUse => "ERR_NICKNAMEINUSE",
            Self::MessageTooLarge => "ERR_MESSAGETOOLARGE",
            Self::Timeout => "ERR_TIMEOUT",
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Who => f.write_str("WHO"),
            Self::Ok => f.write_str("OK"),
            Self::Bye => f.write_str("BYE"),
            Self::Ping => f.write_str("PING"),
            Self::From { sender, body } => write!(f, "FROM {sender} {body}"),
            Self::RosterEntry(id) => f.write_str(id.as_str()),
            Self::RosterEnd => f.write_str("END"),
            Self::Error(err) => f.write_str(err.token()),
        }
    }
}
