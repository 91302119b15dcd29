//! Parley chat protocol.
//!
//! Pure protocol logic shared by the server (and any future client): the
//! command grammar, the identifier and message-body rules, and the full
//! vocabulary of server reply tokens. No I/O — every function here is
//! deterministic and synchronous, which is what makes the session engine's
//! behavior unit-testable without a socket in sight.
//!
//! ## Wire format
//!
//! One command per line, ASCII, newline-terminated, case-insensitive verbs:
//!
//! ```text
//! C: NAME abcd1234          S: OK
//! C: LIST                   S: abcd1234 / END
//! C: MESG wxyz5678 hello    S: OK        (recipient sees FROM abcd1234 hello)
//! C: QUIT                   S: BYE
//! S: PING                   C: PONG
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod ident;
mod message;
mod reply;

pub use command::{Command, ParseError, Verb, parse};
pub use ident::{IDENTIFIER_LEN, Identifier, IdentifierError};
pub use message::{Body, BodyError, MAX_BODY_LEN};
pub use reply::{ErrorReply, Reply};
