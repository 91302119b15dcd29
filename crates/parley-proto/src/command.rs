//! Command grammar.
//!
//! One command per line. The verb is the first whitespace-delimited token,
//! matched case-insensitively against a fixed table:
//!
//! | Verb   | Arguments                                  |
//! |--------|--------------------------------------------|
//! | `QUIT` | none                                       |
//! | `LIST` | none                                       |
//! | `PONG` | none (heartbeat reply, not a real command) |
//! | `NAME` | exactly one token                          |
//! | `MESG` | recipient token + remainder-of-line body   |
//!
//! Parsing is pure and deterministic; argument *content* (identifier length,
//! body size) is validated later, at the session boundary.

/// A protocol verb, recognized case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// End the session.
    Quit,
    /// Claim an identifier (authorization only).
    Name,
    /// Request the roster of online peers.
    List,
    /// Send a direct message.
    Mesg,
    /// Heartbeat liveness reply.
    Pong,
}

impl Verb {
    fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("QUIT") {
            Some(Self::Quit)
        } else if token.eq_ignore_ascii_case("NAME") {
            Some(Self::Name)
        } else if token.eq_ignore_ascii_case("LIST") {
            Some(Self::List)
        } else if token.eq_ignore_ascii_case("MESG") {
            Some(Self::Mesg)
        } else if token.eq_ignore_ascii_case("PONG") {
            Some(Self::Pong)
        } else {
            None
        }
    }
}

/// A parsed client command.
///
/// Arguments are carried as raw tokens; `NAME`'s token may still fail the
/// identifier length rule and `MESG`'s body may still fail the size rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `QUIT` — end the session.
    Quit,
    /// `NAME <id>` — claim an identifier.
    Name(String),
    /// `LIST` — request the roster.
    List,
    /// `MESG <toId> <body...>` — direct message.
    Mesg {
        /// Recipient token (first argument).
        to: String,
        /// Free-form body, everything after the recipient token, trimmed.
        body: String,
    },
    /// `PONG` — heartbeat liveness reply.
    Pong,
}

/// Why a line failed to parse.
///
/// Arity errors carry the verb so callers can pick verb-specific replies
/// (a bare `NAME` warrants `ERR_NONICKNAMEGIVEN`, not a generic error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The verb is not in the command table (or the line was empty).
    #[error("unknown command")]
    UnknownCommand,

    /// The verb was recognized but required arguments are missing.
    #[error("missing arguments for {0:?}")]
    MissingArgs(Verb),

    /// The verb was recognized but received extra tokens.
    #[error("too many arguments for {0:?}")]
    TooManyArgs(Verb),
}

/// Split off the first whitespace-delimited token.
///
/// Returns the token and the trimmed remainder (empty if none).
fn split_token(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim()),
        None => (s, ""),
    }
}

/// Parse one line into a [`Command`].
///
/// # Errors
///
/// Returns [`ParseError::UnknownCommand`] for empty lines and unrecognized
/// verbs, [`ParseError::MissingArgs`] / [`ParseError::TooManyArgs`] for
/// arity violations.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::UnknownCommand);
    }

    let (token, rest) = split_token(line);
    let verb = Verb::from_token(token).ok_or(ParseError::UnknownCommand)?;

    match verb {
        Verb::Quit | Verb::List | Verb::Pong => {
            if rest.is_empty() {
                Ok(match verb {
                    Verb::Quit => Command::Quit,
                    Verb::List => Command::List,
                    _ => Command::Pong,
                })
            } else {
                Err(ParseError::TooManyArgs(verb))
            }
        }

        Verb::Name => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgs(Verb::Name));
            }
            let (id, extra) = split_token(rest);
            if extra.is_empty() {
                Ok(Command::Name(id.to_owned()))
            } else {
                Err(ParseError::TooManyArgs(Verb::Name))
            }
        }

        Verb::Mesg => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgs(Verb::Mesg));
            }
            let (to, body) = split_token(rest);
            if to.is_empty() || body.is_empty() {
                return Err(ParseError::MissingArgs(Verb::Mesg));
            }
            Ok(Command::Mesg { to: to.to_owned(), body: body.to_owned() })
        }
    }
}
