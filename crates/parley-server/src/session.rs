//! Per-connection session engine.
//!
//! A session owns its framed transport exclusively and walks the
//! `Authorizing → Active → Closed` state machine:
//!
//! - `Authorizing`: challenge the peer with `WHO` until it claims a valid,
//!   unused identifier (or quits, or the transport dies).
//! - `Active`: dispatch commands, timestamp `PONG`s for the heartbeat task,
//!   drain the outbox other sessions (and the heartbeat) deliver into.
//! - `Closed`: release the registry claim, cancel the heartbeat, drop the
//!   transport. The teardown path at the bottom of [`Session::run`] is the
//!   only exit, so it runs exactly once no matter what triggered it.

use std::net::SocketAddr;
use std::time::Instant;

use futures::SinkExt;
use parley_proto::{
    Body, BodyError, Command, ErrorReply, Identifier, ParseError, Reply, Verb,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::env::Environment;
use crate::heartbeat::{self, HeartbeatConfig};
use crate::registry::{ClientRegistry, PeerHandle};

/// Errors fatal to a single session (never to the server).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Read/write fault or an over-long line on this connection.
    #[error("transport error: {0}")]
    Transport(#[from] LinesCodecError),
}

type LineTransport = Framed<TcpStream, LinesCodec>;

/// What handling one active-phase line decided.
enum LineOutcome {
    /// Keep reading.
    Continue,
    /// Peer sent `QUIT`; `BYE` has already been attempted.
    Quit,
}

/// One client connection's server-side state.
pub(crate) struct Session<E: Environment> {
    conn_id: u64,
    peer_addr: SocketAddr,
    registry: ClientRegistry,
    env: E,
    heartbeat: HeartbeatConfig,
    max_line_length: usize,
}

impl<E: Environment> Session<E> {
    pub(crate) fn new(
        conn_id: u64,
        peer_addr: SocketAddr,
        registry: ClientRegistry,
        env: E,
        heartbeat: HeartbeatConfig,
        max_line_length: usize,
    ) -> Self {
        Self { conn_id, peer_addr, registry, env, heartbeat, max_line_length }
    }

    /// Drive the connection from accept to teardown.
    pub(crate) async fn run(self, socket: TcpStream) -> Result<(), SessionError> {
        let mut framed =
            Framed::new(socket, LinesCodec::new_with_max_length(self.max_line_length));
        let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel();

        let Some(id) = self.authorize(&mut framed, &outbox_tx).await? else {
            // Never activated: nothing claimed, nothing to release.
            return Ok(());
        };

        let (pong_tx, pong_rx) = watch::channel(self.env.now());
        let cancel = CancellationToken::new();
        let monitor = tokio::spawn(heartbeat::run(
            self.env.clone(),
            self.heartbeat,
            self.conn_id,
            outbox_tx.clone(),
            pong_rx,
            cancel.clone(),
        ));
        // Keep our own sender alive so the outbox branch below can never see
        // a closed channel while the loop still runs.
        let _outbox_tx = outbox_tx;

        let outcome = loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    // Heartbeat gave up on the peer; silent drop, no BYE.
                    break Ok(());
                }

                incoming = framed.next() => match incoming {
                    None => break Ok(()), // EOF: ungraceful QUIT
                    Some(Err(e)) => break Err(SessionError::from(e)),
                    Some(Ok(line)) => {
                        match self.on_active_line(&mut framed, &id, &pong_tx, &line).await {
                            Ok(LineOutcome::Continue) => {}
                            Ok(LineOutcome::Quit) => break Ok(()),
                            Err(e) => break Err(e),
                        }
                    }
                },

                queued = outbox_rx.recv() => {
                    if let Some(reply) = queued {
                        if let Err(e) = framed.send(reply.to_string()).await {
                            break Err(SessionError::from(e));
                        }
                    }
                }
            }
        };

        // Closed: single teardown path for every trigger.
        cancel.cancel();
        self.registry.release(&id).await;
        let _ = monitor.await;
        tracing::info!(conn_id = self.conn_id, %id, "session closed");
        outcome
    }

    /// `Authorizing` phase: loop until a successful claim or a terminal exit.
    ///
    /// Returns the claimed identifier, or `None` if the session ended before
    /// activation (graceful `QUIT` or dead transport).
    async fn authorize(
        &self,
        framed: &mut LineTransport,
        outbox_tx: &mpsc::UnboundedSender<Reply>,
    ) -> Result<Option<Identifier>, SessionError> {
        tracing::debug!(conn_id = self.conn_id, addr = %self.peer_addr, "starting authorization");
        framed.send(Reply::Who.to_string()).await?;

        loop {
            let Some(line) = framed.next().await else {
                tracing::debug!(conn_id = self.conn_id, "connection closed during authorization");
                return Ok(None);
            };
            let line = line?;

            match parley_proto::parse(&line) {
                Ok(Command::Quit) => {
                    self.send_bye(framed).await;
                    return Ok(None);
                }

                Ok(Command::Name(raw)) => match Identifier::parse(&raw) {
                    Ok(id) => {
                        let handle = PeerHandle::new(self.conn_id, outbox_tx.clone());
                        if self.registry.try_claim(id.clone(), handle).await {
                            tracing::info!(conn_id = self.conn_id, %id, "authorization complete");
                            framed.send(Reply::Ok.to_string()).await?;
                            return Ok(Some(id));
                        }
                        tracing::warn!(conn_id = self.conn_id, %id, "identifier already in use");
                        self.reject(framed, ErrorReply::NicknameInUse).await?;
                    }
                    Err(e) => {
                        tracing::warn!(conn_id = self.conn_id, "rejected identifier: {}", e);
                        self.reject(framed, ErrorReply::NoNicknameGiven).await?;
                    }
                },

                // Recognized commands that are meaningless before activation.
                Ok(Command::List | Command::Mesg { .. } | Command::Pong) => {
                    self.reject(framed, ErrorReply::BadRequest).await?;
                }

                Err(ParseError::UnknownCommand) => {
                    self.reject(framed, ErrorReply::NoSuchCommand).await?;
                }
                Err(ParseError::MissingArgs(Verb::Name)) => {
                    self.reject(framed, ErrorReply::NoNicknameGiven).await?;
                }
                Err(ParseError::MissingArgs(_) | ParseError::TooManyArgs(_)) => {
                    self.reject(framed, ErrorReply::BadRequest).await?;
                }
            }
        }
    }

    /// Send an error followed by the `WHO` re-challenge.
    async fn reject(
        &self,
        framed: &mut LineTransport,
        error: ErrorReply,
    ) -> Result<(), SessionError> {
        framed.send(Reply::Error(error).to_string()).await?;
        framed.send(Reply::Who.to_string()).await?;
        Ok(())
    }

    /// Handle one line received while `Active`.
    async fn on_active_line(
        &self,
        framed: &mut LineTransport,
        id: &Identifier,
        pong_tx: &watch::Sender<Instant>,
        line: &str,
    ) -> Result<LineOutcome, SessionError> {
        match parley_proto::parse(line) {
            // Liveness reply, not a protocol command: timestamp and move on.
            Ok(Command::Pong) => {
                tracing::trace!(conn_id = self.conn_id, "PONG");
                let _ = pong_tx.send(self.env.now());
            }

            Ok(Command::Quit) => {
                self.send_bye(framed).await;
                return Ok(LineOutcome::Quit);
            }

            // Re-naming an active session is not permitted.
            Ok(Command::Name(_)) => {
                framed.send(Reply::Error(ErrorReply::BadRequest).to_string()).await?;
            }

            Ok(Command::List) => {
                let roster = self.registry.snapshot().await;
                tracing::debug!(conn_id = self.conn_id, peers = roster.len(), "roster sent");
                for peer in roster {
                    framed.send(Reply::RosterEntry(peer).to_string()).await?;
                }
                framed.send(Reply::RosterEnd.to_string()).await?;
            }

            Ok(Command::Mesg { to, body }) => {
                self.relay_message(framed, id, &to, &body).await?;
            }

            Err(ParseError::UnknownCommand) => {
                tracing::debug!(conn_id = self.conn_id, "unknown command");
                framed.send(Reply::Error(ErrorReply::NoSuchCommand).to_string()).await?;
            }
            Err(ParseError::MissingArgs(_) | ParseError::TooManyArgs(_)) => {
                framed.send(Reply::Error(ErrorReply::BadRequest).to_string()).await?;
            }
        }

        Ok(LineOutcome::Continue)
    }

    /// Route a direct message to its recipient's outbox.
    async fn relay_message(
        &self,
        framed: &mut LineTransport,
        sender: &Identifier,
        to: &str,
        raw_body: &str,
    ) -> Result<(), SessionError> {
        // A token that fails the identifier rules can never be registered,
        // so it reports the same way as an unknown recipient.
        let recipient = match Identifier::parse(to) {
            Ok(recipient) => recipient,
            Err(_) => {
                framed.send(Reply::Error(ErrorReply::BadRequest).to_string()).await?;
                return Ok(());
            }
        };

        let Some(handle) = self.registry.lookup(&recipient).await else {
            tracing::debug!(conn_id = self.conn_id, %recipient, "no such recipient");
            framed.send(Reply::Error(ErrorReply::BadRequest).to_string()).await?;
            return Ok(());
        };

        let body = match Body::parse(raw_body) {
            Ok(body) => body,
            Err(BodyError::Empty) => {
                framed.send(Reply::Error(ErrorReply::BadRequest).to_string()).await?;
                return Ok(());
            }
            Err(BodyError::TooLarge(len)) => {
                tracing::debug!(conn_id = self.conn_id, len, "oversized message rejected");
                framed.send(Reply::Error(ErrorReply::MessageTooLarge).to_string()).await?;
                return Ok(());
            }
        };

        match handle.deliver(Reply::From { sender: sender.clone(), body }) {
            Ok(()) => {
                tracing::debug!(conn_id = self.conn_id, from = %sender, to = %recipient, "message relayed");
                framed.send(Reply::Ok.to_string()).await?;
            }
            Err(_) => {
                // Recipient is tearing down; its own task handles cleanup.
                tracing::warn!(conn_id = self.conn_id, to = %recipient, "delivery failed");
                framed.send(Reply::Error(ErrorReply::Timeout).to_string()).await?;
            }
        }

        Ok(())
    }

    /// Attempt a graceful `BYE`; failure to deliver it never blocks teardown.
    async fn send_bye(&self, framed: &mut LineTransport) {
        if let Err(e) = framed.send(Reply::Bye.to_string()).await {
            tracing::debug!(conn_id = self.conn_id, "BYE not delivered: {}", e);
        }
    }
}
