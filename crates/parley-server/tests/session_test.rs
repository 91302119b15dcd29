//! End-to-end protocol tests over loopback TCP.
//!
//! Each test binds a real server on an ephemeral port and drives it with
//! plain socket clients. The heartbeat probes immediately on activation, so
//! [`TestClient::recv`] skips `PING` lines; heartbeat-focused tests read the
//! raw stream instead.

use std::net::SocketAddr;
use std::time::Duration;

use parley_server::{HeartbeatConfig, Server, ServerConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Heartbeat that probes once at activation and then stays quiet for the
/// life of any test.
fn relaxed_heartbeat() -> HeartbeatConfig {
    HeartbeatConfig {
        ping_interval: Duration::from_secs(600),
        pong_wait: Duration::from_secs(5),
        max_missed: 3,
    }
}

/// Millisecond-scale heartbeat for liveness tests.
fn fast_heartbeat() -> HeartbeatConfig {
    HeartbeatConfig {
        ping_interval: Duration::from_millis(50),
        pong_wait: Duration::from_millis(20),
        max_missed: 2,
    }
}

async fn spawn_server(heartbeat: HeartbeatConfig) -> SocketAddr {
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        heartbeat,
        ..ServerConfig::default()
    };
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        Self { lines: BufReader::new(read).lines(), writer }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Next line, including heartbeat probes.
    async fn recv_raw(&mut self) -> Option<String> {
        tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .expect("read error")
    }

    /// Next protocol line, skipping heartbeat probes.
    async fn recv(&mut self) -> String {
        loop {
            match self.recv_raw().await {
                Some(line) if line == "PING" => {}
                Some(line) => return line,
                None => panic!("connection closed while expecting a line"),
            }
        }
    }

    /// Authorize with the given 8-character identifier.
    async fn authorize(&mut self, id: &str) {
        assert_eq!(self.recv().await, "WHO");
        self.send(&format!("NAME {id}")).await;
        assert_eq!(self.recv().await, "OK");
    }

    /// Assert the server closes the connection, draining anything pending.
    async fn expect_closed(&mut self) {
        loop {
            match tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line())
                .await
                .expect("timed out waiting for close")
            {
                Ok(None) => return,
                Ok(Some(_)) => {}
                Err(_) => return, // reset also counts as closed
            }
        }
    }
}

#[tokio::test]
async fn authorization_happy_path() {
    let addr = spawn_server(relaxed_heartbeat()).await;
    let mut client = TestClient::connect(addr).await;
    client.authorize("abcd1234").await;
}

#[tokio::test]
async fn authorization_rejects_wrong_length_names() {
    let addr = spawn_server(relaxed_heartbeat()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.recv().await, "WHO");

    client.send("NAME short").await;
    assert_eq!(client.recv().await, "ERR_NONICKNAMEGIVEN");
    assert_eq!(client.recv().await, "WHO");

    client.send("NAME ninechars").await;
    assert_eq!(client.recv().await, "ERR_NONICKNAMEGIVEN");
    assert_eq!(client.recv().await, "WHO");

    client.send("NAME").await;
    assert_eq!(client.recv().await, "ERR_NONICKNAMEGIVEN");
    assert_eq!(client.recv().await, "WHO");

    // Still claimable after all the rejections.
    client.send("NAME abcd1234").await;
    assert_eq!(client.recv().await, "OK");
}

#[tokio::test]
async fn authorization_rejects_duplicate_identifier() {
    let addr = spawn_server(relaxed_heartbeat()).await;

    let mut first = TestClient::connect(addr).await;
    first.authorize("abcd1234").await;

    let mut second = TestClient::connect(addr).await;
    assert_eq!(second.recv().await, "WHO");
    second.send("NAME abcd1234").await;
    assert_eq!(second.recv().await, "ERR_NICKNAMEINUSE");
    assert_eq!(second.recv().await, "WHO");

    // A different id goes through.
    second.send("NAME wxyz5678").await;
    assert_eq!(second.recv().await, "OK");
}

#[tokio::test]
async fn authorization_rejects_other_commands_and_rechallenges() {
    let addr = spawn_server(relaxed_heartbeat()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.recv().await, "WHO");

    client.send("LIST").await;
    assert_eq!(client.recv().await, "ERR_BADREQUEST");
    assert_eq!(client.recv().await, "WHO");

    client.send("MESG abcd1234 hello").await;
    assert_eq!(client.recv().await, "ERR_BADREQUEST");
    assert_eq!(client.recv().await, "WHO");

    client.send("BOGUS").await;
    assert_eq!(client.recv().await, "ERR_NOSUCHCOMMAND");
    assert_eq!(client.recv().await, "WHO");
}

#[tokio::test]
async fn quit_during_authorization_says_bye() {
    let addr = spawn_server(relaxed_heartbeat()).await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.recv().await, "WHO");
    client.send("QUIT").await;
    assert_eq!(client.recv().await, "BYE");
    client.expect_closed().await;
}

#[tokio::test]
async fn list_returns_the_current_roster() {
    let addr = spawn_server(relaxed_heartbeat()).await;

    let mut alice = TestClient::connect(addr).await;
    alice.authorize("alice000").await;

    // One active session: the roster is just us.
    alice.send("LIST").await;
    assert_eq!(alice.recv().await, "alice000");
    assert_eq!(alice.recv().await, "END");

    let mut bob = TestClient::connect(addr).await;
    bob.authorize("bobby000").await;

    // Sorted, consistent snapshot with two sessions.
    alice.send("LIST").await;
    assert_eq!(alice.recv().await, "alice000");
    assert_eq!(alice.recv().await, "bobby000");
    assert_eq!(alice.recv().await, "END");

    // A released id never shows up again.
    bob.send("QUIT").await;
    assert_eq!(bob.recv().await, "BYE");
    bob.expect_closed().await;

    // The socket only closes after the entry is released, so once we've
    // seen EOF this snapshot cannot still contain the departed peer.
    alice.send("LIST").await;
    assert_eq!(alice.recv().await, "alice000");
    assert_eq!(alice.recv().await, "END");
}

#[tokio::test]
async fn mesg_delivers_to_recipient_and_acks_sender() {
    let addr = spawn_server(relaxed_heartbeat()).await;

    let mut alice = TestClient::connect(addr).await;
    alice.authorize("alice000").await;
    let mut bob = TestClient::connect(addr).await;
    bob.authorize("bobby000").await;

    bob.send("MESG alice000 hello there, friend").await;
    assert_eq!(bob.recv().await, "OK");
    assert_eq!(alice.recv().await, "FROM bobby000 hello there, friend");

    alice.send("MESG bobby000 hi back").await;
    assert_eq!(alice.recv().await, "OK");
    assert_eq!(bob.recv().await, "FROM alice000 hi back");
}

#[tokio::test]
async fn mesg_to_unknown_recipient_is_a_bad_request() {
    let addr = spawn_server(relaxed_heartbeat()).await;
    let mut client = TestClient::connect(addr).await;
    client.authorize("alice000").await;

    client.send("MESG nobody99 hello").await;
    assert_eq!(client.recv().await, "ERR_BADREQUEST");

    // A recipient token that can't even be an identifier reports the same.
    client.send("MESG x hello").await;
    assert_eq!(client.recv().await, "ERR_BADREQUEST");
}

#[tokio::test]
async fn mesg_body_size_boundary() {
    let addr = spawn_server(relaxed_heartbeat()).await;

    let mut alice = TestClient::connect(addr).await;
    alice.authorize("alice000").await;
    let mut bob = TestClient::connect(addr).await;
    bob.authorize("bobby000").await;

    let exact = "x".repeat(256);
    bob.send(&format!("MESG alice000 {exact}")).await;
    assert_eq!(bob.recv().await, "OK");
    assert_eq!(alice.recv().await, format!("FROM bobby000 {exact}"));

    let over = "x".repeat(257);
    bob.send(&format!("MESG alice000 {over}")).await;
    assert_eq!(bob.recv().await, "ERR_MESSAGETOOLARGE");
}

#[tokio::test]
async fn mesg_normalizes_embedded_carriage_returns() {
    let addr = spawn_server(relaxed_heartbeat()).await;

    let mut alice = TestClient::connect(addr).await;
    alice.authorize("alice000").await;
    let mut bob = TestClient::connect(addr).await;
    bob.authorize("bobby000").await;

    // The embedded CR is inside one wire line, so it reaches the body
    // intact and must come out as a space.
    bob.send("MESG alice000 fragmented\rbody").await;
    assert_eq!(bob.recv().await, "OK");
    assert_eq!(alice.recv().await, "FROM bobby000 fragmented body");
}

#[tokio::test]
async fn active_phase_error_taxonomy() {
    let addr = spawn_server(relaxed_heartbeat()).await;
    let mut client = TestClient::connect(addr).await;
    client.authorize("alice000").await;

    // Unknown verb.
    client.send("BOGUS").await;
    assert_eq!(client.recv().await, "ERR_NOSUCHCOMMAND");

    // Re-naming is forbidden once active.
    client.send("NAME wxyz5678").await;
    assert_eq!(client.recv().await, "ERR_BADREQUEST");

    // Arity violations.
    client.send("LIST everyone").await;
    assert_eq!(client.recv().await, "ERR_BADREQUEST");
    client.send("MESG alice000").await;
    assert_eq!(client.recv().await, "ERR_BADREQUEST");
}

#[tokio::test]
async fn quit_releases_the_identifier_for_reuse() {
    let addr = spawn_server(relaxed_heartbeat()).await;

    let mut first = TestClient::connect(addr).await;
    first.authorize("abcd1234").await;
    first.send("QUIT").await;
    assert_eq!(first.recv().await, "BYE");
    first.expect_closed().await;

    let mut second = TestClient::connect(addr).await;
    second.authorize("abcd1234").await;
}

#[tokio::test]
async fn abrupt_disconnect_releases_the_identifier() {
    let addr = spawn_server(relaxed_heartbeat()).await;

    let mut first = TestClient::connect(addr).await;
    first.authorize("abcd1234").await;
    drop(first); // no QUIT, just a dead socket

    // The reader sees EOF and tears down; the id must come free. Retry
    // briefly since the release races our reconnect.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let mut second = TestClient::connect(addr).await;
        assert_eq!(second.recv().await, "WHO");
        second.send("NAME abcd1234").await;
        match second.recv().await.as_str() {
            "OK" => return,
            "ERR_NICKNAMEINUSE" => {
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "identifier was never released after disconnect"
                );
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            other => panic!("unexpected reply: {other}"),
        }
    }
}

#[tokio::test]
async fn over_long_lines_are_fatal_to_the_connection() {
    let addr = spawn_server(relaxed_heartbeat()).await;
    let mut client = TestClient::connect(addr).await;
    client.authorize("abcd1234").await;

    client.send(&"x".repeat(600)).await;
    client.expect_closed().await;
}

#[tokio::test]
async fn heartbeat_drops_a_silent_client() {
    let addr = spawn_server(fast_heartbeat()).await;

    let mut client = TestClient::connect(addr).await;
    client.authorize("abcd1234").await;

    // Never answer a PING: after two missed windows the server must drop
    // us without a BYE.
    client.expect_closed().await;

    // And the identifier is immediately claimable again.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let mut next = TestClient::connect(addr).await;
        assert_eq!(next.recv().await, "WHO");
        next.send("NAME abcd1234").await;
        match next.recv().await.as_str() {
            "OK" => return,
            "ERR_NICKNAMEINUSE" => {
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "identifier was never released after heartbeat timeout"
                );
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            other => panic!("unexpected reply: {other}"),
        }
    }
}

#[tokio::test]
async fn heartbeat_keeps_a_ponging_client_alive() {
    let addr = spawn_server(fast_heartbeat()).await;

    let mut client = TestClient::connect(addr).await;
    client.authorize("abcd1234").await;

    // Answer probes like a healthy client for several cycles.
    let mut pings = 0;
    while pings < 5 {
        match client.recv_raw().await {
            Some(line) if line == "PING" => {
                client.send("PONG").await;
                pings += 1;
            }
            Some(other) => panic!("unexpected line while idling: {other}"),
            None => panic!("server dropped a responsive client"),
        }
    }

    // Still alive and fully functional.
    client.send("MESG abcd1234 note to self").await;
    loop {
        match client.recv_raw().await {
            Some(line) if line == "PING" => client.send("PONG").await,
            Some(line) if line == "OK" => break,
            Some(line) => {
                assert_eq!(line, "FROM abcd1234 note to self");
            }
            None => panic!("server dropped a responsive client"),
        }
    }
}
