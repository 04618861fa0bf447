#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;

/// What the stub answers a connection with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// AuthenticationOk: the server is accepting connections.
    Accept,
    /// ErrorResponse with SQLSTATE 57P03, what a server answers while it is
    /// still starting up.
    RejectStartingUp,
    /// Read the startup packet, then close without answering.
    Hangup,
}

/// A scripted PostgreSQL stub. Each connection consumes the next answer in
/// the script; once the script runs out the last answer repeats forever.
pub struct PgStub {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    startups: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl PgStub {
    pub async fn start(script: Vec<Answer>) -> Self {
        assert!(!script.is_empty(), "stub script must not be empty");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let connections = Arc::new(AtomicUsize::new(0));
        let startups = Arc::new(Mutex::new(Vec::new()));

        let seen = connections.clone();
        let captured = startups.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.expect("accept");
                let n = seen.fetch_add(1, Ordering::SeqCst);
                let answer = script.get(n).copied().unwrap_or(script[script.len() - 1]);

                let startup = read_startup(&mut socket).await;
                captured.lock().expect("startup log").push(startup);

                match answer {
                    Answer::Accept => {
                        socket.write_all(&auth_ok()).await.expect("write accept");
                    }
                    Answer::RejectStartingUp => {
                        socket
                            .write_all(&starting_up())
                            .await
                            .expect("write reject");
                    }
                    Answer::Hangup => {}
                }
            }
        });

        Self {
            addr,
            connections,
            startups,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Startup packet bodies seen so far, version prefix included.
    pub fn startups(&self) -> Vec<Vec<u8>> {
        self.startups.lock().expect("startup log").clone()
    }
}

async fn read_startup(socket: &mut TcpStream) -> Vec<u8> {
    let mut len = [0u8; 4];
    socket.read_exact(&mut len).await.expect("read length");
    let total = i32::from_be_bytes(len) as usize;
    let mut body = vec![0u8; total - 4];
    socket.read_exact(&mut body).await.expect("read startup");
    body
}

fn auth_ok() -> Vec<u8> {
    let mut message = vec![b'R'];
    message.extend_from_slice(&8i32.to_be_bytes());
    message.extend_from_slice(&0i32.to_be_bytes());
    message
}

fn starting_up() -> Vec<u8> {
    let body = b"SFATAL\0C57P03\0Mthe database system is starting up\0\0";
    let mut message = vec![b'E'];
    message.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
    message.extend_from_slice(body);
    message
}

/// Command for the binary under test, pointed at the stub and sped up for
/// tests. Environment the test runner might carry is scrubbed so every test
/// starts from the documented defaults.
pub fn pgwait(stub: &PgStub) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pgwait"));
    cmd.env_remove("POSTGRES_USER")
        .env_remove("POSTGRES_DB")
        .env_remove("PGWAIT_TIMEOUT")
        .env_remove("RUST_LOG")
        .env("POSTGRES_PORT", stub.addr.port().to_string())
        .env("POLL_INTERVAL", "50")
        .env("CONNECT_TIMEOUT", "500")
        .kill_on_drop(true);
    cmd
}
