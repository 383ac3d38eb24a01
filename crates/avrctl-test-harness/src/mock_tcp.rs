//! Mock receiver for connection-level testing.
//!
//! [`MockAvrServer`] listens on a random localhost port and behaves like a
//! receiver's telnet control port: it reads carriage-return terminated
//! command lines, records them, and answers from a script of request to
//! reply lines. It keeps accepting connections for its whole lifetime, so a
//! test can drop every client and watch the connection manager reconnect.
//!
//! # Example
//!
//! ```
//! use avrctl_test_harness::MockAvrServer;
//!
//! # async fn example() -> avrctl_core::Result<()> {
//! let server = MockAvrServer::start().await?;
//!
//! // When the client sends "PW?", answer "PWON".
//! server.reply("PW?", &["PWON"]);
//!
//! let port = server.port();
//! // ... connect to 127.0.0.1:port and test ...
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use avrctl_core::error::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;

const TERMINATOR: u8 = b'\r';

struct Client {
    tx: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
    script: std::sync::Mutex<HashMap<String, Vec<String>>>,
    silent: AtomicBool,
    received: std::sync::Mutex<Vec<String>>,
    connections: AtomicUsize,
    clients: Mutex<Vec<Client>>,
    changed: Notify,
}

impl Shared {
    fn replies_for(&self, request: &str) -> Vec<String> {
        if self.silent.load(Ordering::SeqCst) {
            return Vec::new();
        }
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(request)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, line: String) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
        self.changed.notify_waiters();
    }
}

/// A scripted stand-in for a receiver's control port.
pub struct MockAvrServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept_handle: JoinHandle<()>,
}

impl MockAvrServer {
    /// Bind to a random localhost port and start accepting connections.
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock AVR server: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?;
        let shared = Arc::new(Shared::default());

        let accept_handle = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                loop {
                    let (stream, peer) = match listener.accept().await {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::debug!(error = %e, "mock AVR accept failed");
                            continue;
                        }
                    };
                    tracing::debug!(peer = %peer, "mock AVR accepted client");
                    let (tx, rx) = mpsc::unbounded_channel();
                    let task = tokio::spawn(serve_client(stream, rx, Arc::clone(&shared)));
                    shared.clients.lock().await.push(Client { tx, task });
                    shared.connections.fetch_add(1, Ordering::SeqCst);
                    shared.changed.notify_waiters();
                }
            })
        };

        Ok(MockAvrServer {
            addr,
            shared,
            accept_handle,
        })
    }

    /// Address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port the server listens on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Answer `request` (without terminator) with `replies`, in order.
    ///
    /// Replaces any earlier script for the same request.
    pub fn reply(&self, request: &str, replies: &[&str]) {
        self.shared
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                request.to_string(),
                replies.iter().map(|r| r.to_string()).collect(),
            );
    }

    /// Stop (or resume) answering. Lines are still recorded while silent.
    pub fn set_silent(&self, silent: bool) {
        self.shared.silent.store(silent, Ordering::SeqCst);
    }

    /// Send an unsolicited line to every connected client.
    pub async fn push(&self, line: &str) {
        for client in self.shared.clients.lock().await.iter() {
            let _ = client.tx.send(line.to_string());
        }
    }

    /// Every line received so far, across all connections.
    pub fn received(&self) -> Vec<String> {
        self.shared
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times `line` has been received.
    pub fn count_of(&self, line: &str) -> usize {
        self.received().iter().filter(|l| *l == line).count()
    }

    /// Number of connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Close every client connection. The listener keeps accepting.
    pub async fn drop_clients(&self) {
        let clients: Vec<Client> = self.shared.clients.lock().await.drain(..).collect();
        for client in clients {
            client.task.abort();
            let _ = client.task.await;
        }
    }

    /// Wait until at least `count` lines have been received.
    pub async fn wait_for_lines(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.received().len() >= count)
            .await
    }

    /// Wait until at least `count` connections have been accepted.
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.connection_count() >= count)
            .await
    }

    async fn wait_until(&self, timeout: Duration, done: impl Fn() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let changed = self.shared.changed.notified();
            if done() {
                return true;
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return done();
            }
        }
    }
}

impl Drop for MockAvrServer {
    fn drop(&mut self) {
        self.accept_handle.abort();
        if let Ok(mut clients) = self.shared.clients.try_lock() {
            for client in clients.drain(..) {
                client.task.abort();
            }
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 256];

    loop {
        tokio::select! {
            read = reader.read(&mut chunk) => {
                let n = match read {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&chunk[..n]);
                while let Some(pos) = buf.iter().position(|&b| b == TERMINATOR) {
                    let line: Vec<u8> = buf.drain(..=pos).take(pos).collect();
                    let line = String::from_utf8_lossy(&line).trim_matches('\n').to_string();
                    let replies = shared.replies_for(&line);
                    shared.record(line);
                    for reply in replies {
                        let mut out = reply.into_bytes();
                        out.push(TERMINATOR);
                        if writer.write_all(&out).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Some(line) = outgoing.recv() => {
                let mut out = line.into_bytes();
                out.push(TERMINATOR);
                if writer.write_all(&out).await.is_err() {
                    return;
                }
            }
        }
    }
}
