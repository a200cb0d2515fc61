//! A scripted SQM-LE unit on a loopback TCP port.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Answers each 4-byte command with a canned response line.
pub struct FakeSqmle {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FakeSqmle {
    /// Reply to `command` (e.g. `"Rx\r\n"`) with `response`; unknown
    /// commands get no reply and the connection stays open.
    pub async fn start(responses: &[(&str, &str)]) -> Self {
        Self::spawn(responses, false).await
    }

    /// Like [`FakeSqmle::start`], but the connection stays open after the
    /// reply until the client hangs up.
    pub async fn start_open(responses: &[(&str, &str)]) -> Self {
        Self::spawn(responses, true).await
    }

    async fn spawn(responses: &[(&str, &str)], hold_open: bool) -> Self {
        let responses: HashMap<Vec<u8>, Vec<u8>> = responses
            .iter()
            .map(|(c, r)| (c.as_bytes().to_vec(), r.as_bytes().to_vec()))
            .collect();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake device");
        let addr = listener.local_addr().expect("local addr");
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = received.clone();
        let handle = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let responses = responses.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut command = [0u8; 4];
                    if stream.read_exact(&mut command).await.is_err() {
                        return;
                    }
                    log.lock().await.push(String::from_utf8_lossy(&command).into_owned());
                    match responses.get(command.as_slice()) {
                        Some(reply) => {
                            let _ = stream.write_all(reply).await;
                            if hold_open {
                                let mut rest = Vec::new();
                                let _ = stream.read_to_end(&mut rest).await;
                            }
                        }
                        None => {
                            // Hold the connection open without answering.
                            let mut rest = Vec::new();
                            let _ = stream.read_to_end(&mut rest).await;
                        }
                    }
                });
            }
        });

        Self {
            addr,
            received,
            handle,
        }
    }

    /// A unit that accepts connections but never answers.
    pub async fn silent() -> Self {
        Self::start(&[]).await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Commands received so far, in arrival order.
    pub async fn commands(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }
}

impl Drop for FakeSqmle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
