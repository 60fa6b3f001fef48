//! Minimal HTTP/1.1 responder for driving the workload end to end

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Requests seen by a [`TestServer`]
#[derive(Default)]
pub struct Seen {
    pub count: AtomicU64,
    pub requests: Mutex<Vec<String>>,
}

impl Seen {
    /// Request paths in arrival order
    pub fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| r.split_whitespace().nth(1).map(str::to_string))
            .collect()
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub seen: Arc<Seen>,
}

impl TestServer {
    /// Answer the n-th request (from 0) with `status(n)`.
    pub async fn start<F>(status: F) -> Self
    where
        F: Fn(u64) -> u16 + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Seen::default());
        let status = Arc::new(status);

        let server_seen = seen.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                let seen = server_seen.clone();
                let status = status.clone();
                tokio::spawn(async move {
                    respond(stream, &seen, &*status).await;
                });
            }
        });

        Self { addr, seen }
    }

    /// Accept connections but never answer them.
    pub async fn start_silent() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        Self {
            addr,
            seen: Arc::new(Seen::default()),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn respond(mut stream: TcpStream, seen: &Seen, status: impl Fn(u64) -> u16) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    let n = seen.count.fetch_add(1, Ordering::SeqCst);
    seen.requests
        .lock()
        .push(String::from_utf8_lossy(&buf).into_owned());

    let response = format!(
        "HTTP/1.1 {} Test\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
        status(n)
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
