//! Minimal HTTP/1.1 servers for exercising real captures.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";

/// Self-signed certificate for `localhost` and `127.0.0.1`, with its PKCS#8 key.
const CERT_PEM: &[u8] = include_bytes!("cert.pem");
const KEY_PEM: &[u8] = include_bytes!("key.pem");

/// Reads one request head, returning it as text.
async fn read_head<S: AsyncRead + Unpin>(sock: &mut S) -> Option<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = sock.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        head.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(head).ok()
}

/// Answers every request with `200 ok` after `delay`. Received request heads
/// are forwarded on the returned channel.
pub async fn delayed_server(delay: Duration) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (heads, received) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let heads = heads.clone();
            tokio::spawn(async move {
                let Some(head) = read_head(&mut sock).await else {
                    return;
                };
                let _ = heads.send(head);
                tokio::time::sleep(delay).await;
                let _ = sock.write_all(RESPONSE).await;
                let _ = sock.shutdown().await;
            });
        }
    });

    (addr, received)
}

/// Accepts connections and reads requests but never answers.
pub async fn silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut sock, _)) = listener.accept().await {
            let _ = read_head(&mut sock).await;
            held.push(sock);
        }
    });

    addr
}

fn redirect(status: &str, location: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {status}\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    )
    .into_bytes()
}

/// `/start` answers 301 to `/final`, `/loop` answers 302 to itself, and any
/// other path gets `200 ok` after `delay`. Received request heads are
/// forwarded on the returned channel.
pub async fn redirect_server(delay: Duration) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (heads, received) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let heads = heads.clone();
            tokio::spawn(async move {
                let Some(head) = read_head(&mut sock).await else {
                    return;
                };
                let response = if head.starts_with("GET /start ") {
                    redirect("301 Moved Permanently", "/final")
                } else if head.starts_with("GET /loop ") {
                    redirect("302 Found", "/loop")
                } else {
                    tokio::time::sleep(delay).await;
                    RESPONSE.to_vec()
                };
                let _ = heads.send(head);
                let _ = sock.write_all(&response).await;
                let _ = sock.shutdown().await;
            });
        }
    });

    (addr, received)
}

/// Answers every request with `200 ok` over TLS, using the self-signed
/// certificate fixture.
pub async fn tls_server() -> SocketAddr {
    let identity = native_tls::Identity::from_pkcs8(CERT_PEM, KEY_PEM).unwrap();
    let acceptor =
        tokio_native_tls::TlsAcceptor::from(native_tls::TlsAcceptor::new(identity).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((sock, _)) = listener.accept().await else {
                return;
            };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(mut tls) = acceptor.accept(sock).await else {
                    return;
                };
                if read_head(&mut tls).await.is_some() {
                    let _ = tls.write_all(RESPONSE).await;
                    let _ = tls.shutdown().await;
                }
            });
        }
    });

    addr
}
