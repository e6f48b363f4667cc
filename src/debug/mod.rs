use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::ConfigError;
use crate::scheduler::stats::PollStats;

pub const VARS_PATH: &str = "/debug/vars";

/// Binds the debug endpoint. Failing to bind is a startup error.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ConfigError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ConfigError::DebugBind { addr, source })
}

/// Serves scheduler counters on `listener` until the process exits.
pub fn spawn(listener: TcpListener, stats: Arc<PollStats>) -> JoinHandle<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Debug endpoint listening on http://{addr}{VARS_PATH}");
    }
    tokio::spawn(serve(listener, stats))
}

async fn serve(listener: TcpListener, stats: Arc<PollStats>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::warn!("Debug endpoint accept failed: {e}");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        let stats = Arc::clone(&stats);
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let response = respond(&req, &stats);
                async move { Ok::<_, Infallible>(response) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                log::debug!("Debug connection from {peer} failed: {e}");
            }
        });
    }
}

fn respond<B>(req: &Request<B>, stats: &PollStats) -> Response<Full<Bytes>> {
    if req.uri().path() != VARS_PATH {
        return plain(StatusCode::NOT_FOUND, "not found\n");
    }
    if req.method() != Method::GET {
        return plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
    }

    match serde_json::to_vec(&stats.snapshot()) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            log::error!("Failed to serialize debug vars: {e}");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "internal error\n")
        }
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
