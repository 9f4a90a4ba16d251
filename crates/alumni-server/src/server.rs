use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::Service;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;
use crate::http::{json_response, with_cors, Request, MAX_BODY_BYTES};
use crate::router::route;
use crate::AppState;

/// Accept connections until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let state = state.clone();
                tokio::task::spawn(async move {
                    if let Err(e) = handle_connection(stream, remote_addr, state).await {
                        tracing::debug!(%remote_addr, error = %e, "connection closed with error");
                    }
                });
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, stopping server");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    state: AppState,
) -> std::result::Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let service = RequestService { state, remote_addr };
    http1::Builder::new().serve_connection(io, service).await
}

struct RequestService {
    state: AppState,
    remote_addr: SocketAddr,
}

impl Service<hyper::Request<Incoming>> for RequestService {
    type Response = hyper::Response<Full<Bytes>>;
    type Error = hyper::Error;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: hyper::Request<Incoming>) -> Self::Future {
        let state = self.state.clone();
        let remote_addr = self.remote_addr;

        Box::pin(async move {
            let (parts, body) = req.into_parts();

            let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    tracing::debug!(%remote_addr, error = %e, "request body rejected");
                    let resp = json_response(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        &json!({
                            "status": "error",
                            "message": "Corps de requête trop volumineux",
                        }),
                    );
                    return Ok(with_cors(resp, &state.config.web_url));
                }
            };

            let request = Request::new(parts.method, &parts.uri, parts.headers, body);
            let method = request.method.clone();
            let path = request.path.clone();

            let resp = route(&state, request).await;
            tracing::debug!(
                %remote_addr,
                %method,
                %path,
                status = resp.status().as_u16(),
                "request handled"
            );
            Ok(resp)
        })
    }
}
