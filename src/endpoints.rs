//! Endpoint server exposing Prometheus metrics and a health check

use anyhow::Result;
use tokio::net::TcpListener;

use crate::metrics::metrics;

/// Start the endpoint server
///
/// `GET /metrics` returns the text exposition, anything else returns `ok`.
pub async fn endpoint_server(port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(%addr, "Metrics endpoint listening");

    loop {
        match listener.accept().await {
            Ok((mut socket, _peer)) => {
                tokio::spawn(async move {
                    use tokio::io::{AsyncReadExt, AsyncWriteExt};

                    let mut buf = [0; 1024];
                    match socket.read(&mut buf).await {
                        Ok(n) => {
                            let request = String::from_utf8_lossy(&buf[..n]);
                            let response = render_response(&request);
                            let _ = socket.write_all(response.as_bytes()).await;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to read from socket");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

fn render_response(request: &str) -> String {
    let body = if request.starts_with("GET /metrics") {
        match metrics().encode_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode metrics");
                String::new()
            }
        }
    } else {
        "ok\n".to_string()
    };
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}
