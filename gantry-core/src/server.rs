// HTTP host adapter: hyper <-> kernel glue
//
// The core assumes a fully parsed request and hands back a response for a
// thin adapter to write to the wire. This module is that adapter.

use crate::kernel::Kernel;
use crate::router::parse_query_string;
use crate::{HttpRequest, HttpResponse};
use gantry_log::{error, info};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

impl Kernel {
    /// Start an HTTP/1.1 server on the specified port and hand every
    /// connection's requests to this kernel.
    pub async fn listen(self, port: u16) -> Result<(), crate::Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;

        info!(target: "gantry::server", "Listening on http://{}", addr);

        let kernel = Arc::new(self);

        loop {
            let (stream, remote) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let kernel = kernel.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let kernel = kernel.clone();
                    async move { handle_connection(req, kernel, remote).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(target: "gantry::server", "Error serving connection: {:?}", err);
                }
            });
        }
    }
}

/// Handle one incoming HTTP request end to end.
async fn handle_connection(
    req: Request<IncomingBody>,
    kernel: Arc<Kernel>,
    remote: SocketAddr,
) -> Result<Response<Full<bytes::Bytes>>, hyper::Error> {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let mut gantry_req = HttpRequest::new(method.clone(), path.clone());

    for (name, value) in req.headers() {
        if let Ok(value_str) = value.to_str() {
            gantry_req
                .headers
                .insert(name.to_string(), value_str.to_string());
        }
    }

    if let Some(query) = &query {
        gantry_req.query_params = parse_query_string(query);
    }

    if let Some(cookie_header) = gantry_req.headers.get("cookie").cloned() {
        gantry_req.cookies = parse_cookie_header(&cookie_header);
    }

    gantry_req
        .server_env
        .insert("REQUEST_METHOD".to_string(), method);
    gantry_req.server_env.insert("REQUEST_URI".to_string(), path);
    gantry_req
        .server_env
        .insert("REMOTE_ADDR".to_string(), remote.ip().to_string());

    let body_bytes = req.collect().await?.to_bytes();
    gantry_req.body = body_bytes.to_vec();

    let is_form = gantry_req
        .headers
        .get("content-type")
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if is_form {
        if let Ok(params) =
            serde_urlencoded::from_bytes::<HashMap<String, String>>(&gantry_req.body)
        {
            gantry_req.form_params = params;
        }
    }

    // The session slot is shared across clones, so the teardown below sees
    // whatever the chain attached.
    let teardown_view = gantry_req.clone();

    let response = match kernel.handle(gantry_req).await {
        Ok(response) => response,
        Err(err) => {
            // Development mode: the kernel re-raised so we render the
            // diagnostic here, at the process boundary
            HttpResponse::internal_server_error()
                .with_header(
                    "Content-Type".to_string(),
                    "text/plain; charset=utf-8".to_string(),
                )
                .with_body(format!("Unhandled error: {}\n", err).into_bytes())
        }
    };

    let mut builder = Response::builder().status(response.status);
    for (key, value) in &response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    let body = Full::new(bytes::Bytes::from(response.body.clone()));
    let hyper_response = builder
        .body(body)
        .unwrap_or_else(|_| Response::new(Full::new(bytes::Bytes::from_static(b"Server error"))));

    // The response is fully rendered and on its way out; run teardown once
    kernel.terminate(&teardown_view, &response).await;

    Ok(hyper_response)
}

/// Parse a `Cookie` request header into a name/value map.
fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header("gantry_session=abc123; theme=dark");
        assert_eq!(cookies.get("gantry_session"), Some(&"abc123".to_string()));
        assert_eq!(cookies.get("theme"), Some(&"dark".to_string()));
    }

    #[test]
    fn test_parse_cookie_header_ignores_malformed_pairs() {
        let cookies = parse_cookie_header("ok=1; broken; also=2");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies.get("ok"), Some(&"1".to_string()));
        assert_eq!(cookies.get("also"), Some(&"2".to_string()));
    }
}
