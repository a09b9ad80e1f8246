//! Forwards requests the gate let through to the application origin.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName},
    response::Response,
};
use http_body_util::LengthLimitError;
use url::Url;

use crate::error::AppError;

const MAX_FORWARDED_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Headers that describe a single hop and must not be forwarded.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Clone)]
pub struct Upstream {
    http: reqwest::Client,
    origin: Url,
}

impl Upstream {
    pub fn new(origin: Url) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { http, origin })
    }

    fn target(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.origin.clone();
        url.set_path(path);
        url.set_query(query);
        url
    }
}

pub async fn forward(
    State(upstream): State<Upstream>,
    request: Request,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let target = upstream.target(parts.uri.path(), parts.uri.query());
    let body = to_bytes(body, MAX_FORWARDED_BODY_BYTES)
        .await
        .map_err(|err| {
            if exceeds_length_limit(&err) {
                AppError::PayloadTooLarge(format!(
                    "Request body exceeds {} bytes",
                    MAX_FORWARDED_BODY_BYTES
                ))
            } else {
                AppError::BadGateway(format!("failed to read request body: {}", err))
            }
        })?;

    tracing::debug!(method = %parts.method, target = %target, "Forwarding request upstream");

    let upstream_response = upstream
        .http
        .request(parts.method, target)
        .headers(strip_hop_by_hop(parts.headers))
        .body(body)
        .send()
        .await?;

    let status = upstream_response.status();
    let headers = strip_hop_by_hop(upstream_response.headers().clone());
    let bytes = upstream_response.bytes().await?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response.headers_mut().remove(header::CONTENT_LENGTH);
    Ok(response)
}

fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = source {
        if current.is::<LengthLimitError>() {
            return true;
        }
        source = current.source();
    }
    false
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers
}
