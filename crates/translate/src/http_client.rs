use std::time::Duration;

use axum::http;
use reqwest::Client;

/// Build the shared outbound HTTP client.
///
/// One client per process keeps the connection pool warm across requests;
/// the pool is re-entrant so handlers share it freely. Read timeouts are
/// applied per request since streaming responses may legitimately outlive
/// any fixed total-duration budget.
pub(crate) fn build_http_client(connect_timeout: Duration) -> Client {
    let mut headers = http::HeaderMap::new();
    headers.insert(http::header::CONNECTION, http::HeaderValue::from_static("keep-alive"));

    Client::builder()
        .connect_timeout(connect_timeout)
        // A short pool idle timeout picks up upstream DNS changes without
        // hurting connection reuse under steady traffic.
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
        .build()
        .expect("default HTTP client configuration is valid")
}
