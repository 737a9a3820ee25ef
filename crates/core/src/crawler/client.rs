//! Builds the single, process-wide `reqwest::Client` every worker shares
//! (§4.9: "workers share one client rather than one-per-worker" so the
//! connection pool and cookie jar are actually shared).

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::Config;
use crate::error::{Error, Result};

pub fn build(config: &Config) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        reqwest::header::ACCEPT_ENCODING,
        HeaderValue::from_static("gzip, deflate, br"),
    );

    for raw in &config.headers {
        let Some((name, value)) = raw.split_once(':') else {
            tracing::warn!("ignoring malformed --header value: {raw}");
            continue;
        };
        let name = match HeaderName::from_bytes(name.trim().as_bytes()) {
            Ok(name) => name,
            Err(_) => {
                tracing::warn!("ignoring --header with invalid name: {raw}");
                continue;
            }
        };
        let value = match HeaderValue::from_str(value.trim()) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("ignoring --header with invalid value: {raw}");
                continue;
            }
        };
        headers.insert(name, value);
    }

    let connect_timeout = Duration::from_secs(config.connect_timeout_seconds);
    let read_timeout = Duration::from_secs(config.read_timeout_seconds);

    let mut builder = reqwest::Client::builder()
        .user_agent(&config.user_agent.full)
        .default_headers(headers)
        .connect_timeout(connect_timeout)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .read_timeout(read_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .cookie_store(true)
        .pool_idle_timeout(Some(Duration::from_secs(90)));

    if !config.keep_alive {
        builder = builder.pool_max_idle_per_host(0);
    }

    if config.no_check_certificate {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let (Some(user), Some(password)) = (config.user.as_ref(), config.password.as_ref()) {
        // reqwest has no client-wide basic-auth builder; per-request auth is
        // attached in `worker::send_request` instead. This branch exists so
        // config validation catches a `--password` given without `--user`.
        let _ = (user, password);
    }

    builder.build().map_err(Error::from)
}
