// src/fetch/mod.rs

use anyhow::Context;
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::error::{ForecastError, Result};

/// Shared client for every outbound feed request; the timeout bounds each attempt.
pub fn build_client(cfg: &FetchConfig) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(cfg.timeout)
        .user_agent(concat!("apforecast/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")
}

fn classify(url: &Url, err: reqwest::Error) -> ForecastError {
    if err.is_timeout() {
        ForecastError::Timeout {
            url: url.to_string(),
            attempts: 1,
        }
    } else {
        ForecastError::Fetch {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

async fn get_text_core(client: &Client, url: &Url) -> Result<String> {
    debug!("Fetching text from {}", url);
    let resp = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| classify(url, e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(ForecastError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    resp.text().await.map_err(|e| classify(url, e))
}

/// Upper bound on the pause between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Pause after the `attempt`-th failure: `initial * 2^(attempt - 1)`, capped.
fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    initial.saturating_mul(factor).min(MAX_BACKOFF)
}

async fn get_text_with_retry(client: &Client, url: &Url, cfg: &FetchConfig) -> Result<String> {
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match get_text_core(client, url).await {
            Ok(t) => return Ok(t),
            Err(e) if e.is_retryable() && attempts <= cfg.max_retries => {
                let backoff = backoff_delay(cfg.initial_backoff, attempts);
                warn!(%url, attempt = attempts, delay_ms = backoff.as_millis() as u64, error = %e, "Retrying");
                sleep(backoff).await;
            }
            Err(ForecastError::Timeout { url, .. }) => {
                error!(%url, attempts, "Timed out on every attempt");
                return Err(ForecastError::Timeout { url, attempts });
            }
            Err(e) => {
                error!(%url, attempts, error = %e, "Giving up");
                return Err(e);
            }
        }
    }
}

/// GET the feed at `url`, returning the raw body text.
///
/// Timeouts, connection failures and 5xx answers are retried with
/// exponential backoff; any other non-success status fails at once.
#[instrument(level = "info", skip(client, cfg), fields(url = %url))]
pub async fn fetch_feed(client: &Client, url: &Url, cfg: &FetchConfig) -> Result<String> {
    let text = get_text_with_retry(client, url, cfg).await?;
    debug!(bytes = text.len(), "feed downloaded");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn fast_config(max_retries: u32) -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_millis(300),
            max_retries,
            initial_backoff: Duration::from_millis(10),
        }
    }

    fn feed_url(addr: SocketAddr) -> Url {
        Url::parse(&format!("http://{}/feed.txt", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let app = Router::new().route("/feed.txt", get(|| async { "# header\n2024 01 01\n" }));
        let addr = serve(app).await;
        let cfg = fast_config(0);
        let client = build_client(&cfg).unwrap();

        let text = fetch_feed(&client, &feed_url(addr), &cfg).await.unwrap();
        assert_eq!(text, "# header\n2024 01 01\n");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/feed.txt",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::NOT_FOUND, "gone")
                }
            }),
        );
        let addr = serve(app).await;
        let cfg = fast_config(3);
        let client = build_client(&cfg).unwrap();

        let err = fetch_feed(&client, &feed_url(addr), &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::Status { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried_until_success() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/feed.txt",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::SERVICE_UNAVAILABLE, "busy")
                    } else {
                        (StatusCode::OK, "ok")
                    }
                }
            }),
        );
        let addr = serve(app).await;
        let cfg = fast_config(2);
        let client = build_client(&cfg).unwrap();

        let text = fetch_feed(&client, &feed_url(addr), &cfg).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let app = Router::new().route(
            "/feed.txt",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "too late"
            }),
        );
        let addr = serve(app).await;
        let cfg = fast_config(1);
        let client = build_client(&cfg).unwrap();

        let err = fetch_feed(&client, &feed_url(addr), &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::Timeout { attempts: 2, .. }));
        assert_eq!(err.code(), "fetch_timeout");
    }

    #[tokio::test]
    async fn test_connection_refused_is_fetch_error() {
        // bind then drop so nothing is listening on the port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cfg = fast_config(1);
        let client = build_client(&cfg).unwrap();
        let err = fetch_feed(&client, &feed_url(addr), &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::Fetch { .. }));
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, 40), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, u32::MAX), MAX_BACKOFF);
        assert_eq!(backoff_delay(Duration::ZERO, 40), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_many_retries_end_in_fetch_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cfg = FetchConfig {
            initial_backoff: Duration::ZERO,
            ..fast_config(40)
        };
        let client = build_client(&cfg).unwrap();
        let err = fetch_feed(&client, &feed_url(addr), &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::Fetch { .. }));
    }
}
