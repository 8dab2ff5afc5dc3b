use anyhow::Result;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde_json::Value;

use crate::config::{CREDENTIAL_KEY, SyncConfig};
use crate::error::SyncError;
use crate::http_client::http_client;

const MAX_ERROR_DETAIL_CHARS: usize = 200;

/// Source of authoritative stats for the signed-in user.
///
/// `Ok(None)` means the call went through but carried no usable body; the
/// reconciler treats that the same way as a failure.
pub trait StatsSource: Send + Sync {
    fn fetch_stats(&self, credential: Option<&str>) -> Result<Option<Value>, SyncError>;
}

pub struct HttpStatsFetcher {
    client: Client,
    url: String,
}

impl HttpStatsFetcher {
    /// Uses `cfg.request_timeout` for every request, sharing the process-wide
    /// client when its timeout matches.
    pub fn new(cfg: &SyncConfig) -> Result<Self> {
        let client = http_client(cfg.request_timeout)?;
        Ok(Self {
            client,
            url: cfg.stats_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl StatsSource for HttpStatsFetcher {
    fn fetch_stats(&self, credential: Option<&str>) -> Result<Option<Value>, SyncError> {
        let Some(token) = credential else {
            return Err(SyncError::MissingCredential(CREDENTIAL_KEY.to_string()));
        };

        let resp = self
            .client
            .get(&self.url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(SyncError::from_reqwest)?;
        let status = resp.status();
        let body = resp.text().map_err(SyncError::from_reqwest)?;
        if !status.is_success() {
            return Err(SyncError::RemoteRejected {
                status: status.as_u16(),
                detail: body.trim().chars().take(MAX_ERROR_DETAIL_CHARS).collect(),
            });
        }
        Ok(parse_stats_body(&body))
    }
}

/// Interprets a 2xx body. Empty, `null`, `false`, `0` and `""` are "no body".
/// Anything else counts as a body, even text that isn't JSON: its fields are
/// simply all missing and default downstream.
pub fn parse_stats_body(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) if is_falsy(&value) => None,
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(trimmed.to_string())),
    }
}

pub(crate) fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_none_or(|v| v == 0.0 || v.is_nan()),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use super::*;
    use serde_json::json;

    fn fetcher_for(addr: SocketAddr, timeout: Duration) -> HttpStatsFetcher {
        let cfg = SyncConfig {
            api_base: format!("http://{addr}"),
            request_timeout: timeout,
            ..SyncConfig::default()
        };
        HttpStatsFetcher::new(&cfg).unwrap()
    }

    /// Answers one request with `status` and `body`, handing back the raw
    /// request head it received.
    fn serve_once(status: &'static str, body: &'static str) -> (SocketAddr, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&head).to_ascii_lowercase()
        });
        (addr, handle)
    }

    #[test]
    fn success_returns_the_body_and_sends_the_bearer_token() {
        let (addr, server) = serve_once("200 OK", r#"{"gamesPlayed":12,"gamesWon":4}"#);
        let fetcher = fetcher_for(addr, Duration::from_secs(5));
        assert!(fetcher.url().ends_with("/api/users/stats"));

        let body = fetcher.fetch_stats(Some("tok-1")).unwrap();
        assert_eq!(body, Some(json!({"gamesPlayed": 12, "gamesWon": 4})));

        let request = server.join().unwrap();
        assert!(request.starts_with("get /api/users/stats "));
        assert!(request.contains("authorization: bearer tok-1"));
        assert!(request.contains("accept: application/json"));
    }

    #[test]
    fn empty_success_body_is_absent() {
        let (addr, server) = serve_once("200 OK", "null");
        let fetcher = fetcher_for(addr, Duration::from_secs(5));
        assert_eq!(fetcher.fetch_stats(Some("tok")).unwrap(), None);
        server.join().unwrap();
    }

    #[test]
    fn unauthorized_is_rejected_with_status_and_detail() {
        let (addr, server) = serve_once("401 Unauthorized", "jwt expired");
        let fetcher = fetcher_for(addr, Duration::from_secs(5));
        let err = fetcher.fetch_stats(Some("tok")).unwrap_err();
        match err {
            SyncError::RemoteRejected { status, detail } => {
                assert_eq!(status, 401);
                assert_eq!(detail, "jwt expired");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn server_error_is_rejected() {
        let (addr, server) = serve_once("503 Service Unavailable", "");
        let fetcher = fetcher_for(addr, Duration::from_secs(5));
        let err = fetcher.fetch_stats(Some("tok")).unwrap_err();
        assert!(matches!(err, SyncError::RemoteRejected { status: 503, .. }));
        server.join().unwrap();
    }

    #[test]
    fn closed_port_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = fetcher_for(addr, Duration::from_secs(5));
        let err = fetcher.fetch_stats(Some("tok")).unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable(_)), "{err:?}");
    }

    #[test]
    fn silent_server_times_out_as_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                thread::sleep(Duration::from_secs(3));
                drop(stream);
            }
        });

        // A longer-lived fetcher first, so the short timeout can't ride on it.
        let _slow = fetcher_for(addr, Duration::from_secs(30));
        let fetcher = fetcher_for(addr, Duration::from_millis(300));
        let started = std::time::Instant::now();
        let err = fetcher.fetch_stats(Some("tok")).unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable(_)), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn empty_bodies_are_absent() {
        assert_eq!(parse_stats_body(""), None);
        assert_eq!(parse_stats_body("  \n"), None);
        assert_eq!(parse_stats_body("null"), None);
        assert_eq!(parse_stats_body("false"), None);
        assert_eq!(parse_stats_body("0"), None);
        assert_eq!(parse_stats_body("\"\""), None);
    }

    #[test]
    fn object_bodies_pass_through() {
        assert_eq!(
            parse_stats_body(r#"{"gamesWon":7}"#),
            Some(json!({"gamesWon": 7}))
        );
        assert_eq!(parse_stats_body("{}"), Some(json!({})));
    }

    #[test]
    fn non_json_text_is_still_a_body() {
        assert_eq!(
            parse_stats_body("<html>ok</html>"),
            Some(Value::String("<html>ok</html>".to_string()))
        );
    }

    #[test]
    fn missing_credential_skips_the_request() {
        let fetcher = HttpStatsFetcher {
            client: Client::new(),
            url: "http://127.0.0.1:9/api/users/stats".to_string(),
        };
        let err = fetcher.fetch_stats(None).unwrap_err();
        assert!(matches!(err, SyncError::MissingCredential(_)));
    }
}
