use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

static CLIENT: OnceCell<(Duration, Client)> = OnceCell::new();

/// Blocking client with `timeout`. The first caller's client is shared; a
/// caller asking for a different timeout gets its own client instead.
pub fn http_client(timeout: Duration) -> Result<Client> {
    let (shared_timeout, shared) = CLIENT.get_or_try_init(|| {
        build_client(timeout).map(|client| (timeout, client))
    })?;
    if *shared_timeout == timeout {
        return Ok(shared.clone());
    }
    tracing::debug!(?timeout, shared = ?shared_timeout, "building dedicated http client");
    build_client(timeout)
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("bingo_stats/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build http client")
}
