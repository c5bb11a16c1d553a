use std::env;
use std::time::Duration;

use anyhow::Context;
use docfeed_core::{DEFAULT_FEED_BASE, DEFAULT_ROOT_CREATE, FeedUris};
use url::Url;

use crate::backoff::Backoff;
use crate::retry::{DEFAULT_RETRY_DELAY, RetryPolicy};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfig {
    pub uris: FeedUris,
    pub retry: RetryPolicy,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let feed_base = read_url(&lookup, "DOCFEED_FEED_BASE", DEFAULT_FEED_BASE)?;
        let root_create = read_url(&lookup, "DOCFEED_ROOT_CREATE", DEFAULT_ROOT_CREATE)?;

        let default_delay = u64::try_from(DEFAULT_RETRY_DELAY.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = read_u64(&lookup, "DOCFEED_RETRY_DELAY_MS", default_delay);
        let max_delay_ms = read_u64(&lookup, "DOCFEED_RETRY_MAX_DELAY_MS", delay_ms);
        let jitter = read_bool(&lookup, "DOCFEED_RETRY_JITTER", false);
        let limit = lookup("DOCFEED_RETRY_LIMIT")
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|value| *value > 0);

        let backoff = Backoff::exponential(
            Duration::from_millis(delay_ms),
            Duration::from_millis(max_delay_ms),
        )
        .with_jitter(jitter);

        Ok(Self {
            uris: FeedUris::new(feed_base, root_create),
            retry: RetryPolicy::new(backoff, limit),
        })
    }
}

fn read_url<F>(lookup: &F, name: &str, default: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name).filter(|value| !value.trim().is_empty()) else {
        return Ok(default.to_string());
    };
    let value = value.trim().to_string();
    Url::parse(&value).with_context(|| format!("{name} is not a valid url: {value}"))?;
    Ok(value)
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
