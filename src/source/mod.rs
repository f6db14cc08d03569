//! The attendance terminal, as seen by the poller.

pub mod bridge;

use crate::model::{DeviceSnapshot, PunchEvent, RosterEntry};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub use bridge::DeviceBridge;

/// Every variant means "skip this cycle"; none is fatal.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("terminal unreachable: {0}")]
    Unavailable(String),
    #[error("terminal timed out")]
    Timeout,
    #[error("unexpected response from terminal: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if e.is_decode() {
            SourceError::Malformed(e.to_string())
        } else {
            SourceError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn metadata(&self) -> Result<DeviceSnapshot, SourceError>;

    async fn roster(&self) -> Result<Vec<RosterEntry>, SourceError>;

    /// Every punch the terminal still holds, names not yet resolved.
    async fn events(&self) -> Result<Vec<PunchEvent>, SourceError>;

    async fn close(&self) {}
}

/// The terminal answers list calls as a bare array, as `{ "data": [...] }`,
/// or as an object keyed by index. All three collapse to one `Vec`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Plain(Vec<T>),
    Wrapped { data: Vec<T> },
    Keyed(BTreeMap<String, T>),
}

impl<T> Listing<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Plain(items) | Listing::Wrapped { data: items } => items,
            Listing::Keyed(items) => items.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_shapes_normalize() {
        let plain: Listing<u32> = serde_json::from_str("[1,2]").unwrap();
        let wrapped: Listing<u32> = serde_json::from_str(r#"{"data":[1,2]}"#).unwrap();
        let keyed: Listing<u32> = serde_json::from_str(r#"{"0":1,"1":2}"#).unwrap();

        assert_eq!(plain.into_vec(), vec![1, 2]);
        assert_eq!(wrapped.into_vec(), vec![1, 2]);
        assert_eq!(keyed.into_vec(), vec![1, 2]);
    }
}
