//! Core contracts for the Teams notification bot.
//!
//! This crate holds the Bot Framework value types exchanged with the hosting adapter, the
//! collaborator traits the notification layer consumes (`BotAdapter`, `TurnContext`,
//! `Middleware`), and the registry helpers that derive keys and target types from a stored
//! conversation reference.
pub mod activity;
pub mod adapter;
pub mod middleware;
pub mod reference;
pub mod teams;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use activity::*;
pub use adapter::*;
pub use middleware::*;
pub use reference::*;
pub use teams::*;

/// A page of results plus the token needed to fetch the next one.
///
/// A `None` continuation token means there is nothing left to read.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedData<T> {
    pub data: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

impl<T> PagedData<T> {
    pub fn new(data: Vec<T>, continuation_token: Option<String>) -> Self {
        Self {
            data,
            continuation_token: continuation_token.filter(|token| !token.is_empty()),
        }
    }

    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            continuation_token: None,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedData<U> {
        PagedData {
            data: self.data.into_iter().map(f).collect(),
            continuation_token: self.continuation_token,
        }
    }
}

impl<T> Default for PagedData<T> {
    fn default() -> Self {
        Self::empty()
    }
}
