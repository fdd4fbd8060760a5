//! Caller-owned "remember last search" state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::request::SearchRequest;

/// Last request per entity type.
///
/// The engine never stores it; callers keep it wherever they keep per-user
/// state and hand it back between requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSession {
    #[serde(default)]
    last: BTreeMap<String, SearchRequest>,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&mut self, request: &SearchRequest) {
        self.last.insert(request.itemtype.clone(), request.clone());
    }

    pub fn last_for(&self, itemtype: &str) -> Option<&SearchRequest> {
        self.last.get(itemtype)
    }

    /// The remembered request, or a fresh one for `itemtype`.
    pub fn resume(&self, itemtype: &str) -> SearchRequest {
        self.last_for(itemtype)
            .cloned()
            .unwrap_or_else(|| SearchRequest::new(itemtype))
    }

    pub fn reset(&mut self, itemtype: &str) -> Option<SearchRequest> {
        self.last.remove(itemtype)
    }
}
