//! Listing filters sent to the content API

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::content::PostType;

/// Characters left alone in query values, as in form encoding
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'*');

/// Filters for a post listing. `None` fields are never sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostQuery {
    /// Comma-joined post type names
    pub post_types: Option<String>,
    pub sort_by: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PostQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: &[PostType]) -> Self {
        self.post_types = if types.is_empty() {
            None
        } else {
            Some(
                types
                    .iter()
                    .map(PostType::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            )
        };
        self
    }

    pub fn with_sort_by(mut self, sort_by: Option<&str>) -> Self {
        self.sort_by = sort_by.map(str::to_string);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Same filters, one page window
    pub fn page(&self, limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
            ..self.clone()
        }
    }

    /// Key/value pairs in a stable order, skipping unset fields
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(types) = &self.post_types {
            pairs.push(("post_types", types.clone()));
        }
        if let Some(sort_by) = &self.sort_by {
            pairs.push(("sort_by", sort_by.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        pairs
    }

    /// Encoded query string without the leading `?`; empty when nothing is set
    pub fn to_query_string(&self) -> String {
        self.to_query_pairs()
            .into_iter()
            .map(|(key, value)| format!("{}={}", key, utf8_percent_encode(&value, QUERY_VALUE)))
            .collect::<Vec<_>>()
            .join("&")
    }
}
