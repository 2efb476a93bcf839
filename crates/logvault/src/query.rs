//! Query engine over the entry store.
//!
//! All filter fields are optional and conjunctive. Results are ordered by
//! (timestamp, id) so the same store snapshot always yields the same
//! sequence, then paginated with offset/limit.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::{Category, Level, LogEntry};

/// Default page size when none is requested.
pub const DEFAULT_QUERY_LIMIT: usize = 1000;

/// Filter over stored entries. Unset fields match everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogQuery {
    /// Inclusive lower bound on the entry timestamp.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the entry timestamp.
    pub end: Option<DateTime<Utc>>,
    /// Minimum severity.
    pub min_level: Option<Level>,
    /// Exact category match.
    pub category: Option<Category>,
    /// Exact trace id match.
    pub trace_id: Option<String>,
    /// Substring match over the message text.
    pub search_text: Option<String>,
    /// Exact matches against the string rendering of metadata values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata_filters: BTreeMap<String, String>,
    /// Maximum number of results. Zero means no results, not unlimited.
    pub limit: usize,
    /// Number of matching entries to skip.
    pub offset: usize,
}

impl Default for LogQuery {
    fn default() -> LogQuery {
        LogQuery {
            start: None,
            end: None,
            min_level: None,
            category: None,
            trace_id: None,
            search_text: None,
            metadata_filters: BTreeMap::new(),
            limit: DEFAULT_QUERY_LIMIT,
            offset: 0,
        }
    }
}

impl LogQuery {
    #[must_use]
    pub fn new() -> LogQuery {
        LogQuery::default()
    }

    #[must_use]
    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    #[must_use]
    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    #[must_use]
    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = Some(level);
        self
    }

    #[must_use]
    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    #[must_use]
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search_text = Some(text.into());
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata_filters.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Whether a single entry satisfies every set filter.
    #[must_use]
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(start) = self.start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.timestamp > end {
                return false;
            }
        }
        if let Some(min_level) = self.min_level {
            if entry.level < min_level {
                return false;
            }
        }
        if let Some(category) = self.category {
            if entry.category != category {
                return false;
            }
        }
        if let Some(trace_id) = &self.trace_id {
            if entry.trace_id.as_deref() != Some(trace_id.as_str()) {
                return false;
            }
        }
        if let Some(text) = &self.search_text {
            if !entry.message.contains(text.as_str()) {
                return false;
            }
        }
        for (key, expected) in &self.metadata_filters {
            match entry.metadata.get(key) {
                Some(value) if value.to_string() == *expected => {}
                _ => return false,
            }
        }
        true
    }

    /// Evaluate against a store snapshot: filter, order, paginate.
    #[must_use]
    pub fn execute(&self, snapshot: Vec<Arc<LogEntry>>) -> Vec<Arc<LogEntry>> {
        // Zero is an explicit "no results", not "unlimited".
        if self.limit == 0 {
            return Vec::new();
        }

        let mut matched: Vec<Arc<LogEntry>> = snapshot
            .into_iter()
            .filter(|e| self.matches(e))
            .collect();
        matched.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });

        matched
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}
