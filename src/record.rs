use chrono::{DateTime, Utc};
use serde::Serialize;

/// One extracted post. Column order here is the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostRecord {
    pub post_url: String,
    pub date: Option<DateTime<Utc>>,
    pub likes: u64,
    pub comments_count: u64,
    pub is_video: bool,
}

pub const CSV_HEADER: [&str; 5] = ["post_url", "date", "likes", "comments_count", "is_video"];

/// Outcome of reading a single field from a post page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<T> {
    Value(T),
    Missing,
}

impl<T> Field<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Field::Missing)
    }

    pub fn value_or(self, default: T) -> T {
        match self {
            Field::Value(v) => v,
            Field::Missing => default,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Value(v) => Some(v),
            Field::Missing => None,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => Field::Value(v),
            None => Field::Missing,
        }
    }
}
