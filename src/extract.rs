use std::sync::LazyLock;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use regex::Regex;
use url::Url;

use crate::page::PageReader;
use crate::record::{Field, PostRecord};
use crate::selectors;

// Either grouped thousands ("1,234", "1.234", "1 234") or a plain/decimal
// number ("1234", "12.5"), optionally followed by a K/M/B multiplier.
static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?P<num>\d{1,3}(?:[.,\x{a0}\x{202f} ]\d{3})+|\d+(?:[.,]\d+)?)(?:\s?(?P<suffix>[KkMmBb])\b)?",
    )
    .expect("count regex")
});

/// Parse an engagement count out of display text.
///
/// With a `keyword`, only a number directly followed by that word is taken
/// (`"1,234 likes, 5 comments"` with `"comment"` gives 5). A "Liked by a and
/// N others" line counts the named account too. Without a keyword, the first
/// number in the text is used.
pub fn parse_count(text: &str, keyword: Option<&str>) -> Field<u64> {
    let Some(keyword) = keyword else {
        return match COUNT_RE.captures_iter(text).next() {
            Some(caps) => count_value(&caps).into(),
            None => Field::Missing,
        };
    };
    if let Some(n) = count_before(text, keyword) {
        return n.into();
    }
    if keyword.to_lowercase().starts_with("like") && text.to_lowercase().contains("liked by") {
        if let Some(others) = count_before(text, "other") {
            return others.map(|n| n.saturating_add(1)).into();
        }
    }
    Field::Missing
}

/// Value of the first number directly followed by `word`. The outer `None`
/// means no number precedes `word`; the inner one that it did not parse.
fn count_before(text: &str, word: &str) -> Option<Option<u64>> {
    let word = word.to_lowercase();
    COUNT_RE.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        let rest = text[whole.end()..].trim_start().to_lowercase();
        rest.starts_with(&word).then(|| count_value(&caps))
    })
}

fn count_value(caps: &regex::Captures<'_>) -> Option<u64> {
    let num = caps.name("num").map(|m| m.as_str()).unwrap_or("");
    let suffix = caps.name("suffix").map(|m| m.as_str());
    number_value(num, suffix)
}

fn number_value(num: &str, suffix: Option<&str>) -> Option<u64> {
    let multiplier = match suffix.map(|s| s.to_ascii_lowercase()) {
        None => None,
        Some(s) if s == "k" => Some(1_000f64),
        Some(s) if s == "m" => Some(1_000_000f64),
        Some(s) if s == "b" => Some(1_000_000_000f64),
        Some(_) => return None,
    };

    let grouped = num
        .split(|c: char| !c.is_ascii_digit())
        .skip(1)
        .all(|g| g.len() == 3)
        && num.chars().any(|c| !c.is_ascii_digit());

    match multiplier {
        Some(m) => {
            let normalized = if grouped {
                num.chars().filter(|c| c.is_ascii_digit()).collect::<String>()
            } else {
                num.replace(',', ".")
            };
            let value: f64 = normalized.parse().ok()?;
            Some((value * m).round() as u64)
        }
        None if grouped => num
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .ok(),
        None if num.chars().all(|c| c.is_ascii_digit()) => num.parse().ok(),
        // A fractional count without a multiplier is not a count.
        None => None,
    }
}

pub fn parse_timestamp(raw: &str) -> Field<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
        .into()
}

/// Open `post_url` and read its engagement fields.
///
/// Only a failed navigation is an error; anything that cannot be read from
/// the rendered page degrades to the field's default.
pub async fn extract_post<R: PageReader>(
    reader: &mut R,
    post_url: &Url,
    timeout: std::time::Duration,
) -> anyhow::Result<PostRecord> {
    reader
        .navigate(post_url)
        .await
        .with_context(|| format!("open post {}", post_url))?;
    let reader: &R = reader;

    match reader.wait_for(selectors::POST_READY, timeout).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(%post_url, "post view did not render in time"),
        Err(e) => tracing::warn!(%post_url, error = %format!("{e:#}"), "post view check failed"),
    }

    let og = read_attr(reader, selectors::OG_DESCRIPTION, "content").await;

    let mut likes = Field::Missing;
    for sel in selectors::LIKE_COUNT_TEXT {
        if let Some(text) = read_text(reader, sel).await {
            likes = match parse_count(&text, Some("like")) {
                Field::Missing => parse_count(&text, None),
                found => found,
            };
            if !likes.is_missing() {
                break;
            }
        }
    }
    if likes.is_missing() {
        if let Some(og) = &og {
            likes = parse_count(og, Some("like"));
        }
    }

    let comments = comment_count(reader, og.as_deref()).await;

    let date = match read_attr(reader, selectors::POST_TIME, "datetime").await {
        Some(raw) => parse_timestamp(&raw),
        None => Field::Missing,
    };

    let is_video = post_url.path().contains("/reel/") || has_video_marker(reader).await;

    if likes.is_missing() || comments.is_missing() || date.is_missing() {
        tracing::debug!(
            %post_url,
            likes_missing = likes.is_missing(),
            comments_missing = comments.is_missing(),
            date_missing = date.is_missing(),
            "post fields defaulted"
        );
    }

    Ok(PostRecord {
        post_url: post_url.to_string(),
        date: date.into_option(),
        likes: likes.value_or(0),
        comments_count: comments.value_or(0),
        is_video,
    })
}

async fn comment_count<R: PageReader>(reader: &R, og: Option<&str>) -> Field<u64> {
    for sel in selectors::COMMENT_SUMMARY_TEXT {
        if let Some(text) = read_text(reader, sel).await {
            let parsed = parse_count(&text, Some("comment"));
            if !parsed.is_missing() {
                return parsed;
            }
        }
    }
    if let Some(og) = og {
        let parsed = parse_count(og, Some("comment"));
        if !parsed.is_missing() {
            return parsed;
        }
    }
    for sel in selectors::COMMENT_ITEMS {
        match reader.count(sel).await {
            Ok(n) if n > 0 => return Field::Value(n as u64),
            Ok(_) => {}
            Err(e) => tracing::debug!(selector = sel, error = %format!("{e:#}"), "count failed"),
        }
    }
    Field::Missing
}

async fn has_video_marker<R: PageReader>(reader: &R) -> bool {
    for sel in selectors::VIDEO_MARKERS {
        match reader.count(sel).await {
            Ok(n) if n > 0 => return true,
            Ok(_) => {}
            Err(e) => tracing::debug!(selector = sel, error = %format!("{e:#}"), "count failed"),
        }
    }
    false
}

async fn read_text<R: PageReader>(reader: &R, selector: &str) -> Option<String> {
    match reader.read_text(selector).await {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(selector, error = %format!("{e:#}"), "read text failed");
            None
        }
    }
}

async fn read_attr<R: PageReader>(reader: &R, selector: &str, attr: &str) -> Option<String> {
    match reader.read_attr(selector, attr).await {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(selector, attr, error = %format!("{e:#}"), "read attribute failed");
            None
        }
    }
}
