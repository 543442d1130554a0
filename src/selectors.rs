//! Site markup the crawler depends on. These track Instagram's front end and
//! are the first thing to check when extraction starts returning defaults.

/// Grid thumbnails linking to a post or reel detail page.
pub const THUMBNAIL_LINKS: &str = r#"a[href*="/p/"], a[href*="/reel/"]"#;

/// Present once a post detail view has rendered.
pub const POST_READY: &str = "article, time[datetime]";

pub const POST_TIME: &str = "time[datetime]";

pub const OG_DESCRIPTION: &str = r#"meta[property="og:description"]"#;

/// Elements whose text is the like count, tried in order.
pub const LIKE_COUNT_TEXT: &[&str] = &[
    r#"section a[href$="/liked_by/"] span"#,
    r#"section a[href$="/liked_by/"]"#,
];

/// "View all N comments" style links.
pub const COMMENT_SUMMARY_TEXT: &[&str] = &[r#"a[href$="/comments/"]"#];

/// Rendered comment entries, counted when no summary is available.
pub const COMMENT_ITEMS: &[&str] = &["ul ul[role] li", "ul > div > li"];

pub const VIDEO_MARKERS: &[&str] = &[
    "video",
    r#"meta[property="og:video"]"#,
    r#"svg[aria-label="Clip"]"#,
    r#"svg[aria-label="Reel"]"#,
];

pub const PAGE_BODY: &str = "body";
