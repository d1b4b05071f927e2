//! Project posts: taxonomy, listing queries, forms and uploads.

pub mod forms;
pub mod markdown;
pub mod repository;
pub mod taxonomy;
pub mod uploads;

use chrono::NaiveDateTime;

/// Category slug that addresses posts without a category.
pub const UNCATEGORIZED_SLUG: &str = "no_category";

/// Display name of the uncategorized bucket.
pub const UNCATEGORIZED_LABEL: &str = "미분류";

pub fn post_url(post_id: i64) -> String {
    format!("/{post_id}/")
}

pub fn comment_url(post_id: i64, comment_id: i64) -> String {
    format!("/{post_id}/#comment-{comment_id}")
}

/// Format a SQLite `datetime('now')` value for display.
pub fn display_date(db_time: &str) -> String {
    NaiveDateTime::parse_from_str(db_time, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|_| db_time.to_string())
}
