//! Tag ingestion: turns the free-text `tags_str` form field into tag rows
//! attached to a post.

use rusqlite::{params, Connection, OptionalExtension};
use unicode_normalization::UnicodeNormalization;

use crate::db::models::Tag;
use crate::error::AppResult;

/// How an ingestion treats tags already attached to the post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    /// Keep existing associations and add the new ones (post creation).
    Append,
    /// Detach everything first, then attach the parsed tags (post update).
    Replace,
}

/// Split raw tag input on `;` or `,` into trimmed names.
///
/// Tokens that are empty after trimming are skipped, and repeated names keep
/// only their first occurrence.
pub fn split_tag_input(raw: &str) -> Vec<String> {
    let normalized = raw.trim().replace(',', ";");
    let mut names: Vec<String> = Vec::new();
    for piece in normalized.split(';') {
        let name = piece.trim();
        if name.is_empty() || names.iter().any(|n| n == name) {
            continue;
        }
        names.push(name.to_string());
    }
    names
}

/// Unicode-aware slug: NFKC, lowercase, keep word characters, whitespace and
/// hyphens, then collapse whitespace/hyphen runs into a single `-`.
pub fn slugify(value: &str) -> String {
    let lowered: String = value.nfkc().collect::<String>().to_lowercase();

    let mut slug = String::with_capacity(lowered.len());
    let mut pending_dash = false;
    for c in lowered.chars() {
        if c.is_whitespace() || c == '-' {
            pending_dash = true;
        } else if c.is_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        }
    }

    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Look up a tag by exact name, creating it when unseen.
/// Returns the tag and whether it was created.
///
/// Names that slugify to nothing, or to a slug another tag already holds
/// (`rust` and `Rust`), get the row id appended: `tag-{id}` or `{slug}-{id}`.
pub fn get_or_create_tag(conn: &Connection, name: &str) -> AppResult<(Tag, bool)> {
    let existing = conn
        .query_row(
            "SELECT id, name, slug FROM tags WHERE name = ?1",
            params![name],
            tag_from_row,
        )
        .optional()?;
    if let Some(tag) = existing {
        return Ok((tag, false));
    }

    let slug = slugify(name);
    let needs_suffix = slug.is_empty() || slug_taken(conn, &slug)?;
    let placeholder = if needs_suffix {
        uuid::Uuid::new_v4().to_string()
    } else {
        slug.clone()
    };
    conn.execute(
        "INSERT INTO tags (name, slug) VALUES (?1, ?2)",
        params![name, placeholder],
    )?;
    let id = conn.last_insert_rowid();

    let slug = if needs_suffix {
        let base = if slug.is_empty() { "tag" } else { slug.as_str() };
        let unique = unique_suffixed_slug(conn, base, id)?;
        conn.execute(
            "UPDATE tags SET slug = ?1 WHERE id = ?2",
            params![unique, id],
        )?;
        unique
    } else {
        slug
    };

    tracing::info!(tag = %name, %slug, "Created tag");
    Ok((
        Tag {
            id,
            name: name.to_string(),
            slug,
        },
        true,
    ))
}

fn slug_taken(conn: &Connection, slug: &str) -> AppResult<bool> {
    let taken = conn.query_row(
        "SELECT COUNT(*) > 0 FROM tags WHERE slug = ?1",
        params![slug],
        |row| row.get(0),
    )?;
    Ok(taken)
}

/// `{base}-{id}`, or `{base}-{id}-{n}` if a hand-made slug already has that form.
fn unique_suffixed_slug(conn: &Connection, base: &str, id: i64) -> AppResult<String> {
    let mut candidate = format!("{base}-{id}");
    let mut n = 2;
    while slug_taken(conn, &candidate)? {
        candidate = format!("{base}-{id}-{n}");
        n += 1;
    }
    Ok(candidate)
}

/// Attach tags parsed from `raw` to a post.
///
/// With [`TagMode::Append`] an absent input leaves the post untouched. With
/// [`TagMode::Replace`] the association set is cleared first, so an absent or
/// empty input detaches every tag. Tag rows themselves are never deleted.
pub fn ingest_tags(
    conn: &Connection,
    post_id: i64,
    raw: Option<&str>,
    mode: TagMode,
) -> AppResult<Vec<Tag>> {
    if mode == TagMode::Replace {
        conn.execute("DELETE FROM post_tags WHERE post_id = ?1", params![post_id])?;
    }

    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    let mut attached = Vec::new();
    for name in split_tag_input(raw) {
        let (tag, _) = get_or_create_tag(conn, &name)?;
        conn.execute(
            "INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?1, ?2)",
            params![post_id, tag.id],
        )?;
        attached.push(tag);
    }
    Ok(attached)
}

/// Tags attached to a post, in creation order.
pub fn tags_for_post(conn: &Connection, post_id: i64) -> AppResult<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.slug FROM tags t
         JOIN post_tags pt ON pt.tag_id = t.id
         WHERE pt.post_id = ?1
         ORDER BY t.id ASC",
    )?;
    let tags = stmt
        .query_map(params![post_id], tag_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

/// Display form used to pre-fill the update form.
pub fn join_tag_names(tags: &[Tag]) -> String {
    tags.iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn find_tag_by_slug(conn: &Connection, slug: &str) -> AppResult<Option<Tag>> {
    let tag = conn
        .query_row(
            "SELECT id, name, slug FROM tags WHERE slug = ?1",
            params![slug],
            tag_from_row,
        )
        .optional()?;
    Ok(tag)
}

fn tag_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::users::create_user;
    use crate::db;
    use crate::state::DbPool;

    fn setup() -> (DbPool, i64) {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();
        let author = create_user(&conn, "writer", true, false).unwrap();
        conn.execute(
            "INSERT INTO posts (title, content, author_id) VALUES ('p', 'c', ?1)",
            params![author.id],
        )
        .unwrap();
        let post_id = conn.last_insert_rowid();
        drop(conn);
        (pool, post_id)
    }

    fn tag_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM tags", [], |r| r.get(0))
            .unwrap()
    }

    fn names(tags: &[Tag]) -> Vec<&str> {
        tags.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn splits_on_mixed_separators_and_trims() {
        assert_eq!(
            split_tag_input("  rust , web;  django ;axum  "),
            vec!["rust", "web", "django", "axum"]
        );
    }

    #[test]
    fn skips_empty_tokens() {
        assert_eq!(split_tag_input("a;;b, ,c;"), vec!["a", "b", "c"]);
        assert!(split_tag_input("  ; , ").is_empty());
        assert!(split_tag_input("").is_empty());
    }

    #[test]
    fn repeated_names_collapse() {
        assert_eq!(split_tag_input("a, b; a"), vec!["a", "b"]);
    }

    #[test]
    fn slugify_ascii() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Rust & Axum!  "), "rust-axum");
        assert_eq!(slugify("a -- b"), "a-b");
        assert_eq!(slugify("_private_"), "private");
    }

    #[test]
    fn slugify_keeps_unicode_letters() {
        assert_eq!(slugify("파이썬 장고"), "파이썬-장고");
        assert_eq!(slugify("Ünïcödé"), "ünïcödé");
    }

    #[test]
    fn slugify_applies_nfkc() {
        // Fullwidth letters fold to ASCII under NFKC
        assert_eq!(slugify("ＲＵＳＴ"), "rust");
    }

    #[test]
    fn slugify_punctuation_only_is_empty() {
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn creates_tags_with_slugs() {
        let (pool, post_id) = setup();
        let conn = pool.get().unwrap();

        let tags = ingest_tags(&conn, post_id, Some("Web Dev, 파이썬"), TagMode::Append).unwrap();
        assert_eq!(names(&tags), vec!["Web Dev", "파이썬"]);
        assert_eq!(tags[0].slug, "web-dev");
        assert_eq!(tags[1].slug, "파이썬");
        assert_eq!(names(&tags_for_post(&conn, post_id).unwrap()), vec!["Web Dev", "파이썬"]);
    }

    #[test]
    fn reuses_existing_tag_by_exact_name() {
        let (pool, post_id) = setup();
        let conn = pool.get().unwrap();

        ingest_tags(&conn, post_id, Some("rust"), TagMode::Append).unwrap();
        ingest_tags(&conn, post_id, Some("rust; rust"), TagMode::Append).unwrap();

        assert_eq!(tag_count(&conn), 1);
        assert_eq!(tags_for_post(&conn, post_id).unwrap().len(), 1);
    }

    #[test]
    fn slug_is_not_recomputed_on_reuse() {
        let (pool, post_id) = setup();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO tags (name, slug) VALUES ('Legacy Name', 'hand-picked')",
            [],
        )
        .unwrap();

        let tags = ingest_tags(&conn, post_id, Some("Legacy Name"), TagMode::Append).unwrap();
        assert_eq!(tags[0].slug, "hand-picked");
    }

    #[test]
    fn absent_input_on_append_keeps_existing_tags() {
        let (pool, post_id) = setup();
        let conn = pool.get().unwrap();

        ingest_tags(&conn, post_id, Some("a;b"), TagMode::Append).unwrap();
        ingest_tags(&conn, post_id, None, TagMode::Append).unwrap();

        assert_eq!(tags_for_post(&conn, post_id).unwrap().len(), 2);
    }

    #[test]
    fn replace_detaches_missing_tags_but_keeps_rows() {
        let (pool, post_id) = setup();
        let conn = pool.get().unwrap();

        ingest_tags(&conn, post_id, Some("A; B"), TagMode::Append).unwrap();
        ingest_tags(&conn, post_id, Some("B, C"), TagMode::Replace).unwrap();

        assert_eq!(names(&tags_for_post(&conn, post_id).unwrap()), vec!["B", "C"]);
        assert_eq!(tag_count(&conn), 3);
        assert!(find_tag_by_slug(&conn, "a").unwrap().is_some());
    }

    #[test]
    fn replace_with_empty_input_clears_all() {
        let (pool, post_id) = setup();
        let conn = pool.get().unwrap();

        ingest_tags(&conn, post_id, Some("x, y"), TagMode::Append).unwrap();
        ingest_tags(&conn, post_id, Some("  "), TagMode::Replace).unwrap();
        assert!(tags_for_post(&conn, post_id).unwrap().is_empty());

        ingest_tags(&conn, post_id, Some("x"), TagMode::Append).unwrap();
        ingest_tags(&conn, post_id, None, TagMode::Replace).unwrap();
        assert!(tags_for_post(&conn, post_id).unwrap().is_empty());
    }

    #[test]
    fn punctuation_only_name_gets_fallback_slug() {
        let (pool, _) = setup();
        let conn = pool.get().unwrap();

        let (tag, created) = get_or_create_tag(&conn, "!!!").unwrap();
        assert!(created);
        assert_eq!(tag.slug, format!("tag-{}", tag.id));

        let (again, created) = get_or_create_tag(&conn, "!!!").unwrap();
        assert!(!created);
        assert_eq!(again, tag);
    }

    #[test]
    fn names_sharing_a_slug_get_distinct_slugs() {
        let (pool, post_id) = setup();
        let conn = pool.get().unwrap();

        ingest_tags(&conn, post_id, Some("rust"), TagMode::Append).unwrap();
        let tags = ingest_tags(&conn, post_id, Some("Rust; Web Dev, web-dev"), TagMode::Append)
            .unwrap();

        assert_eq!(names(&tags), vec!["Rust", "Web Dev", "web-dev"]);
        assert_eq!(tags[0].slug, format!("rust-{}", tags[0].id));
        assert_eq!(tags[1].slug, "web-dev");
        assert_eq!(tags[2].slug, format!("web-dev-{}", tags[2].id));
        assert_eq!(tag_count(&conn), 4);
        assert_eq!(tags_for_post(&conn, post_id).unwrap().len(), 4);
        assert_eq!(find_tag_by_slug(&conn, "rust").unwrap().unwrap().name, "rust");
    }

    #[test]
    fn suffixed_slug_skips_one_already_in_use() {
        let (pool, _) = setup();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO tags (name, slug) VALUES ('go', 'go'), ('golang', 'go-3')",
            [],
        )
        .unwrap();

        let (tag, created) = get_or_create_tag(&conn, "Go").unwrap();
        assert!(created);
        assert_eq!(tag.id, 3);
        assert_eq!(tag.slug, "go-3-2");
    }

    #[test]
    fn joins_names_for_display() {
        let tags = vec![
            Tag { id: 1, name: "a".into(), slug: "a".into() },
            Tag { id: 2, name: "b c".into(), slug: "b-c".into() },
        ];
        assert_eq!(join_tag_names(&tags), "a; b c");
        assert_eq!(join_tag_names(&[]), "");
    }
}
