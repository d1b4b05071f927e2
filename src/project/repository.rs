//! Storage queries for posts, categories and comments.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::db::models::{Category, Comment, Post, Tag};
use crate::error::{AppError, AppResult};
use crate::project::forms::PostForm;
use crate::project::taxonomy::{slugify, tags_for_post};
use crate::project::{display_date, markdown};

// --- Views ---

pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub hook_text: String,
    pub excerpt: String,
    pub head_image: Option<String>,
    pub author: String,
    pub category: Option<Category>,
    pub tags: Vec<Tag>,
    pub created_at: String,
}

pub struct PostDetail {
    pub post: Post,
    pub author: String,
    pub category: Option<Category>,
    pub tags: Vec<Tag>,
    pub content_html: String,
    pub created_at: String,
}

pub struct CommentView {
    pub id: i64,
    pub author_id: String,
    pub author: String,
    pub content: String,
    pub created_at: String,
    pub edited: bool,
}

pub struct CategoryEntry {
    pub name: String,
    pub slug: String,
    pub post_count: i64,
}

/// Shared context of every listing and detail page.
pub struct Sidebar {
    pub categories: Vec<CategoryEntry>,
    pub uncategorized_count: i64,
}

pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub num_pages: u32,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn previous_number(&self) -> u32 {
        self.number.saturating_sub(1)
    }

    pub fn next_number(&self) -> u32 {
        self.number + 1
    }
}

// --- Filtering ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Category(i64),
    Uncategorized,
    Tag(i64),
    /// Case-insensitive substring of the title or of any tag name.
    Search(String),
}

impl PostFilter {
    fn clause(&self) -> (&'static str, Vec<Value>) {
        match self {
            PostFilter::All => ("1 = 1", vec![]),
            PostFilter::Category(id) => ("p.category_id = ?1", vec![Value::Integer(*id)]),
            PostFilter::Uncategorized => ("p.category_id IS NULL", vec![]),
            PostFilter::Tag(id) => (
                "EXISTS (SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag_id = ?1)",
                vec![Value::Integer(*id)],
            ),
            // EXISTS instead of a join keeps one row per post however many tags match.
            // fold_case is registered per connection in db::init_connection.
            PostFilter::Search(q) => (
                "(fold_case(p.title) LIKE ?1 ESCAPE '\\' OR EXISTS (
                    SELECT 1 FROM post_tags pt JOIN tags t ON t.id = pt.tag_id
                    WHERE pt.post_id = p.id AND fold_case(t.name) LIKE ?1 ESCAPE '\\'))",
                vec![Value::Text(like_pattern(&q.to_lowercase()))],
            ),
        }
    }
}

/// `%q%` with LIKE wildcards in `q` taken literally.
fn like_pattern(q: &str) -> String {
    let mut escaped = String::with_capacity(q.len() + 2);
    escaped.push('%');
    for c in q.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

pub fn count_posts(conn: &Connection, filter: &PostFilter) -> AppResult<i64> {
    let (clause, values) = filter.clause();
    let sql = format!("SELECT COUNT(*) FROM posts p WHERE {clause}");
    let count = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
    Ok(count)
}

/// Posts matching `filter`, newest first. `window` is `(offset, limit)`.
pub fn list_posts(
    conn: &Connection,
    filter: &PostFilter,
    window: Option<(u32, u32)>,
) -> AppResult<Vec<PostSummary>> {
    let (clause, values) = filter.clause();
    let limit = match window {
        Some((offset, limit)) => format!("LIMIT {limit} OFFSET {offset}"),
        None => String::new(),
    };
    let sql = format!(
        "SELECT p.id, p.title, p.hook_text, p.content, p.head_image, u.username,
                c.id, c.name, c.slug, p.created_at
         FROM posts p
         JOIN users u ON u.id = p.author_id
         LEFT JOIN categories c ON c.id = p.category_id
         WHERE {clause}
         ORDER BY p.id DESC
         {limit}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            let content: String = row.get(3)?;
            let created_at: String = row.get(9)?;
            Ok(PostSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                hook_text: row.get(2)?,
                excerpt: markdown::excerpt(&content),
                head_image: row.get(4)?,
                author: row.get(5)?,
                category: category_from_columns(row, 6)?,
                tags: Vec::new(),
                created_at: display_date(&created_at),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|mut post| {
            post.tags = tags_for_post(conn, post.id)?;
            Ok(post)
        })
        .collect()
}

/// One page of posts. Page numbers start at 1; asking past the last page is
/// NotFound, except that page 1 of an empty listing is just empty.
pub fn paginate(
    conn: &Connection,
    filter: &PostFilter,
    number: u32,
    page_size: u32,
) -> AppResult<Page<PostSummary>> {
    let page_size = page_size.max(1);
    let total = count_posts(conn, filter)?;
    let num_pages = u32::try_from(total)
        .map_err(|_| AppError::Internal("post count out of range".into()))?
        .div_ceil(page_size)
        .max(1);

    if number == 0 || number > num_pages {
        return Err(AppError::NotFound);
    }

    let items = list_posts(conn, filter, Some(((number - 1) * page_size, page_size)))?;
    Ok(Page {
        items,
        number,
        num_pages,
        total,
    })
}

// --- Posts ---

pub fn get_post(conn: &Connection, id: i64) -> AppResult<Option<Post>> {
    let post = conn
        .query_row(
            "SELECT id, title, hook_text, tools, content, head_image, file_upload,
                    author_id, category_id, created_at, updated_at
             FROM posts WHERE id = ?1",
            params![id],
            post_from_row,
        )
        .optional()?;
    Ok(post)
}

pub fn post_detail(conn: &Connection, id: i64) -> AppResult<Option<PostDetail>> {
    let Some(post) = get_post(conn, id)? else {
        return Ok(None);
    };

    let author: String = conn.query_row(
        "SELECT username FROM users WHERE id = ?1",
        params![post.author_id],
        |row| row.get(0),
    )?;
    let category = match post.category_id {
        Some(category_id) => get_category(conn, category_id)?,
        None => None,
    };
    let tags = tags_for_post(conn, post.id)?;
    let content_html = markdown::render(&post.content);
    let created_at = display_date(&post.created_at);

    Ok(Some(PostDetail {
        post,
        author,
        category,
        tags,
        content_html,
        created_at,
    }))
}

/// Insert the fields bound by the create form.
pub fn insert_post(
    conn: &Connection,
    author_id: &str,
    form: &PostForm,
    head_image: Option<&str>,
    file_upload: Option<&str>,
) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO posts (title, tools, content, head_image, file_upload, category_id, author_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            form.title,
            form.tools,
            form.content,
            head_image,
            file_upload,
            form.category_id(),
            author_id
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Update the fields bound by the update form. `tools` is not one of them.
pub fn update_post(
    conn: &Connection,
    id: i64,
    form: &PostForm,
    head_image: Option<&str>,
    file_upload: Option<&str>,
) -> AppResult<()> {
    conn.execute(
        "UPDATE posts SET title = ?1, hook_text = ?2, content = ?3, head_image = ?4,
                file_upload = ?5, category_id = ?6, updated_at = datetime('now')
         WHERE id = ?7",
        params![
            form.title,
            form.hook_text,
            form.content,
            head_image,
            file_upload,
            form.category_id(),
            id
        ],
    )?;
    Ok(())
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        hook_text: row.get(2)?,
        tools: row.get(3)?,
        content: row.get(4)?,
        head_image: row.get(5)?,
        file_upload: row.get(6)?,
        author_id: row.get(7)?,
        category_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

// --- Categories ---

/// Categories are normally managed from the admin site; the slug is derived
/// from the name the same way.
pub fn create_category(conn: &Connection, name: &str) -> AppResult<Category> {
    let slug = slugify(name);
    conn.execute(
        "INSERT INTO categories (name, slug) VALUES (?1, ?2)",
        params![name, slug],
    )?;
    Ok(Category {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        slug,
    })
}

pub fn get_category(conn: &Connection, id: i64) -> AppResult<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, name, slug FROM categories WHERE id = ?1",
            params![id],
            category_from_row,
        )
        .optional()?;
    Ok(category)
}

pub fn find_category_by_slug(conn: &Connection, slug: &str) -> AppResult<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, name, slug FROM categories WHERE slug = ?1",
            params![slug],
            category_from_row,
        )
        .optional()?;
    Ok(category)
}

pub fn list_categories(conn: &Connection) -> AppResult<Vec<Category>> {
    let mut stmt = conn.prepare("SELECT id, name, slug FROM categories ORDER BY name ASC")?;
    let categories = stmt
        .query_map([], category_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(categories)
}

pub fn sidebar(conn: &Connection) -> AppResult<Sidebar> {
    let mut stmt = conn.prepare(
        "SELECT c.name, c.slug, COUNT(p.id)
         FROM categories c
         LEFT JOIN posts p ON p.category_id = c.id
         GROUP BY c.id
         ORDER BY c.name ASC",
    )?;
    let categories = stmt
        .query_map([], |row| {
            Ok(CategoryEntry {
                name: row.get(0)?,
                slug: row.get(1)?,
                post_count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Sidebar {
        categories,
        uncategorized_count: count_posts(conn, &PostFilter::Uncategorized)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
    })
}

/// A LEFT JOINed category spread over three columns starting at `start`.
fn category_from_columns(row: &Row<'_>, start: usize) -> rusqlite::Result<Option<Category>> {
    let id: Option<i64> = row.get(start)?;
    match id {
        Some(id) => Ok(Some(Category {
            id,
            name: row.get(start + 1)?,
            slug: row.get(start + 2)?,
        })),
        None => Ok(None),
    }
}

// --- Comments ---

pub fn comments_for_post(conn: &Connection, post_id: i64) -> AppResult<Vec<CommentView>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.author_id, u.username, c.content, c.created_at, c.modified_at
         FROM comments c
         JOIN users u ON u.id = c.author_id
         WHERE c.post_id = ?1
         ORDER BY c.id ASC",
    )?;

    let comments = stmt
        .query_map(params![post_id], |row| {
            let created_at: String = row.get(4)?;
            let modified_at: String = row.get(5)?;
            Ok(CommentView {
                id: row.get(0)?,
                author_id: row.get(1)?,
                author: row.get(2)?,
                content: row.get(3)?,
                edited: modified_at != created_at,
                created_at: display_date(&created_at),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

pub fn get_comment(conn: &Connection, id: i64) -> AppResult<Option<Comment>> {
    let comment = conn
        .query_row(
            "SELECT id, post_id, author_id, content, created_at, modified_at
             FROM comments WHERE id = ?1",
            params![id],
            |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    author_id: row.get(2)?,
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                    modified_at: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(comment)
}

pub fn insert_comment(
    conn: &Connection,
    post_id: i64,
    author_id: &str,
    content: &str,
) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO comments (post_id, author_id, content) VALUES (?1, ?2, ?3)",
        params![post_id, author_id, content],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_comment(conn: &Connection, id: i64, content: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE comments SET content = ?1, modified_at = datetime('now') WHERE id = ?2",
        params![content, id],
    )?;
    Ok(())
}

pub fn delete_comment(conn: &Connection, id: i64) -> AppResult<()> {
    conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
    Ok(())
}
