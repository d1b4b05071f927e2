use askama::Template;
use axum::extract::{Multipart, Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::db::models::{Category, Tag};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::project::forms::{CommentForm, FormErrors, PostForm, PostFormKind};
use crate::project::repository::{
    self, CommentView, Page, PostDetail, PostFilter, PostSummary, Sidebar,
};
use crate::project::taxonomy::{self, TagMode};
use crate::project::uploads::{self, UploadKind};
use crate::project::{post_url, UNCATEGORIZED_LABEL, UNCATEGORIZED_SLUG};
use crate::routes::Html;
use crate::state::AppState;

// --- Templates ---

/// Previous/next links under a paginated listing.
pub struct Pager {
    pub base: String,
    pub number: u32,
    pub num_pages: u32,
    pub previous: Option<u32>,
    pub next: Option<u32>,
}

impl Pager {
    fn new<T>(base: String, page: &Page<T>) -> Self {
        Self {
            base,
            number: page.number,
            num_pages: page.num_pages,
            previous: page.has_previous().then(|| page.previous_number()),
            next: page.has_next().then(|| page.next_number()),
        }
    }
}

#[derive(Template)]
#[template(path = "project/post_list.html")]
pub struct PostListTemplate {
    pub viewer: Option<CurrentUser>,
    pub sidebar: Sidebar,
    pub posts: Vec<PostSummary>,
    pub category: Option<String>,
    pub tag: Option<Tag>,
    pub search_info: Option<String>,
    pub pager: Option<Pager>,
}

#[derive(Template)]
#[template(path = "project/post_detail.html")]
pub struct PostDetailTemplate {
    pub viewer: Option<CurrentUser>,
    pub sidebar: Sidebar,
    pub detail: PostDetail,
    pub attachment_name: Option<String>,
    pub can_edit: bool,
    pub comments: Vec<CommentView>,
    pub comment_form: CommentForm,
    pub comment_errors: FormErrors,
}

#[derive(Template)]
#[template(path = "project/post_form.html")]
pub struct PostFormTemplate {
    pub viewer: Option<CurrentUser>,
    pub heading: String,
    pub action: String,
    pub form: PostForm,
    pub errors: FormErrors,
    pub categories: Vec<Category>,
    pub current_head_image: Option<String>,
    pub current_file_upload: Option<String>,
}

impl PostFormTemplate {
    pub fn shows(&self, field: &str) -> bool {
        self.form.kind.binds(field)
    }

    pub fn is_selected(&self, category: &Category) -> bool {
        self.form.category_id() == Some(category.id)
    }

    pub fn tags_value(&self) -> &str {
        self.form.tags_str.as_deref().unwrap_or_default()
    }
}

// --- Queries ---

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    fn number(&self) -> AppResult<u32> {
        match self.page.as_deref() {
            None | Some("") => Ok(1),
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::BadRequest("Invalid page number".into())),
        }
    }
}

// --- Listing handlers ---

pub async fn post_list(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<PostListTemplate>> {
    let number = query.number()?;
    let conn = state.db.get()?;
    let page = repository::paginate(
        &conn,
        &PostFilter::All,
        number,
        state.config.listing.page_size,
    )?;

    Ok(Html(PostListTemplate {
        viewer,
        sidebar: repository::sidebar(&conn)?,
        pager: Some(Pager::new("/".to_string(), &page)),
        posts: page.items,
        category: None,
        tag: None,
        search_info: None,
    }))
}

pub async fn category_page(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<PostListTemplate>> {
    let number = query.number()?;
    let conn = state.db.get()?;

    let (label, filter) = if slug == UNCATEGORIZED_SLUG {
        (UNCATEGORIZED_LABEL.to_string(), PostFilter::Uncategorized)
    } else {
        let category =
            repository::find_category_by_slug(&conn, &slug)?.ok_or(AppError::NotFound)?;
        (category.name, PostFilter::Category(category.id))
    };

    let page = repository::paginate(&conn, &filter, number, state.config.listing.page_size)?;

    Ok(Html(PostListTemplate {
        viewer,
        sidebar: repository::sidebar(&conn)?,
        pager: Some(Pager::new(format!("/category/{slug}/"), &page)),
        posts: page.items,
        category: Some(label),
        tag: None,
        search_info: None,
    }))
}

pub async fn tag_page(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<PostListTemplate>> {
    let number = query.number()?;
    let conn = state.db.get()?;

    let tag = taxonomy::find_tag_by_slug(&conn, &slug)?.ok_or(AppError::NotFound)?;
    let page = repository::paginate(
        &conn,
        &PostFilter::Tag(tag.id),
        number,
        state.config.listing.page_size,
    )?;

    Ok(Html(PostListTemplate {
        viewer,
        sidebar: repository::sidebar(&conn)?,
        pager: Some(Pager::new(format!("/tag/{slug}/"), &page)),
        posts: page.items,
        category: None,
        tag: Some(tag),
        search_info: None,
    }))
}

pub async fn search(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(q): Path<String>,
) -> AppResult<Html<PostListTemplate>> {
    let conn = state.db.get()?;
    let posts = repository::list_posts(&conn, &PostFilter::Search(q.clone()), None)?;
    let search_info = format!("Search: {} ({})", q, posts.len());

    Ok(Html(PostListTemplate {
        viewer,
        sidebar: repository::sidebar(&conn)?,
        posts,
        category: None,
        tag: None,
        search_info: Some(search_info),
        pager: None,
    }))
}

// --- Detail ---

/// Detail page, optionally carrying a rejected comment submission.
pub fn render_detail(
    conn: &rusqlite::Connection,
    viewer: Option<CurrentUser>,
    post_id: i64,
    comment_form: CommentForm,
    comment_errors: FormErrors,
) -> AppResult<Html<PostDetailTemplate>> {
    let detail = repository::post_detail(conn, post_id)?.ok_or(AppError::NotFound)?;
    let can_edit = viewer
        .as_ref()
        .is_some_and(|u| u.is_author_of(&detail.post.author_id));
    let attachment_name = detail
        .post
        .file_upload
        .as_deref()
        .map(|path| uploads::display_name(path).to_string());

    Ok(Html(PostDetailTemplate {
        viewer,
        sidebar: repository::sidebar(conn)?,
        comments: repository::comments_for_post(conn, post_id)?,
        detail,
        attachment_name,
        can_edit,
        comment_form,
        comment_errors,
    }))
}

pub async fn post_detail(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Html<PostDetailTemplate>> {
    let conn = state.db.get()?;
    render_detail(&conn, viewer, id, CommentForm::default(), FormErrors::default())
}

// --- Create ---

fn post_form_page(
    conn: &rusqlite::Connection,
    viewer: CurrentUser,
    action: String,
    form: PostForm,
    errors: FormErrors,
    current: (Option<String>, Option<String>),
) -> AppResult<Html<PostFormTemplate>> {
    let heading = match form.kind {
        PostFormKind::Create => "Create New Post".to_string(),
        PostFormKind::Update => "Edit Post".to_string(),
    };
    Ok(Html(PostFormTemplate {
        viewer: Some(viewer),
        heading,
        action,
        form,
        errors,
        categories: repository::list_categories(conn)?,
        current_head_image: current.0,
        current_file_upload: current.1,
    }))
}

/// Only staff and superusers publish; everyone else goes back to the list.
fn publisher(viewer: Option<CurrentUser>) -> Option<CurrentUser> {
    match viewer {
        Some(user) if user.can_publish() => Some(user),
        Some(user) => {
            tracing::warn!(user = %user.username, "Non-staff user tried to create a post");
            None
        }
        None => None,
    }
}

pub async fn new_post(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
) -> AppResult<Response> {
    let Some(user) = publisher(viewer) else {
        return Ok(Redirect::to("/").into_response());
    };

    let conn = state.db.get()?;
    let page = post_form_page(
        &conn,
        user,
        "/create_post/".to_string(),
        PostForm::empty(PostFormKind::Create),
        FormErrors::default(),
        (None, None),
    )?;
    Ok(page.into_response())
}

pub async fn create_post(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let Some(user) = publisher(viewer) else {
        return Ok(Redirect::to("/").into_response());
    };

    let form = PostForm::from_multipart(PostFormKind::Create, multipart).await?;

    {
        let conn = state.db.get()?;
        let errors = form.validate(&conn)?;
        if !errors.is_empty() {
            let page = post_form_page(
                &conn,
                user,
                "/create_post/".to_string(),
                form,
                errors,
                (None, None),
            )?;
            return Ok(page.into_response());
        }
    }

    let media_root = state.config.media_path();
    let head_image = uploads::apply(&media_root, UploadKind::HeadImage, &form.head_image, None).await?;
    let file_upload =
        uploads::apply(&media_root, UploadKind::Attachment, &form.file_upload, None).await?;

    let written = insert_with_tags(
        &state,
        &user.id,
        &form,
        head_image.as_deref(),
        file_upload.as_deref(),
    );
    let fresh: Vec<&str> = head_image
        .iter()
        .chain(file_upload.iter())
        .map(String::as_str)
        .collect();
    let post_id = uploads::commit_or_discard(&media_root, &fresh, written).await?;

    tracing::info!(post_id, author = %user.username, "Created post");
    Ok(Redirect::to(&post_url(post_id)).into_response())
}

/// Post row and its tags in one transaction.
fn insert_with_tags(
    state: &AppState,
    author_id: &str,
    form: &PostForm,
    head_image: Option<&str>,
    file_upload: Option<&str>,
) -> AppResult<i64> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    let post_id = repository::insert_post(&tx, author_id, form, head_image, file_upload)?;
    taxonomy::ingest_tags(&tx, post_id, form.tags_str.as_deref(), TagMode::Append)?;
    tx.commit()?;
    Ok(post_id)
}

// --- Update ---

/// Load a post and make sure the viewer wrote it.
fn authored_post(
    conn: &rusqlite::Connection,
    viewer: Option<CurrentUser>,
    id: i64,
) -> AppResult<(CurrentUser, crate::db::models::Post)> {
    let post = repository::get_post(conn, id)?.ok_or(AppError::NotFound)?;
    match viewer {
        Some(user) if user.is_author_of(&post.author_id) => Ok((user, post)),
        other => {
            tracing::warn!(
                post_id = id,
                user = other.as_ref().map(|u| u.username.as_str()).unwrap_or("anonymous"),
                "Rejected post update by non-author"
            );
            Err(AppError::PermissionDenied)
        }
    }
}

pub async fn edit_post(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Html<PostFormTemplate>> {
    let conn = state.db.get()?;
    let (user, post) = authored_post(&conn, viewer, id)?;

    let tags_str_default = taxonomy::join_tag_names(&taxonomy::tags_for_post(&conn, id)?);
    let form = PostForm::from_post(PostFormKind::Update, &post, tags_str_default);
    post_form_page(
        &conn,
        user,
        format!("/update_post/{id}/"),
        form,
        FormErrors::default(),
        (post.head_image, post.file_upload),
    )
}

fn update_with_tags(
    state: &AppState,
    id: i64,
    form: &PostForm,
    head_image: Option<&str>,
    file_upload: Option<&str>,
) -> AppResult<()> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    repository::update_post(&tx, id, form, head_image, file_upload)?;
    taxonomy::ingest_tags(&tx, id, form.tags_str.as_deref(), TagMode::Replace)?;
    tx.commit()?;
    Ok(())
}

pub async fn update_post(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Response> {
    let (user, post) = {
        let conn = state.db.get()?;
        authored_post(&conn, viewer, id)?
    };

    let form = PostForm::from_multipart(PostFormKind::Update, multipart).await?;

    {
        let conn = state.db.get()?;
        let errors = form.validate(&conn)?;
        if !errors.is_empty() {
            let page = post_form_page(
                &conn,
                user,
                format!("/update_post/{id}/"),
                form,
                errors,
                (post.head_image, post.file_upload),
            )?;
            return Ok(page.into_response());
        }
    }

    let media_root = state.config.media_path();
    let head_image = uploads::apply(
        &media_root,
        UploadKind::HeadImage,
        &form.head_image,
        post.head_image,
    )
    .await?;
    let file_upload = uploads::apply(
        &media_root,
        UploadKind::Attachment,
        &form.file_upload,
        post.file_upload,
    )
    .await?;

    let written = update_with_tags(&state, id, &form, head_image.as_deref(), file_upload.as_deref());
    let fresh: Vec<&str> = [
        uploads::fresh(&form.head_image, &head_image),
        uploads::fresh(&form.file_upload, &file_upload),
    ]
    .into_iter()
    .flatten()
    .collect();
    uploads::commit_or_discard(&media_root, &fresh, written).await?;

    tracing::info!(post_id = id, author = %user.username, "Updated post");
    Ok(Redirect::to(&post_url(id)).into_response())
}
