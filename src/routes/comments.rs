use askama::Template;
use axum::extract::rejection::FormRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;

use crate::db::models::Comment;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::project::forms::{CommentForm, FormErrors};
use crate::project::{comment_url, post_url, repository};
use crate::routes::posts::render_detail;
use crate::routes::Html;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "project/comment_form.html")]
pub struct CommentFormTemplate {
    pub viewer: Option<CurrentUser>,
    pub comment_id: i64,
    pub post_id: i64,
    pub form: CommentForm,
    pub errors: FormErrors,
}

/// The form body is only looked at once the caller has passed the
/// authorship checks.
fn submitted(form: Result<Form<CommentForm>, FormRejection>) -> AppResult<CommentForm> {
    form.map(|Form(form)| form)
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

/// Load a comment and make sure the viewer wrote it.
fn authored_comment(
    conn: &rusqlite::Connection,
    viewer: Option<CurrentUser>,
    id: i64,
) -> AppResult<(CurrentUser, Comment)> {
    let comment = repository::get_comment(conn, id)?.ok_or(AppError::NotFound)?;
    match viewer {
        Some(user) if user.is_author_of(&comment.author_id) => Ok((user, comment)),
        other => {
            tracing::warn!(
                comment_id = id,
                user = other.as_ref().map(|u| u.username.as_str()).unwrap_or("anonymous"),
                "Rejected comment change by non-author"
            );
            Err(AppError::PermissionDenied)
        }
    }
}

/// Visiting the comment endpoint without submitting goes back to the post.
pub async fn new_comment_redirect(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(post_id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let post = repository::get_post(&conn, post_id)?.ok_or(AppError::NotFound)?;
    Ok(Redirect::to(&post_url(post.id)).into_response())
}

pub async fn new_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
    form: Result<Form<CommentForm>, FormRejection>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let post = repository::get_post(&conn, post_id)?.ok_or(AppError::NotFound)?;
    let form = submitted(form)?;

    let errors = form.validate();
    if !errors.is_empty() {
        let page = render_detail(&conn, Some(user), post.id, form, errors)?;
        return Ok(page.into_response());
    }

    let comment_id = repository::insert_comment(&conn, post.id, &user.id, form.content.trim())?;
    tracing::info!(post_id = post.id, comment_id, author = %user.username, "Created comment");
    Ok(Redirect::to(&comment_url(post.id, comment_id)).into_response())
}

pub async fn edit_comment(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Html<CommentFormTemplate>> {
    let conn = state.db.get()?;
    let (user, comment) = authored_comment(&conn, viewer, id)?;

    Ok(Html(CommentFormTemplate {
        viewer: Some(user),
        comment_id: comment.id,
        post_id: comment.post_id,
        form: CommentForm {
            content: comment.content,
        },
        errors: FormErrors::default(),
    }))
}

pub async fn update_comment(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
    form: Result<Form<CommentForm>, FormRejection>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let (user, comment) = authored_comment(&conn, viewer, id)?;
    let form = submitted(form)?;

    let errors = form.validate();
    if !errors.is_empty() {
        return Ok(Html(CommentFormTemplate {
            viewer: Some(user),
            comment_id: comment.id,
            post_id: comment.post_id,
            form,
            errors,
        })
        .into_response());
    }

    repository::update_comment(&conn, comment.id, form.content.trim())?;
    tracing::info!(comment_id = comment.id, author = %user.username, "Updated comment");
    Ok(Redirect::to(&comment_url(comment.post_id, comment.id)).into_response())
}

pub async fn delete_comment(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let (user, comment) = authored_comment(&conn, viewer, id)?;

    repository::delete_comment(&conn, comment.id)?;
    tracing::info!(comment_id = comment.id, author = %user.username, "Deleted comment");
    Ok(Redirect::to(&post_url(comment.post_id)).into_response())
}
