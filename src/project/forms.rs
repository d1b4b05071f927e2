//! Typed request-to-entity mapping for the post and comment forms.

use axum::body::Bytes;
use axum::extract::Multipart;
use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::db::models::Post;
use crate::error::{AppError, AppResult};

pub const TITLE_MAX: usize = 30;
pub const HOOK_TEXT_MAX: usize = 100;
pub const TOOLS_MAX: usize = 100;

const REQUIRED: &str = "This field is required.";
const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

/// Validation messages keyed by field name, in the order they were found.
#[derive(Debug, Default, Clone)]
pub struct FormErrors {
    entries: Vec<(&'static str, String)>,
}

impl FormErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.entries.push((field, message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First message for a field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, m)| m.as_str())
    }
}

fn check_max_len(errors: &mut FormErrors, field: &'static str, value: &str, max: usize) {
    let len = value.chars().count();
    if len > max {
        errors.add(
            field,
            format!("Ensure this value has at most {max} characters (it has {len})."),
        );
    }
}

/// Which endpoint a post form belongs to; each binds its own field list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFormKind {
    Create,
    Update,
}

impl PostFormKind {
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            PostFormKind::Create => &[
                "title",
                "tools",
                "content",
                "head_image",
                "file_upload",
                "category",
            ],
            PostFormKind::Update => &[
                "title",
                "hook_text",
                "content",
                "head_image",
                "file_upload",
                "category",
            ],
        }
    }

    pub fn binds(self, field: &str) -> bool {
        self.fields().contains(&field)
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// What a submission asks for on a file column.
#[derive(Debug, Clone, Default)]
pub enum FileField {
    #[default]
    Keep,
    Clear,
    Replace(UploadedFile),
}

#[derive(Debug, Clone)]
pub struct PostForm {
    pub kind: PostFormKind,
    pub title: String,
    pub hook_text: String,
    pub tools: String,
    pub content: String,
    pub category: String,
    pub tags_str: Option<String>,
    pub head_image: FileField,
    pub file_upload: FileField,
}

impl PostForm {
    pub fn empty(kind: PostFormKind) -> Self {
        Self {
            kind,
            title: String::new(),
            hook_text: String::new(),
            tools: String::new(),
            content: String::new(),
            category: String::new(),
            tags_str: None,
            head_image: FileField::Keep,
            file_upload: FileField::Keep,
        }
    }

    /// Pre-populated form for editing an existing post.
    pub fn from_post(kind: PostFormKind, post: &Post, tags_str: String) -> Self {
        Self {
            title: post.title.clone(),
            hook_text: post.hook_text.clone(),
            tools: post.tools.clone(),
            content: post.content.clone(),
            category: post.category_id.map(|id| id.to_string()).unwrap_or_default(),
            tags_str: Some(tags_str),
            ..Self::empty(kind)
        }
    }

    /// Bind a `multipart/form-data` submission. Parts outside the endpoint's
    /// field list are ignored, apart from `tags_str` and the clear checkboxes.
    pub async fn from_multipart(kind: PostFormKind, mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::empty(kind);
        let mut clear_head_image = false;
        let mut clear_file_upload = false;

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "head_image" | "file_upload" if kind.binds(&name) => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    let upload = FileField::Replace(UploadedFile { file_name, bytes });
                    if name == "head_image" {
                        form.head_image = upload;
                    } else {
                        form.file_upload = upload;
                    }
                }
                "head_image-clear" => clear_head_image = true,
                "file_upload-clear" => clear_file_upload = true,
                "tags_str" => {
                    form.tags_str = Some(field.text().await.map_err(multipart_error)?);
                }
                "title" | "hook_text" | "tools" | "content" | "category" if kind.binds(&name) => {
                    let value = field.text().await.map_err(multipart_error)?;
                    match name.as_str() {
                        "title" => form.title = value.trim().to_string(),
                        "hook_text" => form.hook_text = value.trim().to_string(),
                        "tools" => form.tools = value.trim().to_string(),
                        "content" => form.content = value,
                        _ => form.category = value.trim().to_string(),
                    }
                }
                _ => {}
            }
        }

        // A new file wins over the clear checkbox
        if clear_head_image && matches!(form.head_image, FileField::Keep) {
            form.head_image = FileField::Clear;
        }
        if clear_file_upload && matches!(form.file_upload, FileField::Keep) {
            form.file_upload = FileField::Clear;
        }

        Ok(form)
    }

    /// Selected category id; None when left empty or not a number.
    pub fn category_id(&self) -> Option<i64> {
        self.category.parse().ok()
    }

    pub fn validate(&self, conn: &Connection) -> AppResult<FormErrors> {
        let mut errors = FormErrors::default();

        if self.title.is_empty() {
            errors.add("title", REQUIRED);
        } else {
            check_max_len(&mut errors, "title", &self.title, TITLE_MAX);
        }
        if self.kind.binds("hook_text") {
            check_max_len(&mut errors, "hook_text", &self.hook_text, HOOK_TEXT_MAX);
        }
        if self.kind.binds("tools") {
            check_max_len(&mut errors, "tools", &self.tools, TOOLS_MAX);
        }
        if self.content.trim().is_empty() {
            errors.add("content", REQUIRED);
        }

        if !self.category.is_empty() {
            let exists = match self.category_id() {
                Some(id) => conn.query_row(
                    "SELECT COUNT(*) > 0 FROM categories WHERE id = ?1",
                    params![id],
                    |row| row.get::<_, bool>(0),
                )?,
                None => false,
            };
            if !exists {
                errors.add("category", INVALID_CHOICE);
            }
        }

        Ok(errors)
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid form submission: {}", e.body_text()))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub content: String,
}

impl CommentForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        if self.content.trim().is_empty() {
            errors.add("content", REQUIRED);
        }
        errors
    }
}
