#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub hook_text: String,
    pub tools: String,
    pub content: String,
    pub head_image: Option<String>,
    pub file_upload: Option<String>,
    pub author_id: String,
    pub category_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: String,
    pub content: String,
    pub created_at: String,
    pub modified_at: String,
}
