use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;

use super::tag::Tag;

pub const DEFAULT_NOTE_COLOR: &str = "#ffffff";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub color: String,
    pub pinned: bool,
    pub archived: bool,
    #[sqlx(rename = "order_position")]
    pub order: i64,
    #[sqlx(skip)]
    pub tags: Vec<Tag>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct NoteForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub color: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub order: i64,
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub color: Option<String>,
    pub pinned: Option<bool>,
    pub archived: Option<bool>,
    pub order: Option<i64>,
}

impl NotePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.color.is_none()
            && self.pinned.is_none()
            && self.archived.is_none()
            && self.order.is_none()
    }
}

/// Boolean note attributes that can be toggled on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteFlag {
    Pinned,
    Archived,
}

impl NoteFlag {
    pub fn column(self) -> &'static str {
        match self {
            NoteFlag::Pinned => "pinned",
            NoteFlag::Archived => "archived",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TogglePinForm {
    pub pinned: bool,
}

#[derive(Debug, Deserialize)]
pub struct ToggleArchiveForm {
    pub archived: bool,
}

/// `{ "<note id>": <new position>, ... }`
pub type NoteOrderForm = BTreeMap<i64, i64>;

#[derive(Debug, Deserialize)]
pub struct NotesQuery {
    pub archived: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}
