use std::collections::BTreeSet;

use crate::db::{is_foreign_key_violation, is_unique_violation, Database};
use crate::error::{AppError, AppResult};
use crate::models::tag::{CreateTagRequest, Tag, UpdateTagRequest, DEFAULT_TAG_COLOR};
use crate::utils::time::current_timestamp_seconds;

fn tag_not_found() -> AppError {
    AppError::NotFound("Tag not found".to_string())
}

fn map_tag_write_error(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict("Tag name already exists".to_string())
    } else {
        AppError::from(e)
    }
}

/// Tags are global; only the note side of an association is owner-checked.
pub struct TagService<'a> {
    db: &'a Database,
}

impl<'a> TagService<'a> {
    pub fn new(db: &'a Database) -> Self {
        TagService { db }
    }

    pub async fn create_tag(&self, form: &CreateTagRequest) -> AppResult<Tag> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Tag name is required".to_string()));
        }
        let color = form
            .color
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_TAG_COLOR);

        sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (name, color, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, name, color, created_at
            "#,
        )
        .bind(name)
        .bind(color)
        .bind(current_timestamp_seconds())
        .fetch_one(&self.db.pool)
        .await
        .map_err(map_tag_write_error)
    }

    pub async fn list_tags(&self) -> AppResult<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(
            "SELECT id, name, color, created_at FROM tags ORDER BY name ASC",
        )
        .fetch_all(&self.db.pool)
        .await?;

        Ok(tags)
    }

    pub async fn get_tag(&self, id: i64) -> AppResult<Tag> {
        sqlx::query_as::<_, Tag>("SELECT id, name, color, created_at FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?
            .ok_or_else(tag_not_found)
    }

    pub async fn update_tag(&self, id: i64, form: &UpdateTagRequest) -> AppResult<Tag> {
        let name = form.name.as_deref().map(str::trim);
        if name == Some("") {
            return Err(AppError::Validation("Tag name is required".to_string()));
        }

        sqlx::query_as::<_, Tag>(
            r#"
            UPDATE tags
            SET name = COALESCE($1, name),
                color = COALESCE($2, color)
            WHERE id = $3
            RETURNING id, name, color, created_at
            "#,
        )
        .bind(name)
        .bind(&form.color)
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await
        .map_err(map_tag_write_error)?
        .ok_or_else(tag_not_found)
    }

    /// Associations referencing the tag are removed by cascade.
    pub async fn delete_tag(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&self.db.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(tag_not_found());
        }

        Ok(())
    }

    /// Idempotent: assigning a tag twice leaves one association.
    pub async fn assign_tag(&self, note_id: i64, tag_id: i64, user_id: i64) -> AppResult<()> {
        self.ensure_note_owner(note_id, user_id).await?;

        sqlx::query("INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES ($1, $2)")
            .bind(note_id)
            .bind(tag_id)
            .execute(&self.db.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    tag_not_found()
                } else {
                    AppError::from(e)
                }
            })?;

        Ok(())
    }

    pub async fn remove_tag(&self, note_id: i64, tag_id: i64, user_id: i64) -> AppResult<()> {
        self.ensure_note_owner(note_id, user_id).await?;

        let result = sqlx::query("DELETE FROM note_tags WHERE note_id = $1 AND tag_id = $2")
            .bind(note_id)
            .bind(tag_id)
            .execute(&self.db.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Tag is not assigned to this note".to_string()));
        }

        Ok(())
    }

    /// Replaces the full tag set of a note atomically.
    ///
    /// Duplicate ids collapse into one association. An unknown tag id aborts
    /// the whole replacement and the previous set is kept.
    pub async fn replace_note_tags(&self, note_id: i64, user_id: i64, tag_ids: &[i64]) -> AppResult<()> {
        let tag_ids: BTreeSet<i64> = tag_ids.iter().copied().collect();

        let mut tx = self
            .db
            .pool
            .begin()
            .await
            .map_err(|e| AppError::TransactionFailed(e.to_string()))?;

        // The first statement must write: a deferred transaction that reads first
        // cannot later upgrade to a write lock under WAL and fails without waiting.
        sqlx::query(
            r#"
            DELETE FROM note_tags
            WHERE note_id = $1
              AND EXISTS (SELECT 1 FROM notes WHERE id = $1 AND user_id = $2)
            "#,
        )
        .bind(note_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::TransactionFailed(e.to_string()))?;

        let owned: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM notes WHERE id = $1 AND user_id = $2")
                .bind(note_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| AppError::TransactionFailed(e.to_string()))?;
        if owned.is_none() {
            return Err(AppError::NotFound("Note not found".to_string()));
        }

        for tag_id in &tag_ids {
            sqlx::query("INSERT INTO note_tags (note_id, tag_id) VALUES ($1, $2)")
                .bind(note_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_foreign_key_violation(&e) {
                        tag_not_found()
                    } else {
                        AppError::TransactionFailed(e.to_string())
                    }
                })?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::TransactionFailed(e.to_string()))?;

        tracing::debug!("Note {} now has {} tags", note_id, tag_ids.len());
        Ok(())
    }

    async fn ensure_note_owner(&self, note_id: i64, user_id: i64) -> AppResult<()> {
        let owned: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM notes WHERE id = $1 AND user_id = $2")
                .bind(note_id)
                .bind(user_id)
                .fetch_optional(&self.db.pool)
                .await?;

        owned
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("Note not found".to_string()))
    }
}
