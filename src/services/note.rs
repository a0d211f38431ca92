use crate::db::{is_foreign_key_violation, Database};
use crate::error::{AppError, AppResult};
use crate::models::note::{Note, NoteFlag, NoteForm, NotePatch, DEFAULT_NOTE_COLOR};
use crate::models::tag::Tag;
use crate::utils::time::current_timestamp_seconds;

const NOTE_COLUMNS: &str = "id, user_id, title, content, color, pinned, archived, order_position, created_at, updated_at";
const NOTE_ORDERING: &str = "ORDER BY pinned DESC, order_position ASC, updated_at DESC, id ASC";

fn note_not_found() -> AppError {
    AppError::NotFound("Note not found".to_string())
}

/// Escapes LIKE wildcards so the query matches literally.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub struct NoteService<'a> {
    db: &'a Database,
}

impl<'a> NoteService<'a> {
    pub fn new(db: &'a Database) -> Self {
        NoteService { db }
    }

    pub async fn create_note(&self, user_id: i64, form: &NoteForm) -> AppResult<Note> {
        let now = current_timestamp_seconds();
        let color = form
            .color
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_NOTE_COLOR);

        let note = sqlx::query_as::<_, Note>(&format!(
            r#"
            INSERT INTO notes (user_id, title, content, color, pinned, archived, order_position, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            NOTE_COLUMNS
        ))
        .bind(user_id)
        .bind(&form.title)
        .bind(&form.content)
        .bind(color)
        .bind(form.pinned)
        .bind(form.archived)
        .bind(form.order)
        .bind(now)
        .bind(now)
        .fetch_one(&self.db.pool)
        .await
        .map_err(|e| {
            // The owner vanished between authentication and insert
            if is_foreign_key_violation(&e) {
                AppError::NotFound("User not found".to_string())
            } else {
                AppError::from(e)
            }
        })?;

        Ok(note)
    }

    /// Owner-scoped lookup. A note owned by someone else is reported as missing.
    pub async fn get_note_by_id(&self, id: i64, user_id: i64) -> AppResult<Note> {
        let mut note = sqlx::query_as::<_, Note>(&format!(
            "SELECT {} FROM notes WHERE id = $1 AND user_id = $2",
            NOTE_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db.pool)
        .await?
        .ok_or_else(note_not_found)?;

        note.tags = self.get_note_tags(note.id).await?;
        Ok(note)
    }

    pub async fn get_notes_by_user(&self, user_id: i64, include_archived: bool) -> AppResult<Vec<Note>> {
        let archived_filter = if include_archived {
            ""
        } else {
            "AND archived = FALSE"
        };

        let notes = sqlx::query_as::<_, Note>(&format!(
            "SELECT {} FROM notes WHERE user_id = $1 {} {}",
            NOTE_COLUMNS, archived_filter, NOTE_ORDERING
        ))
        .bind(user_id)
        .fetch_all(&self.db.pool)
        .await?;

        self.with_tags(notes).await
    }

    pub async fn search_notes(&self, user_id: i64, query: &str) -> AppResult<Vec<Note>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("Search query is required".to_string()));
        }

        let notes = sqlx::query_as::<_, Note>(&format!(
            r#"
            SELECT {} FROM notes
            WHERE user_id = $1 AND (title LIKE $2 ESCAPE '\' OR content LIKE $2 ESCAPE '\')
            {}
            "#,
            NOTE_COLUMNS, NOTE_ORDERING
        ))
        .bind(user_id)
        .bind(like_pattern(query))
        .fetch_all(&self.db.pool)
        .await?;

        self.with_tags(notes).await
    }

    /// Applies the patch in one parameterized statement; absent fields keep their value.
    pub async fn update_note(&self, id: i64, user_id: i64, patch: &NotePatch) -> AppResult<Note> {
        if patch.is_empty() {
            return self.get_note_by_id(id, user_id).await;
        }

        let result = sqlx::query(
            r#"
            UPDATE notes
            SET title = COALESCE($1, title),
                content = COALESCE($2, content),
                color = COALESCE($3, color),
                pinned = COALESCE($4, pinned),
                archived = COALESCE($5, archived),
                order_position = COALESCE($6, order_position),
                updated_at = $7
            WHERE id = $8 AND user_id = $9
            "#,
        )
        .bind(&patch.title)
        .bind(&patch.content)
        .bind(&patch.color)
        .bind(patch.pinned)
        .bind(patch.archived)
        .bind(patch.order)
        .bind(current_timestamp_seconds())
        .bind(id)
        .bind(user_id)
        .execute(&self.db.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(note_not_found());
        }

        self.get_note_by_id(id, user_id).await
    }

    /// Sets a single boolean attribute. Zero rows affected is NotFound whether
    /// the note is absent or owned by someone else.
    pub async fn set_flag(&self, id: i64, user_id: i64, flag: NoteFlag, value: bool) -> AppResult<Note> {
        let result = sqlx::query(&format!(
            "UPDATE notes SET {} = $1, updated_at = $2 WHERE id = $3 AND user_id = $4",
            flag.column()
        ))
        .bind(value)
        .bind(current_timestamp_seconds())
        .bind(id)
        .bind(user_id)
        .execute(&self.db.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(note_not_found());
        }

        self.get_note_by_id(id, user_id).await
    }

    /// Moves every listed note to its new position in one transaction.
    ///
    /// All-or-nothing: a note that is missing or not owned by `user_id` aborts
    /// the batch with NotFound, and a storage failure aborts it with
    /// TransactionFailed. Nothing is committed in either case.
    pub async fn reorder_notes(
        &self,
        user_id: i64,
        orders: impl IntoIterator<Item = (i64, i64)>,
    ) -> AppResult<()> {
        let mut tx = self
            .db
            .pool
            .begin()
            .await
            .map_err(|e| AppError::TransactionFailed(e.to_string()))?;
        let now = current_timestamp_seconds();

        for (note_id, position) in orders {
            let result = sqlx::query(
                r#"
                UPDATE notes
                SET order_position = $1, updated_at = $2
                WHERE id = $3 AND user_id = $4
                "#,
            )
            .bind(position)
            .bind(now)
            .bind(note_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::TransactionFailed(e.to_string()))?;

            if result.rows_affected() == 0 {
                tracing::debug!("Reorder aborted: note {} not owned by user {}", note_id, user_id);
                // Dropping `tx` rolls back the pairs already applied
                return Err(note_not_found());
            }
        }

        tx.commit()
            .await
            .map_err(|e| AppError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    pub async fn delete_note(&self, id: i64, user_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(note_not_found());
        }

        Ok(())
    }

    /// Tags of a note, lexicographic by name.
    pub async fn get_note_tags(&self, note_id: i64) -> AppResult<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.id, t.name, t.color, t.created_at
            FROM tags t
            JOIN note_tags nt ON t.id = nt.tag_id
            WHERE nt.note_id = $1
            ORDER BY t.name ASC
            "#,
        )
        .bind(note_id)
        .fetch_all(&self.db.pool)
        .await?;

        Ok(tags)
    }

    async fn with_tags(&self, mut notes: Vec<Note>) -> AppResult<Vec<Note>> {
        for note in notes.iter_mut() {
            note.tags = self.get_note_tags(note.id).await?;
        }
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateTagRequest;
    use crate::services::{TagService, UserService};

    struct Fixture {
        db: Database,
        alice: i64,
        bob: i64,
    }

    async fn setup() -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let users = UserService::new(&db);
        let alice = users.register("alice", "alice@example.com", "pw").await.unwrap().id;
        let bob = users.register("bob", "bob@example.com", "pw").await.unwrap().id;
        Fixture { db, alice, bob }
    }

    fn titled(title: &str) -> NoteForm {
        NoteForm {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let f = setup().await;
        let notes = NoteService::new(&f.db);

        let note = notes.create_note(f.alice, &titled("T")).await.unwrap();
        assert_eq!(note.title, "T");
        assert_eq!(note.color, DEFAULT_NOTE_COLOR);
        assert!(!note.pinned);
        assert!(!note.archived);
        assert_eq!(note.order, 0);
        assert!(note.tags.is_empty());

        let colored = notes
            .create_note(
                f.alice,
                &NoteForm {
                    color: Some("#ffeb3b".to_string()),
                    ..titled("C")
                },
            )
            .await
            .unwrap();
        assert_eq!(colored.color, "#ffeb3b");
    }

    #[tokio::test]
    async fn test_other_users_note_is_not_found() {
        let f = setup().await;
        let notes = NoteService::new(&f.db);
        let note = notes.create_note(f.alice, &titled("private")).await.unwrap();

        assert!(matches!(
            notes.get_note_by_id(note.id, f.bob).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            notes
                .update_note(
                    note.id,
                    f.bob,
                    &NotePatch {
                        title: Some("owned".to_string()),
                        ..Default::default()
                    }
                )
                .await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            notes.set_flag(note.id, f.bob, NoteFlag::Pinned, true).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            notes.delete_note(note.id, f.bob).await,
            Err(AppError::NotFound(_))
        ));

        // Same error as a note that never existed
        let missing = notes.get_note_by_id(9999, f.bob).await.unwrap_err();
        let foreign = notes.get_note_by_id(note.id, f.bob).await.unwrap_err();
        assert_eq!(missing.to_string(), foreign.to_string());

        let untouched = notes.get_note_by_id(note.id, f.alice).await.unwrap();
        assert_eq!(untouched.title, "private");
        assert!(!untouched.pinned);
    }

    #[tokio::test]
    async fn test_patch_only_touches_given_fields() {
        let f = setup().await;
        let notes = NoteService::new(&f.db);
        let note = notes
            .create_note(
                f.alice,
                &NoteForm {
                    content: "body".to_string(),
                    ..titled("T")
                },
            )
            .await
            .unwrap();

        let updated = notes
            .update_note(
                note.id,
                f.alice,
                &NotePatch {
                    title: Some("T2".to_string()),
                    archived: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "T2");
        assert_eq!(updated.content, "body");
        assert!(updated.archived);
        assert_eq!(updated.color, DEFAULT_NOTE_COLOR);

        let unchanged = notes
            .update_note(note.id, f.alice, &NotePatch::default())
            .await
            .unwrap();
        assert_eq!(unchanged.title, "T2");
    }

    #[tokio::test]
    async fn test_toggle_flags() {
        let f = setup().await;
        let notes = NoteService::new(&f.db);
        let note = notes.create_note(f.alice, &titled("T")).await.unwrap();

        let pinned = notes.set_flag(note.id, f.alice, NoteFlag::Pinned, true).await.unwrap();
        assert!(pinned.pinned);
        assert!(notes.get_note_by_id(note.id, f.alice).await.unwrap().pinned);

        let archived = notes.set_flag(note.id, f.alice, NoteFlag::Archived, true).await.unwrap();
        assert!(archived.archived);
        assert!(archived.pinned);
    }

    #[tokio::test]
    async fn test_listing_hides_archived_and_orders() {
        let f = setup().await;
        let notes = NoteService::new(&f.db);
        let a = notes.create_note(f.alice, &NoteForm { order: 2, ..titled("a") }).await.unwrap();
        let b = notes.create_note(f.alice, &NoteForm { order: 1, ..titled("b") }).await.unwrap();
        let c = notes.create_note(f.alice, &NoteForm { order: 5, pinned: true, ..titled("c") }).await.unwrap();
        let d = notes.create_note(f.alice, &NoteForm { archived: true, ..titled("d") }).await.unwrap();
        notes.create_note(f.bob, &titled("bob's")).await.unwrap();

        let visible: Vec<i64> = notes
            .get_notes_by_user(f.alice, false)
            .await
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(visible, vec![c.id, b.id, a.id]);

        let all = notes.get_notes_by_user(f.alice, true).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().any(|n| n.id == d.id));
    }

    #[tokio::test]
    async fn test_reorder_applies_all_pairs() {
        let f = setup().await;
        let notes = NoteService::new(&f.db);
        let n1 = notes.create_note(f.alice, &titled("1")).await.unwrap();
        let n2 = notes.create_note(f.alice, &titled("2")).await.unwrap();

        notes.reorder_notes(f.alice, [(n1.id, 1), (n2.id, 0)]).await.unwrap();

        assert_eq!(notes.get_note_by_id(n1.id, f.alice).await.unwrap().order, 1);
        assert_eq!(notes.get_note_by_id(n2.id, f.alice).await.unwrap().order, 0);
    }

    #[tokio::test]
    async fn test_reorder_with_foreign_note_rolls_back_everything() {
        let f = setup().await;
        let notes = NoteService::new(&f.db);
        let n1 = notes.create_note(f.alice, &NoteForm { order: 7, ..titled("mine") }).await.unwrap();
        let n2 = notes.create_note(f.bob, &NoteForm { order: 3, ..titled("theirs") }).await.unwrap();

        let result = notes.reorder_notes(f.alice, [(n1.id, 0), (n2.id, 1)]).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        // n1's update was rolled back, n2 was never touched
        assert_eq!(notes.get_note_by_id(n1.id, f.alice).await.unwrap().order, 7);
        assert_eq!(notes.get_note_by_id(n2.id, f.bob).await.unwrap().order, 3);

        // Unknown ids abort the same way
        let result = notes.reorder_notes(f.alice, [(n1.id, 0), (4242, 1)]).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(notes.get_note_by_id(n1.id, f.alice).await.unwrap().order, 7);
    }

    #[tokio::test]
    async fn test_search_is_owner_scoped_and_literal() {
        let f = setup().await;
        let notes = NoteService::new(&f.db);
        notes.create_note(f.alice, &NoteForm { content: "buy Milk".to_string(), ..titled("groceries") }).await.unwrap();
        notes.create_note(f.alice, &titled("100% done")).await.unwrap();
        notes.create_note(f.alice, &titled("1000 things")).await.unwrap();
        notes.create_note(f.bob, &titled("milk for bob")).await.unwrap();

        let hits = notes.search_notes(f.alice, "milk").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "groceries");

        let hits = notes.search_notes(f.alice, "100%").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "100% done");

        assert!(matches!(
            notes.search_notes(f.alice, "  ").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_tags_are_sorted_by_name() {
        let f = setup().await;
        let notes = NoteService::new(&f.db);
        let tags = TagService::new(&f.db);
        let note = notes.create_note(f.alice, &titled("T")).await.unwrap();

        let mut ids = Vec::new();
        for name in ["zeta", "alpha", "mid"] {
            let tag = tags
                .create_tag(&CreateTagRequest {
                    name: name.to_string(),
                    color: None,
                })
                .await
                .unwrap();
            ids.push(tag.id);
        }
        tags.replace_note_tags(note.id, f.alice, &ids).await.unwrap();

        let names: Vec<String> = notes
            .get_note_by_id(note.id, f.alice)
            .await
            .unwrap()
            .tags
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);

        let listed = notes.get_notes_by_user(f.alice, false).await.unwrap();
        assert_eq!(listed[0].tags.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_note() {
        let f = setup().await;
        let notes = NoteService::new(&f.db);
        let note = notes.create_note(f.alice, &titled("T")).await.unwrap();

        notes.delete_note(note.id, f.alice).await.unwrap();
        assert!(matches!(
            notes.delete_note(note.id, f.alice).await,
            Err(AppError::NotFound(_))
        ));
    }
}
