use actix_web::{web, HttpResponse};

use crate::{
    error::AppResult,
    middleware::{AuthMiddleware, AuthUser},
    models::{
        NoteFlag, NoteForm, NoteOrderForm, NotePatch, NotesQuery, SearchQuery,
        SetNoteTagsRequest, ToggleArchiveForm, TogglePinForm,
    },
    services::{NoteService, TagService},
    AppState,
};

// Literal segments are registered before `/{id}` so they are not captured as ids.
pub fn create_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .wrap(AuthMiddleware)
            .route(web::get().to(get_notes))
            .route(web::post().to(create_note)),
    )
    .service(
        web::resource("/search")
            .wrap(AuthMiddleware)
            .route(web::get().to(search_notes)),
    )
    .service(
        web::resource("/order")
            .wrap(AuthMiddleware)
            .route(web::put().to(reorder_notes)),
    )
    .service(
        web::resource("/{id}")
            .wrap(AuthMiddleware)
            .route(web::get().to(get_note_by_id))
            .route(web::put().to(update_note_by_id))
            .route(web::delete().to(delete_note_by_id)),
    )
    .service(
        web::resource("/{id}/pin")
            .wrap(AuthMiddleware)
            .route(web::patch().to(toggle_pin)),
    )
    .service(
        web::resource("/{id}/archive")
            .wrap(AuthMiddleware)
            .route(web::patch().to(toggle_archive)),
    )
    .service(
        web::resource("/{id}/tags")
            .wrap(AuthMiddleware)
            .route(web::put().to(set_note_tags)),
    )
    .service(
        web::resource("/{note_id}/tags/{tag_id}")
            .wrap(AuthMiddleware)
            .route(web::post().to(assign_tag))
            .route(web::delete().to(remove_tag)),
    );
}

/// GET / - Notes of the caller, archived ones only with `?archived=true`
async fn get_notes(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<NotesQuery>,
) -> AppResult<HttpResponse> {
    let notes = NoteService::new(&state.db)
        .get_notes_by_user(auth_user.id, query.archived.unwrap_or(false))
        .await?;

    Ok(HttpResponse::Ok().json(notes))
}

/// GET /search?q=
async fn search_notes(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<SearchQuery>,
) -> AppResult<HttpResponse> {
    let q = query.q.as_deref().unwrap_or_default();
    let notes = NoteService::new(&state.db).search_notes(auth_user.id, q).await?;

    Ok(HttpResponse::Ok().json(notes))
}

/// POST / - Create note
async fn create_note(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    form: web::Json<NoteForm>,
) -> AppResult<HttpResponse> {
    let note = NoteService::new(&state.db)
        .create_note(auth_user.id, &form)
        .await?;

    Ok(HttpResponse::Created().json(note))
}

/// PUT /order - `{ "<id>": position, ... }`, applied all-or-nothing. `{}` is a no-op.
async fn reorder_notes(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    form: web::Json<NoteOrderForm>,
) -> AppResult<HttpResponse> {
    let orders = form.into_inner();
    if !orders.is_empty() {
        NoteService::new(&state.db)
            .reorder_notes(auth_user.id, orders)
            .await?;
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": true })))
}

/// GET /{id}
async fn get_note_by_id(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    id: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let note = NoteService::new(&state.db)
        .get_note_by_id(id.into_inner(), auth_user.id)
        .await?;

    Ok(HttpResponse::Ok().json(note))
}

/// PUT /{id}
async fn update_note_by_id(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    id: web::Path<i64>,
    form: web::Json<NotePatch>,
) -> AppResult<HttpResponse> {
    let note = NoteService::new(&state.db)
        .update_note(id.into_inner(), auth_user.id, &form)
        .await?;

    Ok(HttpResponse::Ok().json(note))
}

/// DELETE /{id}
async fn delete_note_by_id(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    id: web::Path<i64>,
) -> AppResult<HttpResponse> {
    NoteService::new(&state.db)
        .delete_note(id.into_inner(), auth_user.id)
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

/// PATCH /{id}/pin
async fn toggle_pin(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    id: web::Path<i64>,
    form: web::Json<TogglePinForm>,
) -> AppResult<HttpResponse> {
    let note = NoteService::new(&state.db)
        .set_flag(id.into_inner(), auth_user.id, NoteFlag::Pinned, form.pinned)
        .await?;

    Ok(HttpResponse::Ok().json(note))
}

/// PATCH /{id}/archive
async fn toggle_archive(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    id: web::Path<i64>,
    form: web::Json<ToggleArchiveForm>,
) -> AppResult<HttpResponse> {
    let note = NoteService::new(&state.db)
        .set_flag(id.into_inner(), auth_user.id, NoteFlag::Archived, form.archived)
        .await?;

    Ok(HttpResponse::Ok().json(note))
}

/// PUT /{id}/tags - Replace the whole tag set
async fn set_note_tags(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    id: web::Path<i64>,
    form: web::Json<SetNoteTagsRequest>,
) -> AppResult<HttpResponse> {
    TagService::new(&state.db)
        .replace_note_tags(id.into_inner(), auth_user.id, &form.tag_ids)
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

async fn assign_tag(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<(i64, i64)>,
) -> AppResult<HttpResponse> {
    let (note_id, tag_id) = path.into_inner();
    TagService::new(&state.db)
        .assign_tag(note_id, tag_id, auth_user.id)
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

async fn remove_tag(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<(i64, i64)>,
) -> AppResult<HttpResponse> {
    let (note_id, tag_id) = path.into_inner();
    TagService::new(&state.db)
        .remove_tag(note_id, tag_id, auth_user.id)
        .await?;

    Ok(HttpResponse::NoContent().finish())
}
