use actix_web::{web, HttpResponse};
use validator::Validate;

use crate::{
    error::AppResult,
    middleware::AuthMiddleware,
    models::{CreateTagRequest, UpdateTagRequest},
    services::TagService,
    AppState,
};

pub fn create_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .wrap(AuthMiddleware)
            .route(web::get().to(get_tags))
            .route(web::post().to(create_tag)),
    )
    .service(
        web::resource("/{id}")
            .wrap(AuthMiddleware)
            .route(web::put().to(update_tag_by_id))
            .route(web::delete().to(delete_tag_by_id)),
    );
}

async fn get_tags(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let tags = TagService::new(&state.db).list_tags().await?;
    Ok(HttpResponse::Ok().json(tags))
}

async fn create_tag(
    state: web::Data<AppState>,
    form: web::Json<CreateTagRequest>,
) -> AppResult<HttpResponse> {
    form.validate()?;

    let tag = TagService::new(&state.db).create_tag(&form).await?;
    Ok(HttpResponse::Created().json(tag))
}

async fn update_tag_by_id(
    state: web::Data<AppState>,
    id: web::Path<i64>,
    form: web::Json<UpdateTagRequest>,
) -> AppResult<HttpResponse> {
    form.validate()?;

    let tag = TagService::new(&state.db)
        .update_tag(id.into_inner(), &form)
        .await?;
    Ok(HttpResponse::Ok().json(tag))
}

async fn delete_tag_by_id(
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> AppResult<HttpResponse> {
    TagService::new(&state.db).delete_tag(id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
