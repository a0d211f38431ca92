use actix_web::{web, HttpResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppResult,
    middleware::{AuthMiddleware, AuthUser},
    models::{SigninRequest, SignupRequest, User, UserResponse},
    services::UserService,
    utils::auth::{clear_session_cookie, session_cookie},
    AppState,
};

pub fn create_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/register").route(web::post().to(register)))
        .service(web::resource("/login").route(web::post().to(login)))
        .service(web::resource("/logout").route(web::post().to(logout)))
        .service(
            web::resource("/auth/check")
                .wrap(AuthMiddleware)
                .route(web::get().to(check_auth)),
        );
}

/// Issues a token for `user` and returns it as JSON with the session cookie set.
fn signed_in(state: &AppState, user: User) -> AppResult<HttpResponse> {
    let token = state.tokens.issue(user.id, &user.username, user.is_admin)?;
    let cookie = session_cookie(token, state.tokens.lifetime_secs(), state.config.cookie_secure);

    Ok(HttpResponse::Ok()
        .cookie(cookie)
        .json(UserResponse::from(user)))
}

/// POST /register
async fn register(
    state: web::Data<AppState>,
    form: web::Json<SignupRequest>,
) -> AppResult<HttpResponse> {
    form.validate()?;

    let user = UserService::new(&state.db)
        .register(&form.username, &form.email, &form.password)
        .await?;
    tracing::info!("Registered user {} ({})", user.id, user.username);

    signed_in(&state, user)
}

/// POST /login
async fn login(
    state: web::Data<AppState>,
    form: web::Json<SigninRequest>,
) -> AppResult<HttpResponse> {
    form.validate()?;

    let user = UserService::new(&state.db)
        .authenticate(&form.username, &form.password)
        .await?;

    signed_in(&state, user)
}

/// POST /logout
async fn logout() -> HttpResponse {
    HttpResponse::Ok()
        .cookie(clear_session_cookie())
        .json(json!({ "message": "Logged out successfully" }))
}

/// GET /auth/check
async fn check_auth(state: web::Data<AppState>, auth_user: AuthUser) -> AppResult<HttpResponse> {
    let user = UserService::new(&state.db).get_user_by_id(auth_user.id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}
