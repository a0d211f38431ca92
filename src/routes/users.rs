use actix_web::{web, HttpResponse};

use crate::{
    error::AppResult,
    middleware::{AdminMiddleware, AuthUser},
    services::UserService,
    AppState,
};

pub fn create_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .wrap(AdminMiddleware)
            .route(web::get().to(get_users)),
    )
    .service(
        web::resource("/{id}")
            .wrap(AdminMiddleware)
            .route(web::delete().to(delete_user_by_id)),
    );
}

/// GET / - All users, without password digests
async fn get_users(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let users = UserService::new(&state.db).list_users().await?;
    Ok(HttpResponse::Ok().json(users))
}

/// DELETE /{id} - Notes and their tag links go with the user
async fn delete_user_by_id(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    id: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = id.into_inner();
    UserService::new(&state.db).delete_user(id).await?;
    tracing::info!("Admin {} deleted user {}", auth_user.id, id);

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use crate::tests::{init_app, session_for, test_state};
    use actix_web::{http::StatusCode, test};
    use serde_json::Value;

    #[actix_web::test]
    async fn test_listing_is_admin_only_and_digest_free() {
        let state = test_state().await;
        let app = init_app!(state);
        let admin = session_for(&state, "admin").await;
        let member = session_for(&state, "member").await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/users").cookie(member).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/users").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let users: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/api/users").cookie(admin).to_request(),
        )
        .await;
        let users = users.as_array().unwrap();
        assert_eq!(users.len(), 2);
        for user in users {
            assert!(user.get("password_hash").is_none());
            assert!(user.get("password").is_none());
        }
    }

    #[actix_web::test]
    async fn test_delete_user_then_404() {
        let state = test_state().await;
        let app = init_app!(state);
        let admin = session_for(&state, "admin").await;
        let _member = session_for(&state, "member").await;
        let member_id = crate::services::UserService::new(&state.db)
            .get_user_by_username("member")
            .await
            .unwrap()
            .unwrap()
            .id;

        let delete = || {
            test::TestRequest::delete()
                .uri(&format!("/api/users/{}", member_id))
                .cookie(admin.clone())
                .to_request()
        };

        assert_eq!(test::call_service(&app, delete()).await.status(), StatusCode::NO_CONTENT);
        assert_eq!(test::call_service(&app, delete()).await.status(), StatusCode::NOT_FOUND);
    }
}
