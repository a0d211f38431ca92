use crate::error::AppError;
use crate::models::Claims;
use crate::services::user::{OPERATOR_USERNAME, OPERATOR_USER_ID};
use crate::utils::auth::SESSION_COOKIE;
use crate::AppState;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::Error as ActixError,
    web, HttpMessage, ResponseError,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use serde::Serialize;
use std::rc::Rc;

/// Identity resolved by the gate and attached to the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
}

impl AuthUser {
    pub fn operator() -> Self {
        AuthUser {
            id: OPERATOR_USER_ID,
            username: OPERATOR_USERNAME.to_string(),
            is_admin: true,
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        AuthUser {
            id: claims.user_id,
            username: claims.username,
            is_admin: claims.is_admin,
        }
    }
}

// Extractor for AuthUser from request extensions
impl actix_web::FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &actix_web::HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        let result = req
            .extensions()
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()));

        ready(result)
    }
}

fn resolve_identity(req: &ServiceRequest, require_admin: bool) -> Result<AuthUser, AppError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::InternalServerError("App state not found".to_string()))?;

    let user = if state.config.no_auth_for_user_zero {
        AuthUser::operator()
    } else {
        let token = req
            .cookie(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing session token".to_string()))?;

        AuthUser::from(state.tokens.verify(&token)?)
    };

    if require_admin && !user.is_admin {
        tracing::debug!("User {} denied admin route {}", user.id, req.path());
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    Ok(user)
}

/// RequireUser: a valid session cookie is needed to reach the wrapped service.
pub struct AuthMiddleware;

/// RequireAdmin: RequireUser plus the admin flag; a valid non-admin session gets 403.
pub struct AdminMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type InitError = ();
    type Transform = AccessGateService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessGateService {
            service: Rc::new(service),
            require_admin: false,
        }))
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdminMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type InitError = ();
    type Transform = AccessGateService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessGateService {
            service: Rc::new(service),
            require_admin: true,
        }))
    }
}

pub struct AccessGateService<S> {
    service: Rc<S>,
    require_admin: bool,
}

impl<S, B> Service<ServiceRequest> for AccessGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let require_admin = self.require_admin;

        Box::pin(async move {
            match resolve_identity(&req, require_admin) {
                Ok(user) => {
                    req.extensions_mut().insert(user);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                // Halt here; the wrapped handler never runs
                Err(err) => Ok(req.into_response(err.error_response()).map_into_right_body()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::tests::{test_state, test_state_with};
    use actix_web::{cookie::Cookie, http::StatusCode, test, App, HttpResponse};
    use chrono::Utc;

    async fn whoami(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().json(user)
    }

    macro_rules! gated_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .service(web::scope("/user").wrap(AuthMiddleware).route("", web::get().to(whoami)))
                    .service(web::scope("/admin").wrap(AdminMiddleware).route("", web::get().to(whoami))),
            )
            .await
        };
    }

    fn with_session(uri: &str, token: &str) -> test::TestRequest {
        test::TestRequest::get()
            .uri(uri)
            .cookie(Cookie::new(SESSION_COOKIE, token.to_string()))
    }

    #[actix_web::test]
    async fn test_valid_session_reaches_handler() {
        let state = test_state().await;
        let app = gated_app!(state);
        let token = state.tokens.issue(7, "bob", false).unwrap();

        let resp = test::call_service(&app, with_session("/user", &token).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["id"], 7);
        assert_eq!(body["username"], "bob");
        assert_eq!(body["is_admin"], false);
    }

    #[actix_web::test]
    async fn test_missing_cookie_is_unauthorized_and_cleared() {
        let state = test_state().await;
        let app = gated_app!(state);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/user").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let cleared = resp
            .response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .expect("session cookie cleared");
        assert_eq!(cleared.value(), "");
    }

    #[actix_web::test]
    async fn test_bad_tokens_are_unauthorized() {
        let state = test_state().await;
        let app = gated_app!(state);

        let expired = state
            .tokens
            .issue_at(1, "alice", true, Utc::now().timestamp() - 25 * 3600)
            .unwrap();
        let foreign = crate::services::TokenService::new("another-secret")
            .issue(1, "alice", true)
            .unwrap();

        for token in [expired.as_str(), foreign.as_str(), "garbage"] {
            let resp = test::call_service(&app, with_session("/user", token).to_request()).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[actix_web::test]
    async fn test_admin_gate_distinguishes_forbidden() {
        let state = test_state().await;
        let app = gated_app!(state);
        let member = state.tokens.issue(2, "bob", false).unwrap();
        let admin = state.tokens.issue(1, "alice", true).unwrap();

        let resp = test::call_service(&app, with_session("/admin", &member).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = test::call_service(&app, with_session("/admin", &admin).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/admin").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_no_auth_mode_injects_operator() {
        let state = test_state_with(Config {
            no_auth_for_user_zero: true,
            ..Config::default()
        })
        .await;
        let app = gated_app!(state);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/admin").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["id"], 0);
        assert_eq!(body["is_admin"], true);
    }
}
