pub mod auth;
pub mod notes;
pub mod tags;
pub mod users;

use actix_web::web;

/// Everything mounted under `/api`.
pub fn create_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(auth::create_routes)
        .service(web::scope("/notes").configure(notes::create_routes))
        .service(web::scope("/tags").configure(tags::create_routes))
        .service(web::scope("/users").configure(users::create_routes));
}
