pub mod auth;
pub mod note;
pub mod tag;
pub mod user;

pub use auth::*;
pub use note::*;
pub use tag::*;
pub use user::*;
