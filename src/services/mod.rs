pub mod note;
pub mod tag;
pub mod token;
pub mod user;

pub use note::NoteService;
pub use tag::TagService;
pub use token::TokenService;
pub use user::UserService;
