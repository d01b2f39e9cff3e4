pub mod auth;
pub mod error;

pub use auth::{Session, User};
pub use error::{AppError, Notice};
