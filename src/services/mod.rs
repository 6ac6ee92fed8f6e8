pub mod user_service;

pub use user_service::{ErrorKind, ServiceError, UserFilter, UserPage, UserService};
