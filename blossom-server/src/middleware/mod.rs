mod auth;

pub use auth::{AuthHeader, authorize};
