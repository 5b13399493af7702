/// Middleware module

mod authentication;

pub use authentication::AuthenticationMiddleware;
