pub mod authentication;

pub use authentication::Manager as AdminAuthentication;
