pub mod deployment;
pub mod deployment_history;
pub mod health_checks;

pub use health_checks::*;
