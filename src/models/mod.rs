mod deployment;
mod deployment_config;

pub use deployment::*;
pub use deployment_config::*;
