mod getheader;
mod manager;
mod manager_middleware;
pub mod method;

pub use getheader::*;
pub use manager::*;
pub use manager_middleware::*;

use crate::configuration::Settings;
use actix_web::{dev::ServiceRequest, web, HttpMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Bearer,
    Cookie,
}

/// Request extension set once the caller proved it holds the admin token.
#[derive(Debug, Clone, Copy)]
pub struct AdminIdentity {
    pub method: AuthMethod,
}

fn admin_token(req: &ServiceRequest) -> Result<String, String> {
    let settings = req
        .app_data::<web::Data<Settings>>()
        .ok_or_else(|| "settings are not registered".to_string())?;
    if settings.auth.admin_token.is_empty() {
        return Err("admin token is not configured".to_string());
    }
    Ok(settings.auth.admin_token.clone())
}

fn mark_admin(req: &mut ServiceRequest, method: AuthMethod) -> Result<(), String> {
    if req
        .extensions_mut()
        .insert(AdminIdentity { method })
        .is_some()
    {
        return Err("admin already authenticated".to_string());
    }
    Ok(())
}
