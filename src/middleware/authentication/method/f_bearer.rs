use crate::middleware::authentication::{admin_token, get_header, mark_admin, AuthMethod};
use actix_web::dev::ServiceRequest;

#[tracing::instrument(name = "Authenticate with bearer token", skip(req))]
pub fn try_bearer(req: &mut ServiceRequest) -> Result<bool, String> {
    let Some(authorization) = get_header::<String>(req, "authorization")? else {
        return Ok(false);
    };

    let Some(token) = authorization.strip_prefix("Bearer ") else {
        return Ok(false);
    };

    if token.trim() != admin_token(req)? {
        tracing::debug!("Bearer token rejected");
        return Ok(false);
    }

    mark_admin(req, AuthMethod::Bearer)?;
    Ok(true)
}
