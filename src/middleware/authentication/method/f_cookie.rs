use crate::middleware::authentication::{admin_token, get_header, mark_admin, AuthMethod};
use actix_web::dev::ServiceRequest;

pub const ADMIN_COOKIE: &str = "admin_token";

#[tracing::instrument(name = "Authenticate with cookie", skip(req))]
pub fn try_cookie(req: &mut ServiceRequest) -> Result<bool, String> {
    let Some(cookies) = get_header::<String>(req, "cookie")? else {
        return Ok(false);
    };

    let token = cookies.split(';').find_map(|cookie| {
        let (name, value) = cookie.trim().split_once('=')?;
        (name == ADMIN_COOKIE).then(|| value.to_string())
    });

    let Some(token) = token else {
        return Ok(false);
    };

    if token != admin_token(req)? {
        tracing::debug!("Admin cookie rejected");
        return Ok(false);
    }

    mark_admin(req, AuthMethod::Cookie)?;
    Ok(true)
}
