use actix_session::{Session, SessionExt, SessionInsertError};
use actix_web::{
    body::EitherBody,
    dev::{self, forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpRequest, HttpResponse,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use serde::Serialize;
use serde_json::json;
use std::future::{ready, Ready as StdReady};
use std::rc::Rc;

use crate::models::{Role, User};

pub const SESSION_USER_ID: &str = "user_id";
pub const SESSION_USERNAME: &str = "username";
pub const SESSION_ROLE: &str = "role";
pub const SESSION_LANGUAGE: &str = "language";

/// Stores the logged-in user in the session cookie.
pub fn start_session(session: &Session, user: &User) -> Result<(), SessionInsertError> {
    session.renew();
    session.insert(SESSION_USER_ID, user.id)?;
    session.insert(SESSION_USERNAME, &user.username)?;
    session.insert(SESSION_ROLE, user.role.as_str())?;
    Ok(())
}

/// Clears the login but keeps the chosen language.
pub fn end_session(session: &Session) {
    let language = session.get::<String>(SESSION_LANGUAGE).unwrap_or(None);
    session.purge();
    if let Some(language) = language {
        if let Err(e) = session.insert(SESSION_LANGUAGE, language) {
            log::error!("Failed to keep language in session after logout: {}", e);
        }
    }
}

fn session_user(session: &Session) -> Option<AuthenticatedUser> {
    let id = session.get::<i64>(SESSION_USER_ID).ok()??;
    let username = session.get::<String>(SESSION_USERNAME).ok()??;
    let role = session.get::<String>(SESSION_ROLE).ok()??.parse::<Role>().ok()?;
    Some(AuthenticatedUser { id, username, role })
}

/// The user attached to the request's session. Rejects with 401 when absent;
/// take `Option<AuthenticatedUser>` for routes open to anonymous readers.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_at_least(&self, role: Role) -> bool {
        self.role >= role
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        match session_user(&req.get_session()) {
            Some(user) => ready(Ok(user)),
            None => ready(Err(actix_web::error::InternalError::from_response(
                "Not logged in.",
                HttpResponse::Unauthorized().json(json!({"success": false, "error": "Not logged in."})),
            ).into())),
        }
    }
}

/// Only lets requests through whose session role is at least `min_role`.
pub struct RequireRole {
    min_role: Role,
}

impl RequireRole {
    pub fn new(min_role: Role) -> Self {
        RequireRole { min_role }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireRoleMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequireRoleMiddleware { service: Rc::new(service), min_role: self.min_role })
    }
}

pub struct RequireRoleMiddleware<S> {
    service: Rc<S>,
    min_role: Role,
}

impl<S, B> Service<ServiceRequest> for RequireRoleMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let rejection = match session_user(&req.get_session()) {
            Some(user) if user.is_at_least(self.min_role) => None,
            Some(user) => {
                log::warn!("User '{}' ({}) denied access to {}.", user.username, user.role, req.path());
                Some(HttpResponse::Forbidden().json(json!({"success": false, "error": "Insufficient permissions."})))
            }
            None => Some(HttpResponse::Unauthorized().json(json!({"success": false, "error": "Not logged in."}))),
        };

        match rejection {
            None => {
                let fut = self.service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res.map_into_left_body())
                })
            }
            Some(response) => Box::pin(async move {
                let (http_req, _payload) = req.into_parts();
                Ok(ServiceResponse::new(http_req, response.map_into_right_body()))
            }),
        }
    }
}
