use actix_web::{http::StatusCode, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::fmt::Display;

use crate::middleware::RequireRole;
use crate::models::Role;

pub mod admin;
pub mod auth;
pub mod editor;
pub mod public;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Deserialize)]
pub struct Pagination {
    limit: Option<u32>,
    offset: Option<u32>,
}

impl Pagination {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// Every endpoint lives under `/api`.
pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::scope("/admin")
                    .wrap(RequireRole::new(Role::Admin))
                    .configure(admin::config_admin),
            )
            .service(
                web::scope("/moderation")
                    .wrap(RequireRole::new(Role::Moderator))
                    .configure(admin::config_moderation),
            )
            .service(web::scope("/editor").configure(editor::config_editor))
            .configure(auth::config_auth)
            .configure(public::config_api),
    );
}

pub fn json_error(status: StatusCode, message: impl Display) -> HttpResponse {
    HttpResponse::build(status).json(json!({"success": false, "error": message.to_string()}))
}

/// Logs the cause and answers with a generic 500.
pub fn server_error(context: &str, e: impl Display) -> HttpResponse {
    log::error!("{}: {}", context, e);
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
}

pub fn not_found(what: &str) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, format!("{} not found.", what))
}
