use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::helper::admin_helpers;
use crate::middleware::AuthenticatedUser;
use crate::models::DraftInput;
use crate::routes::{json_error, not_found, server_error};
use crate::services::post_management::DraftError;
use crate::AppState;

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PublishForm {
    scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct AutosaveForm {
    enabled: bool,
}

pub fn config_editor(cfg: &mut web::ServiceConfig) {
    cfg.route("/drafts", web::get().to(list_drafts))
        .route("/drafts", web::post().to(save_draft))
        .route("/drafts/{id}", web::get().to(load_draft))
        .route("/drafts/{id}", web::delete().to(delete_draft))
        .route("/drafts/{id}/publish", web::post().to(publish_draft))
        .route("/current", web::get().to(get_current))
        .route("/current", web::put().to(update_current))
        .route("/current", web::delete().to(new_draft))
        .route("/autosave", web::put().to(set_autosave));
}

fn draft_error_response(context: &str, e: DraftError) -> HttpResponse {
    match e {
        DraftError::NotFound(_) => json_error(StatusCode::NOT_FOUND, e),
        DraftError::Storage(_) => server_error(context, e),
    }
}

async fn list_drafts(state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    match state.post_manager.list_drafts(user.id) {
        Ok(drafts) => HttpResponse::Ok().json(drafts),
        Err(e) => draft_error_response("Failed to list drafts", e),
    }
}

async fn save_draft(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    form: web::Json<DraftInput>,
) -> impl Responder {
    match state.post_manager.save_draft(user.id, &form) {
        Ok(id) => HttpResponse::Ok().json(json!({
            "success": true,
            "id": id,
            "draft": state.post_manager.current_draft(user.id),
        })),
        Err(e) => draft_error_response("Failed to save draft", e),
    }
}

async fn load_draft(id: web::Path<String>, state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    match state.post_manager.load_draft(user.id, &id) {
        Ok(Some(draft)) => HttpResponse::Ok().json(draft),
        Ok(None) => not_found("Draft"),
        Err(e) => draft_error_response("Failed to load draft", e),
    }
}

async fn delete_draft(id: web::Path<String>, state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    match state.post_manager.delete_draft(user.id, &id) {
        Ok(true) => HttpResponse::Ok().json(json!({"success": true})),
        Ok(false) => not_found("Draft"),
        Err(e) => draft_error_response("Failed to delete draft", e),
    }
}

async fn publish_draft(
    id: web::Path<String>,
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    form: Option<web::Json<PublishForm>>,
) -> impl Responder {
    let author = match state.auth.current_user(user.id) {
        Ok(Some(me)) => me.as_author(),
        Ok(None) => return not_found("User"),
        Err(e) => return server_error("Failed to load author", e),
    };
    let scheduled_at = form.and_then(|f| f.into_inner().scheduled_at);

    match state.post_manager.publish_post(&author, &id, scheduled_at) {
        Ok(post) => {
            admin_helpers::record_publication(&state, &post);
            HttpResponse::Created().json(json!({"success": true, "post": post}))
        }
        Err(e) => draft_error_response("Failed to publish draft", e),
    }
}

async fn get_current(state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    HttpResponse::Ok().json(state.post_manager.session(user.id))
}

async fn update_current(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    form: web::Json<DraftInput>,
) -> impl Responder {
    HttpResponse::Ok().json(state.post_manager.update_editor(user.id, &form))
}

async fn new_draft(state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    HttpResponse::Ok().json(state.post_manager.new_draft(user.id))
}

async fn set_autosave(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    form: web::Json<AutosaveForm>,
) -> impl Responder {
    HttpResponse::Ok().json(state.post_manager.set_autosave(user.id, form.enabled))
}
