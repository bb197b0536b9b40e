use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::helper::admin_helpers;
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::{admin_db_operations, posts_db_operations};
use crate::models::{CommentStatus, ReportStatus, Role, SubscriberStatus};
use crate::routes::auth::auth_error_response;
use crate::routes::{json_error, not_found, server_error, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::AppState;

pub const DEFAULT_ANALYTICS_DAYS: u32 = 30;

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    days: Option<u32>,
}

#[derive(Deserialize)]
pub struct RoleForm {
    role: Role,
}

#[derive(Deserialize)]
pub struct SubscriberQuery {
    status: Option<SubscriberStatus>,
}

#[derive(Deserialize)]
pub struct CategoryForm {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
pub struct TagForm {
    name: String,
}

#[derive(Deserialize)]
pub struct FeaturedForm {
    featured: bool,
}

#[derive(Deserialize)]
pub struct CommentQuery {
    status: Option<CommentStatus>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Deserialize)]
pub struct CommentStatusForm {
    status: CommentStatus,
}

#[derive(Deserialize)]
pub struct ReportQuery {
    status: Option<ReportStatus>,
}

#[derive(Deserialize)]
pub struct ReportStatusForm {
    status: ReportStatus,
}

pub fn config_admin(cfg: &mut web::ServiceConfig) {
    cfg.route("/analytics", web::get().to(get_analytics))
        .route("/users", web::get().to(list_users))
        .route("/users/{id}/role", web::put().to(set_user_role))
        .route("/users/{id}", web::delete().to(delete_user))
        .route("/subscribers", web::get().to(list_subscribers))
        .route("/subscribers/{id}", web::delete().to(delete_subscriber))
        .route("/categories", web::post().to(create_category))
        .route("/categories/{id}", web::delete().to(delete_category))
        .route("/tags", web::post().to(create_tag))
        .route("/tags/{id}", web::delete().to(delete_tag))
        .route("/posts", web::get().to(list_all_posts))
        .route("/posts/{id}/featured", web::put().to(set_featured))
        .route("/posts/{id}", web::delete().to(delete_post));
}

pub fn config_moderation(cfg: &mut web::ServiceConfig) {
    cfg.route("/comments", web::get().to(list_comments))
        .route("/comments/{id}/status", web::put().to(set_comment_status))
        .route("/comments/{id}", web::delete().to(delete_comment))
        .route("/reports", web::get().to(list_reports))
        .route("/reports/{id}/status", web::put().to(set_report_status));
}

async fn get_analytics(state: web::Data<AppState>, query: web::Query<AnalyticsQuery>) -> impl Responder {
    let days = query.days.unwrap_or(DEFAULT_ANALYTICS_DAYS).clamp(1, 365);
    match state.analytics.dashboard(days) {
        Ok(dashboard) => HttpResponse::Ok().json(dashboard),
        Err(e) => server_error("Failed to compute analytics", e),
    }
}

async fn list_users(state: web::Data<AppState>) -> impl Responder {
    match state.auth.list_users() {
        Ok(users) => HttpResponse::Ok().json(users),
        Err(e) => auth_error_response("Failed to list users", e),
    }
}

async fn set_user_role(
    id: web::Path<i64>,
    state: web::Data<AppState>,
    admin: AuthenticatedUser,
    form: web::Json<RoleForm>,
) -> impl Responder {
    if *id == admin.id && form.role < Role::Admin {
        return json_error(StatusCode::BAD_REQUEST, "Admins cannot demote themselves.");
    }
    match state.auth.set_role(*id, form.role) {
        Ok(user) => HttpResponse::Ok().json(json!({"success": true, "user": user})),
        Err(e) => auth_error_response("Failed to change role", e),
    }
}

async fn delete_user(id: web::Path<i64>, state: web::Data<AppState>, admin: AuthenticatedUser) -> impl Responder {
    if *id == admin.id {
        return json_error(StatusCode::BAD_REQUEST, "Admins cannot delete themselves.");
    }
    match state.auth.delete_user(*id) {
        Ok(()) => {
            state.post_manager.end_session(*id);
            HttpResponse::Ok().json(json!({"success": true}))
        }
        Err(e) => auth_error_response("Failed to delete user", e),
    }
}

async fn list_subscribers(state: web::Data<AppState>, query: web::Query<SubscriberQuery>) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::read_subscribers(&conn, query.status) {
        Ok(subscribers) => HttpResponse::Ok().json(subscribers),
        Err(e) => server_error("Failed to list subscribers", e),
    }
}

async fn delete_subscriber(id: web::Path<i64>, state: web::Data<AppState>) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::delete_subscriber(&conn, *id) {
        Ok(0) => not_found("Subscriber"),
        Ok(_) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => server_error("Failed to delete subscriber", e),
    }
}

async fn create_category(state: web::Data<AppState>, form: web::Json<CategoryForm>) -> impl Responder {
    let name = form.name.trim();
    if name.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Category name is required.");
    }
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::create_category(&conn, name, form.description.trim()) {
        Ok(id) => HttpResponse::Created().json(json!({"success": true, "id": id})),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            json_error(StatusCode::CONFLICT, format!("Category '{}' already exists.", name))
        }
        Err(e) => server_error("Failed to create category", e),
    }
}

async fn delete_category(id: web::Path<i64>, state: web::Data<AppState>) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::delete_category(&conn, *id) {
        Ok(0) => not_found("Category"),
        Ok(_) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => server_error("Failed to delete category", e),
    }
}

async fn create_tag(state: web::Data<AppState>, form: web::Json<TagForm>) -> impl Responder {
    let name = form.name.trim();
    if name.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Tag name is required.");
    }
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::create_tag(&conn, name) {
        Ok(id) => HttpResponse::Created().json(json!({"success": true, "id": id})),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            json_error(StatusCode::CONFLICT, format!("Tag '{}' already exists.", name))
        }
        Err(e) => server_error("Failed to create tag", e),
    }
}

async fn delete_tag(id: web::Path<i64>, state: web::Data<AppState>) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::delete_tag(&conn, *id) {
        Ok(0) => not_found("Tag"),
        Ok(_) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => server_error("Failed to delete tag", e),
    }
}

/// Every post including scheduled and private ones.
async fn list_all_posts(state: web::Data<AppState>) -> impl Responder {
    match posts_db_operations::read_all_post_summaries(&state.posts_db) {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => server_error("Failed to list posts", e),
    }
}

async fn set_featured(
    id: web::Path<String>,
    state: web::Data<AppState>,
    form: web::Json<FeaturedForm>,
) -> impl Responder {
    match posts_db_operations::set_featured(&state.posts_db, &id, form.featured) {
        Ok(true) => HttpResponse::Ok().json(json!({"success": true, "featured": form.featured})),
        Ok(false) => not_found("Post"),
        Err(e) => server_error(&format!("Failed to update featured flag of post '{}'", id), e),
    }
}

async fn delete_post(id: web::Path<String>, state: web::Data<AppState>) -> impl Responder {
    match admin_helpers::delete_published_post(&state, &id) {
        Ok(true) => HttpResponse::Ok().json(json!({"success": true})),
        Ok(false) => not_found("Post"),
        Err(e) => server_error(&format!("Failed to delete post '{}'", id), e),
    }
}

async fn list_comments(state: web::Data<AppState>, query: web::Query<CommentQuery>) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    match admin_db_operations::read_all_comments(&conn, query.status, limit, query.offset.unwrap_or(0)) {
        Ok(comments) => HttpResponse::Ok().json(comments),
        Err(e) => server_error("Failed to list comments", e),
    }
}

async fn set_comment_status(
    id: web::Path<i64>,
    state: web::Data<AppState>,
    form: web::Json<CommentStatusForm>,
) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::update_comment_status(&conn, *id, form.status) {
        Ok(0) => not_found("Comment"),
        Ok(_) => HttpResponse::Ok().json(json!({"success": true, "status": form.status})),
        Err(e) => server_error("Failed to moderate comment", e),
    }
}

async fn delete_comment(id: web::Path<i64>, state: web::Data<AppState>) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::delete_comment(&conn, *id) {
        Ok(0) => not_found("Comment"),
        Ok(_) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => server_error("Failed to delete comment", e),
    }
}

async fn list_reports(state: web::Data<AppState>, query: web::Query<ReportQuery>) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::read_reports(&conn, query.status) {
        Ok(reports) => HttpResponse::Ok().json(reports),
        Err(e) => server_error("Failed to list reports", e),
    }
}

async fn set_report_status(
    id: web::Path<i64>,
    state: web::Data<AppState>,
    form: web::Json<ReportStatusForm>,
) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::update_report_status(&conn, *id, form.status) {
        Ok(0) => not_found("Report"),
        Ok(_) => HttpResponse::Ok().json(json!({"success": true, "status": form.status})),
        Err(e) => server_error("Failed to update report", e),
    }
}
