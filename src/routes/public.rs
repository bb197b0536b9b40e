use actix_session::Session;
use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::helper::public_helpers;
use crate::middleware::{AuthenticatedUser, SESSION_LANGUAGE};
use crate::models::db_operations::admin_db_operations;
use crate::models::{CommentStatus, ReactionKind, ReportTarget};
use crate::routes::{json_error, not_found, server_error, Pagination};
use crate::services::i18n::{self, Language};
use crate::AppState;

#[derive(Deserialize)]
pub struct CommentForm {
    content: String,
}

#[derive(Deserialize)]
pub struct SubscribeForm {
    email: String,
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportForm {
    content_type: ReportTarget,
    content_id: String,
    reason: String,
}

#[derive(Deserialize)]
pub struct LanguageForm {
    language: String,
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/is_server_active", web::get().to(is_server_active))
        .route("/posts/latest", web::get().to(get_latest_posts))
        .route("/posts/featured", web::get().to(get_featured_posts))
        .route("/posts/tag/{tag}", web::get().to(get_posts_by_tag))
        .route("/posts/category/{category}", web::get().to(get_posts_by_category))
        .route("/posts/{id}", web::get().to(get_post_by_id))
        .route("/posts/{id}/like", web::post().to(toggle_like))
        .route("/posts/{id}/bookmark", web::post().to(toggle_bookmark))
        .route("/posts/{id}/comments", web::get().to(get_comments))
        .route("/posts/{id}/comments", web::post().to(add_comment))
        .route("/categories", web::get().to(get_categories))
        .route("/tags", web::get().to(get_tags))
        .route("/subscribe", web::post().to(subscribe))
        .route("/unsubscribe", web::post().to(unsubscribe))
        .route("/report", web::post().to(report_content))
        .route("/i18n/{lang}", web::get().to(get_dictionary))
        .route("/language", web::get().to(get_language))
        .route("/language", web::post().to(set_language));
}

async fn is_server_active() -> impl Responder {
    HttpResponse::Ok().body("active")
}

fn viewer_id(user: &Option<AuthenticatedUser>) -> Option<i64> {
    user.as_ref().map(|u| u.id)
}

async fn get_post_by_id(
    id: web::Path<String>,
    state: web::Data<AppState>,
    user: Option<AuthenticatedUser>,
) -> impl Responder {
    match public_helpers::fetch_post(&state, &id, viewer_id(&user)) {
        Ok(Some(post)) => HttpResponse::Ok().json(post),
        Ok(None) => not_found("Post"),
        Err(e) => server_error(&format!("Failed to fetch post '{}'", id), e),
    }
}

async fn get_latest_posts(
    state: web::Data<AppState>,
    query: web::Query<Pagination>,
    user: Option<AuthenticatedUser>,
) -> impl Responder {
    match public_helpers::fetch_latest_posts(&state, viewer_id(&user), query.limit(), query.offset()) {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => server_error("Failed to fetch latest posts", e),
    }
}

async fn get_featured_posts(
    state: web::Data<AppState>,
    query: web::Query<Pagination>,
    user: Option<AuthenticatedUser>,
) -> impl Responder {
    match public_helpers::fetch_featured_posts(&state, viewer_id(&user), query.limit()) {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => server_error("Failed to fetch featured posts", e),
    }
}

async fn get_posts_by_tag(
    tag: web::Path<String>,
    state: web::Data<AppState>,
    query: web::Query<Pagination>,
    user: Option<AuthenticatedUser>,
) -> impl Responder {
    let tag_value = tag.into_inner();
    match public_helpers::fetch_posts_by_tag(&state, &tag_value, viewer_id(&user), query.limit(), query.offset()) {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => server_error(&format!("Failed to fetch posts by tag '{}'", tag_value), e),
    }
}

async fn get_posts_by_category(
    category: web::Path<String>,
    state: web::Data<AppState>,
    query: web::Query<Pagination>,
    user: Option<AuthenticatedUser>,
) -> impl Responder {
    let category_value = category.into_inner();
    match public_helpers::fetch_posts_by_category(&state, &category_value, viewer_id(&user), query.limit(), query.offset()) {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => server_error(&format!("Failed to fetch posts by category '{}'", category_value), e),
    }
}

fn reaction_response(state: &AppState, post_id: &str, user: &AuthenticatedUser, kind: ReactionKind) -> HttpResponse {
    match public_helpers::toggle_reaction(state, post_id, user.id, &user.username, kind) {
        Ok(Some(post)) => HttpResponse::Ok().json(json!({"success": true, "post": post})),
        Ok(None) => not_found("Post"),
        Err(e) => server_error(&format!("Failed to toggle {} on post '{}'", kind, post_id), e),
    }
}

async fn toggle_like(id: web::Path<String>, state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    reaction_response(&state, &id, &user, ReactionKind::Like)
}

async fn toggle_bookmark(id: web::Path<String>, state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    reaction_response(&state, &id, &user, ReactionKind::Bookmark)
}

async fn get_comments(id: web::Path<String>, state: web::Data<AppState>) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::read_comments_for_post(&conn, &id, Some(CommentStatus::Approved)) {
        Ok(comments) => HttpResponse::Ok().json(comments),
        Err(e) => server_error(&format!("Failed to fetch comments for post '{}'", id), e),
    }
}

async fn add_comment(
    id: web::Path<String>,
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    form: web::Json<CommentForm>,
) -> impl Responder {
    if form.content.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Comment cannot be empty.");
    }
    match public_helpers::add_comment(&state, &id, user.id, &user.username, &form.content) {
        Ok(Some(comment)) => HttpResponse::Created().json(json!({"success": true, "comment": comment})),
        Ok(None) => not_found("Post"),
        Err(e) => server_error(&format!("Failed to add comment to post '{}'", id), e),
    }
}

async fn get_categories(state: web::Data<AppState>) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::read_categories(&conn) {
        Ok(categories) => HttpResponse::Ok().json(categories),
        Err(e) => server_error("Failed to fetch categories", e),
    }
}

async fn get_tags(state: web::Data<AppState>) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::read_tags(&conn) {
        Ok(tags) => HttpResponse::Ok().json(tags),
        Err(e) => server_error("Failed to fetch tags", e),
    }
}

async fn subscribe(state: web::Data<AppState>, form: web::Json<SubscribeForm>) -> impl Responder {
    let email = form.email.trim();
    if !email.contains('@') {
        return json_error(StatusCode::BAD_REQUEST, "A valid email is required.");
    }
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    let name = form.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    match admin_db_operations::subscribe(&conn, email, name, state.clock.now()) {
        Ok(()) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => server_error("Failed to subscribe", e),
    }
}

async fn unsubscribe(state: web::Data<AppState>, form: web::Json<SubscribeForm>) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::unsubscribe(&conn, form.email.trim()) {
        Ok(0) => not_found("Subscriber"),
        Ok(_) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => server_error("Failed to unsubscribe", e),
    }
}

async fn report_content(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    form: web::Json<ReportForm>,
) -> impl Responder {
    if form.reason.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "A reason is required.");
    }
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    let reason = crate::helper::sanitization_helpers::strip_all_html(form.reason.trim());
    match admin_db_operations::create_report(&conn, form.content_type, &form.content_id, &reason, user.id, state.clock.now()) {
        Ok(id) => HttpResponse::Created().json(json!({"success": true, "id": id})),
        Err(e) => server_error("Failed to create report", e),
    }
}

async fn get_dictionary(lang: web::Path<String>) -> impl Responder {
    match Language::parse(&lang) {
        Some(language) => HttpResponse::Ok().json(json!({
            "language": language,
            "messages": i18n::dictionary(language),
        })),
        None => json_error(StatusCode::NOT_FOUND, format!("Unsupported language: '{}'", lang)),
    }
}

/// Session choice first, then the user's saved preference, then the server default.
pub fn resolve_language(session: &Session, state: &AppState, user: Option<&AuthenticatedUser>) -> Language {
    if let Some(language) = session.get::<String>(SESSION_LANGUAGE).unwrap_or(None).and_then(|l| Language::parse(&l)) {
        return language;
    }
    user.and_then(|u| state.auth.language_preference(u.id).ok().flatten())
        .and_then(|l| Language::parse(&l))
        .unwrap_or(state.default_language)
}

async fn get_language(session: Session, state: web::Data<AppState>, user: Option<AuthenticatedUser>) -> impl Responder {
    HttpResponse::Ok().json(json!({"language": resolve_language(&session, &state, user.as_ref())}))
}

async fn set_language(
    session: Session,
    state: web::Data<AppState>,
    user: Option<AuthenticatedUser>,
    form: web::Json<LanguageForm>,
) -> impl Responder {
    let Some(language) = Language::parse(&form.language) else {
        return json_error(StatusCode::BAD_REQUEST, format!("Unsupported language: '{}'", form.language));
    };
    if let Err(e) = session.insert(SESSION_LANGUAGE, language.code()) {
        return server_error("Failed to store language in session", e);
    }
    if let Some(user) = user {
        if let Err(e) = state.auth.save_language_preference(user.id, language.code()) {
            log::error!("Failed to save language preference for user {}: {}", user.id, e);
        }
    }
    HttpResponse::Ok().json(json!({"success": true, "language": language}))
}
