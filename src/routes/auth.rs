use actix_session::Session;
use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::helper::public_helpers;
use crate::middleware::{self, AuthenticatedUser, SESSION_LANGUAGE};
use crate::models::db_operations::admin_db_operations;
use crate::models::{NotificationKind, User};
use crate::routes::{json_error, not_found, server_error, Pagination};
use crate::services::auth::{AuthError, ProfileChanges, SignupRequest};
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordForm {
    current_password: String,
    new_password: String,
}

#[derive(Deserialize)]
pub struct NotificationQuery {
    unread: Option<bool>,
}

pub fn config_auth(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/signup", web::post().to(signup))
        .route("/auth/login", web::post().to(login))
        .route("/auth/logout", web::post().to(logout))
        .route("/auth/me", web::get().to(get_me))
        .route("/auth/me", web::put().to(update_me))
        .route("/auth/password", web::put().to(change_password))
        .route("/users/{username}", web::get().to(get_user_profile))
        .route("/users/{username}/posts", web::get().to(get_user_posts))
        .route("/users/{username}/follow", web::post().to(follow_user))
        .route("/users/{username}/unfollow", web::post().to(unfollow_user))
        .route("/notifications", web::get().to(get_notifications))
        .route("/notifications/read_all", web::post().to(mark_all_read))
        .route("/notifications/{id}/read", web::post().to(mark_read))
        .route("/notifications/{id}", web::delete().to(delete_notification));
}

/// Maps service errors onto HTTP statuses. Storage failures are logged and
/// hidden behind a generic message.
pub fn auth_error_response(context: &str, e: AuthError) -> HttpResponse {
    match e {
        AuthError::InvalidCredentials => json_error(StatusCode::UNAUTHORIZED, e),
        AuthError::AlreadyExists => json_error(StatusCode::CONFLICT, e),
        AuthError::InvalidInput(_) => json_error(StatusCode::BAD_REQUEST, e),
        AuthError::UserNotFound => not_found("User"),
        AuthError::Hash(_) | AuthError::Storage(_) => server_error(context, e),
    }
}

fn logged_in(session: &Session, state: &AppState, user: &User) -> HttpResponse {
    if let Err(e) = middleware::start_session(session, user) {
        return server_error("Failed to start session", e);
    }
    // A saved preference wins over whatever the anonymous session picked.
    match state.auth.language_preference(user.id) {
        Ok(Some(language)) => {
            if let Err(e) = session.insert(SESSION_LANGUAGE, language) {
                log::error!("Failed to restore language for user {}: {}", user.id, e);
            }
        }
        Ok(None) => {}
        Err(e) => log::error!("Failed to read language preference for user {}: {}", user.id, e),
    }
    HttpResponse::Ok().json(json!({"success": true, "user": user}))
}

async fn signup(
    session: Session,
    state: web::Data<AppState>,
    form: web::Json<SignupRequest>,
) -> impl Responder {
    match state.auth.signup(&form) {
        Ok(user) => logged_in(&session, &state, &user),
        Err(e) => auth_error_response("Signup failed", e),
    }
}

async fn login(
    session: Session,
    state: web::Data<AppState>,
    form: web::Json<LoginForm>,
) -> impl Responder {
    match state.auth.login(&form.email, &form.password) {
        Ok(user) => logged_in(&session, &state, &user),
        Err(e) => auth_error_response("Login failed", e),
    }
}

async fn logout(session: Session, state: web::Data<AppState>, user: Option<AuthenticatedUser>) -> impl Responder {
    if let Some(user) = user {
        state.post_manager.end_session(user.id);
        log::info!("User '{}' logged out.", user.username);
    }
    middleware::end_session(&session);
    HttpResponse::Ok().json(json!({"success": true}))
}

async fn get_me(state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    match state.auth.current_user(user.id) {
        Ok(Some(me)) => HttpResponse::Ok().json(me),
        Ok(None) => not_found("User"),
        Err(e) => auth_error_response("Failed to load current user", e),
    }
}

async fn update_me(
    session: Session,
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    form: web::Json<ProfileChanges>,
) -> impl Responder {
    match state.auth.update_profile(user.id, &form) {
        Ok(updated) => {
            if let Err(e) = session.insert(middleware::SESSION_USERNAME, &updated.username) {
                log::error!("Failed to refresh username in session: {}", e);
            }
            HttpResponse::Ok().json(json!({"success": true, "user": updated}))
        }
        Err(e) => auth_error_response("Failed to update profile", e),
    }
}

async fn change_password(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    form: web::Json<PasswordForm>,
) -> impl Responder {
    match state.auth.change_password(user.id, &form.current_password, &form.new_password) {
        Ok(()) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => auth_error_response("Failed to change password", e),
    }
}

async fn get_user_profile(username: web::Path<String>, state: web::Data<AppState>) -> impl Responder {
    match state.auth.user_by_username(&username) {
        Ok(Some(user)) => HttpResponse::Ok().json(json!({
            "id": user.id,
            "name": user.name,
            "username": user.username,
            "avatar": user.avatar,
            "bio": user.bio,
            "followers": user.followers,
            "following": user.following,
            "role": user.role,
            "createdAt": user.created_at,
        })),
        Ok(None) => not_found("User"),
        Err(e) => auth_error_response("Failed to load profile", e),
    }
}

async fn get_user_posts(
    username: web::Path<String>,
    state: web::Data<AppState>,
    query: web::Query<Pagination>,
    viewer: Option<AuthenticatedUser>,
) -> impl Responder {
    let author = match state.auth.user_by_username(&username) {
        Ok(Some(author)) => author,
        Ok(None) => return not_found("User"),
        Err(e) => return auth_error_response("Failed to load profile", e),
    };
    let viewer_id = viewer.map(|v| v.id);
    match public_helpers::fetch_posts_by_author(&state, author.id, viewer_id, query.limit(), query.offset()) {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(e) => server_error(&format!("Failed to fetch posts of '{}'", username), e),
    }
}

async fn follow_user(username: web::Path<String>, state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    let followee = match state.auth.follow(user.id, &username) {
        Ok(followee) => followee,
        Err(e) => return auth_error_response("Failed to follow user", e),
    };
    if let Err(e) = state.pool.get().map_err(|e| e.to_string()).and_then(|conn| {
        admin_db_operations::create_notification(
            &conn,
            followee.id,
            NotificationKind::Follow,
            &format!("{} started following you", user.username),
            Some(&format!("/users/{}", user.username)),
            state.clock.now(),
        ).map_err(|e| e.to_string())
    }) {
        log::error!("Failed to notify user {} about a new follower: {}", followee.id, e);
    }
    HttpResponse::Ok().json(json!({"success": true, "user": followee}))
}

async fn unfollow_user(username: web::Path<String>, state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    match state.auth.unfollow(user.id, &username) {
        Ok(followee) => HttpResponse::Ok().json(json!({"success": true, "user": followee})),
        Err(e) => auth_error_response("Failed to unfollow user", e),
    }
}

async fn get_notifications(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<NotificationQuery>,
) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    let notifications = admin_db_operations::read_notifications_for_user(&conn, user.id, query.unread.unwrap_or(false));
    let unread = admin_db_operations::count_unread_notifications(&conn, user.id);
    match (notifications, unread) {
        (Ok(notifications), Ok(unread)) => HttpResponse::Ok().json(json!({
            "notifications": notifications,
            "unread": unread,
        })),
        (Err(e), _) | (_, Err(e)) => server_error("Failed to fetch notifications", e),
    }
}

async fn mark_read(id: web::Path<i64>, state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::mark_notification_read(&conn, user.id, *id) {
        Ok(0) => not_found("Notification"),
        Ok(_) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => server_error("Failed to mark notification as read", e),
    }
}

async fn mark_all_read(state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::mark_all_notifications_read(&conn, user.id) {
        Ok(updated) => HttpResponse::Ok().json(json!({"success": true, "updated": updated})),
        Err(e) => server_error("Failed to mark notifications as read", e),
    }
}

async fn delete_notification(id: web::Path<i64>, state: web::Data<AppState>, user: AuthenticatedUser) -> impl Responder {
    let conn = match state.pool.get() {
        Ok(conn) => conn,
        Err(e) => return server_error("Failed to get DB connection", e),
    };
    match admin_db_operations::delete_notification(&conn, user.id, *id) {
        Ok(0) => not_found("Notification"),
        Ok(_) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => server_error("Failed to delete notification", e),
    }
}
