use std::sync::Arc;

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{Cookie, Key};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use livlog::services::clock::SystemClock;
use livlog::services::i18n::Language;
use livlog::setup::db_setup;
use livlog::{routes, AppState};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use redb::Database;
use serde_json::{json, Value};
use tempfile::TempDir;

fn test_state(dir: &TempDir) -> web::Data<AppState> {
    let posts_db = Database::create(dir.path().join("posts.db")).unwrap();
    db_setup::setup_posts_db(&posts_db).unwrap();

    let manager = SqliteConnectionManager::file(dir.path().join("livlog.db"));
    let pool = Pool::builder().max_size(4).build(manager).unwrap();
    db_setup::setup_app_db(&mut pool.get().unwrap()).unwrap();

    web::Data::new(AppState::new(Arc::new(posts_db), pool, Arc::new(SystemClock), 4, Language::Ko))
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .wrap(
                    SessionMiddleware::builder(CookieSessionStore::default(), Key::from(&[7u8; 64]))
                        .cookie_secure(false)
                        .build(),
                )
                .app_data($state.clone())
                .configure(routes::config_app),
        )
        .await
    };
}

/// Sends the request with the jar's session cookie and keeps whatever cookie
/// the response sets. Returns the status and the JSON body (Null if none).
macro_rules! send {
    ($app:expr, $jar:expr, $req:expr) => {{
        let jar: &mut Option<Cookie<'static>> = $jar;
        let mut req = $req;
        if let Some(cookie) = jar.as_ref() {
            req = req.cookie(cookie.clone());
        }
        let resp = test::call_service(&$app, req.to_request()).await;
        if let Some(cookie) = resp.response().cookies().find(|c| c.name() == "id") {
            *jar = Some(cookie.into_owned());
        }
        let status = resp.status();
        let body = test::read_body(resp).await;
        (status, serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null))
    }};
}

fn signup_body(username: &str) -> Value {
    json!({
        "email": format!("{username}@example.com"),
        "name": username.to_uppercase(),
        "username": username,
        "password": "Test1234!",
    })
}

#[actix_web::test]
async fn write_publish_and_read_flow() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    let app = app!(state);
    let mut author = None;

    let (status, body) = send!(app, &mut author, test::TestRequest::post().uri("/api/auth/signup").set_json(signup_body("jisoo")));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "jisoo");

    let (status, body) = send!(app, &mut author, test::TestRequest::post().uri("/api/editor/drafts").set_json(json!({
        "title": "Hello Livlog",
        "content": "Some **bold** words for the first post.",
        "tags": ["rust"],
        "category": "Technology",
    })));
    assert_eq!(status, StatusCode::OK);
    let draft_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send!(app, &mut author, test::TestRequest::get().uri(&format!("/api/editor/drafts/{draft_id}")));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Hello Livlog");

    let (status, body) = send!(app, &mut author, test::TestRequest::post().uri(&format!("/api/editor/drafts/{draft_id}/publish")));
    assert_eq!(status, StatusCode::CREATED);
    let post_id = body["post"]["id"].as_str().unwrap().to_string();

    let (_, drafts) = send!(app, &mut author, test::TestRequest::get().uri("/api/editor/drafts"));
    assert_eq!(drafts, json!([]));

    let mut anonymous = None;
    let (status, latest) = send!(app, &mut anonymous, test::TestRequest::get().uri("/api/posts/latest"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest.as_array().unwrap().len(), 1);
    assert_eq!(latest[0]["title"], "Hello Livlog");

    let (status, post) = send!(app, &mut anonymous, test::TestRequest::get().uri(&format!("/api/posts/{post_id}")));
    assert_eq!(status, StatusCode::OK);
    assert!(post["contentHtml"].as_str().unwrap().contains("<strong>bold</strong>"));
    assert_eq!(post["likes"], 0);

    let mut reader = None;
    send!(app, &mut reader, test::TestRequest::post().uri("/api/auth/signup").set_json(signup_body("alex")));
    let (status, liked) = send!(app, &mut reader, test::TestRequest::post().uri(&format!("/api/posts/{post_id}/like")));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(liked["post"]["likes"], 1);
    assert_eq!(liked["post"]["isLiked"], true);

    let (_, notifications) = send!(app, &mut author, test::TestRequest::get().uri("/api/notifications"));
    assert_eq!(notifications["unread"], 1);
}

#[actix_web::test]
async fn wrong_password_gets_generic_401() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    let app = app!(state);
    let mut jar = None;

    send!(app, &mut jar, test::TestRequest::post().uri("/api/auth/signup").set_json(signup_body("mina")));
    send!(app, &mut jar, test::TestRequest::post().uri("/api/auth/logout"));

    let mut fresh = None;
    let (status, body) = send!(app, &mut fresh, test::TestRequest::post().uri("/api/auth/login").set_json(json!({
        "email": "mina@example.com",
        "password": "wrong",
    })));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid email or password");

    let (status, _) = send!(app, &mut fresh, test::TestRequest::post().uri("/api/auth/login").set_json(json!({
        "email": "nobody@example.com",
        "password": "Test1234!",
    })));
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send!(app, &mut fresh, test::TestRequest::post().uri("/api/auth/login").set_json(json!({
        "email": "mina@example.com",
        "password": "Test1234!",
    })));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "mina");
}

#[actix_web::test]
async fn role_gates_protect_admin_and_moderation() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    let app = app!(state);

    let mut anonymous = None;
    let (status, _) = send!(app, &mut anonymous, test::TestRequest::get().uri("/api/admin/users"));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send!(app, &mut anonymous, test::TestRequest::get().uri("/api/editor/drafts"));
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut user = None;
    send!(app, &mut user, test::TestRequest::post().uri("/api/auth/signup").set_json(signup_body("alex")));
    let (status, body) = send!(app, &mut user, test::TestRequest::get().uri("/api/admin/users"));
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    let (status, _) = send!(app, &mut user, test::TestRequest::get().uri("/api/moderation/reports"));
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn language_follows_session_choice() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    let app = app!(state);
    let mut jar = None;

    let (_, body) = send!(app, &mut jar, test::TestRequest::get().uri("/api/language"));
    assert_eq!(body["language"], "ko");

    let (status, _) = send!(app, &mut jar, test::TestRequest::post().uri("/api/language").set_json(json!({"language": "en"})));
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send!(app, &mut jar, test::TestRequest::get().uri("/api/language"));
    assert_eq!(body["language"], "en");

    let (status, _) = send!(app, &mut jar, test::TestRequest::post().uri("/api/language").set_json(json!({"language": "fr"})));
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send!(app, &mut jar, test::TestRequest::get().uri("/api/i18n/en"));
    assert_eq!(status, StatusCode::OK);
    assert!(body["messages"].is_object());
}
