use crate::models::{ReactionKind, Role, User};
use bcrypt::{hash, verify, BcryptError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Error as RusqliteError, Result as RusqliteResult};

const USER_COLUMNS: &str = "u.id, u.email, u.name, u.username, u.avatar, u.bio, u.role, u.created_at, \
    (SELECT COUNT(*) FROM follows f WHERE f.followee_id = u.id), \
    (SELECT COUNT(*) FROM follows f WHERE f.follower_id = u.id)";

fn bcrypt_to_rusqlite_error(e: BcryptError) -> RusqliteError {
    RusqliteError::ToSqlConversionFailure(Box::new(e))
}

fn user_from_row(row: &Row) -> RusqliteResult<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        username: row.get(3)?,
        avatar: row.get(4)?,
        bio: row.get(5)?,
        role: row.get(6)?,
        created_at: row.get(7)?,
        followers: row.get(8)?,
        following: row.get(9)?,
    })
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub role: Role,
}

/// Inserts a user with a bcrypt hash of `password` and returns the new id.
pub fn create_user(conn: &Connection, user: &NewUser, cost: u32, now: DateTime<Utc>) -> RusqliteResult<i64> {
    let hashed_password = hash(user.password, cost).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "INSERT INTO users (email, name, username, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![user.email.trim().to_lowercase(), user.name, user.username, hashed_password, user.role, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_all_users(conn: &Connection) -> RusqliteResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users u ORDER BY u.id"))?;
    let user_iter = stmt.query_map([], user_from_row)?;
    user_iter.collect()
}

pub fn read_user_by_id(conn: &Connection, user_id: i64) -> RusqliteResult<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
        [user_id],
        user_from_row,
    ).optional()
}

pub fn read_user_by_username(conn: &Connection, username: &str) -> RusqliteResult<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1"),
        [username],
        user_from_row,
    ).optional()
}

pub fn email_or_username_taken(conn: &Connection, email: &str, username: &str) -> RusqliteResult<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 OR username = ?2)",
        params![email.trim().to_lowercase(), username],
        |row| row.get(0),
    )
}

/// Returns the user when the email exists and the password matches its hash.
pub fn verify_credentials(conn: &Connection, email: &str, password: &str) -> RusqliteResult<Option<User>> {
    let res: Option<(i64, String)> = conn.query_row(
        "SELECT id, password_hash FROM users WHERE email = ?1",
        [email.trim().to_lowercase()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    ).optional()?;

    match res {
        Some((user_id, password_hash)) if verify(password, &password_hash).unwrap_or(false) => {
            read_user_by_id(conn, user_id)
        }
        _ => Ok(None),
    }
}

pub fn update_last_login_time(conn: &Connection, user_id: i64, now: DateTime<Utc>) -> RusqliteResult<()> {
    conn.execute("UPDATE users SET last_login_time = ?1 WHERE id = ?2", params![now, user_id])?;
    Ok(())
}

pub struct ProfileUpdate<'a> {
    pub name: Option<&'a str>,
    pub username: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub avatar: Option<&'a str>,
}

/// Applies the present fields; an empty avatar clears it.
pub fn update_profile(conn: &Connection, user_id: i64, update: &ProfileUpdate) -> RusqliteResult<usize> {
    let avatar_given = update.avatar.is_some();
    let avatar = update.avatar.map(str::trim).filter(|s| !s.is_empty());
    conn.execute(
        "UPDATE users SET
            name = COALESCE(?1, name),
            username = COALESCE(?2, username),
            bio = COALESCE(?3, bio),
            avatar = CASE WHEN ?4 THEN ?5 ELSE avatar END
         WHERE id = ?6",
        params![update.name, update.username, update.bio, avatar_given, avatar, user_id],
    )
}

pub fn update_password(conn: &Connection, user_id: i64, new_password: &str, cost: u32) -> RusqliteResult<usize> {
    let hashed_password = hash(new_password, cost).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute("UPDATE users SET password_hash = ?1 WHERE id = ?2", params![hashed_password, user_id])
}

pub fn update_role(conn: &Connection, user_id: i64, role: Role) -> RusqliteResult<usize> {
    conn.execute("UPDATE users SET role = ?1 WHERE id = ?2", params![role, user_id])
}

pub fn delete_user(conn: &Connection, user_id: i64) -> RusqliteResult<usize> {
    conn.execute("DELETE FROM users WHERE id = ?1", [user_id])
}

pub fn read_users_by_role(conn: &Connection, role: Role) -> RusqliteResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.role = ?1 ORDER BY u.username"))?;
    let user_iter = stmt.query_map([role], user_from_row)?;
    user_iter.collect()
}

// --- Follows ---

/// Returns `true` if a new follow edge was created.
pub fn follow(conn: &Connection, follower_id: i64, followee_id: i64) -> RusqliteResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO follows (follower_id, followee_id) VALUES (?1, ?2)",
        params![follower_id, followee_id],
    )?;
    Ok(inserted > 0)
}

pub fn unfollow(conn: &Connection, follower_id: i64, followee_id: i64) -> RusqliteResult<bool> {
    let removed = conn.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
        params![follower_id, followee_id],
    )?;
    Ok(removed > 0)
}

// --- Per-user settings ---

pub fn read_user_setting(conn: &Connection, user_id: i64, key: &str) -> RusqliteResult<Option<String>> {
    conn.query_row(
        "SELECT value FROM user_settings WHERE user_id = ?1 AND key = ?2",
        params![user_id, key],
        |row| row.get(0),
    ).optional()
}

pub fn update_user_setting(conn: &Connection, user_id: i64, key: &str, value: &str) -> RusqliteResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO user_settings (user_id, key, value) VALUES (?1, ?2, ?3)",
        params![user_id, key, value],
    )?;
    Ok(())
}

// --- Reactions (likes and bookmarks) ---

/// Adds the reaction if absent, removes it if present. Returns the new state.
pub fn toggle_reaction(conn: &Connection, post_id: &str, user_id: i64, kind: ReactionKind) -> RusqliteResult<bool> {
    let removed = conn.execute(
        "DELETE FROM post_reactions WHERE post_id = ?1 AND user_id = ?2 AND kind = ?3",
        params![post_id, user_id, kind],
    )?;
    if removed > 0 {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO post_reactions (post_id, user_id, kind) VALUES (?1, ?2, ?3)",
        params![post_id, user_id, kind],
    )?;
    Ok(true)
}

pub fn count_reactions(conn: &Connection, post_id: &str, kind: ReactionKind) -> RusqliteResult<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM post_reactions WHERE post_id = ?1 AND kind = ?2",
        params![post_id, kind],
        |row| row.get(0),
    )
}

pub fn count_all_reactions(conn: &Connection, kind: ReactionKind) -> RusqliteResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM post_reactions WHERE kind = ?1", [kind], |row| row.get(0))
}

pub fn has_reaction(conn: &Connection, post_id: &str, user_id: i64, kind: ReactionKind) -> RusqliteResult<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM post_reactions WHERE post_id = ?1 AND user_id = ?2 AND kind = ?3)",
        params![post_id, user_id, kind],
        |row| row.get(0),
    )
}

pub fn delete_reactions_for_post(conn: &Connection, post_id: &str) -> RusqliteResult<usize> {
    conn.execute("DELETE FROM post_reactions WHERE post_id = ?1", [post_id])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup;

    // Lowest cost bcrypt accepts; keeps the suite fast.
    const TEST_COST: u32 = 4;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        db_setup::setup_app_db(&mut conn).unwrap();
        conn
    }

    fn add(conn: &Connection, email: &str, username: &str) -> i64 {
        let user = NewUser { email, name: username, username, password: "Test1234!", role: Role::User };
        create_user(conn, &user, TEST_COST, Utc::now()).unwrap()
    }

    #[test]
    fn credentials_match_only_the_right_password() {
        let conn = conn();
        let id = add(&conn, "Ana@Example.com", "ana");

        let user = verify_credentials(&conn, "ana@example.com", "Test1234!").unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::User);
        assert!(verify_credentials(&conn, "ana@example.com", "wrong").unwrap().is_none());
        assert!(verify_credentials(&conn, "nobody@example.com", "Test1234!").unwrap().is_none());
    }

    #[test]
    fn follow_counts_are_derived() {
        let conn = conn();
        let ana = add(&conn, "ana@example.com", "ana");
        let ben = add(&conn, "ben@example.com", "ben");

        assert!(follow(&conn, ana, ben).unwrap());
        assert!(!follow(&conn, ana, ben).unwrap());
        let ben_user = read_user_by_id(&conn, ben).unwrap().unwrap();
        assert_eq!((ben_user.followers, ben_user.following), (1, 0));

        assert!(unfollow(&conn, ana, ben).unwrap());
        assert_eq!(read_user_by_id(&conn, ben).unwrap().unwrap().followers, 0);
    }

    #[test]
    fn profile_update_keeps_missing_fields() {
        let conn = conn();
        let id = add(&conn, "ana@example.com", "ana");
        let update = ProfileUpdate { name: None, username: None, bio: Some("writer"), avatar: Some("/a.png") };
        update_profile(&conn, id, &update).unwrap();

        let user = read_user_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(user.name, "ana");
        assert_eq!(user.bio, "writer");
        assert_eq!(user.avatar.as_deref(), Some("/a.png"));

        let clear = ProfileUpdate { name: None, username: None, bio: None, avatar: Some("") };
        update_profile(&conn, id, &clear).unwrap();
        assert_eq!(read_user_by_id(&conn, id).unwrap().unwrap().avatar, None);
    }

    #[test]
    fn reactions_toggle() {
        let conn = conn();
        let id = add(&conn, "ana@example.com", "ana");

        assert!(toggle_reaction(&conn, "p1", id, ReactionKind::Like).unwrap());
        assert_eq!(count_reactions(&conn, "p1", ReactionKind::Like).unwrap(), 1);
        assert!(has_reaction(&conn, "p1", id, ReactionKind::Like).unwrap());
        assert!(!has_reaction(&conn, "p1", id, ReactionKind::Bookmark).unwrap());

        assert!(!toggle_reaction(&conn, "p1", id, ReactionKind::Like).unwrap());
        assert_eq!(count_reactions(&conn, "p1", ReactionKind::Like).unwrap(), 0);
    }

    #[test]
    fn user_settings_upsert() {
        let conn = conn();
        let id = add(&conn, "ana@example.com", "ana");
        assert_eq!(read_user_setting(&conn, id, "language").unwrap(), None);
        update_user_setting(&conn, id, "language", "en").unwrap();
        update_user_setting(&conn, id, "language", "ko").unwrap();
        assert_eq!(read_user_setting(&conn, id, "language").unwrap().as_deref(), Some("ko"));
    }
}
