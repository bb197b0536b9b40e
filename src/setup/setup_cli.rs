use bcrypt::DEFAULT_COST;
use chrono::Utc;
use clap::{Parser, Subcommand};
use livlog::config::Config;
use livlog::models::db_operations::users_db_operations::{self, NewUser};
use livlog::models::Role;
use livlog::setup::{db_setup, seed};
use redb::Database;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "livlog_setup", author, version, about = "Initial setup and maintenance for a Livlog install.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Fills an empty install with demo accounts, taxonomy and posts.
    Seed,
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates both databases, or only `app` / `posts`.
    Setup {
        db_type: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    List,
    ChangePassword {
        #[arg(long)]
        username: String,
        #[arg(long)]
        new_password: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => match db_type.as_deref() {
                Some("app") => setup_app_database(&config),
                Some("posts") => setup_posts_database(&config),
                Some(other) => eprintln!("❌ Error: Unknown database type '{}'. Use 'app' or 'posts'.", other),
                None => {
                    setup_app_database(&config);
                    setup_posts_database(&config);
                }
            },
        },
        Commands::Admin { action } => match action {
            AdminAction::Create { email, name, username, password } => {
                create_admin_user(&config, email, name, username, password);
            }
            AdminAction::List => list_admin_users(&config),
            AdminAction::ChangePassword { username, new_password } => {
                change_admin_password(&config, username, new_password);
            }
        },
        Commands::Seed => seed_demo_data(&config),
    }
}

fn ensure_parent_dir(path: &Path) -> bool {
    match path.parent() {
        Some(parent) => match fs::create_dir_all(parent) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("❌ Error: Could not create directory '{}': {}", parent.display(), e);
                false
            }
        },
        None => true,
    }
}

fn open_app_db(config: &Config) -> Option<Connection> {
    let db_path = config.users_db_path();
    if !db_path.exists() {
        eprintln!("❌ Error: App database not found at '{}'. Please run `livlog_setup db setup` first.", db_path.display());
        return None;
    }
    match Connection::open(&db_path) {
        Ok(conn) => Some(conn),
        Err(e) => {
            eprintln!("❌ Error opening app database: {}", e);
            None
        }
    }
}

fn setup_app_database(config: &Config) {
    let db_path = config.users_db_path();
    println!("\nSetting up app database at '{}'...", db_path.display());
    if !ensure_parent_dir(&db_path) {
        return;
    }

    let mut conn = match Connection::open(&db_path) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("❌ Error creating app database file: {}", e);
            return;
        }
    };
    match db_setup::setup_app_db(&mut conn) {
        Ok(()) => println!("✅ App database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up app database: {}", e),
    }
}

fn setup_posts_database(config: &Config) {
    let db_path = config.posts_db_path();
    println!("\nSetting up posts database at '{}'...", db_path.display());
    if !ensure_parent_dir(&db_path) {
        return;
    }

    let db = match Database::create(&db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("❌ Error creating posts database file: {}", e);
            return;
        }
    };
    match db_setup::setup_posts_db(&db) {
        Ok(()) => println!("✅ Posts database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up posts database: {}", e),
    }
}

fn create_admin_user(config: &Config, email: &str, name: &str, username: &str, password: &str) {
    let Some(conn) = open_app_db(config) else { return };
    match users_db_operations::email_or_username_taken(&conn, email, username) {
        Ok(true) => {
            eprintln!("❌ Error: A user with email '{}' or username '{}' already exists.", email, username);
            return;
        }
        Ok(false) => {}
        Err(e) => {
            eprintln!("❌ Error checking existing users: {}", e);
            return;
        }
    }

    let new_user = NewUser { email, name, username, password, role: Role::Admin };
    match users_db_operations::create_user(&conn, &new_user, DEFAULT_COST, Utc::now()) {
        Ok(id) => println!("✅ Admin user '{}' created successfully (id {}).", username, id),
        Err(e) => eprintln!("❌ Error creating admin user: {}", e),
    }
}

fn list_admin_users(config: &Config) {
    let Some(conn) = open_app_db(config) else { return };
    match users_db_operations::read_users_by_role(&conn, Role::Admin) {
        Ok(admins) if admins.is_empty() => println!("ℹ️ No admin users yet."),
        Ok(admins) => {
            println!("Listing Admin Users:");
            for admin in admins {
                println!("- {} <{}>", admin.username, admin.email);
            }
        }
        Err(e) => eprintln!("❌ Error fetching admins: {}", e),
    }
}

fn change_admin_password(config: &Config, username: &str, new_password: &str) {
    let Some(conn) = open_app_db(config) else { return };
    let admin = match users_db_operations::read_user_by_username(&conn, username) {
        Ok(Some(user)) if user.role == Role::Admin => user,
        Ok(_) => {
            eprintln!("❌ Error: Admin user '{}' not found.", username);
            return;
        }
        Err(e) => {
            eprintln!("❌ Error looking up '{}': {}", username, e);
            return;
        }
    };
    match users_db_operations::update_password(&conn, admin.id, new_password, DEFAULT_COST) {
        Ok(_) => println!("✅ Password for admin '{}' changed successfully.", username),
        Err(e) => eprintln!("❌ Error changing password: {}", e),
    }
}

fn seed_demo_data(config: &Config) {
    let Some(conn) = open_app_db(config) else { return };
    let posts_path = config.posts_db_path();
    if !posts_path.exists() {
        eprintln!("❌ Error: Posts database not found at '{}'. Please run `livlog_setup db setup` first.", posts_path.display());
        return;
    }
    let posts_db = match Database::open(&posts_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("❌ Error opening posts database: {}", e);
            return;
        }
    };

    let mut rng = rand::thread_rng();
    match seed::seed_demo_data(&conn, &posts_db, DEFAULT_COST, Utc::now(), &mut rng) {
        Ok(report) => {
            println!(
                "✅ Seeded {} users, {} categories, {} tags, {} posts and {} comments.",
                report.users, report.categories, report.tags, report.posts, report.comments
            );
            println!("ℹ️ Demo accounts log in with the password '{}'.", seed::DEMO_PASSWORD);
        }
        Err(e) => eprintln!("❌ Error seeding demo data: {}", e),
    }
}
