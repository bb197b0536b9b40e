use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use redb::Database;
use serde::Serialize;

use crate::models::db_operations::{
    admin_db_operations, drafts_db_operations, posts_db_operations, users_db_operations, DbError,
};
use crate::models::{PostSummary, ReactionKind};
use crate::services::charts::{self, DonutArc, LineChart, Margin, NamedValue, SparkPoint, TimePoint};
use crate::services::clock::Clock;
use crate::DbPool;

pub const LINE_CHART_SIZE: (f64, f64) = (600.0, 300.0);
pub const SPARKLINE_SIZE: (f64, f64) = (120.0, 32.0);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub posts: usize,
    pub drafts: usize,
    pub users: usize,
    pub likes: i64,
    pub comments: i64,
    pub subscribers: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostLikes {
    pub post_id: String,
    pub title: String,
    pub likes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LikesSparkline {
    pub posts: Vec<PostLikes>,
    pub points: Vec<SparkPoint>,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub totals: Totals,
    pub posts_per_day: LineChart,
    pub categories: Vec<DonutArc>,
    pub likes: LikesSparkline,
}

/// Read-only aggregates over posts, drafts and the SQLite records.
pub struct AnalyticsService {
    posts_db: Arc<Database>,
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl AnalyticsService {
    pub fn new(posts_db: Arc<Database>, pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        AnalyticsService { posts_db, pool, clock }
    }

    pub fn totals(&self) -> Result<Totals, DbError> {
        let conn = self.pool.get()?;
        Ok(Totals {
            posts: posts_db_operations::read_all_post_summaries(&self.posts_db)?.len(),
            drafts: drafts_db_operations::count_all_drafts(&self.posts_db)?,
            users: users_db_operations::read_all_users(&conn)?.len(),
            likes: users_db_operations::count_all_reactions(&conn, ReactionKind::Like)?,
            comments: admin_db_operations::count_all_comments(&conn)?,
            subscribers: admin_db_operations::count_active_subscribers(&conn)?,
        })
    }

    /// One point per calendar day (UTC) for the last `days` days, today last.
    pub fn posts_per_day(&self, days: u32) -> Result<Vec<TimePoint>, DbError> {
        let posts = posts_db_operations::read_all_post_summaries(&self.posts_db)?;
        Ok(daily_counts(&posts, self.clock.now().date_naive(), days))
    }

    /// Published posts per category, largest first.
    pub fn category_share(&self) -> Result<Vec<NamedValue>, DbError> {
        let posts = posts_db_operations::read_all_post_summaries(&self.posts_db)?;
        Ok(category_counts(&posts))
    }

    /// Like counts of the `limit` newest posts, oldest first so the line
    /// reads left to right.
    pub fn likes_sparkline(&self, limit: usize) -> Result<LikesSparkline, DbError> {
        let conn = self.pool.get()?;
        let mut posts = Vec::new();
        for summary in posts_db_operations::read_all_post_summaries(&self.posts_db)?.into_iter().take(limit) {
            posts.push(PostLikes {
                likes: users_db_operations::count_reactions(&conn, &summary.id, ReactionKind::Like)?,
                post_id: summary.id,
                title: summary.metadata.title,
            });
        }
        posts.reverse();

        let values: Vec<f64> = posts.iter().map(|p| p.likes as f64).collect();
        let points = charts::sparkline(&values, SPARKLINE_SIZE.0, SPARKLINE_SIZE.1);
        Ok(LikesSparkline { path: charts::sparkline_path(&points), points, posts })
    }

    pub fn dashboard(&self, days: u32) -> Result<Dashboard, DbError> {
        let (width, height) = LINE_CHART_SIZE;
        Ok(Dashboard {
            totals: self.totals()?,
            posts_per_day: LineChart::new(&self.posts_per_day(days)?, width, height, Margin::default()),
            categories: charts::donut_arcs(&self.category_share()?),
            likes: self.likes_sparkline(10)?,
        })
    }
}

fn daily_counts(posts: &[PostSummary], today: NaiveDate, days: u32) -> Vec<TimePoint> {
    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    for post in posts {
        *per_day.entry(post.metadata.published_at.date_naive()).or_default() += 1;
    }

    (0..days as i64)
        .rev()
        .map(|back| {
            let day = today - Duration::days(back);
            TimePoint {
                date: Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN)),
                value: per_day.get(&day).copied().unwrap_or(0) as f64,
            }
        })
        .collect()
}

fn category_counts(posts: &[PostSummary]) -> Vec<NamedValue> {
    let mut per_category: HashMap<&str, usize> = HashMap::new();
    for post in posts {
        let category = post.metadata.category.trim();
        let label = if category.is_empty() { "Uncategorized" } else { category };
        *per_category.entry(label).or_default() += 1;
    }

    let mut counts: Vec<(&str, usize)> = per_category.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    counts.into_iter()
        .map(|(label, count)| NamedValue { label: label.to_string(), value: count as f64 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PostAuthor, PostMetadata, PublishedPost, Visibility};
    use crate::services::clock::ManualClock;
    use crate::setup::db_setup;
    use r2d2_sqlite::SqliteConnectionManager;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        service: AnalyticsService,
        db: Arc<Database>,
        pool: DbPool,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::create(dir.path().join("posts.db")).unwrap());
        db_setup::setup_posts_db(&db).unwrap();
        let pool = r2d2::Pool::builder().max_size(1).build(SqliteConnectionManager::memory()).unwrap();
        db_setup::setup_app_db(&mut pool.get().unwrap()).unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()));
        let service = AnalyticsService::new(db.clone(), pool.clone(), clock);
        Fixture { _dir: dir, service, db, pool }
    }

    fn publish(db: &Database, id: &str, category: &str, day: u32) {
        let at = Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap();
        let post = PublishedPost {
            id: id.to_string(),
            content: "body".into(),
            metadata: PostMetadata {
                title: format!("Post {id}"),
                excerpt: String::new(),
                author: PostAuthor { id: 1, name: "Ana".into(), username: "ana".into(), avatar: None },
                cover_image: None,
                tags: vec![],
                category: category.into(),
                visibility: Visibility::Public,
                featured: false,
                created_at: at,
                published_at: at,
                word_count: 1,
                read_time: 1,
            },
        };
        posts_db_operations::insert_post(db, &post).unwrap();
    }

    const A: &str = "a1a1a1a1-0000-4000-8000-000000000001";
    const B: &str = "b2b2b2b2-0000-4000-8000-000000000002";
    const C: &str = "c3c3c3c3-0000-4000-8000-000000000003";

    #[test]
    fn posts_per_day_fills_empty_days() {
        let f = fixture();
        publish(&f.db, A, "Tech", 10);
        publish(&f.db, B, "Tech", 10);
        publish(&f.db, C, "Life", 8);

        let series = f.service.posts_per_day(3).unwrap();
        let values: Vec<f64> = series.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 0.0, 2.0]);
        assert_eq!(series[2].date, Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap());
    }

    #[test]
    fn category_share_is_sorted_by_count() {
        let f = fixture();
        publish(&f.db, A, "Tech", 1);
        publish(&f.db, B, "Life", 2);
        publish(&f.db, C, "tech ", 3);

        let share = f.service.category_share().unwrap();
        assert_eq!(share[0].label, "Life");
        assert_eq!(share.len(), 3);

        let arcs = charts::donut_arcs(&share);
        assert!((arcs.last().unwrap().end_angle - std::f64::consts::TAU).abs() < 1e-9);
    }

    #[test]
    fn totals_count_likes_and_posts() {
        let f = fixture();
        publish(&f.db, A, "Tech", 1);
        {
            let conn = f.pool.get().unwrap();
            users_db_operations::toggle_reaction(&conn, A, 7, ReactionKind::Like).unwrap();
            users_db_operations::toggle_reaction(&conn, A, 8, ReactionKind::Like).unwrap();
            users_db_operations::toggle_reaction(&conn, A, 8, ReactionKind::Bookmark).unwrap();
        }

        let totals = f.service.totals().unwrap();
        assert_eq!(totals.posts, 1);
        assert_eq!(totals.likes, 2);
        assert_eq!(totals.drafts, 0);

        let sparkline = f.service.likes_sparkline(5).unwrap();
        assert_eq!(sparkline.posts[0].likes, 2);
        assert_eq!(sparkline.points.len(), 1);
    }
}
