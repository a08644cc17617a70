//! Quota service - the single source of truth for post allowances
//!
//! Every user owns one ledger row in `users` holding the subscription plan,
//! the start of the current 30-day cycle and a cached count of posts
//! published inside that cycle. The ledger must always satisfy
//!
//! ```text
//! remaining = total_posts_allowed - count(posts published in [cycle_start, cycle_start + 30d))
//! ```
//!
//! Approval never touches the ledger. Deduction happens only on a publish
//! confirmation, inside one transaction guarded by two conditional updates:
//! the post must still be `approved`, and the cached count must still be
//! below the allowance. Concurrent confirmations therefore neither deduct
//! twice for one post nor push the remaining count below zero.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{QuotaError, Result};
use crate::quota::cycle::{self, CycleWindow};
use crate::quota::types::{
    NewPost, Post, PostStatus, PublishConfirmation, QuotaStatus, QuotaValidation,
    SubscriptionPlan, UserQuota,
};
use crate::utils::{format_timestamp, parse_timestamp, validate_content, validate_user_id};

pub struct QuotaService {
    db: SqlitePool,
}

impl QuotaService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                subscription_plan TEXT NOT NULL,
                cycle_start TEXT NOT NULL,
                total_posts_allowed INTEGER NOT NULL,
                published_count INTEGER NOT NULL DEFAULT 0 CHECK (published_count >= 0),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                content TEXT NOT NULL,
                status TEXT NOT NULL
                    CHECK (status IN ('draft', 'approved', 'published', 'failed')),
                scheduled_for TEXT,
                published_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        // Window counts filter on these three columns
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_posts_published_window
            ON posts(user_id, status, published_at)
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Create the ledger row for a new subscriber.
    ///
    /// The cycle starts now. Calling this for an existing user changes
    /// nothing and returns the current status.
    pub async fn initialize_quota(
        &self,
        user_id: &str,
        plan: SubscriptionPlan,
    ) -> Result<QuotaStatus> {
        validate_user_id(user_id)?;
        let now = format_timestamp(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO users (
                id, subscription_plan, cycle_start, total_posts_allowed,
                published_count, created_at, updated_at
            ) VALUES (?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(plan.as_str())
        .bind(&now)
        .bind(plan.total_posts())
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 1 {
            info!(
                user_id = %user_id,
                plan = %plan,
                total_posts = plan.total_posts(),
                "Initialized post quota"
            );
        } else {
            debug!(user_id = %user_id, "Quota already initialized");
        }

        self.get_quota_status(user_id).await
    }

    /// Switch subscription plan and start a fresh cycle now
    pub async fn change_plan(&self, user_id: &str, plan: SubscriptionPlan) -> Result<QuotaStatus> {
        let now = Utc::now();
        let window = CycleWindow::starting_at(now);

        let result = sqlx::query(
            r#"
            UPDATE users
            SET subscription_plan = ?,
                total_posts_allowed = ?,
                cycle_start = ?,
                published_count = (
                    SELECT COUNT(*) FROM posts
                    WHERE posts.user_id = users.id
                      AND posts.status = 'published'
                      AND posts.published_at >= ?
                      AND posts.published_at < ?
                ),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(plan.as_str())
        .bind(plan.total_posts())
        .bind(format_timestamp(window.start))
        .bind(format_timestamp(window.start))
        .bind(format_timestamp(window.end))
        .bind(format_timestamp(now))
        .bind(user_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QuotaError::NotFound(format!("User {}", user_id)));
        }

        info!(user_id = %user_id, plan = %plan, "Subscription plan changed, new cycle started");
        self.get_quota_status(user_id).await
    }

    /// Store a generated post as a draft. Drafts cost nothing.
    pub async fn create_draft(&self, user_id: &str, new_post: NewPost) -> Result<Post> {
        validate_content(&new_post.content)?;

        let mut conn = self.db.acquire().await?;
        load_user(&mut conn, user_id).await?;

        let id = Uuid::new_v4().to_string();
        let now = format_timestamp(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO posts (
                id, user_id, platform, content, status, scheduled_for,
                published_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, 'draft', ?, NULL, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(new_post.platform.as_str())
        .bind(&new_post.content)
        .bind(new_post.scheduled_for.map(format_timestamp))
        .bind(&now)
        .bind(&now)
        .execute(&mut *conn)
        .await?;

        debug!(user_id = %user_id, post_id = %id, platform = %new_post.platform, "Draft created");

        fetch_post(&mut conn, user_id, &id)
            .await?
            .ok_or_else(|| QuotaError::NotFound(format!("Post {}", id)))
    }

    /// Mark a draft (or a failed post being retried) as ready to publish.
    ///
    /// Leaves the quota untouched. Approving an approved post is a no-op.
    pub async fn approve_post(&self, user_id: &str, post_id: &str) -> Result<Post> {
        let mut conn = self.db.acquire().await?;

        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'approved', updated_at = ?
            WHERE id = ? AND user_id = ? AND status IN ('draft', 'failed')
            "#,
        )
        .bind(format_timestamp(Utc::now()))
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

        let post = fetch_post(&mut conn, user_id, post_id)
            .await?
            .ok_or_else(|| QuotaError::NotFound(format!("Post {}", post_id)))?;

        if result.rows_affected() == 1 {
            info!(user_id = %user_id, post_id = %post_id, "Post approved");
            return Ok(post);
        }

        match post.status {
            PostStatus::Approved => Ok(post),
            from => Err(QuotaError::InvalidTransition {
                post_id: post_id.to_string(),
                from,
                to: PostStatus::Approved,
            }),
        }
    }

    /// Publish confirmation: approved -> published, deducting one post.
    ///
    /// Called by the publish orchestrator only after the platform accepted
    /// the post. A post that is already published is reported with
    /// `deducted = false`, so repeated confirmations deduct exactly once.
    /// With no posts remaining the call fails with
    /// [`QuotaError::QuotaExceeded`] and nothing is written.
    pub async fn post_approved(&self, user_id: &str, post_id: &str) -> Result<PublishConfirmation> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        // Writing first takes the database write lock for the whole transaction
        let transitioned = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'published', published_at = ?, updated_at = ?
            WHERE id = ? AND user_id = ? AND status = 'approved'
            "#,
        )
        .bind(format_timestamp(now))
        .bind(format_timestamp(now))
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !transitioned {
            let post = fetch_post(&mut tx, user_id, post_id).await?;
            tx.rollback().await?;

            let post = post.ok_or_else(|| QuotaError::NotFound(format!("Post {}", post_id)))?;
            return match post.status {
                PostStatus::Published => {
                    debug!(
                        user_id = %user_id,
                        post_id = %post_id,
                        "Post already published, no deduction"
                    );
                    let quota = self.get_quota_status(user_id).await?;
                    Ok(PublishConfirmation {
                        post,
                        deducted: false,
                        quota,
                    })
                }
                from => Err(QuotaError::InvalidTransition {
                    post_id: post_id.to_string(),
                    from,
                    to: PostStatus::Published,
                }),
            };
        }

        let quota = load_user(&mut tx, user_id).await?;
        let quota = ensure_current_cycle(&mut tx, quota, now, Some(post_id)).await?;

        let deducted = sqlx::query(
            r#"
            UPDATE users
            SET published_count = published_count + 1, updated_at = ?
            WHERE id = ? AND published_count < total_posts_allowed
            "#,
        )
        .bind(format_timestamp(now))
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !deducted {
            tx.rollback().await?;
            warn!(
                user_id = %user_id,
                post_id = %post_id,
                total_posts = quota.total_posts_allowed,
                "Publish confirmation rejected, quota exhausted"
            );
            return Err(QuotaError::QuotaExceeded {
                user_id: user_id.to_string(),
                total_posts: quota.total_posts_allowed,
            });
        }

        let post = fetch_post(&mut tx, user_id, post_id)
            .await?
            .ok_or_else(|| QuotaError::NotFound(format!("Post {}", post_id)))?;
        let quota = load_user(&mut tx, user_id).await?;
        tx.commit().await?;

        let quota = quota_status(&quota);
        info!(
            user_id = %user_id,
            post_id = %post_id,
            platform = %post.platform,
            remaining = quota.remaining_posts,
            "Post published, quota deducted"
        );

        Ok(PublishConfirmation {
            post,
            deducted: true,
            quota,
        })
    }

    /// Same as [`QuotaService::post_approved`]
    pub async fn deduct(&self, user_id: &str, post_id: &str) -> Result<PublishConfirmation> {
        self.post_approved(user_id, post_id).await
    }

    /// Publish failure reported by the orchestrator: approved -> failed.
    ///
    /// No quota effect. The post can be approved again for a retry.
    pub async fn mark_failed(&self, user_id: &str, post_id: &str) -> Result<Post> {
        let mut conn = self.db.acquire().await?;

        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'failed', updated_at = ?
            WHERE id = ? AND user_id = ? AND status = 'approved'
            "#,
        )
        .bind(format_timestamp(Utc::now()))
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

        let post = fetch_post(&mut conn, user_id, post_id)
            .await?
            .ok_or_else(|| QuotaError::NotFound(format!("Post {}", post_id)))?;

        if result.rows_affected() == 1 {
            warn!(user_id = %user_id, post_id = %post_id, platform = %post.platform, "Publish failed");
            return Ok(post);
        }

        match post.status {
            PostStatus::Failed => Ok(post),
            from => Err(QuotaError::InvalidTransition {
                post_id: post_id.to_string(),
                from,
                to: PostStatus::Failed,
            }),
        }
    }

    pub async fn get_post(&self, user_id: &str, post_id: &str) -> Result<Post> {
        let mut conn = self.db.acquire().await?;
        fetch_post(&mut conn, user_id, post_id)
            .await?
            .ok_or_else(|| QuotaError::NotFound(format!("Post {}", post_id)))
    }

    /// Posts of a user, newest first, optionally filtered by status
    pub async fn list_posts(&self, user_id: &str, status: Option<PostStatus>) -> Result<Vec<Post>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    r#"
                    SELECT * FROM posts
                    WHERE user_id = ? AND status = ?
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(user_id)
                .bind(status.as_str())
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM posts WHERE user_id = ? ORDER BY created_at DESC")
                    .bind(user_id)
                    .fetch_all(&self.db)
                    .await?
            }
        };

        rows.into_iter().map(row_to_post).collect()
    }

    /// Current quota snapshot.
    ///
    /// Reading is the moment an expired cycle gets rolled forward, so the only
    /// write this may perform is persisting the new cycle start.
    pub async fn get_quota_status(&self, user_id: &str) -> Result<QuotaStatus> {
        let mut conn = self.db.acquire().await?;
        let quota = load_user(&mut conn, user_id).await?;
        let quota = ensure_current_cycle(&mut conn, quota, Utc::now(), None).await?;
        Ok(quota_status(&quota))
    }

    /// Posts the user can still publish this cycle
    pub async fn remaining_posts(&self, user_id: &str) -> Result<i64> {
        Ok(self.get_quota_status(user_id).await?.remaining_posts)
    }

    /// Recompute the published count from `posts` and compare it with the ledger.
    ///
    /// Mismatches are logged and reported, never repaired here.
    pub async fn validate_quota(&self, user_id: &str) -> Result<QuotaValidation> {
        let mut conn = self.db.acquire().await?;
        let quota = load_user(&mut conn, user_id).await?;
        let quota = ensure_current_cycle(&mut conn, quota, Utc::now(), None).await?;
        let window = CycleWindow::starting_at(quota.cycle_start);
        let actual = count_published(&mut conn, user_id, &window, None).await?;

        let mut issues = Vec::new();

        if actual != quota.published_count {
            issues.push(format!(
                "Cached published count {} does not match {} published posts in the current cycle",
                quota.published_count, actual
            ));
        }

        if actual > quota.total_posts_allowed {
            issues.push(format!(
                "{} posts published this cycle exceed the {} plan allowance of {}",
                actual, quota.plan, quota.total_posts_allowed
            ));
        }

        if quota.published_count > quota.total_posts_allowed {
            issues.push(format!(
                "Cached published count {} exceeds the plan allowance of {}",
                quota.published_count, quota.total_posts_allowed
            ));
        }

        if quota.total_posts_allowed != quota.plan.total_posts() {
            issues.push(format!(
                "Allowance {} differs from the {} plan allowance of {}",
                quota.total_posts_allowed,
                quota.plan,
                quota.plan.total_posts()
            ));
        }

        let valid = issues.is_empty();
        if !valid {
            warn!(user_id = %user_id, issues = ?issues, "Quota integrity check failed");
        }

        Ok(QuotaValidation { valid, issues })
    }

    /// [`QuotaService::validate_quota`] with a failed check turned into
    /// [`QuotaError::Integrity`]
    pub async fn ensure_consistent(&self, user_id: &str) -> Result<QuotaValidation> {
        let validation = self.validate_quota(user_id).await?;
        if validation.valid {
            Ok(validation)
        } else {
            Err(QuotaError::Integrity {
                user_id: user_id.to_string(),
                issues: validation.issues,
            })
        }
    }

    /// Explicit repair: overwrite the cached count and allowance with values
    /// recomputed from `posts` and the plan
    pub async fn repair_quota(&self, user_id: &str) -> Result<QuotaStatus> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        // Writing first takes the database write lock before anything is read
        let touched = sqlx::query("UPDATE users SET updated_at = ? WHERE id = ?")
            .bind(format_timestamp(now))
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if touched == 0 {
            return Err(QuotaError::NotFound(format!("User {}", user_id)));
        }

        let quota = load_user(&mut tx, user_id).await?;
        let quota = ensure_current_cycle(&mut tx, quota, now, None).await?;
        let window = CycleWindow::starting_at(quota.cycle_start);
        let actual = count_published(&mut tx, user_id, &window, None).await?;

        sqlx::query(
            r#"
            UPDATE users
            SET published_count = ?, total_posts_allowed = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(actual)
        .bind(quota.plan.total_posts())
        .bind(format_timestamp(now))
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let repaired = load_user(&mut tx, user_id).await?;
        tx.commit().await?;

        info!(
            user_id = %user_id,
            previous = quota.published_count,
            published = actual,
            "Quota ledger repaired"
        );

        Ok(quota_status(&repaired))
    }
}

fn quota_status(quota: &UserQuota) -> QuotaStatus {
    QuotaStatus {
        user_id: quota.user_id.clone(),
        plan: quota.plan,
        total_posts: quota.total_posts_allowed,
        published_posts: quota.published_count,
        remaining_posts: quota.remaining_posts(),
        cycle_start: quota.cycle_start,
        cycle_end: cycle::cycle_end(quota.cycle_start),
    }
}

async fn load_user(conn: &mut SqliteConnection, user_id: &str) -> Result<UserQuota> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => row_to_user(row),
        None => Err(QuotaError::NotFound(format!("User {}", user_id))),
    }
}

async fn fetch_post(
    conn: &mut SqliteConnection,
    user_id: &str,
    post_id: &str,
) -> Result<Option<Post>> {
    let row = sqlx::query("SELECT * FROM posts WHERE id = ? AND user_id = ?")
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(row_to_post).transpose()
}

/// Published posts of `user_id` inside `window`, optionally leaving one post out
async fn count_published(
    conn: &mut SqliteConnection,
    user_id: &str,
    window: &CycleWindow,
    exclude_post: Option<&str>,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM posts
        WHERE user_id = ? AND status = 'published'
          AND published_at >= ? AND published_at < ?
          AND id != ?
        "#,
    )
    .bind(user_id)
    .bind(format_timestamp(window.start))
    .bind(format_timestamp(window.end))
    .bind(exclude_post.unwrap_or(""))
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

/// Roll an expired cycle forward to the window containing `now`.
///
/// The new count is taken from `posts` in the same statement. `exclude_post`
/// leaves out a post whose deduction is still pending in the caller's
/// transaction. The update only applies if the stored start is unchanged.
async fn ensure_current_cycle(
    conn: &mut SqliteConnection,
    quota: UserQuota,
    now: DateTime<Utc>,
    exclude_post: Option<&str>,
) -> Result<UserQuota> {
    if !cycle::needs_roll(quota.cycle_start, now) {
        return Ok(quota);
    }

    let window = cycle::current_cycle(quota.cycle_start, now);

    let result = sqlx::query(
        r#"
        UPDATE users
        SET cycle_start = ?,
            published_count = (
                SELECT COUNT(*) FROM posts
                WHERE posts.user_id = users.id
                  AND posts.status = 'published'
                  AND posts.published_at >= ?
                  AND posts.published_at < ?
                  AND posts.id != ?
            ),
            updated_at = ?
        WHERE id = ? AND cycle_start = ?
        "#,
    )
    .bind(format_timestamp(window.start))
    .bind(format_timestamp(window.start))
    .bind(format_timestamp(window.end))
    .bind(exclude_post.unwrap_or(""))
    .bind(format_timestamp(now))
    .bind(&quota.user_id)
    .bind(format_timestamp(quota.cycle_start))
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        info!(
            user_id = %quota.user_id,
            previous_start = %quota.cycle_start,
            cycle_start = %window.start,
            "Quota cycle rolled forward"
        );
    }

    load_user(conn, &quota.user_id).await
}

fn row_to_user(row: SqliteRow) -> Result<UserQuota> {
    let plan: String = row.try_get("subscription_plan")?;
    let cycle_start: String = row.try_get("cycle_start")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(UserQuota {
        user_id: row.try_get("id")?,
        plan: plan
            .parse()
            .map_err(|_| QuotaError::Parse(format!("Unknown plan in ledger: {}", plan)))?,
        cycle_start: parse_timestamp(&cycle_start)?,
        total_posts_allowed: row.try_get("total_posts_allowed")?,
        published_count: row.try_get("published_count")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_post(row: SqliteRow) -> Result<Post> {
    let platform: String = row.try_get("platform")?;
    let status: String = row.try_get("status")?;
    let scheduled_for: Option<String> = row.try_get("scheduled_for")?;
    let published_at: Option<String> = row.try_get("published_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Post {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        platform: platform
            .parse()
            .map_err(|_| QuotaError::Parse(format!("Unknown platform in posts: {}", platform)))?,
        content: row.try_get("content")?,
        status: status.parse()?,
        scheduled_for: scheduled_for.as_deref().map(parse_timestamp).transpose()?,
        published_at: published_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
