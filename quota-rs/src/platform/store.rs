//! Credential store - persists one credential per user and platform

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::platform::types::{Platform, PlatformCredential};
use crate::utils::{format_timestamp, parse_timestamp};

pub struct CredentialStore {
    db: SqlitePool,
}

impl CredentialStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS platform_credentials (
                user_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, platform)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Store a credential, replacing any previous one for the same platform
    pub async fn upsert(
        &self,
        user_id: &str,
        credential: &PlatformCredential,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_credentials (
                user_id, platform, token, refresh_token, expires_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                token = excluded.token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(credential.platform.as_str())
        .bind(&credential.token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at.map(format_timestamp))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn get(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<PlatformCredential>> {
        let row = sqlx::query(
            r#"
            SELECT platform, token, refresh_token, expires_at
            FROM platform_credentials
            WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.db)
        .await?;

        row.map(row_to_credential).transpose()
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<PlatformCredential>> {
        let rows = sqlx::query(
            r#"
            SELECT platform, token, refresh_token, expires_at
            FROM platform_credentials
            WHERE user_id = ?
            ORDER BY platform
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(row_to_credential).collect()
    }

    /// Credentials of all users that expire before `before`, as (user_id, credential)
    pub async fn list_expiring(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<(String, PlatformCredential)>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, platform, token, refresh_token, expires_at
            FROM platform_credentials
            WHERE expires_at IS NOT NULL AND expires_at < ?
            ORDER BY expires_at
            "#,
        )
        .bind(format_timestamp(before))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<(String, PlatformCredential)> {
                let user_id: String = row.try_get("user_id")?;
                Ok((user_id, row_to_credential(row)?))
            })
            .collect()
    }
}

fn row_to_credential(row: SqliteRow) -> Result<PlatformCredential> {
    let platform: String = row.try_get("platform")?;
    let expires_at: Option<String> = row.try_get("expires_at")?;

    Ok(PlatformCredential {
        platform: platform.parse()?,
        token: row.try_get("token")?,
        refresh_token: row.try_get("refresh_token")?,
        expires_at: expires_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn setup_store() -> CredentialStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = CredentialStore::new(pool);
        store.init_db().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = setup_store().await;

        assert!(store.get("u1", Platform::Instagram).await.unwrap().is_none());

        let mut credential = PlatformCredential::new(Platform::Instagram, "ig-token");
        credential.refresh_token = Some("ig-refresh".to_string());
        store.upsert("u1", &credential).await.unwrap();

        let stored = store.get("u1", Platform::Instagram).await.unwrap().unwrap();
        assert_eq!(stored, credential);
    }

    #[tokio::test]
    async fn test_upsert_replaces_token() {
        let store = setup_store().await;

        store
            .upsert("u1", &PlatformCredential::new(Platform::X, "old"))
            .await
            .unwrap();
        store
            .upsert("u1", &PlatformCredential::new(Platform::X, "new"))
            .await
            .unwrap();

        let all = store.list_for_user("u1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].token, "new");
    }

    #[tokio::test]
    async fn test_list_expiring() {
        let store = setup_store().await;
        let now = Utc::now();

        let mut soon = PlatformCredential::new(Platform::Facebook, "fb");
        soon.expires_at = Some(now + Duration::hours(1));
        let mut later = PlatformCredential::new(Platform::YouTube, "yt");
        later.expires_at = Some(now + Duration::days(30));
        let forever = PlatformCredential::new(Platform::LinkedIn, "li");

        store.upsert("u1", &soon).await.unwrap();
        store.upsert("u2", &later).await.unwrap();
        store.upsert("u2", &forever).await.unwrap();

        let expiring = store.list_expiring(now + Duration::days(1)).await.unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].0, "u1");
        assert_eq!(expiring[0].1.platform, Platform::Facebook);
    }
}
