//! Push subscription repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::PushSubscriptionDbModel;
use crate::Result;

/// Push subscription repository trait.
#[async_trait]
pub trait PushSubscriptionRepository: Send + Sync {
    async fn create(&self, subscription: &PushSubscriptionDbModel) -> Result<()>;
    /// Snapshot of every stored subscription, oldest first.
    async fn list_all(&self) -> Result<Vec<PushSubscriptionDbModel>>;
    /// Delete by record id. Returns `false` if the row was already gone.
    async fn delete(&self, id: &str) -> Result<bool>;
    async fn count(&self) -> Result<i64>;
}

/// SQLx implementation of PushSubscriptionRepository.
pub struct SqlxPushSubscriptionRepository {
    pool: SqlitePool,
}

impl SqlxPushSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PushSubscriptionRepository for SqlxPushSubscriptionRepository {
    async fn create(&self, subscription: &PushSubscriptionDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO push_subscription (id, endpoint, p256dh, auth, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.endpoint)
        .bind(&subscription.p256dh)
        .bind(&subscription.auth)
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<PushSubscriptionDbModel>> {
        let rows = sqlx::query_as::<_, PushSubscriptionDbModel>(
            "SELECT * FROM push_subscription ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM push_subscription WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM push_subscription")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
