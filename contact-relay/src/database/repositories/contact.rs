//! Contact submission repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::ContactSubmissionDbModel;
use crate::{Error, Result};

/// Contact submission repository trait.
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn create(&self, submission: &ContactSubmissionDbModel) -> Result<()>;
    async fn get(&self, id: &str) -> Result<ContactSubmissionDbModel>;
    async fn list_recent(&self, limit: i64) -> Result<Vec<ContactSubmissionDbModel>>;
    async fn count(&self) -> Result<i64>;
}

/// SQLx implementation of ContactRepository.
pub struct SqlxContactRepository {
    pool: SqlitePool,
}

impl SqlxContactRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for SqlxContactRepository {
    async fn create(&self, submission: &ContactSubmissionDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contact_submission (
                id, name, email, service, budget, deadline, message, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&submission.id)
        .bind(&submission.name)
        .bind(&submission.email)
        .bind(&submission.service)
        .bind(&submission.budget)
        .bind(&submission.deadline)
        .bind(&submission.message)
        .bind(submission.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<ContactSubmissionDbModel> {
        sqlx::query_as::<_, ContactSubmissionDbModel>(
            "SELECT * FROM contact_submission WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("ContactSubmission", id))
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<ContactSubmissionDbModel>> {
        let rows = sqlx::query_as::<_, ContactSubmissionDbModel>(
            "SELECT * FROM contact_submission ORDER BY created_at DESC, id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contact_submission")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
