// crates/db/src/queries/services.rs
// Service registry: name -> service entity lookups for route resolution.

use async_trait::async_trait;
use chrono::Utc;

use jobtrail_core::{Service, ServiceDirectory};

use crate::{Database, DbError, DbResult};

impl Database {
    /// Register a service name, updating the description when the name is
    /// already present. The original id and registration time survive
    /// re-registration.
    pub async fn upsert_service(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> DbResult<Service> {
        if name.trim().is_empty() {
            return Err(DbError::MissingServiceName);
        }
        let created_at = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO services (name, description, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET description = excluded.description
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(created_at)
        .execute(self.pool())
        .await?;

        self.find_service_by_name(name)
            .await?
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
    }

    /// Look up one service by exact name.
    pub async fn find_service_by_name(&self, name: &str) -> DbResult<Option<Service>> {
        let row: Option<(i64, String, Option<String>, i64)> = sqlx::query_as(
            "SELECT id, name, description, created_at FROM services WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(id, name, description, created_at)| Service {
            id,
            name,
            description,
            created_at,
        }))
    }

    /// All registered services, ordered by name.
    pub async fn list_services(&self) -> DbResult<Vec<Service>> {
        let rows: Vec<(i64, String, Option<String>, i64)> = sqlx::query_as(
            "SELECT id, name, description, created_at FROM services ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, description, created_at)| Service {
                id,
                name,
                description,
                created_at,
            })
            .collect())
    }
}

#[async_trait]
impl ServiceDirectory for Database {
    type Error = DbError;

    async fn find_by_name(&self, name: &str) -> Result<Option<Service>, DbError> {
        self.find_service_by_name(name).await
    }
}
