use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    clients::NotificationStore,
    models::{notification::NotificationRequest, preferences::UserPreferences},
};

pub struct DatabaseClient {
    client: Client,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }
}

#[async_trait]
impl NotificationStore for DatabaseClient {
    async fn insert(&self, request: &NotificationRequest) -> Result<Uuid, Error> {
        let template_data = serde_json::to_value(&request.template_data)?;
        let metadata = serde_json::to_value(&request.metadata)?;

        let row = self
            .client
            .query_one(
                r#"
                INSERT INTO notifications (
                    user_id,
                    type,
                    channel,
                    subject,
                    message,
                    template_id,
                    template_data,
                    priority,
                    scheduled_at,
                    metadata
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING id
                "#,
                &[
                    &request.user_id,
                    &request.notification_type.as_str(),
                    &request.channel,
                    &request.subject,
                    &request.message,
                    &request.template_id,
                    &template_data,
                    &request.priority.as_str(),
                    &request.scheduled_at,
                    &metadata,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    user_id = %request.user_id,
                    "Failed to write notification to database"
                );
                anyhow!("Database write failed: {}", e)
            })?;

        let id: Uuid = row.try_get("id")?;

        debug!(notification_id = %id, "Notification record written to database");

        Ok(id)
    }

    async fn lookup_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, Error> {
        let row = self
            .client
            .query_opt(
                r#"
                SELECT email_enabled, sms_enabled, push_enabled
                FROM user_preferences
                WHERE user_id = $1
                "#,
                &[&user_id],
            )
            .await
            .map_err(|e| anyhow!("Preference lookup failed: {}", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(UserPreferences {
            user_id: user_id.to_string(),
            email_enabled: row.try_get("email_enabled")?,
            sms_enabled: row.try_get("sms_enabled")?,
            push_enabled: row.try_get("push_enabled")?,
        }))
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}
