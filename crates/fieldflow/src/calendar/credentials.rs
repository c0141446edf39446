use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

pub const REFRESH_TOKEN_KEY: &str = "google_refresh_token";
pub const CONNECTED_KEY: &str = "google_calendar_connected";

fn config_keys() -> Vec<String> {
    vec![REFRESH_TOKEN_KEY.to_string(), CONNECTED_KEY.to_string()]
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarConnection {
    pub connected: bool,
    pub connected_at: Option<DateTime<Utc>>,
}

/// The persisted calendar credential, kept in `system_config`.
#[derive(Clone)]
pub struct CalendarCredentials {
    pool: PgPool,
}

impl CalendarCredentials {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The refresh token, if the calendar is connected.
    pub async fn refresh_token(&self) -> anyhow::Result<Option<String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, value FROM system_config WHERE key = ANY($1)",
        )
        .bind(config_keys())
        .fetch_all(&self.pool)
        .await?;

        let connected = rows
            .iter()
            .any(|(k, v)| k == CONNECTED_KEY && v == "true");
        let token = rows
            .into_iter()
            .find(|(k, v)| k == REFRESH_TOKEN_KEY && !v.trim().is_empty())
            .map(|(_, v)| v);

        Ok(token.filter(|_| connected))
    }

    pub async fn status(&self) -> anyhow::Result<CalendarConnection> {
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT value, updated_at FROM system_config WHERE key = $1",
        )
        .bind(CONNECTED_KEY)
        .fetch_optional(&self.pool)
        .await?;

        let connected = self.refresh_token().await?.is_some();
        Ok(CalendarConnection {
            connected,
            connected_at: row.filter(|_| connected).map(|(_, at)| at),
        })
    }

    /// Store a refresh token obtained from the external authorization flow.
    pub async fn connect(&self, refresh_token: &str) -> anyhow::Result<()> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            anyhow::bail!("refresh token is empty");
        }

        let mut tx = self.pool.begin().await?;
        for (key, value) in [(REFRESH_TOKEN_KEY, refresh_token), (CONNECTED_KEY, "true")] {
            sqlx::query(
                r#"
                INSERT INTO system_config (key, value, updated_at)
                VALUES ($1, $2, now())
                ON CONFLICT (key) DO UPDATE
                  SET value = EXCLUDED.value, updated_at = now()
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!("calendar connected");
        Ok(())
    }

    pub async fn disconnect(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM system_config WHERE key = ANY($1)")
            .bind(config_keys())
            .execute(&self.pool)
            .await?;

        tracing::info!("calendar disconnected");
        Ok(())
    }
}
