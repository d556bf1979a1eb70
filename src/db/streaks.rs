//! Streak state persistence: one row per scope, counters as a JSONB object.

use async_trait::async_trait;
use sqlx::types::Json;

use crate::error::{Error, Result};
use crate::model::{ScopeKey, StreakMap};
use crate::storage::StateStore;

#[async_trait]
impl StateStore for super::Db {
    async fn get(&self, scope: &ScopeKey) -> Result<StreakMap> {
        let scope_str = scope.to_string();
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT streaks FROM consequent_workable_blocks WHERE scope = $1")
                .bind(&scope_str)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::StateRead {
                    scope: scope_str.clone(),
                    source: e.into(),
                })?;

        let Some((streaks,)) = row else {
            return Ok(StreakMap::new());
        };

        // Negative or non-integer counters fail here as a malformed record.
        serde_json::from_value(streaks).map_err(|e| Error::StateRead {
            scope: scope_str,
            source: e.into(),
        })
    }

    async fn put(&self, scope: &ScopeKey, streaks: &StreakMap) -> Result<()> {
        let scope_str = scope.to_string();
        sqlx::query(
            "INSERT INTO consequent_workable_blocks (scope, streaks, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (scope) DO UPDATE
             SET streaks = EXCLUDED.streaks, updated_at = EXCLUDED.updated_at",
        )
        .bind(&scope_str)
        .bind(Json(streaks))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::StateWrite {
            scope: scope_str,
            source: e.into(),
        })?;
        Ok(())
    }
}

impl super::Db {
    /// When the counters of `scope` were last written, if ever.
    pub async fn streaks_updated_at(
        &self,
        scope: &ScopeKey,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let row: Option<(chrono::DateTime<chrono::Utc>,)> =
            sqlx::query_as("SELECT updated_at FROM consequent_workable_blocks WHERE scope = $1")
                .bind(scope.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(updated_at,)| updated_at))
    }
}
