use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{types::Json, PgPool};

use crate::core::error::{AppError, Result};

/// Named pieces of durable controller state, one row each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateSlot {
    Lock,
    Logs,
    LastSuccess,
    RollbackRef,
    DeployMeter,
}

impl StateSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            StateSlot::Lock => "lock",
            StateSlot::Logs => "logs",
            StateSlot::LastSuccess => "lastSuccess",
            StateSlot::RollbackRef => "rollbackRef",
            StateSlot::DeployMeter => "deployMeter",
        }
    }
}

/// Durable key/value storage behind each deploy controller
#[async_trait]
pub trait DeployStateStore: Send + Sync {
    async fn get(&self, target: &str, slot: StateSlot) -> Result<Option<serde_json::Value>>;

    async fn put(&self, target: &str, slot: StateSlot, value: serde_json::Value) -> Result<()>;

    async fn delete(&self, target: &str, slot: StateSlot) -> Result<()>;
}

/// Read and decode a slot, `None` when it has never been written
pub async fn load_slot<T: DeserializeOwned>(
    store: &dyn DeployStateStore,
    target: &str,
    slot: StateSlot,
) -> Result<Option<T>> {
    match store.get(target, slot).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encode and write a slot
pub async fn save_slot<T: Serialize>(
    store: &dyn DeployStateStore,
    target: &str,
    slot: StateSlot,
    value: &T,
) -> Result<()> {
    store
        .put(target, slot, serde_json::to_value(value)?)
        .await
}

pub struct PgDeployStateStore {
    pool: PgPool,
}

impl PgDeployStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeployStateStore for PgDeployStateStore {
    async fn get(&self, target: &str, slot: StateSlot) -> Result<Option<serde_json::Value>> {
        let value: Option<Json<serde_json::Value>> = sqlx::query_scalar(
            r#"
            SELECT value
            FROM deploy_controller_state
            WHERE target = $1
              AND slot = $2
            "#,
        )
        .bind(target)
        .bind(slot.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                "Failed to read deploy state '{}' for {}: {:?}",
                slot.as_str(),
                target,
                e
            );
            AppError::Database(e)
        })?;

        Ok(value.map(|Json(v)| v))
    }

    async fn put(&self, target: &str, slot: StateSlot, value: serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO deploy_controller_state (target, slot, value, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (target, slot)
            DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(target)
        .bind(slot.as_str())
        .bind(Json(value))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                "Failed to write deploy state '{}' for {}: {:?}",
                slot.as_str(),
                target,
                e
            );
            AppError::Database(e)
        })?;

        Ok(())
    }

    async fn delete(&self, target: &str, slot: StateSlot) -> Result<()> {
        sqlx::query("DELETE FROM deploy_controller_state WHERE target = $1 AND slot = $2")
            .bind(target)
            .bind(slot.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to clear deploy state '{}' for {}: {:?}",
                    slot.as_str(),
                    target,
                    e
                );
                AppError::Database(e)
            })?;

        Ok(())
    }
}
