use crate::model::PunchEvent;
use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use thiserror::Error;

/// Rows per INSERT statement; keeps well under MySQL's placeholder limit.
const UPSERT_CHUNK: usize = 1_000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Idempotent sink for raw punches, keyed by terminal serial.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Returns the number of rows sent.
    async fn upsert(&self, punches: &[PunchEvent]) -> Result<usize, StoreError>;
}

pub struct MySqlLogStore {
    pool: MySqlPool,
}

impl MySqlLogStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogStore for MySqlLogStore {
    async fn upsert(&self, punches: &[PunchEvent]) -> Result<usize, StoreError> {
        if punches.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for chunk in punches.chunks(UPSERT_CHUNK) {
            let mut query: QueryBuilder<MySql> = QueryBuilder::new(
                "INSERT INTO attendance_logs (sn, user_id, name, record_time, type, state, device_id) ",
            );
            query.push_values(chunk, |mut row, punch| {
                row.push_bind(punch.sn)
                    .push_bind(&punch.employee_id)
                    .push_bind(&punch.name)
                    .push_bind(punch.record_time)
                    .push_bind(punch.verify_type)
                    .push_bind(punch.state)
                    .push_bind(&punch.device_id);
            });
            query.push(
                " ON DUPLICATE KEY UPDATE \
                 user_id = VALUES(user_id), \
                 name = VALUES(name), \
                 record_time = VALUES(record_time), \
                 type = VALUES(type), \
                 state = VALUES(state), \
                 device_id = VALUES(device_id)",
            );
            query.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(punches.len())
    }
}
