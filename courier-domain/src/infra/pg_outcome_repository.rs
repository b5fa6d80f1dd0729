//! Postgres 投递结果仓储：按 id 写入 `messages` 表
//!
use crate::error::{DomainError, DomainResult as Result};
use crate::persist::{DeliveryOutcome, DeliveryOutcomeRepository};
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use uuid::Uuid;

const UPSERT_MESSAGE: &str = r#"
INSERT INTO messages (
    id, to_contact, from_contact, body, type, timestamp, status, conversation_id,
    external_sid, direction, error_code, error_message, num_media, num_segments,
    price, price_unit, date_sent, date_updated
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
ON CONFLICT (id) DO UPDATE SET
    status = EXCLUDED.status,
    external_sid = EXCLUDED.external_sid,
    direction = EXCLUDED.direction,
    error_code = EXCLUDED.error_code,
    error_message = EXCLUDED.error_message,
    num_media = EXCLUDED.num_media,
    num_segments = EXCLUDED.num_segments,
    price = EXCLUDED.price,
    price_unit = EXCLUDED.price_unit,
    date_sent = EXCLUDED.date_sent,
    date_updated = EXCLUDED.date_updated
RETURNING id
"#;

#[derive(Clone)]
pub struct PgDeliveryOutcomeRepository {
    pool: PgPool,
}

impl PgDeliveryOutcomeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// messages 表的整数列为 INTEGER，越界时报错而不是截断
fn int4<T>(column: &str, value: T) -> Result<i32>
where
    T: TryInto<i32> + Copy + std::fmt::Display,
{
    value.try_into().map_err(|_| DomainError::Parse {
        reason: format!("{column}={value} does not fit an INTEGER column"),
    })
}

#[async_trait]
impl DeliveryOutcomeRepository for PgDeliveryOutcomeRepository {
    async fn save_delivery_outcome(&self, outcome: &DeliveryOutcome) -> Result<Uuid> {
        let stored: Uuid = sqlx::query_scalar(UPSERT_MESSAGE)
            .bind(outcome.id())
            .bind(outcome.to_contact())
            .bind(outcome.from_contact())
            .bind(outcome.body())
            .bind(outcome.kind().as_str())
            .bind(outcome.timestamp().naive_utc())
            .bind(outcome.status())
            .bind(outcome.conversation_id())
            .bind(outcome.external_sid())
            .bind(outcome.direction())
            .bind(outcome.error_code().map(|c| int4("error_code", c)).transpose()?)
            .bind(outcome.error_message())
            .bind(int4("num_media", outcome.num_media())?)
            .bind(int4("num_segments", outcome.num_segments())?)
            .bind(outcome.price())
            .bind(outcome.price_unit())
            .bind(outcome.date_sent().map(|d| d.naive_utc()))
            .bind(outcome.date_updated().map(|d| d.naive_utc()))
            .fetch_one(&self.pool)
            .await?;
        Ok(stored)
    }
}
