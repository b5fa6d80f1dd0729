//! 发送短信用例（SendSms）
//!
//! 校验端点与正文 → 交给投递管道完成提交、退避、轮询与持久化 → 返回 `SendSmsResult`。
//! 携带幂等键的请求在发送前占位：并发或重复的同键请求共享首次成功的结果，不再触达运营商；
//! 发送失败会释放占位。已完成的键按保留时长与数量上限淘汰。
//!
use crate::command::Command;
use crate::command_handler::CommandHandler;
use crate::context::AppContext;
use crate::dto::SendSmsResult;
use crate::error::AppError;
use async_trait::async_trait;
use courier_domain::delivery::{DeliveryPipeline, OutboundMessage};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendSms {
    pub to: String,
    pub from: String,
    pub body: String,
}

impl Command for SendSms {
    const NAME: &'static str = "SendSms";
    type Output = SendSmsResult;
}

impl SendSms {
    fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [("to", &self.to), ("from", &self.from)] {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{field} must not be empty")));
            }
        }
        if self.to.trim() == self.from.trim() {
            return Err(AppError::Validation(
                "to and from must be different endpoints".into(),
            ));
        }
        if self.body.trim().is_empty() {
            return Err(AppError::Validation("body must not be empty".into()));
        }
        Ok(())
    }
}

/// 幂等结果默认保留时长
pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// 幂等键默认上限
pub const DEFAULT_IDEMPOTENCY_CAPACITY: usize = 10_000;

// 键在发送前占位；并发的同键请求等待同一个 OnceCell
struct Reservation {
    reserved_at: Instant,
    cell: Arc<OnceCell<SendSmsResult>>,
}

pub struct SendSmsHandler {
    pipeline: Arc<DeliveryPipeline>,
    reservations: DashMap<String, Reservation>,
    ttl: Duration,
    capacity: usize,
}

impl SendSmsHandler {
    pub fn new(pipeline: Arc<DeliveryPipeline>) -> Self {
        Self {
            pipeline,
            reservations: DashMap::new(),
            ttl: DEFAULT_IDEMPOTENCY_TTL,
            capacity: DEFAULT_IDEMPOTENCY_CAPACITY,
        }
    }

    /// 调整幂等结果的保留时长与键数上限
    pub fn with_idempotency_limits(mut self, ttl: Duration, capacity: usize) -> Self {
        self.ttl = ttl;
        self.capacity = capacity.max(1);
        self
    }

    /// 当前保留的幂等键数量
    pub fn idempotency_keys(&self) -> usize {
        self.reservations.len()
    }

    fn reserve(&self, key: &str) -> Arc<OnceCell<SendSmsResult>> {
        self.evict(key);
        self.reservations
            .entry(key.to_string())
            .or_insert_with(|| Reservation {
                reserved_at: Instant::now(),
                cell: Arc::new(OnceCell::new()),
            })
            .cell
            .clone()
    }

    // 只淘汰已完成的键；进行中的发送必须保持占位
    fn evict(&self, incoming: &str) {
        let ttl = self.ttl;
        self.reservations
            .retain(|_, r| !r.cell.initialized() || r.reserved_at.elapsed() < ttl);

        if self.reservations.contains_key(incoming) {
            return;
        }
        while self.reservations.len() >= self.capacity {
            let oldest = self
                .reservations
                .iter()
                .filter(|r| r.cell.initialized())
                .min_by_key(|r| r.reserved_at)
                .map(|r| r.key().clone());
            let Some(key) = oldest else { break };
            self.reservations.remove(&key);
            debug!(idempotency_key = %key, "evicted idempotency key");
        }
    }

    async fn deliver(&self, ctx: &AppContext, cmd: SendSms) -> Result<SendSmsResult, AppError> {
        let message = OutboundMessage::builder()
            .to(cmd.to.trim().to_string())
            .from(cmd.from.trim().to_string())
            .body(cmd.body)
            .build();

        let receipt = self.pipeline.send(message).await.inspect_err(|e| {
            warn!(
                correlation_id = ?ctx.correlation_id,
                error = %e,
                "send sms failed"
            )
        })?;

        let outcome = receipt.outcome();
        let result = SendSmsResult {
            message_id: receipt.stored_id(),
            conversation_id: outcome.conversation_id(),
            external_sid: outcome.external_sid().map(str::to_string),
            status: outcome.status().to_string(),
            delivery_status: outcome.attempt_status().to_string(),
            retry_count: outcome.retry_count(),
            delivery_poll_count: outcome.delivery_poll_count(),
            request_id: receipt.meta().request_id.clone(),
        };
        info!(
            correlation_id = ?ctx.correlation_id,
            message_id = %result.message_id,
            conversation_id = %result.conversation_id,
            status = %result.status,
            "sms sent"
        );
        Ok(result)
    }
}

#[async_trait]
impl CommandHandler<SendSms> for SendSmsHandler {
    async fn handle(&self, ctx: &AppContext, cmd: SendSms) -> Result<SendSmsResult, AppError> {
        cmd.validate()?;

        let Some(key) = ctx.idempotency_key.as_deref() else {
            return self.deliver(ctx, cmd).await;
        };

        let cell = self.reserve(key);
        if let Some(done) = cell.get() {
            info!(
                idempotency_key = key,
                message_id = %done.message_id,
                "duplicate send request, returning previous result"
            );
            return Ok(done.clone());
        }

        match cell.get_or_try_init(|| self.deliver(ctx, cmd)).await {
            Ok(result) => Ok(result.clone()),
            Err(e) => {
                // 失败不占用键，后续同键请求可以重试
                self.reservations.remove_if(key, |_, r| {
                    Arc::ptr_eq(&r.cell, &cell) && !r.cell.initialized()
                });
                Err(e)
            }
        }
    }
}
