//! 投递管道（DeliveryPipeline）
//!
//! 在一次出站请求的生命周期内完成：提交（限流时指数退避重试）→ 解析标准化记录
//! → 未终结时按指数退避轮询状态 → 终态或轮询耗尽后恰好持久化一次。
//!
//! 退避等待只挂起调用方所在任务；提交或轮询被运营商硬拒绝时直接返回错误，不持久化。
//!
use super::attempt::DeliveryAttempt;
use super::carrier::{Carrier, CarrierResponse, OutboundMessage};
use super::record::{DeliveryRecord, ResponseMeta};
use super::state::{DeliveryConfig, PollState, RetryCause, SubmitState};
use crate::error::{DomainError, DomainResult};
use crate::persist::{DeliveryOutcome, DeliveryOutcomeRepository};
use bon::Builder;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 一次成功投递的回执
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    stored_id: Uuid,
    outcome: DeliveryOutcome,
    meta: ResponseMeta,
}

impl DeliveryReceipt {
    pub fn stored_id(&self) -> Uuid {
        self.stored_id
    }

    pub fn outcome(&self) -> &DeliveryOutcome {
        &self.outcome
    }

    /// 提交响应的请求元信息
    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }
}

#[derive(Builder)]
pub struct DeliveryPipeline {
    carrier: Arc<dyn Carrier>,
    repository: Arc<dyn DeliveryOutcomeRepository>,
    #[builder(default)]
    config: DeliveryConfig,
}

impl DeliveryPipeline {
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub async fn send(&self, message: OutboundMessage) -> DomainResult<DeliveryReceipt> {
        let mut attempt = DeliveryAttempt::new(message);
        debug!(attempt = %attempt.id(), to = attempt.request().to(), "submitting message");

        let (record, response) = self.submit(&mut attempt).await?;
        let meta = ResponseMeta::from_response(&response);
        info!(
            attempt = %attempt.id(),
            carrier_ref = %record.carrier_ref,
            status = %record.status,
            retry_count = attempt.retry_count(),
            request_id = ?meta.request_id,
            concurrent_requests = ?meta.concurrent_requests,
            request_duration = ?meta.request_duration,
            "message accepted by carrier"
        );

        let record = self.await_settlement(&mut attempt, record).await?;

        let outcome = DeliveryOutcome::from_attempt(&attempt, &record, Utc::now());
        let stored_id = self.repository.save_delivery_outcome(&outcome).await?;
        info!(
            attempt = %attempt.id(),
            stored_id = %stored_id,
            status = outcome.status(),
            delivery_poll_count = attempt.delivery_poll_count(),
            "delivery outcome persisted"
        );

        Ok(DeliveryReceipt {
            stored_id,
            outcome,
            meta,
        })
    }

    async fn submit(
        &self,
        attempt: &mut DeliveryAttempt,
    ) -> DomainResult<(DeliveryRecord, CarrierResponse)> {
        let mut state = SubmitState::start();
        loop {
            state = match state {
                SubmitState::Submitting { .. } => {
                    let outcome = self.carrier.submit(attempt.request()).await;
                    state.on_outcome(outcome, &self.config)
                }
                SubmitState::Backoff {
                    retry_count,
                    delay,
                    ref cause,
                } => {
                    match cause {
                        RetryCause::RateLimited(detail) => warn!(
                            attempt = %attempt.id(),
                            retry_count,
                            delay = ?delay,
                            code = ?detail.code,
                            message = %detail.message,
                            "carrier rate limited, backing off"
                        ),
                        RetryCause::Transport(reason) => warn!(
                            attempt = %attempt.id(),
                            retry_count,
                            delay = ?delay,
                            error = %reason,
                            "carrier unreachable, backing off"
                        ),
                    }
                    attempt.rate_limited(retry_count);
                    tokio::time::sleep(delay).await;
                    attempt.resubmitted();
                    state.resume()
                }
                SubmitState::Accepted {
                    retry_count,
                    record,
                    response,
                } => {
                    attempt.accepted(&record.carrier_ref, &record.status, retry_count);
                    return Ok((record, response));
                }
                SubmitState::Failed { retry_count, error } => {
                    attempt.failed(retry_count);
                    log_failure(attempt, &error, "message submission failed");
                    return Err(error);
                }
            };
        }
    }

    async fn await_settlement(
        &self,
        attempt: &mut DeliveryAttempt,
        record: DeliveryRecord,
    ) -> DomainResult<DeliveryRecord> {
        let mut state = PollState::begin(record, &self.config);
        loop {
            state = match state {
                PollState::Polling { poll_count, .. } => {
                    let delay = self.config.backoff(poll_count + 1);
                    let carrier_ref = state.carrier_ref().unwrap_or_default().to_string();
                    debug!(
                        attempt = %attempt.id(),
                        carrier_ref = %carrier_ref,
                        poll = poll_count + 1,
                        delay = ?delay,
                        "waiting before status poll"
                    );
                    tokio::time::sleep(delay).await;
                    let outcome = self.carrier.poll_status(&carrier_ref).await;
                    state.on_outcome(outcome, &self.config)
                }
                PollState::Settled { poll_count, record } => {
                    attempt.observed(&record.status, poll_count);
                    debug!(
                        attempt = %attempt.id(),
                        status = %record.status,
                        poll_count,
                        "delivery settled"
                    );
                    return Ok(record);
                }
                PollState::Exhausted { poll_count, record } => {
                    attempt.observed(&record.status, poll_count);
                    warn!(
                        attempt = %attempt.id(),
                        carrier_ref = %record.carrier_ref,
                        status = %record.status,
                        poll_count,
                        "status polls exhausted before terminal status"
                    );
                    return Ok(record);
                }
                PollState::Failed { poll_count, error } => {
                    attempt.poll_failed(poll_count);
                    log_failure(attempt, &error, "status poll failed");
                    return Err(error);
                }
            };
        }
    }
}

fn log_failure(attempt: &DeliveryAttempt, err: &DomainError, what: &str) {
    match err {
        DomainError::CarrierRejected {
            status_code,
            code,
            message,
            more_info,
        } => error!(
            attempt = %attempt.id(),
            status_code,
            code = ?code,
            message = %message,
            more_info = ?more_info,
            "{what}"
        ),
        other => error!(attempt = %attempt.id(), error = %other, "{what}"),
    }
}
