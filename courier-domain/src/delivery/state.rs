//! 投递状态机
//!
//! 提交与轮询是两个嵌套的有界退避状态机，各自以状态枚举与纯转移函数建模，
//! 不涉及等待与 I/O，便于单独验证重试上限的边界情况。
//!
//! ```text
//! Submitting ──429──▶ Backoff(RateLimited) ──wait──▶ Submitting ──2xx──▶ Accepted
//!      │                                                  │
//!      └──────── 非 2xx / 重试耗尽 ────────────────────────┴──▶ Failed
//!
//! Polling ──终态──▶ Settled
//!    │
//!    └── 达到轮询上限 ──▶ Exhausted      非 2xx ──▶ Failed
//! ```
//!
use super::carrier::{CarrierErrorDetail, CarrierResponse};
use super::record::DeliveryRecord;
use crate::error::{DomainError, DomainResult};
use std::time::Duration;
use tracing::warn;

/// 退避与上限配置
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// 指数退避基准：第 n 次等待为 `base_delay * 2^n`（n 从 1 开始）
    pub base_delay: Duration,
    /// 限流/网络故障时的最大重试次数
    pub max_rate_limit_retries: u32,
    /// 最大状态轮询次数
    pub max_delivery_polls: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_rate_limit_retries: 5,
            max_delivery_polls: 5,
        }
    }
}

impl DeliveryConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// 进入退避的原因
#[derive(Debug, Clone, PartialEq)]
pub enum RetryCause {
    RateLimited(CarrierErrorDetail),
    Transport(String),
}

/// 提交阶段
#[derive(Debug)]
pub enum SubmitState {
    /// 待（重新）提交
    Submitting { retry_count: u32 },
    /// 等待 `delay` 后重新提交
    Backoff {
        retry_count: u32,
        delay: Duration,
        cause: RetryCause,
    },
    /// 运营商已受理
    Accepted {
        retry_count: u32,
        record: DeliveryRecord,
        response: CarrierResponse,
    },
    /// 终态失败
    Failed { retry_count: u32, error: DomainError },
}

impl SubmitState {
    pub fn start() -> Self {
        SubmitState::Submitting { retry_count: 0 }
    }

    pub fn retry_count(&self) -> u32 {
        match self {
            SubmitState::Submitting { retry_count }
            | SubmitState::Backoff { retry_count, .. }
            | SubmitState::Accepted { retry_count, .. }
            | SubmitState::Failed { retry_count, .. } => *retry_count,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            SubmitState::Accepted { .. } | SubmitState::Failed { .. }
        )
    }

    /// 处理一次提交结果；仅在 `Submitting` 状态下有效，其余状态原样返回
    pub fn on_outcome(self, outcome: DomainResult<CarrierResponse>, config: &DeliveryConfig) -> Self {
        let SubmitState::Submitting { retry_count } = self else {
            return self;
        };

        match outcome {
            Ok(response) if response.is_rate_limited() => {
                let detail = response.error_detail();
                if retry_count < config.max_rate_limit_retries {
                    let next = retry_count + 1;
                    SubmitState::Backoff {
                        retry_count: next,
                        delay: config.backoff(next),
                        cause: RetryCause::RateLimited(detail),
                    }
                } else {
                    SubmitState::Failed {
                        retry_count,
                        error: DomainError::RateLimitExhausted {
                            retries: retry_count,
                            code: detail.code,
                            message: detail.message,
                        },
                    }
                }
            }
            Ok(response) if response.is_success() => {
                match DeliveryRecord::from_response(&response) {
                    Ok(record) => SubmitState::Accepted {
                        retry_count,
                        record,
                        response,
                    },
                    Err(error) => SubmitState::Failed { retry_count, error },
                }
            }
            Ok(response) => {
                let detail = response.error_detail();
                SubmitState::Failed {
                    retry_count,
                    error: DomainError::CarrierRejected {
                        status_code: response.status_code(),
                        code: detail.code,
                        message: detail.message,
                        more_info: detail.more_info,
                    },
                }
            }
            Err(error) if error.is_connectivity() && retry_count < config.max_rate_limit_retries => {
                let next = retry_count + 1;
                SubmitState::Backoff {
                    retry_count: next,
                    delay: config.backoff(next),
                    cause: RetryCause::Transport(error.to_string()),
                }
            }
            Err(error) => SubmitState::Failed { retry_count, error },
        }
    }

    /// 退避等待结束，回到 `Submitting`
    pub fn resume(self) -> Self {
        match self {
            SubmitState::Backoff { retry_count, .. } => SubmitState::Submitting { retry_count },
            other => other,
        }
    }
}

/// 轮询阶段
#[derive(Debug)]
pub enum PollState {
    /// 状态未终结，仍可继续轮询
    Polling {
        poll_count: u32,
        record: DeliveryRecord,
    },
    /// 观察到终态
    Settled {
        poll_count: u32,
        record: DeliveryRecord,
    },
    /// 轮询次数耗尽，保留最后一次观察到的状态
    Exhausted {
        poll_count: u32,
        record: DeliveryRecord,
    },
    /// 状态查询被运营商拒绝
    Failed { poll_count: u32, error: DomainError },
}

impl PollState {
    pub fn begin(record: DeliveryRecord, config: &DeliveryConfig) -> Self {
        Self::classify(0, record, config)
    }

    fn classify(poll_count: u32, record: DeliveryRecord, config: &DeliveryConfig) -> Self {
        if record.status.is_terminal() {
            PollState::Settled { poll_count, record }
        } else if poll_count >= config.max_delivery_polls {
            PollState::Exhausted { poll_count, record }
        } else {
            PollState::Polling { poll_count, record }
        }
    }

    pub fn poll_count(&self) -> u32 {
        match self {
            PollState::Polling { poll_count, .. }
            | PollState::Settled { poll_count, .. }
            | PollState::Exhausted { poll_count, .. }
            | PollState::Failed { poll_count, .. } => *poll_count,
        }
    }

    /// 下一次轮询前的等待；非 `Polling` 状态返回 None
    pub fn next_delay(&self, config: &DeliveryConfig) -> Option<Duration> {
        match self {
            PollState::Polling { poll_count, .. } => Some(config.backoff(poll_count + 1)),
            _ => None,
        }
    }

    pub fn carrier_ref(&self) -> Option<&str> {
        match self {
            PollState::Polling { record, .. }
            | PollState::Settled { record, .. }
            | PollState::Exhausted { record, .. } => Some(&record.carrier_ref),
            PollState::Failed { .. } => None,
        }
    }

    /// 处理一次状态查询结果。
    ///
    /// 网络故障、限流与无法解析的主体只消耗一次轮询机会，保留上次记录；
    /// 其余非 2xx 响应转为 `Failed`。
    pub fn on_outcome(self, outcome: DomainResult<CarrierResponse>, config: &DeliveryConfig) -> Self {
        let PollState::Polling { poll_count, record } = self else {
            return self;
        };
        let poll_count = poll_count + 1;

        let record = match outcome {
            Ok(response) if response.is_success() => match DeliveryRecord::from_response(&response) {
                Ok(updated) => updated,
                Err(e) => {
                    warn!(error = %e, carrier_ref = %record.carrier_ref, "unparseable status response");
                    record
                }
            },
            Ok(response) if response.is_rate_limited() => {
                warn!(carrier_ref = %record.carrier_ref, poll_count, "status poll rate limited");
                record
            }
            Ok(response) => {
                let detail = response.error_detail();
                return PollState::Failed {
                    poll_count,
                    error: DomainError::CarrierRejected {
                        status_code: response.status_code(),
                        code: detail.code,
                        message: detail.message,
                        more_info: detail.more_info,
                    },
                };
            }
            Err(e) if e.is_connectivity() => {
                warn!(error = %e, carrier_ref = %record.carrier_ref, poll_count, "status poll failed");
                record
            }
            Err(error) => return PollState::Failed { poll_count, error },
        };

        Self::classify(poll_count, record, config)
    }
}
