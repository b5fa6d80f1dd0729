//! 领域层统一错误定义
//!
//! 覆盖变更通知、运营商投递、持久化与配置等最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化/解析 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },

    // --- 变更通知 ---
    #[error("listener connection error: {reason}")]
    Connection { reason: String },
    #[error("malformed notification: channel={channel}, reason={reason}")]
    MalformedNotification { channel: String, reason: String },

    // --- 运营商投递 ---
    #[error("carrier transport error: {reason}")]
    CarrierTransport { reason: String },
    #[error(
        "carrier rejected request: status={status_code}, code={code:?}, message={message}, more_info={more_info:?}"
    )]
    CarrierRejected {
        status_code: u16,
        code: Option<i64>,
        message: String,
        more_info: Option<String>,
    },
    #[error("carrier rate limit exhausted after {retries} retries: code={code:?}, message={message}")]
    RateLimitExhausted {
        retries: u32,
        code: Option<i64>,
        message: String,
    },
    #[error("invalid carrier response: {reason}")]
    InvalidCarrierResponse { reason: String },

    // --- 持久化 ---
    #[error("database error: {reason}")]
    Database { reason: String },

    // --- 通用 ---
    #[error("config error: {reason}")]
    Config { reason: String },
}

impl DomainError {
    pub fn connection(reason: impl Into<String>) -> Self {
        DomainError::Connection {
            reason: reason.into(),
        }
    }

    pub fn carrier_transport(reason: impl Into<String>) -> Self {
        DomainError::CarrierTransport {
            reason: reason.into(),
        }
    }

    /// 是否为可重试的连接类错误（监听连接断开、运营商网络故障）
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            DomainError::Connection { .. } | DomainError::CarrierTransport { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx/reqwest/uuid 等错误转换为 DomainError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(e) => DomainError::Connection {
                reason: e.to_string(),
            },
            pool @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
                DomainError::Connection {
                    reason: pool.to_string(),
                }
            }
            other => DomainError::Database {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(feature = "infra-reqwest")]
impl From<reqwest::Error> for DomainError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DomainError::InvalidCarrierResponse {
                reason: err.to_string(),
            }
        } else {
            DomainError::CarrierTransport {
                reason: err.to_string(),
            }
        }
    }
}

impl From<uuid::Error> for DomainError {
    fn from(err: uuid::Error) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}

impl From<std::num::ParseIntError> for DomainError {
    fn from(err: std::num::ParseIntError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}

impl From<std::num::ParseFloatError> for DomainError {
    fn from(err: std::num::ParseFloatError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for DomainError {
    fn from(err: chrono::ParseError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}
