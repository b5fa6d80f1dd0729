use bon::Builder;
use uuid::Uuid;

/// 应用层上下文（Application Context）
///
/// 承载一次命令调用所需的横切信息：
/// - 关联追踪 `correlation_id`：贯穿日志，便于串联一次请求；
/// - 幂等键 `idempotency_key`：相同键的重复提交只执行一次。
///
/// 典型用法：
/// ```rust
/// use courier_application::context::AppContext;
///
/// let ctx = AppContext::builder()
///     .correlation_id("cor-123".into())
///     .idempotency_key("idem-xyz".into())
///     .build();
/// assert_eq!(ctx.idempotency_key.as_deref(), Some("idem-xyz"));
/// ```
#[derive(Clone, Debug, Default, Builder)]
pub struct AppContext {
    /// 关联追踪 id（可选）
    pub correlation_id: Option<String>,
    /// 幂等键（可选）：为空则不参与幂等
    pub idempotency_key: Option<String>,
}

impl AppContext {
    /// 生成带随机关联 id 的上下文
    pub fn correlated() -> Self {
        Self {
            correlation_id: Some(Uuid::new_v4().to_string()),
            idempotency_key: None,
        }
    }
}
