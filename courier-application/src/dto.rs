use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 数据传输对象（DTO）
///
/// - 作为应用层的输出载体，面向接口/外部系统序列化友好；
/// - 与领域模型解耦，避免将领域对象直接暴露到接口层。
pub trait Dto: Serialize + Send + Sync + 'static {}

/// 发送短信的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendSmsResult {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub external_sid: Option<String>,
    /// 运营商最后报告的状态
    pub status: String,
    pub delivery_status: String,
    pub retry_count: u32,
    pub delivery_poll_count: u32,
    pub request_id: Option<String>,
}

impl Dto for SendSmsResult {}
