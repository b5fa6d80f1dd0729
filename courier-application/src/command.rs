/// 应用层命令（Command）
///
/// 表达“意图”的写操作请求，例如 `SendSms`。
/// - `NAME`：命令的稳定名称，用于日志、追踪与路由，避免依赖 `type_name::<T>()`；
/// - `Output`：处理完成后返回给调用方的结果（通常是一个 DTO）。
pub trait Command: Send + Sync + 'static {
    /// 命令的稳定名称（建议常量字符串，不随重构变化）
    const NAME: &'static str;

    type Output: Send + 'static;
}
