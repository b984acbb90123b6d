use thiserror::Error;

/// The eight error kinds the system distinguishes. PD is the only boundary
/// that converts these into user-facing strings; no other component should
/// stringify an error for a user.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient upstream error: {0}")]
    TransientUpstream(String),

    #[error("fatal upstream error ({status}): {message}")]
    FatalUpstream { status: u16, message: String },

    #[error("degraded: {0}")]
    Degraded(String),

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("render failure: {0}")]
    RenderFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// The string PD shows to the end user. Never includes internal detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            BotError::Validation(_) => "参数有误，请检查指令格式。",
            BotError::NotFound(_) => "未找到相关数据。",
            BotError::TransientUpstream(_) => "服务暂时不可用，请稍后重试。",
            BotError::FatalUpstream { .. } => "请求失败，请稍后重试。",
            BotError::Degraded(_) => "数据可能不是最新的，请注意。",
            BotError::Timeout(_) => "处理超时",
            BotError::RenderFailure(_) => "图片生成失败，请稍后重试。",
            BotError::Internal(_) => "发生未知错误，请稍后重试。",
        }
    }

    /// Whether this error kind still carries a usable payload (e.g. stale
    /// cache served during backup failover) rather than being a hard stop.
    pub fn is_degraded(&self) -> bool {
        matches!(self, BotError::Degraded(_))
    }
}

pub type BotResult<T> = Result<T, BotError>;
