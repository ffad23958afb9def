//! 协议错误类型定义

/// 报文编解码错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// 报文长度不足
    #[error("truncated message: {0}")]
    Truncated(&'static str),

    /// 版本号不是 1
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// Token 长度超过 8
    #[error("invalid token length: {0}")]
    InvalidTokenLength(usize),

    /// 选项头使用了保留值 15
    #[error("reserved option nibble")]
    ReservedOptionNibble,

    /// 负载标记后没有负载
    #[error("payload marker without payload")]
    EmptyPayload,

    /// 选项过长无法编码
    #[error("option too long: {0} bytes")]
    OptionTooLong(usize),
}

/// 协议通信错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 编解码错误
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// 等待响应超时
    #[error("timeout after {0} ms")]
    Timeout(u64),

    /// 对端复位（RST）
    #[error("reset by peer {0}")]
    Reset(std::net::SocketAddr),

    /// 端点已关闭
    #[error("endpoint closed")]
    Closed,
}

impl ProtocolError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
