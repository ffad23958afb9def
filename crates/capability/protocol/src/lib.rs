//! # 协议通信能力模块
//!
//! 设备侧使用 CoAP（RFC 7252 子集）承载于 UDP：
//! - **message**：报文编解码（头、token、选项、负载）
//! - **endpoint**：UDP 端点，入站请求并发处理，出站请求按 token 关联响应
//!
//! ```text
//! 设备 ──CON PUT /sensors──▶ CoapEndpoint::serve ──▶ RequestHandler (ingest)
//! 设备 ◀──CON PUT /commands── CoapEndpoint::request ◀── 命令桥接 (control)
//! ```

mod endpoint;
mod error;
mod message;

pub use endpoint::{CoapEndpoint, InboundRequest, OutboundResponse, RequestHandler, Response};
pub use error::{CodecError, ProtocolError};
pub use message::{
    CONTENT_FORMAT_JSON, CONTENT_FORMAT_TEXT, CoapOption, Code, Header, Message, MessageType,
    Method, OPTION_CONTENT_FORMAT, OPTION_URI_PATH, peek_header,
};
