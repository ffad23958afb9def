//! CoAP UDP 端点
//!
//! 一个 UDP 套接字同时承担服务端与客户端：
//! - 入站请求：每个请求在独立任务中交给 [`RequestHandler`] 处理，
//!   CON 请求以捎带 ACK 响应，NON 请求以 NON 响应（同 token）。
//! - 出站请求：[`CoapEndpoint::request`] 以新 token 发送 CON 请求，
//!   接收循环按 token 把响应交回等待方；超时或失败时挂起项被移除。
//! - 去重：同一来源、同一 message id 的 CON 请求在 EXCHANGE_LIFETIME 内
//!   只交给处理器一次，重传直接回放缓存的 ACK。

use crate::error::ProtocolError;
use crate::message::{
    CONTENT_FORMAT_JSON, CONTENT_FORMAT_TEXT, Code, Message, MessageType, Method, peek_header,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 单个数据报上限（RFC 7252 建议 1152，这里放宽）
const MAX_DATAGRAM: usize = 2048;

/// RFC 7252 §4.8.2 默认参数下的 EXCHANGE_LIFETIME
const EXCHANGE_LIFETIME: Duration = Duration::from_secs(247);

/// 去重表容量上限，满时淘汰最早的交换
const MAX_EXCHANGES: usize = 4096;

/// 入站请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub payload: Vec<u8>,
    /// 数据报的物理来源地址
    pub source: SocketAddr,
}

/// 资源处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundResponse {
    pub code: Code,
    pub payload: Vec<u8>,
    pub content_format: Option<u16>,
}

impl OutboundResponse {
    pub fn empty(code: Code) -> Self {
        Self {
            code,
            payload: Vec::new(),
            content_format: None,
        }
    }

    pub fn text(code: Code, payload: impl Into<String>) -> Self {
        Self {
            code,
            payload: payload.into().into_bytes(),
            content_format: Some(CONTENT_FORMAT_TEXT),
        }
    }

    pub fn json(code: Code, payload: impl Into<String>) -> Self {
        Self {
            code,
            payload: payload.into().into_bytes(),
            content_format: Some(CONTENT_FORMAT_JSON),
        }
    }

    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// 入站请求处理器
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: InboundRequest) -> OutboundResponse;
}

/// 出站请求得到的响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: Code,
    pub payload: Vec<u8>,
    pub content_format: Option<u16>,
}

impl Response {
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

struct Pending {
    peer: SocketAddr,
    message_id: u16,
    tx: oneshot::Sender<Result<Message, ProtocolError>>,
}

/// 已见过的 CON 请求；`reply` 为 None 表示首个副本仍在处理中。
struct Exchange {
    seen_at: Instant,
    reply: Option<Vec<u8>>,
}

enum Duplicate {
    New,
    InProgress,
    Answered(Vec<u8>),
}

type ExchangeKey = (SocketAddr, u16);

struct EndpointInner {
    socket: UdpSocket,
    local_addr: SocketAddr,
    pending: Mutex<HashMap<Vec<u8>, Pending>>,
    exchanges: Mutex<HashMap<ExchangeKey, Exchange>>,
    message_id: AtomicU16,
    token_seq: AtomicU64,
}

/// CoAP 端点（克隆共享同一套接字）
#[derive(Clone)]
pub struct CoapEndpoint {
    inner: Arc<EndpointInner>,
}

impl CoapEndpoint {
    /// 绑定 UDP 地址。
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, ProtocolError> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        info!(target: "irrigation.protocol", local_addr = %local_addr, "coap_endpoint_bound");
        Ok(Self {
            inner: Arc::new(EndpointInner {
                socket,
                local_addr,
                pending: Mutex::new(HashMap::new()),
                exchanges: Mutex::new(HashMap::new()),
                message_id: AtomicU16::new(seed as u16),
                token_seq: AtomicU64::new(seed),
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// 当前等待响应的出站请求数。
    pub fn pending_requests(&self) -> usize {
        self.inner
            .pending
            .lock()
            .map(|pending| pending.len())
            .unwrap_or_default()
    }

    /// 接收循环：持续读取数据报并分发，直到任务被取消。
    pub async fn serve(&self, handler: Arc<dyn RequestHandler>) -> Result<(), ProtocolError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = match self.inner.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(err) => {
                    warn!(target: "irrigation.protocol", error = %err, "coap_recv_failed");
                    continue;
                }
            };
            self.on_datagram(&buf[..len], peer, &handler).await;
        }
    }

    /// 发送 CON 请求并等待关联响应。
    pub async fn request(
        &self,
        target: SocketAddr,
        method: Method,
        path: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Response, ProtocolError> {
        let token = self.next_token();
        let message_id = self.next_message_id();
        let mut message = Message::new(MessageType::Confirmable, method.code(), message_id);
        message.token = token.clone();
        message.set_uri_path(path);
        if !payload.is_empty() {
            message.set_content_format(CONTENT_FORMAT_TEXT);
            message.payload = payload.to_vec();
        }
        let bytes = message.encode()?;

        let (tx, rx) = oneshot::channel();
        self.lock_pending()?.insert(
            token.clone(),
            Pending {
                peer: target,
                message_id,
                tx,
            },
        );
        // 无论成功、超时还是出错，离开作用域时都移除挂起项
        let _guard = PendingGuard {
            endpoint: self,
            token,
        };

        self.inner.socket.send_to(&bytes, target).await?;
        debug!(
            target: "irrigation.protocol",
            peer = %target,
            method = method.as_str(),
            path,
            message_id,
            "coap_request_sent"
        );

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(message))) => Ok(Response {
                code: message.code,
                content_format: message.content_format(),
                payload: message.payload,
            }),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(ProtocolError::Closed),
            Err(_) => Err(ProtocolError::Timeout(timeout.as_millis() as u64)),
        }
    }

    async fn on_datagram(&self, bytes: &[u8], peer: SocketAddr, handler: &Arc<dyn RequestHandler>) {
        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    target: "irrigation.protocol",
                    peer = %peer,
                    size = bytes.len(),
                    error = %err,
                    "coap_datagram_malformed"
                );
                if let Ok(header) = peek_header(bytes) {
                    if header.message_type == MessageType::Confirmable {
                        self.send(&Message::reset(header.message_id), peer).await;
                    }
                }
                return;
            }
        };

        if message.code.is_request() {
            if message.message_type == MessageType::Confirmable {
                match self.track_exchange((peer, message.message_id)) {
                    Duplicate::New => {}
                    Duplicate::InProgress => {
                        debug!(
                            target: "irrigation.protocol",
                            peer = %peer,
                            message_id = message.message_id,
                            "coap_duplicate_in_progress"
                        );
                        return;
                    }
                    Duplicate::Answered(reply) => {
                        debug!(
                            target: "irrigation.protocol",
                            peer = %peer,
                            message_id = message.message_id,
                            "coap_duplicate_replayed"
                        );
                        self.send_bytes(&reply, peer).await;
                        return;
                    }
                }
            }
            let endpoint = self.clone();
            let handler = Arc::clone(handler);
            tokio::spawn(async move {
                endpoint.handle_request(message, peer, handler).await;
            });
        } else if message.code.is_response() {
            self.on_response(message, peer).await;
        } else if message.code.is_empty() {
            match message.message_type {
                MessageType::Acknowledgement => {
                    debug!(
                        target: "irrigation.protocol",
                        peer = %peer,
                        message_id = message.message_id,
                        "coap_separate_response_pending"
                    );
                }
                MessageType::Reset => self.on_reset(message.message_id, peer),
                // CoAP ping
                MessageType::Confirmable => {
                    self.send(&Message::reset(message.message_id), peer).await;
                }
                MessageType::NonConfirmable => {}
            }
        } else {
            debug!(target: "irrigation.protocol", peer = %peer, code = %message.code, "coap_code_ignored");
        }
    }

    async fn handle_request(&self, message: Message, peer: SocketAddr, handler: Arc<dyn RequestHandler>) {
        let response = match Method::from_code(message.code) {
            Some(method) => {
                let request = InboundRequest {
                    method,
                    path: message.uri_path(),
                    payload: message.payload.clone(),
                    source: peer,
                };
                handler.handle(request).await
            }
            None => OutboundResponse::empty(Code::METHOD_NOT_ALLOWED),
        };

        let confirmable = message.message_type == MessageType::Confirmable;
        let mut reply = match message.message_type {
            MessageType::Confirmable => {
                Message::new(MessageType::Acknowledgement, response.code, message.message_id)
            }
            _ => Message::new(
                MessageType::NonConfirmable,
                response.code,
                self.next_message_id(),
            ),
        };
        reply.token = message.token;
        if let Some(format) = response.content_format {
            reply.set_content_format(format);
        }
        reply.payload = response.payload;
        let bytes = match reply.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(target: "irrigation.protocol", peer = %peer, error = %err, "coap_encode_failed");
                return;
            }
        };
        if confirmable {
            self.remember_reply((peer, message.message_id), bytes.clone());
        }
        self.send_bytes(&bytes, peer).await;
    }

    /// 登记一个 CON 请求，返回它是否为重传。
    fn track_exchange(&self, key: ExchangeKey) -> Duplicate {
        let Ok(mut exchanges) = self.inner.exchanges.lock() else {
            return Duplicate::New;
        };
        let now = Instant::now();
        if let Some(exchange) = exchanges.get(&key) {
            if now.duration_since(exchange.seen_at) < EXCHANGE_LIFETIME {
                return match &exchange.reply {
                    Some(reply) => Duplicate::Answered(reply.clone()),
                    None => Duplicate::InProgress,
                };
            }
        }
        if exchanges.len() >= MAX_EXCHANGES {
            exchanges.retain(|_, exchange| now.duration_since(exchange.seen_at) < EXCHANGE_LIFETIME);
        }
        if exchanges.len() >= MAX_EXCHANGES {
            let oldest = exchanges
                .iter()
                .min_by_key(|(_, exchange)| exchange.seen_at)
                .map(|(key, _)| *key);
            if let Some(oldest) = oldest {
                exchanges.remove(&oldest);
            }
        }
        exchanges.insert(
            key,
            Exchange {
                seen_at: now,
                reply: None,
            },
        );
        Duplicate::New
    }

    fn remember_reply(&self, key: ExchangeKey, reply: Vec<u8>) {
        if let Ok(mut exchanges) = self.inner.exchanges.lock() {
            if let Some(exchange) = exchanges.get_mut(&key) {
                exchange.reply = Some(reply);
            }
        }
    }

    async fn on_response(&self, message: Message, peer: SocketAddr) {
        let pending = self.lock_pending().ok().and_then(|mut pending| {
            let matches = pending
                .get(&message.token)
                .is_some_and(|entry| entry.peer == peer);
            if matches {
                pending.remove(&message.token)
            } else {
                None
            }
        });

        let confirmable = message.message_type == MessageType::Confirmable;
        let message_id = message.message_id;
        match pending {
            Some(entry) => {
                if confirmable {
                    self.send(&Message::empty_ack(message_id), peer).await;
                }
                let _ = entry.tx.send(Ok(message));
            }
            None => {
                debug!(
                    target: "irrigation.protocol",
                    peer = %peer,
                    message_id,
                    "coap_response_unmatched"
                );
                if confirmable {
                    self.send(&Message::reset(message_id), peer).await;
                }
            }
        }
    }

    fn on_reset(&self, message_id: u16, peer: SocketAddr) {
        let Ok(mut pending) = self.lock_pending() else {
            return;
        };
        let token = pending
            .iter()
            .find(|(_, entry)| entry.message_id == message_id && entry.peer == peer)
            .map(|(token, _)| token.clone());
        if let Some(entry) = token.and_then(|token| pending.remove(&token)) {
            let _ = entry.tx.send(Err(ProtocolError::Reset(peer)));
        }
    }

    async fn send(&self, message: &Message, peer: SocketAddr) {
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(target: "irrigation.protocol", peer = %peer, error = %err, "coap_encode_failed");
                return;
            }
        };
        self.send_bytes(&bytes, peer).await;
    }

    async fn send_bytes(&self, bytes: &[u8], peer: SocketAddr) {
        if let Err(err) = self.inner.socket.send_to(bytes, peer).await {
            warn!(target: "irrigation.protocol", peer = %peer, error = %err, "coap_send_failed");
        }
    }

    fn lock_pending(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Vec<u8>, Pending>>, ProtocolError> {
        self.inner.pending.lock().map_err(|_| ProtocolError::Closed)
    }

    fn next_message_id(&self) -> u16 {
        self.inner.message_id.fetch_add(1, Ordering::Relaxed)
    }

    fn next_token(&self) -> Vec<u8> {
        self.inner
            .token_seq
            .fetch_add(1, Ordering::Relaxed)
            .to_be_bytes()
            .to_vec()
    }
}

struct PendingGuard<'a> {
    endpoint: &'a CoapEndpoint,
    token: Vec<u8>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.endpoint.inner.pending.lock() {
            pending.remove(&self.token);
        }
    }
}
