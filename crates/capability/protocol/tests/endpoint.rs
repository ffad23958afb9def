use async_trait::async_trait;
use irrigation_protocol::{
    CoapEndpoint, Code, InboundRequest, Message, MessageType, Method, OutboundResponse,
    ProtocolError, RequestHandler,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;

struct EchoHandler;

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn handle(&self, request: InboundRequest) -> OutboundResponse {
        match (request.method, request.path.as_str()) {
            (Method::Get, "hello") => OutboundResponse::text(Code::CONTENT, "Hello world!"),
            (Method::Put, "echo") => {
                OutboundResponse::text(Code::CHANGED, String::from_utf8_lossy(&request.payload))
            }
            (Method::Get, "source") => {
                OutboundResponse::text(Code::CONTENT, request.source.to_string())
            }
            _ => OutboundResponse::empty(Code::NOT_FOUND),
        }
    }
}

async fn spawn_endpoint() -> CoapEndpoint {
    let endpoint = CoapEndpoint::bind("127.0.0.1:0").await.expect("bind");
    let serving = endpoint.clone();
    tokio::spawn(async move {
        let _ = serving.serve(Arc::new(EchoHandler)).await;
    });
    endpoint
}

async fn recv_message(socket: &UdpSocket) -> (Message, SocketAddr) {
    let mut buf = [0u8; 2048];
    let (len, peer) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("datagram in time")
        .expect("recv");
    (Message::decode(&buf[..len]).expect("decode"), peer)
}

#[tokio::test]
async fn request_round_trip_between_endpoints() {
    let server = spawn_endpoint().await;
    let client = spawn_endpoint().await;

    let response = client
        .request(
            server.local_addr(),
            Method::Put,
            "echo",
            b"OPEN_VALVE_1",
            Duration::from_secs(1),
        )
        .await
        .expect("response");
    assert_eq!(response.code, Code::CHANGED);
    assert_eq!(response.payload_text(), "OPEN_VALVE_1");

    let source = client
        .request(server.local_addr(), Method::Get, "source", b"", Duration::from_secs(1))
        .await
        .expect("response");
    assert_eq!(source.payload_text(), client.local_addr().to_string());

    let missing = client
        .request(server.local_addr(), Method::Get, "nope", b"", Duration::from_secs(1))
        .await
        .expect("response");
    assert_eq!(missing.code, Code::NOT_FOUND);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn silent_target_times_out_within_margin() {
    let client = spawn_endpoint().await;
    let silent = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let timeout = Duration::from_millis(200);

    let started = Instant::now();
    let err = client
        .request(silent.local_addr().expect("addr"), Method::Put, "commands", b"x", timeout)
        .await
        .expect_err("timeout");
    let elapsed = started.elapsed();

    assert!(matches!(err, ProtocolError::Timeout(200)));
    assert!(err.is_timeout());
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_millis(500));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn separate_response_is_acknowledged() {
    let client = spawn_endpoint().await;
    let device = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let device_addr = device.local_addr().expect("addr");

    let requester = client.clone();
    let call = tokio::spawn(async move {
        requester
            .request(device_addr, Method::Put, "commands", b"CLOSE", Duration::from_secs(2))
            .await
    });

    let (request, peer) = recv_message(&device).await;
    assert_eq!(request.message_type, MessageType::Confirmable);
    assert_eq!(request.uri_path(), "commands");
    assert_eq!(request.payload, b"CLOSE");

    let ack = Message::empty_ack(request.message_id);
    device
        .send_to(&ack.encode().expect("encode"), peer)
        .await
        .expect("send ack");

    let mut separate = Message::new(MessageType::Confirmable, Code::CHANGED, 4242);
    separate.token = request.token.clone();
    separate.payload = b"DONE".to_vec();
    device
        .send_to(&separate.encode().expect("encode"), peer)
        .await
        .expect("send response");

    let response = call.await.expect("join").expect("response");
    assert_eq!(response.payload_text(), "DONE");

    let (confirm, _) = recv_message(&device).await;
    assert_eq!(confirm.message_type, MessageType::Acknowledgement);
    assert_eq!(confirm.message_id, 4242);
    assert!(confirm.code.is_empty());
}

#[tokio::test]
async fn reset_fails_pending_request() {
    let client = spawn_endpoint().await;
    let device = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let device_addr = device.local_addr().expect("addr");

    let requester = client.clone();
    let call = tokio::spawn(async move {
        requester
            .request(device_addr, Method::Put, "commands", b"X", Duration::from_secs(2))
            .await
    });
    let (request, peer) = recv_message(&device).await;
    device
        .send_to(&Message::reset(request.message_id).encode().expect("encode"), peer)
        .await
        .expect("send rst");

    let err = call.await.expect("join").expect_err("reset");
    assert!(matches!(err, ProtocolError::Reset(addr) if addr == device_addr));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn non_confirmable_request_gets_non_response() {
    let server = spawn_endpoint().await;
    let device = UdpSocket::bind("127.0.0.1:0").await.expect("bind");

    let mut request = Message::new(MessageType::NonConfirmable, Code::GET, 77);
    request.token = vec![9, 9, 9];
    request.set_uri_path("hello");
    device
        .send_to(&request.encode().expect("encode"), server.local_addr())
        .await
        .expect("send");

    let (response, _) = recv_message(&device).await;
    assert_eq!(response.message_type, MessageType::NonConfirmable);
    assert_eq!(response.code, Code::CONTENT);
    assert_eq!(response.token, vec![9, 9, 9]);
    assert_eq!(response.payload, b"Hello world!");
}

#[tokio::test]
async fn malformed_confirmable_is_reset() {
    let server = spawn_endpoint().await;
    let device = UdpSocket::bind("127.0.0.1:0").await.expect("bind");

    // 头部可读，但选项值被截断
    let bytes = [0x40, 0x03, 0x00, 0x2A, 0xB4, b's'];
    device
        .send_to(&bytes, server.local_addr())
        .await
        .expect("send");

    let (reply, _) = recv_message(&device).await;
    assert_eq!(reply.message_type, MessageType::Reset);
    assert_eq!(reply.message_id, 0x2A);
}

#[tokio::test]
async fn unknown_method_code_is_rejected() {
    let server = spawn_endpoint().await;
    let device = UdpSocket::bind("127.0.0.1:0").await.expect("bind");

    // 0.05 FETCH
    let mut request = Message::new(MessageType::Confirmable, Code(0x05), 5);
    request.set_uri_path("hello");
    device
        .send_to(&request.encode().expect("encode"), server.local_addr())
        .await
        .expect("send");

    let (reply, _) = recv_message(&device).await;
    assert_eq!(reply.message_type, MessageType::Acknowledgement);
    assert_eq!(reply.message_id, 5);
    assert_eq!(reply.code, Code::METHOD_NOT_ALLOWED);
}

/// 每次调用都返回不同序号，用来区分“重新处理”和“回放”。
#[derive(Default)]
struct CountingHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl RequestHandler for CountingHandler {
    async fn handle(&self, _request: InboundRequest) -> OutboundResponse {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        OutboundResponse::text(Code::CHANGED, format!("report {call}"))
    }
}

#[tokio::test]
async fn retransmitted_confirmable_is_answered_from_cache() {
    let handler = Arc::new(CountingHandler::default());
    let server = CoapEndpoint::bind("127.0.0.1:0").await.expect("bind");
    let serving = server.clone();
    let serving_handler: Arc<dyn RequestHandler> = handler.clone();
    tokio::spawn(async move {
        let _ = serving.serve(serving_handler).await;
    });
    let device = UdpSocket::bind("127.0.0.1:0").await.expect("bind");

    let mut request = Message::new(MessageType::Confirmable, Code::PUT, 777);
    request.token = vec![0x0A, 0x0B];
    request.set_uri_path("sensors");
    request.payload = b"{\"deviceId\":\"1\"}".to_vec();
    let bytes = request.encode().expect("encode");

    device.send_to(&bytes, server.local_addr()).await.expect("send");
    let (first, _) = recv_message(&device).await;
    device.send_to(&bytes, server.local_addr()).await.expect("send");
    let (second, _) = recv_message(&device).await;

    assert_eq!(first.message_type, MessageType::Acknowledgement);
    assert_eq!(first.message_id, 777);
    assert_eq!(first, second);
    assert_eq!(first.payload, b"report 1");
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

    // 新的 message id 是新的交换
    let mut next = request.clone();
    next.message_id = 778;
    device
        .send_to(&next.encode().expect("encode"), server.local_addr())
        .await
        .expect("send");
    let (third, _) = recv_message(&device).await;
    assert_eq!(third.message_id, 778);
    assert_eq!(third.payload, b"report 2");
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
}
