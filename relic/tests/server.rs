//! End-to-end tests driving the server over real sockets.

use std::net::SocketAddr;
use std::time::Duration;

use relic::context::Context;
use relic::handler::{handler_fn, BoxedHandler};
use relic::routing::{RouteWith, PATH_PARAMETERS};
use relic::server::{ServerConfig, ServerHandle};
use relic::{Body, Pipeline, Response, Router, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn test_router() -> Router<BoxedHandler> {
    let mut router = Router::new();
    router
        .get(
            "/hello",
            BoxedHandler::from_fn(|ctx| async move {
                ctx.respond(Response::ok(Body::from_text("hello world", None)))
            }),
        )
        .unwrap();
    router
        .get(
            "/users/:id",
            BoxedHandler::from_fn(|ctx: Context| async move {
                let id = PATH_PARAMETERS
                    .get(&ctx)?
                    .raw("id")
                    .unwrap_or_default()
                    .to_owned();
                ctx.respond(Response::ok(Body::from_text(format!("user {id}"), None)))
            }),
        )
        .unwrap();
    router
        .post(
            "/echo",
            BoxedHandler::from_fn(|ctx: Context| async move {
                let text = ctx.request().body().read_string(None).await?;
                ctx.respond(Response::ok(Body::from_text(text, None)))
            }),
        )
        .unwrap();
    router
        .get(
            "/raw",
            BoxedHandler::from_fn(|ctx: Context| async move {
                ctx.hijack(|mut channel| async move {
                    let mut buf = [0u8; 4];
                    if channel.read_exact(&mut buf).await.is_ok() {
                        let _ = channel.write_all(b"echo:").await;
                        let _ = channel.write_all(&buf).await;
                    }
                })
            }),
        )
        .unwrap();
    router
}

async fn start(config: ServerConfig) -> (ServerHandle, SocketAddr) {
    let app = Pipeline::new()
        .add(RouteWith::middleware(test_router()))
        .build(handler_fn(|ctx: Context| async move {
            ctx.respond(Response::not_found())
        }));

    let server = Server::bind("127.0.0.1:0")
        .await
        .unwrap()
        .with_config(config);
    let handle = server.launch(app);
    let addr = handle.local_addr().unwrap();
    (handle, addr)
}

/// Read one response off the stream: the head, then a content-length
/// framed body.
async fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut raw = Vec::new();
    let head_end;
    loop {
        let mut byte = [0u8; 1];
        assert!(stream.read_exact(&mut byte).await.is_ok(), "connection died mid-head");
        raw.push(byte[0]);
        if raw.ends_with(b"\r\n\r\n") {
            head_end = raw.len();
            break;
        }
        assert!(raw.len() < 64 * 1024, "head never ended");
    }
    let head = String::from_utf8(raw[..head_end].to_vec()).unwrap();
    let content_length: usize = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        stream.read_exact(&mut body).await.unwrap();
    }
    (head, body)
}

async fn send(stream: &mut TcpStream, raw: &str) {
    stream.write_all(raw.as_bytes()).await.unwrap();
}

#[tokio::test]
async fn serves_a_basic_get() {
    let (handle, addr) = start(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(&mut stream, "GET /hello HTTP/1.1\r\nhost: t\r\n\r\n").await;
    let (head, body) = read_response(&mut stream).await;

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.to_ascii_lowercase().contains("content-type: text/plain"));
    assert!(head.to_ascii_lowercase().contains("server: relic"));
    assert!(head.to_ascii_lowercase().contains("date: "));
    assert_eq!(body, b"hello world");

    handle.close(true).await;
}

#[tokio::test]
async fn keep_alive_serves_requests_in_order() {
    let (handle, addr) = start(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(&mut stream, "GET /users/1 HTTP/1.1\r\nhost: t\r\n\r\n").await;
    let (_, body) = read_response(&mut stream).await;
    assert_eq!(body, b"user 1");

    send(&mut stream, "GET /users/2 HTTP/1.1\r\nhost: t\r\n\r\n").await;
    let (_, body) = read_response(&mut stream).await;
    assert_eq!(body, b"user 2");

    handle.close(true).await;
}

#[tokio::test]
async fn unknown_route_is_404_and_wrong_method_is_405() {
    let (handle, addr) = start(ServerConfig::default()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send(&mut stream, "GET /nope HTTP/1.1\r\nhost: t\r\n\r\n").await;
    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 404"));

    send(&mut stream, "DELETE /hello HTTP/1.1\r\nhost: t\r\n\r\n").await;
    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 405"));
    assert!(head.to_ascii_lowercase().contains("allow: get, head"));

    handle.close(true).await;
}

#[tokio::test]
async fn sized_request_bodies_reach_the_handler() {
    let (handle, addr) = start(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(
        &mut stream,
        "POST /echo HTTP/1.1\r\nhost: t\r\ncontent-length: 5\r\n\r\nhello",
    )
    .await;
    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200"));
    assert_eq!(body, b"hello");

    handle.close(true).await;
}

#[tokio::test]
async fn chunked_request_bodies_are_decoded_transparently() {
    let (handle, addr) = start(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(
        &mut stream,
        "POST /echo HTTP/1.1\r\nhost: t\r\ntransfer-encoding: chunked\r\n\r\n\
         5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
    )
    .await;
    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200"));
    assert_eq!(body, b"hello world");

    handle.close(true).await;
}

#[tokio::test]
async fn head_requests_reuse_get_routes_without_a_body() {
    let (handle, addr) = start(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(&mut stream, "HEAD /hello HTTP/1.1\r\nhost: t\r\n\r\n").await;

    // the body must not follow; probe by issuing a second request and
    // checking the stream lines up
    send(&mut stream, "GET /users/9 HTTP/1.1\r\nhost: t\r\n\r\n").await;

    let mut raw = vec![0u8; 0];
    let mut chunk = [0u8; 1024];
    loop {
        match tokio::time::timeout(Duration::from_millis(300), stream.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => raw.extend_from_slice(&chunk[..n]),
            _ => break,
        }
    }
    let text = String::from_utf8_lossy(&raw);
    let lower = text.to_ascii_lowercase();
    assert!(lower.starts_with("http/1.1 200 ok\r\n"));
    assert!(lower.contains("content-length: 11"));
    assert!(!text.contains("hello world"));
    assert!(text.contains("user 9"));

    handle.close(true).await;
}

#[tokio::test]
async fn oversized_bodies_get_413_and_a_closed_connection() {
    let config = ServerConfig::default().with_max_request_body_bytes(4);
    let (handle, addr) = start(config).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(
        &mut stream,
        "POST /echo HTTP/1.1\r\nhost: t\r\ncontent-length: 10\r\n\r\n0123456789",
    )
    .await;
    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 413"));

    // the server hangs up afterwards
    let mut probe = [0u8; 1];
    let n = stream.read(&mut probe).await.unwrap_or(0);
    assert_eq!(n, 0);

    handle.close(true).await;
}

#[tokio::test]
async fn malformed_heads_get_400() {
    let (handle, addr) = start(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(&mut stream, "TOTAL GARBAGE\r\n\r\n").await;
    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 400"));

    handle.close(true).await;
}

#[tokio::test]
async fn strict_headers_reject_bad_values_up_front() {
    let config = ServerConfig::default().with_strict_headers(true);
    let (handle, addr) = start(config).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(
        &mut stream,
        "GET /hello HTTP/1.1\r\nhost: t\r\ncontent-length: banana\r\n\r\n",
    )
    .await;
    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 400"));

    handle.close(true).await;
}

#[tokio::test]
async fn hijack_releases_the_raw_channel() {
    let (handle, addr) = start(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(&mut stream, "GET /raw HTTP/1.1\r\nhost: t\r\n\r\nping").await;
    let mut out = vec![0u8; 9];
    stream.read_exact(&mut out).await.unwrap();
    assert_eq!(&out, b"echo:ping");

    handle.close(true).await;
}

#[tokio::test]
async fn graceful_close_finishes_idle_servers() {
    let (handle, addr) = start(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    send(&mut stream, "GET /hello HTTP/1.1\r\nhost: t\r\n\r\n").await;
    let _ = read_response(&mut stream).await;

    tokio::time::timeout(Duration::from_secs(5), handle.close(false))
        .await
        .expect("graceful close should finish promptly");
}

#[tokio::test]
async fn handler_errors_become_a_sanitized_500() {
    let app = Pipeline::new().build(handler_fn(|_ctx: Context| async move {
        Err::<Context, _>("database exploded: secret dsn".into())
    }));
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let handle = server.launch(app);
    let addr = handle.local_addr().unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send(&mut stream, "GET / HTTP/1.1\r\nhost: t\r\n\r\n").await;
    let (head, body) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 500"));
    assert_eq!(body, b"Internal Server Error");

    handle.close(true).await;
}

#[tokio::test]
async fn workers_share_one_listener() {
    let config = ServerConfig::default().with_workers(4);
    let (handle, addr) = start(config).await;

    let mut tasks = Vec::new();
    for i in 0..16 {
        tasks.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            send(
                &mut stream,
                &format!("GET /users/{i} HTTP/1.1\r\nhost: t\r\n\r\n"),
            )
            .await;
            let (_, body) = read_response(&mut stream).await;
            assert_eq!(body, format!("user {i}").into_bytes());
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    handle.close(true).await;
}
