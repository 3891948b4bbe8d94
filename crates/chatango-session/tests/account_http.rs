//! Integration tests for the HTTP account helpers against a loopback server
//! that answers one request with a canned response.

use std::time::Duration;

use chatango_session::{
    AccountConfig, AccountService, Credentials, HttpAccountService, SessionError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// =========================================================================
// Helpers
// =========================================================================

/// Reads one HTTP/1.1 request (head and body) and returns it as text.
async fn read_request(sock: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    let head_end = loop {
        let n = sock.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before sending a request");
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .map(|v| v.trim().parse::<usize>().unwrap());
    let chunked = head.contains("transfer-encoding: chunked");

    loop {
        let body = &data[head_end..];
        let done = match content_length {
            Some(len) => body.len() >= len,
            None if chunked => body.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if done {
            break;
        }
        let n = sock.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed mid-body");
        data.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&data).into_owned()
}

/// Serves one request, replying with `response`. Resolves to the request.
async fn serve_once(response: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let request = read_request(&mut sock).await;
        sock.write_all(response.as_bytes()).await.unwrap();
        sock.shutdown().await.unwrap();
        request
    });
    (url, server)
}

fn service(url: &str) -> HttpAccountService {
    HttpAccountService::new(AccountConfig {
        login_url: format!("{url}/login"),
        avatar_url: format!("{url}/updatepic"),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

// =========================================================================
// request_auth_token
// =========================================================================

#[tokio::test]
async fn test_request_auth_token_reads_cookie() {
    let (url, server) = serve_once(
        "HTTP/1.1 200 OK\r\n\
         Set-Cookie: id.chatango.com=alice; Path=/\r\n\
         Set-Cookie: auth.chatango.com=SECRET_TOKEN; Path=/\r\n\
         Content-Length: 0\r\n\
         Connection: close\r\n\r\n",
    )
    .await;

    let token = service(&url)
        .request_auth_token(&Credentials::registered("alice", "pw"))
        .await
        .expect("token should be returned");
    assert_eq!(token, "SECRET_TOKEN");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /login"));
    assert!(request.contains("user_id=alice"));
    assert!(request.contains("password=pw"));
    assert!(request.contains("storecookie=on"));
    assert!(request.contains("checkerrors=yes"));
}

#[tokio::test]
async fn test_request_auth_token_without_cookie_is_rejected() {
    let (url, server) = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    )
    .await;

    let result = service(&url)
        .request_auth_token(&Credentials::registered("alice", "wrong"))
        .await;
    assert!(matches!(result, Err(SessionError::LoginRejected(name)) if name == "alice"));
    server.await.unwrap();
}

#[tokio::test]
async fn test_request_auth_token_needs_password() {
    // No request is made, so no server is needed.
    let result = service("http://127.0.0.1:9")
        .request_auth_token(&Credentials::temporary("guest"))
        .await;
    assert!(matches!(result, Err(SessionError::MissingCredentials)));
}

// =========================================================================
// upload_avatar
// =========================================================================

#[tokio::test]
async fn test_upload_avatar_sends_multipart_form() {
    let dir = std::env::temp_dir().join(format!("chatango-avatar-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join("me.png");
    tokio::fs::write(&path, b"PNGDATA").await.unwrap();

    let (url, server) = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    )
    .await;

    service(&url)
        .upload_avatar(&Credentials::registered("alice", "pw"), &path)
        .await
        .expect("upload should succeed");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /updatepic"));
    assert!(request.contains("multipart/form-data"));
    assert!(request.contains("name=\"action\""));
    assert!(request.contains("fullpic"));
    assert!(request.contains("filename=\"me.png\""));
    assert!(request.contains("image/png"));
    assert!(request.contains("PNGDATA"));

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn test_upload_avatar_missing_file() {
    let result = service("http://127.0.0.1:9")
        .upload_avatar(
            &Credentials::registered("alice", "pw"),
            std::path::Path::new("/definitely/not/here.jpg"),
        )
        .await;
    assert!(matches!(result, Err(SessionError::AvatarRead { .. })));
}
