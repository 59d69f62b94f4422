use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use councildb_core::traits::{GenerationOptions, TextGenerator};
use councildb_core::types::Message;
use councildb_query::OpenAiChatGenerator;

/// Serve one canned HTTP response and return the base URL.
async fn serve_once(status: &'static str, content_type: &'static str, body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let len = text[..head_end]
                    .lines()
                    .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap()))
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + len {
                    break;
                }
            }
        }
        let resp = format!(
            "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        sock.write_all(resp.as_bytes()).await.unwrap();
        sock.shutdown().await.ok();
    });
    format!("http://{addr}")
}

fn options() -> GenerationOptions {
    GenerationOptions::new(0.7, 100)
}

#[tokio::test]
async fn completion_content_is_returned() {
    let body = r#"{"choices":[{"message":{"role":"assistant","content":"A reunião foi em 12/03."}}]}"#.to_string();
    let url = serve_once("200 OK", "application/json", body).await;
    let llm = OpenAiChatGenerator::new(&url, "m", Some("k".into()), Duration::from_secs(5)).unwrap();
    let out = llm.generate(&[Message::user("Quando foi a reunião?")], options()).await.unwrap();
    assert_eq!(out, "A reunião foi em 12/03.");
}

#[tokio::test]
async fn http_errors_are_provider_failures() {
    let url = serve_once("429 Too Many Requests", "application/json", "{}".to_string()).await;
    let llm = OpenAiChatGenerator::new(&url, "m", None, Duration::from_secs(5)).unwrap();
    let err = llm.generate(&[Message::user("oi")], options()).await.unwrap_err();
    assert!(err.is_provider_failure());
}

#[tokio::test]
async fn streamed_deltas_arrive_in_order() {
    let body = [
        r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":"A reunião "}}]}"#,
        "",
        r#"data: {"choices":[{"delta":{"content":"foi em 12/03."}}]}"#,
        "data: [DONE]",
        "",
    ]
    .join("\n");
    let url = serve_once("200 OK", "text/event-stream", body).await;
    let llm = OpenAiChatGenerator::new(&url, "m", None, Duration::from_secs(5)).unwrap();
    let stream = llm.generate_stream(&[Message::user("Quando?")], options()).await.unwrap();
    let parts: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
    assert_eq!(parts, vec!["A reunião ", "foi em 12/03."]);
}
