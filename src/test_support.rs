//! One-shot HTTP responders for executor and engine tests.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

/// Serve one canned response per connection; returns the base URL and
/// a receiver yielding each raw request.
pub(crate) async fn serve(
    status: u16,
    body: &'static str,
    delay: Duration,
) -> (String, UnboundedReceiver<String>) {
    serve_with(status, "", body, delay).await
}

/// Like [`serve`], with extra raw header lines (each ending in `\r\n`).
pub(crate) async fn serve_with(
    status: u16,
    headers: &'static str,
    body: &'static str,
    delay: Duration,
) -> (String, UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let raw = read_request(&mut socket).await;
                let _ = tx.send(raw);
                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 {} Status\r\ncontent-length: {}\r\nx-served-by: test\r\n{}connection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    headers,
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    (format!("http://{}", addr), rx)
}

/// Read headers, then as many body bytes as content-length announces.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&data).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}
