//! Test helpers: a tiny blocking HTTP server on a loopback port.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) struct TestServer {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Serve every connection with `handler(request_head) -> (status, body)`
pub(crate) fn serve_http<H>(handler: H) -> TestServer
where
    H: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(handler);

    let counter = Arc::clone(&hits);
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let handler = Arc::clone(&handler);
            let counter = Arc::clone(&counter);
            std::thread::spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                respond(stream, handler.as_ref());
            });
        }
    });

    TestServer { addr, hits }
}

fn respond<H: Fn(&str) -> (u16, String)>(mut stream: TcpStream, handler: &H) {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&chunk[..n]),
        }
    }

    let request = String::from_utf8_lossy(&head).to_string();
    let (status, body) = handler(&request);
    let response = format!(
        "HTTP/1.1 {} X\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

/// Request path from the first line of a request head
pub(crate) fn request_path(head: &str) -> &str {
    head.split_whitespace().nth(1).unwrap_or("/")
}

/// URL of a loopback port with nothing listening on it
pub(crate) fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}
