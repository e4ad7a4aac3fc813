// Minimal HTTP/1.1 request framing for the notification listener.
//
// Devices POST one envelope per connection and expect a status line back.
// Nothing here needs a full HTTP stack: read headers, honour
// Content-Length, answer, close.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const HEADER_END: &[u8] = b"\r\n\r\n";
const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Why a connection was dropped without producing a request.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("connection closed before a complete request")]
    Truncated,
    #[error("request headers exceed {MAX_HEADER_BYTES} bytes")]
    HeadersTooLarge,
    #[error("request body of {0} bytes exceeds limit")]
    BodyTooLarge(usize),
    #[error("missing or malformed request line")]
    BadRequestLine,
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One framed request.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

/// Read one request from `stream`, bounded by `max_body` and `timeout`.
pub async fn read_request<S>(
    stream: &mut S,
    max_body: usize,
    timeout: Duration,
) -> Result<Request, FramingError>
where
    S: AsyncRead + Unpin,
{
    tokio::time::timeout(timeout, read_framed(stream, max_body))
        .await
        .map_err(|_| FramingError::Timeout(timeout))?
}

async fn read_framed<S>(stream: &mut S, max_body: usize) -> Result<Request, FramingError>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    let (header_end, length) = loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Err(FramingError::Truncated);
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(end) = find_header_end(&buffer) {
            let length = parse_content_length(&buffer[..end]).unwrap_or(0);
            if length > max_body {
                return Err(FramingError::BodyTooLarge(length));
            }
            break (end, length);
        }
        if buffer.len() > MAX_HEADER_BYTES {
            return Err(FramingError::HeadersTooLarge);
        }
    };

    let body_start = header_end + HEADER_END.len();
    while buffer.len() < body_start + length {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Err(FramingError::Truncated);
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let (method, path) =
        parse_request_line(&buffer[..header_end]).ok_or(FramingError::BadRequestLine)?;
    let body = buffer[body_start..body_start + length].to_vec();
    Ok(Request { method, path, body })
}

/// Write a bodiless response and close the write half.
pub async fn respond<S>(stream: &mut S, status: u16, reason: &str) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

pub fn find_header_end(request: &[u8]) -> Option<usize> {
    request
        .windows(HEADER_END.len())
        .position(|window| window == HEADER_END)
}

pub fn parse_content_length(headers: &[u8]) -> Option<usize> {
    let text = String::from_utf8_lossy(headers);
    for line in text.lines() {
        let lower = line.to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("content-length:") {
            if let Ok(length) = rest.trim().parse::<usize>() {
                return Some(length);
            }
        }
    }
    None
}

fn parse_request_line(headers: &[u8]) -> Option<(String, String)> {
    let text = String::from_utf8_lossy(headers);
    let line = text.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();
    parts.next()?.starts_with("HTTP/").then_some((method, path))
}
