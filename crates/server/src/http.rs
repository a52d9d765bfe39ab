//! Minimal HTTP/1.1 handling for the processing endpoint.
//!
//! One POST route, fully buffered bodies, `Connection: close` on every
//! response. Deliberately small: the transport layer is a thin wrapper
//! around the engine and does not try to be a general web server.

use std::io::{BufRead, Read, Write};

/// A parsed request: line, lowercased header names, buffered body.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub path: String,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// First value of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Path without query string or trailing slash.
    pub fn route(&self) -> &str {
        let path = self.path.split('?').next().unwrap_or(&self.path);
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/"
        } else {
            trimmed
        }
    }
}

/// Failures while reading one request.
#[derive(Debug)]
pub enum RequestError {
    /// Malformed request line or header section.
    Malformed(String),
    /// Declared body exceeds the configured limit.
    BodyTooLarge { declared: usize, limit: usize },
    /// Socket error or premature close.
    Io(std::io::Error),
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::Malformed(msg) => write!(f, "malformed request: {}", msg),
            RequestError::BodyTooLarge { declared, limit } => {
                write!(f, "body of {} bytes exceeds the {} byte limit", declared, limit)
            }
            RequestError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for RequestError {}

/// Read one full request from the stream. The body is read to the declared
/// Content-Length (missing means empty), buffered entirely in memory to
/// match the engine's model.
pub fn read_request<R: BufRead>(reader: &mut R, max_body: usize) -> Result<Request, RequestError> {
    let request_line = read_line(reader)?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RequestError::Malformed("empty request line".to_string()))?
        .to_string();
    let path = parts
        .next()
        .ok_or_else(|| RequestError::Malformed("missing request path".to_string()))?
        .to_string();
    if parts.next().is_none() {
        return Err(RequestError::Malformed("missing HTTP version".to_string()));
    }

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| RequestError::Malformed(format!("bad header line: {line}")))?;
        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    let content_length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .map(|(_, value)| {
            value
                .parse::<usize>()
                .map_err(|_| RequestError::Malformed(format!("bad content-length: {value}")))
        })
        .transpose()?
        .unwrap_or(0);

    if content_length > max_body {
        return Err(RequestError::BodyTooLarge { declared: content_length, limit: max_body });
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).map_err(RequestError::Io)?;

    Ok(Request { method, path, headers, body })
}

/// Cap on a single request or header line. The body limit only applies
/// after the header section, so lines themselves must be bounded too.
const MAX_LINE_BYTES: u64 = 8 * 1024;

fn read_line<R: BufRead>(reader: &mut R) -> Result<String, RequestError> {
    let mut line = String::new();
    let n = reader
        .by_ref()
        .take(MAX_LINE_BYTES + 1)
        .read_line(&mut line)
        .map_err(RequestError::Io)?;
    if n == 0 {
        return Err(RequestError::Malformed("connection closed mid-request".to_string()));
    }
    if n as u64 > MAX_LINE_BYTES {
        return Err(RequestError::Malformed(format!(
            "header line exceeds {} bytes",
            MAX_LINE_BYTES
        )));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// An outgoing response. Content-Length and Connection are added on write.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    reason: &'static str,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, reason: &'static str) -> Self {
        Self { status, reason, headers: Vec::new(), body: Vec::new() }
    }

    /// Plain-text response, used for every non-archive outcome.
    pub fn text(status: u16, reason: &'static str, message: &str) -> Self {
        Self::new(status, reason)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(message.as_bytes().to_vec())
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> std::io::Result<()> {
        write!(stream, "HTTP/1.1 {} {}\r\n", self.status, self.reason)?;
        for (name, value) in &self.headers {
            write!(stream, "{}: {}\r\n", name, value)?;
        }
        write!(stream, "Content-Length: {}\r\n", self.body.len())?;
        write!(stream, "Connection: close\r\n\r\n")?;
        stream.write_all(&self.body)?;
        stream.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(raw: &[u8], max_body: usize) -> Result<Request, RequestError> {
        read_request(&mut Cursor::new(raw.to_vec()), max_body)
    }

    #[test]
    fn test_parse_post_with_body() {
        let raw = b"POST /processar-zip/ HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\n\r\nzipp";
        let request = parse(raw, 1024).unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.route(), "/processar-zip");
        assert_eq!(request.body, b"zipp");
        assert_eq!(request.header("host"), Some("x"));
        assert_eq!(request.header("HOST"), Some("x"));
    }

    #[test]
    fn test_missing_body_is_empty() {
        let raw = b"GET / HTTP/1.1\r\n\r\n";
        let request = parse(raw, 1024).unwrap();
        assert!(request.body.is_empty());
        assert_eq!(request.route(), "/");
    }

    #[test]
    fn test_oversized_body_rejected_before_read() {
        let raw = b"POST /processar-zip HTTP/1.1\r\nContent-Length: 2048\r\n\r\n";
        match parse(raw, 1024) {
            Err(RequestError::BodyTooLarge { declared, limit }) => {
                assert_eq!(declared, 2048);
                assert_eq!(limit, 1024);
            }
            other => panic!("expected BodyTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_request_line() {
        assert!(matches!(parse(b"NONSENSE\r\n\r\n", 1024), Err(RequestError::Malformed(_))));
        assert!(matches!(parse(b"\r\n\r\n", 1024), Err(RequestError::Malformed(_))));
    }

    #[test]
    fn test_oversized_header_line_rejected() {
        let mut raw = b"POST /processar-zip HTTP/1.1\r\nX-Junk: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(16 * 1024));
        raw.extend_from_slice(b"\r\n\r\n");
        match parse(&raw, 1024) {
            Err(RequestError::Malformed(msg)) => assert!(msg.contains("header line")),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_content_length() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n";
        assert!(matches!(parse(raw, 1024), Err(RequestError::Malformed(_))));
    }

    #[test]
    fn test_route_strips_query() {
        let raw = b"POST /processar-zip?debug=1 HTTP/1.1\r\n\r\n";
        let request = parse(raw, 1024).unwrap();
        assert_eq!(request.route(), "/processar-zip");
    }

    #[test]
    fn test_response_wire_format() {
        let response = Response::text(404, "Not Found", "no such route");
        let mut out = Vec::new();
        response.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 13\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\nno such route"));
    }
}
