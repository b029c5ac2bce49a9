//! HTTP/1.0 response writing.
//!
//! Every response carries the same header block: the connection is closed
//! after one response and clients are told not to cache anything, since the
//! data served is live control-system state.

use bytes::BytesMut;
use chrono::Utc;

/// Value of the `Server` header.
pub const SERVER: &str = concat!("ctrl-httpd/", env!("CARGO_PKG_VERSION"));

const CACHE_HEADERS: &str = "Cache-Control: no-store, no-cache, must-revalidate, pre-check=0, \
                             post-check=0, max-age=0\r\n\
                             Pragma: no-cache\r\n\
                             Expires: Mon, 3 Jan 2000 12:34:56 GMT\r\n";

const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: *\r\n";

/// Status codes this server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
    ServiceUnavailable,
}

impl Status {
    /// Map an error code onto the error table. Unknown codes become 501.
    pub fn error(code: u16) -> Self {
        match code {
            400 => Status::BadRequest,
            401 => Status::Unauthorized,
            403 => Status::Forbidden,
            404 => Status::NotFound,
            500 => Status::InternalServerError,
            503 => Status::ServiceUnavailable,
            _ => Status::NotImplemented,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
            Status::ServiceUnavailable => 503,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::Unauthorized => "Unauthorized",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
            Status::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// First line of an error body.
    fn base_message(self) -> &'static str {
        match self {
            Status::Ok => "200: OK",
            Status::BadRequest => "400: Bad Request!",
            Status::Unauthorized => "401: Not Authenticated!",
            Status::Forbidden => "403: Forbidden!",
            Status::NotFound => "404: Not Found!",
            Status::InternalServerError => "500: Internal Server Error!",
            Status::NotImplemented => "501: Not Implemented!",
            Status::ServiceUnavailable => "503: Service Unavailable",
        }
    }

    fn extra_header(self) -> Option<&'static str> {
        match self {
            Status::Unauthorized => Some("WWW-Authenticate: Basic realm=\"ctrl-httpd\""),
            _ => None,
        }
    }
}

/// Write the status line and standard header block, ending with the blank line.
pub fn write_header(
    out: &mut BytesMut,
    status: Status,
    content_type: &str,
    content_length: usize,
    extra: Option<&str>,
) {
    let status_line = format!("HTTP/1.0 {} {}\r\n", status.code(), status.reason());
    out.extend_from_slice(status_line.as_bytes());
    out.extend_from_slice(b"Connection: close\r\n");
    out.extend_from_slice(format!("Server: {}\r\n", SERVER).as_bytes());
    out.extend_from_slice(http_date().as_bytes());
    out.extend_from_slice(CACHE_HEADERS.as_bytes());
    out.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
    out.extend_from_slice(format!("Content-Length: {}\r\n", content_length).as_bytes());
    out.extend_from_slice(CORS_HEADERS.as_bytes());
    if let Some(extra) = extra.filter(|extra| !extra.is_empty()) {
        out.extend_from_slice(extra.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

/// Write a complete `200 OK` JSON response.
pub fn write_json(out: &mut BytesMut, body: &str) {
    write_header(out, Status::Ok, "application/json", body.len(), None);
    out.extend_from_slice(body.as_bytes());
}

/// Write a complete plain-text error response for `code`.
///
/// The body is the status' base message followed by `message`.
pub fn write_error(out: &mut BytesMut, code: u16, message: &str) {
    let status = Status::error(code);
    let body = format!("{}\r\n{}", status.base_message(), message);
    write_header(out, status, "text/plain", body.len(), status.extra_header());
    out.extend_from_slice(body.as_bytes());
}

fn http_date() -> String {
    Utc::now()
        .format("Date: %a, %d %b %Y %H:%M:%S GMT\r\n")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(out: &BytesMut) -> String {
        String::from_utf8(out.to_vec()).unwrap()
    }

    #[test]
    fn test_error_table() {
        assert_eq!(Status::error(400), Status::BadRequest);
        assert_eq!(Status::error(401), Status::Unauthorized);
        assert_eq!(Status::error(403), Status::Forbidden);
        assert_eq!(Status::error(404), Status::NotFound);
        assert_eq!(Status::error(500), Status::InternalServerError);
        assert_eq!(Status::error(503), Status::ServiceUnavailable);
        assert_eq!(Status::error(418), Status::NotImplemented);
        assert_eq!(Status::error(200), Status::NotImplemented);
    }

    #[test]
    fn test_header_block() {
        let mut out = BytesMut::new();
        write_header(&mut out, Status::Ok, "application/json", 9, None);
        let text = text(&out);

        assert!(text.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("Pragma: no-cache\r\n"));
        assert!(text.contains("Expires: Mon, 3 Jan 2000 12:34:56 GMT\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.contains("Content-Length: 9\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.contains("\r\nDate: "));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_json_response() {
        let mut out = BytesMut::new();
        write_json(&mut out, "[1,2,3,4]");
        let text = text(&out);
        assert!(text.ends_with("\r\n\r\n[1,2,3,4]"));
    }

    #[test]
    fn test_error_response() {
        let mut out = BytesMut::new();
        write_error(&mut out, 400, "Invalid data");
        let text = text(&out);

        assert!(text.starts_with("HTTP/1.0 400 Bad Request\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.ends_with("\r\n\r\n400: Bad Request!\r\nInvalid data"));
    }

    #[test]
    fn test_unauthorized_has_challenge() {
        let mut out = BytesMut::new();
        write_error(&mut out, 401, "");
        let text = text(&out);
        assert!(text.contains("WWW-Authenticate: Basic realm=\"ctrl-httpd\"\r\n"));
    }

    #[test]
    fn test_unknown_code_is_not_implemented() {
        let mut out = BytesMut::new();
        write_error(&mut out, 299, "nope");
        let text = text(&out);
        assert!(text.starts_with("HTTP/1.0 501 Not Implemented\r\n"));
        assert!(text.ends_with("501: Not Implemented!\r\nnope"));
    }
}
