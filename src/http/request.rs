//! Request reading and parameter parsing for the grid API.
//!
//! Only the request line matters: the path selects the command and carries
//! its parameters. Header lines are read and discarded up to the blank line.

use std::fmt;
use std::io::{self, BufRead, Read};

/// Longest accepted request or header line, including the line ending.
pub const MAX_LINE_LENGTH: u64 = 4096;

/// Most cells a single `/set` may carry.
pub const MAX_CELLS: usize = 4;

/// Valid row and column indices.
pub const CELL_RANGE: std::ops::RangeInclusive<i64> = 1..=4;

/// A `row:col` pair from a `/set` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub row: u8,
    pub col: u8,
}

/// Errors raised while reading or interpreting a request.
#[derive(Debug)]
pub enum RequestError {
    /// Socket failure while reading.
    Io(io::Error),
    /// Peer closed before sending a request line.
    Closed,
    /// A line exceeded `MAX_LINE_LENGTH`.
    LineTooLong,
    /// Request line has no path or is not valid UTF-8.
    Malformed,
    /// Anything other than GET.
    MethodNotAllowed(String),
    /// Path matches no command.
    UnknownPath(String),
    /// Wrong number of `/set` items.
    BadCommand,
    /// A `/set` item failed to parse or was out of range.
    InvalidData(String),
}

impl RequestError {
    /// Status to answer with, if the client should get a response at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Io(_) | RequestError::Closed => None,
            _ => Some(400),
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Io(e) => write!(f, "error reading request: {}", e),
            RequestError::Closed => write!(f, "connection closed before request"),
            RequestError::LineTooLong => {
                write!(f, "Line longer than {} bytes", MAX_LINE_LENGTH)
            }
            RequestError::Malformed => write!(f, "Malformed request line"),
            RequestError::MethodNotAllowed(_) => write!(f, "Can only accept GET"),
            RequestError::UnknownPath(_) => write!(f, "Only allowed urls are /get and /set"),
            RequestError::BadCommand => write!(f, "Failed to parse command"),
            RequestError::InvalidData(item) => write!(f, "Invalid data: {}", item),
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequestError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RequestError {
    fn from(e: io::Error) -> Self {
        RequestError::Io(e)
    }
}

/// Read one line of at most `MAX_LINE_LENGTH` bytes into `line`.
///
/// Bytes are kept as received; 0 means EOF.
fn read_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> Result<usize, RequestError> {
    line.clear();
    let n = reader
        .by_ref()
        .take(MAX_LINE_LENGTH)
        .read_until(b'\n', line)?;
    if n as u64 == MAX_LINE_LENGTH && line.last() != Some(&b'\n') {
        return Err(RequestError::LineTooLong);
    }
    Ok(n)
}

/// Read the request line and return its path.
///
/// The path is the text between the first and second space. Only `GET` is
/// accepted.
pub fn read_request_line<R: BufRead>(reader: &mut R) -> Result<String, RequestError> {
    let mut raw = Vec::with_capacity(128);
    if read_line(reader, &mut raw)? == 0 {
        return Err(RequestError::Closed);
    }

    let line = std::str::from_utf8(&raw).map_err(|_| RequestError::Malformed)?;
    let line = line.trim_end_matches(['\r', '\n']);
    let (method, rest) = line.split_once(' ').unwrap_or((line, ""));
    if method != "GET" {
        return Err(RequestError::MethodNotAllowed(method.to_string()));
    }

    let path = rest.split(' ').next().unwrap_or("").trim();
    if path.is_empty() {
        return Err(RequestError::Malformed);
    }
    Ok(path.to_string())
}

/// Discard header lines through the terminating blank line.
///
/// Header contents are never decoded. EOF also ends the header block.
/// Returns the number of header lines skipped.
pub fn skip_headers<R: BufRead>(reader: &mut R) -> Result<usize, RequestError> {
    let mut line = Vec::with_capacity(128);
    let mut count = 0;
    loop {
        if read_line(reader, &mut line)? == 0 {
            return Ok(count);
        }
        if line == b"\r\n" || line == b"\n" {
            return Ok(count);
        }
        count += 1;
    }
}

/// Parse `/set` parameters: the last path segment, as up to four
/// comma-separated `row:col` pairs with each index in 1..=4.
pub fn parse_set(path: &str) -> Result<Vec<Cell>, RequestError> {
    let params = path.rsplit('/').next().unwrap_or("");

    let items: Vec<&str> = params.split(',').collect();
    if items.is_empty() || items.len() > MAX_CELLS {
        return Err(RequestError::BadCommand);
    }

    items.into_iter().map(parse_cell).collect()
}

fn parse_cell(item: &str) -> Result<Cell, RequestError> {
    let invalid = || RequestError::InvalidData(item.to_string());

    let (row, col) = item.split_once(':').ok_or_else(invalid)?;
    let row: i64 = row.parse().map_err(|_| invalid())?;
    let col: i64 = col.parse().map_err(|_| invalid())?;

    if !CELL_RANGE.contains(&row) || !CELL_RANGE.contains(&col) {
        return Err(invalid());
    }

    Ok(Cell {
        row: row as u8,
        col: col as u8,
    })
}
