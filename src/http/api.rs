//! The grid API: a tiny JSON endpoint for a control-system dashboard.
//!
//! ```text
//! GET /get              -> 200 [1,2,3,4]
//! GET /set/1:2,3:4      -> 200 [[1,2],[3,4]]
//! GET /set/5:1          -> 400 Invalid data
//! POST /                -> 400 Can only accept GET
//! ```

use crate::handler::{Handler, HandlerError};
use crate::http::request::{parse_set, read_request_line, skip_headers, Cell, RequestError};
use crate::http::response::{write_error, write_json};
use crate::stream::Stream;
use bytes::BytesMut;
use std::io::{BufRead, BufReader, Write};
use tracing::debug;

/// Body served by `/get`.
const GRID: &str = "[1,2,3,4]";

const RESPONSE_CAPACITY: usize = 512;

/// Handler serving `/get` and `/set` over one request per connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct GridApi;

impl GridApi {
    pub fn new() -> Self {
        Self
    }

    /// Read one request from `reader` and write the full response into `out`.
    ///
    /// Client errors still produce a response in `out` before the error is
    /// returned; socket errors produce none.
    pub fn respond<R: BufRead>(&self, reader: &mut R, out: &mut BytesMut) -> Result<(), RequestError> {
        let result = read_request_line(reader).and_then(|path| {
            debug!(path = %path, "Request");
            skip_headers(reader)?;
            route(&path, out)
        });

        if let Err(ref e) = result {
            if let RequestError::MethodNotAllowed(method) = e {
                debug!(method = %method, "Rejected method");
            }
            if let Some(code) = e.status() {
                if out.is_empty() {
                    write_error(out, code, &e.to_string());
                }
            }
        }
        result
    }
}

impl Handler for GridApi {
    fn handle(&self, stream: &mut dyn Stream) -> Result<(), HandlerError> {
        let mut out = BytesMut::with_capacity(RESPONSE_CAPACITY);
        let result = {
            let mut reader = BufReader::new(&mut *stream);
            self.respond(&mut reader, &mut out)
        };

        if !out.is_empty() {
            stream.write_all(&out)?;
            stream.flush()?;
        }
        result.map_err(Into::into)
    }
}

/// Dispatch on the request path. `/get` wins if both appear.
fn route(path: &str, out: &mut BytesMut) -> Result<(), RequestError> {
    if path.contains("/get") {
        write_json(out, GRID);
        Ok(())
    } else if path.contains("/set") {
        let cells = parse_set(path)?;
        debug!(cells = ?cells, "Set");
        write_json(out, &cells_json(&cells));
        Ok(())
    } else {
        Err(RequestError::UnknownPath(path.to_string()))
    }
}

fn cells_json(cells: &[Cell]) -> String {
    let pairs: Vec<String> = cells
        .iter()
        .map(|cell| format!("[{},{}]", cell.row, cell.col))
        .collect();
    format!("[{}]", pairs.join(","))
}
