//! Raw protocol client: pre-built extended-query messages written straight
//! to a socket.
//!
//! Message encoding and authentication come from `postgres-protocol`. The
//! timed path never parses rows: it writes a Bind/Execute/Sync buffer and
//! reads until the received bytes end, on a message boundary, with the
//! ReadyForQuery marker
//!
//! ```text
//! | 'Z' | 00 | 00 | 00 | 05 | 'I' |
//!  type   length (incl. self)  idle
//! ```
//!
//! [`RawClient::verify`] frames one response per shape outside the timed
//! region to confirm the statements actually return rows.

mod connect;

use crate::error::ProtocolError;
use crate::runner::QueryShape;
use bench_core::config::ConnConfig;
use bytes::BytesMut;
use connect::RawStream;
use fallible_iterator::FallibleIterator;
use postgres_protocol::message::backend::{ErrorResponseBody, Message};
use postgres_protocol::message::frontend::{self, BindError};
use postgres_protocol::{types, IsNull};
use std::io::{Read, Write};
use tokio_postgres::types::Type;

/// Size of one socket read.
const READ_CHUNK: usize = 8192;

/// BindComplete backend message type.
const BIND_COMPLETE: u8 = b'2';

/// ReadyForQuery status of a session outside any transaction.
const IDLE: u8 = b'I';

/// Binary format code for parameters and results.
const BINARY: i16 = 1;

/// True when `received` ends with a complete ReadyForQuery message reporting
/// an idle session. Only the final six bytes are inspected, so a `'Z'` inside
/// row data earlier in the buffer is ignored. A read that happens to stop
/// right after row data ending in those six bytes still matches; the read
/// loop uses [`ResponseFramer`] to rule that out.
pub fn is_ready_for_query(received: &[u8]) -> bool {
    ready_status(received) == Some(IDLE)
}

/// Transaction status of a ReadyForQuery ending `received`, if there is one.
fn ready_status(received: &[u8]) -> Option<u8> {
    match received {
        [.., b'Z', 0, 0, 0, 5, status @ (b'I' | b'T' | b'E')] => Some(*status),
        _ => None,
    }
}

/// Walks message headers of a response as it arrives, so the end of the
/// cycle is only reported on a real message boundary. Message bodies are
/// skipped, never parsed.
#[derive(Debug, Default)]
pub struct ResponseFramer {
    /// Offset of the first message not yet fully received.
    next: usize,
}

impl ResponseFramer {
    /// Skip every complete message in `received`. Returns the transaction
    /// status once the buffer ends exactly with a ReadyForQuery message.
    pub fn advance(&mut self, received: &[u8]) -> Option<u8> {
        while let Some(header) = received.get(self.next..self.next + 5) {
            let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
            let end = self.next.saturating_add(1).saturating_add(len);
            if end > received.len() {
                break;
            }
            self.next = end;
            if header[0] == b'Z' && end == received.len() {
                return ready_status(received);
            }
        }
        None
    }
}

/// What a framed response contained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSummary {
    pub data_rows: usize,
    pub command_tag: String,
}

/// Frame a complete response cycle and count its rows.
///
/// Fails on an ErrorResponse (reporting the server's code and message) and
/// when the bytes do not finish with ReadyForQuery.
pub fn summarize(response: &[u8]) -> Result<ResponseSummary, ProtocolError> {
    let mut buf = BytesMut::from(response);
    let mut summary = ResponseSummary::default();

    while let Some(message) = Message::parse(&mut buf)? {
        match message {
            Message::DataRow(_) => summary.data_rows += 1,
            Message::CommandComplete(body) => summary.command_tag = body.tag()?.to_string(),
            Message::ErrorResponse(body) => return Err(server_error(&body)),
            Message::ReadyForQuery(_) => {
                if !buf.is_empty() {
                    return Err(ProtocolError::Unexpected {
                        message: "trailing bytes",
                        during: "response framing",
                    });
                }
                return Ok(summary);
            }
            _ => {}
        }
    }

    Err(ProtocolError::Unterminated)
}

pub(crate) fn server_error(body: &ErrorResponseBody) -> ProtocolError {
    let mut code = String::new();
    let mut message = String::new();
    let mut fields = body.fields();
    loop {
        match fields.next() {
            Ok(Some(field)) => match field.type_() {
                b'C' => code = String::from_utf8_lossy(field.value_bytes()).into_owned(),
                b'M' => message = String::from_utf8_lossy(field.value_bytes()).into_owned(),
                _ => {}
            },
            Ok(None) => break,
            Err(err) => return ProtocolError::Io(err),
        }
    }
    ProtocolError::Server { code, message }
}

/// A single dedicated connection speaking the wire protocol directly.
pub struct RawClient {
    stream: RawStream,
    /// Scratch space for one socket read.
    chunk: Box<[u8]>,
    /// Unparsed bytes during startup and prepare.
    inbound: BytesMut,
    /// Bytes of the most recent round trip.
    response: Vec<u8>,
}

impl RawClient {
    /// Open a socket and authenticate.
    pub fn connect(config: &ConnConfig) -> Result<Self, ProtocolError> {
        let mut client = RawClient {
            stream: RawStream::open(config)?,
            chunk: vec![0u8; READ_CHUNK].into_boxed_slice(),
            inbound: BytesMut::with_capacity(READ_CHUNK),
            response: Vec::with_capacity(READ_CHUNK),
        };
        client.startup(config)?;
        log::debug!("raw client connected to {config}");
        Ok(client)
    }

    fn read_chunk(&mut self) -> Result<usize, ProtocolError> {
        let n = self.stream.read(&mut self.chunk)?;
        if n == 0 {
            return Err(ProtocolError::Closed);
        }
        Ok(n)
    }

    fn read_message(&mut self) -> Result<Message, ProtocolError> {
        loop {
            if let Some(message) = Message::parse(&mut self.inbound)? {
                return Ok(message);
            }
            let n = self.read_chunk()?;
            self.inbound.extend_from_slice(&self.chunk[..n]);
        }
    }

    /// Parse and describe the named statement for `shape`, taking one int4
    /// parameter. Must run before any request for that shape is sent.
    pub fn prepare(&mut self, shape: QueryShape) -> Result<(), ProtocolError> {
        let mut buf = BytesMut::new();
        frontend::parse(shape.name(), shape.sql(), Some(Type::INT4.oid()), &mut buf)?;
        frontend::describe(b'S', shape.name(), &mut buf)?;
        frontend::sync(&mut buf);
        self.stream.write_all(&buf)?;

        let mut failure = None;
        loop {
            match self.read_message()? {
                Message::ParseComplete
                | Message::ParameterDescription(_)
                | Message::RowDescription(_)
                | Message::NoData
                | Message::NoticeResponse(_)
                | Message::ParameterStatus(_) => {}
                Message::ErrorResponse(body) => failure = Some(server_error(&body)),
                Message::ReadyForQuery(_) => break,
                _ => {
                    return Err(ProtocolError::Unexpected {
                        message: "non-prepare message",
                        during: "prepare",
                    })
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Encode Bind/Execute/Sync for one execution of `shape` with `id`,
    /// requesting binary results.
    pub fn build_request(shape: QueryShape, id: i32) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = BytesMut::new();
        frontend::bind(
            "",
            shape.name(),
            Some(BINARY),
            Some(id),
            |id, buf| {
                types::int4_to_sql(id, buf);
                Ok::<_, Box<dyn std::error::Error + Sync + Send>>(IsNull::No)
            },
            Some(BINARY),
            &mut buf,
        )
        .map_err(|err| match err {
            BindError::Conversion(_) => ProtocolError::Encode("Bind"),
            BindError::Serialization(io) => ProtocolError::Io(io),
        })?;
        frontend::execute("", 0, &mut buf)?;
        frontend::sync(&mut buf);
        Ok(buf.to_vec())
    }

    /// One request buffer per id, in the same order.
    pub fn build_requests(shape: QueryShape, ids: &[i32]) -> Result<Vec<Vec<u8>>, ProtocolError> {
        ids.iter().map(|&id| Self::build_request(shape, id)).collect()
    }

    /// Write `request` and block until the response ends with ReadyForQuery.
    ///
    /// Besides the terminator only the first byte is checked: a response that
    /// does not open with BindComplete means the server rejected the request.
    pub fn roundtrip(&mut self, request: &[u8]) -> Result<(), ProtocolError> {
        self.stream.write_all(request)?;

        self.response.clear();
        let mut framer = ResponseFramer::default();
        let status = loop {
            let n = self.read_chunk()?;
            self.response.extend_from_slice(&self.chunk[..n]);
            if let Some(status) = framer.advance(&self.response) {
                break status;
            }
        };
        if !is_ready_for_query(&self.response) {
            return Err(ProtocolError::NotIdle(status as char));
        }

        match self.response.first() {
            Some(&BIND_COMPLETE) => Ok(()),
            Some(&other) => Err(ProtocolError::MissingBindComplete(other as char)),
            None => Err(ProtocolError::Unterminated),
        }
    }

    /// Bytes received by the most recent [`RawClient::roundtrip`].
    pub fn last_response(&self) -> &[u8] {
        &self.response
    }

    /// Execute `shape` once for `id` and check the framed response carries the
    /// number of rows the shape may return.
    pub fn verify(&mut self, shape: QueryShape, id: i32) -> Result<ResponseSummary, ProtocolError> {
        let request = Self::build_request(shape, id)?;
        if let Err(err) = self.roundtrip(&request) {
            // A rejected request still carries the server's reason.
            if let ProtocolError::MissingBindComplete(_) = err {
                summarize(&self.response)?;
            }
            return Err(err);
        }

        let summary = summarize(&self.response)?;
        let expected = shape.expected_rows();
        if !expected.contains(&summary.data_rows) {
            return Err(ProtocolError::RowCount {
                expected: format!("{}..={}", expected.start(), expected.end()),
                actual: summary.data_rows,
            });
        }
        Ok(summary)
    }
}

impl Drop for RawClient {
    fn drop(&mut self) {
        let mut buf = BytesMut::new();
        frontend::terminate(&mut buf);
        let _ = self.stream.write_all(&buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    /// Append one backend message: type byte, big-endian length, body.
    fn push_message(buf: &mut Vec<u8>, tag: u8, body: &[u8]) {
        buf.push(tag);
        buf.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
        buf.extend_from_slice(body);
    }

    fn data_row(values: &[&[u8]]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&(values.len() as i16).to_be_bytes());
        for v in values {
            body.extend_from_slice(&(v.len() as i32).to_be_bytes());
            body.extend_from_slice(v);
        }
        body
    }

    fn response_with_rows(rows: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        push_message(&mut buf, b'2', &[]);
        for _ in 0..rows {
            push_message(&mut buf, b'D', &data_row(&[b"Jane"]));
        }
        push_message(&mut buf, b'C', format!("SELECT {rows}\0").as_bytes());
        push_message(&mut buf, b'Z', b"I");
        buf
    }

    #[test]
    fn detects_ready_for_query_at_end() {
        assert!(is_ready_for_query(&response_with_rows(3)));
        assert!(is_ready_for_query(b"Z\0\0\0\x05I"));
    }

    #[test]
    fn ignores_marker_in_non_terminal_position() {
        let mut buf = Vec::new();
        push_message(&mut buf, b'2', &[]);
        // Row data that happens to contain the full marker sequence.
        push_message(&mut buf, b'D', &data_row(&[b"Z\0\0\0\x05I", b"tail"]));
        assert!(!is_ready_for_query(&buf));

        let mut split = response_with_rows(1);
        split.truncate(split.len() - 1);
        assert!(!is_ready_for_query(&split));
    }

    #[test]
    fn rejects_short_or_non_idle_buffers() {
        assert!(!is_ready_for_query(b""));
        assert!(!is_ready_for_query(b"\0\0\x05I"));
        // In-transaction and failed-transaction status bytes.
        assert!(!is_ready_for_query(b"Z\0\0\0\x05T"));
        assert!(!is_ready_for_query(b"Z\0\0\0\x05E"));
        assert_eq!(ready_status(b"Z\0\0\0\x05T"), Some(b'T'));
        // Wrong length field.
        assert!(!is_ready_for_query(b"Z\0\0\x01\x05I"));
    }

    #[test]
    fn framer_waits_for_a_real_message_boundary() {
        // Row data whose last six bytes spell an idle ReadyForQuery.
        let mut buf = Vec::new();
        push_message(&mut buf, b'2', &[]);
        push_message(&mut buf, b'D', &data_row(&[b"Z\0\0\0\x05I"]));
        let row_end = buf.len();
        push_message(&mut buf, b'C', b"SELECT 1\0");
        push_message(&mut buf, b'Z', b"I");

        let mut framer = ResponseFramer::default();
        assert!(is_ready_for_query(&buf[..row_end]));
        assert_eq!(framer.advance(&buf[..row_end]), None);
        assert_eq!(framer.advance(&buf[..buf.len() - 3]), None);
        assert_eq!(framer.advance(&buf), Some(b'I'));
    }

    #[test]
    fn framer_reports_non_idle_status() {
        let mut buf = Vec::new();
        push_message(&mut buf, b'2', &[]);
        push_message(&mut buf, b'Z', b"T");
        assert_eq!(ResponseFramer::default().advance(&buf), Some(b'T'));
        assert!(!is_ready_for_query(&buf));
    }

    #[test]
    fn request_is_bind_execute_sync() {
        let request = RawClient::build_request(QueryShape::SingleRow, 42).unwrap();
        assert_eq!(request[0], b'B');

        // Bind body: portal "", statement name, then formats and the value.
        let name = QueryShape::SingleRow.name().as_bytes();
        assert_eq!(&request[5..6], b"\0");
        assert_eq!(&request[6..6 + name.len()], name);
        let mut encoded_id = BytesMut::new();
        encoded_id.put_i32(4);
        encoded_id.put_i32(42);
        assert!(request
            .windows(encoded_id.len())
            .any(|w| w == &encoded_id[..]));

        // Execute of the unnamed portal with no row limit, then Sync.
        let tail = &request[request.len() - 15..];
        assert_eq!(tail, b"E\0\0\0\x09\0\0\0\0\0S\0\0\0\x04");
    }

    #[test]
    fn requests_follow_id_order() {
        let ids = [5, 1, 9];
        let requests = RawClient::build_requests(QueryShape::SingleValue, &ids).unwrap();
        assert_eq!(requests.len(), 3);
        for (request, id) in requests.iter().zip(ids) {
            assert_eq!(request, &RawClient::build_request(QueryShape::SingleValue, id).unwrap());
        }
        assert_ne!(requests[0], requests[1]);
    }

    #[test]
    fn summarize_counts_rows_and_tag() {
        let summary = summarize(&response_with_rows(25)).unwrap();
        assert_eq!(summary.data_rows, 25);
        assert_eq!(summary.command_tag, "SELECT 25");
    }

    #[test]
    fn summarize_surfaces_server_errors() {
        let mut buf = Vec::new();
        push_message(
            &mut buf,
            b'E',
            b"SERROR\0C26000\0Mprepared statement \"single_row\" does not exist\0\0",
        );
        push_message(&mut buf, b'Z', b"I");

        match summarize(&buf) {
            Err(ProtocolError::Server { code, message }) => {
                assert_eq!(code, "26000");
                assert!(message.contains("does not exist"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn summarize_requires_terminator() {
        let mut buf = response_with_rows(2);
        buf.truncate(buf.len() - 6);
        assert!(matches!(summarize(&buf), Err(ProtocolError::Unterminated)));
    }
}
