//! # RESP2 Encoding and Parsing
//!
//! Purpose: Encode commands and replies and parse both directions of the
//! RESP2 protocol, keeping allocations under control.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Replies are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.
//!
//! The blocking reader (`read_response`) serves the client driver; the
//! incremental `RespParser` serves the async server, which may hold several
//! pipelined request frames (or a partial one) in a single buffer.

use std::io::BufRead;

use bytes::{Buf, BytesMut};

use crate::error::RespError;

/// Upper bound on a single bulk string (matches the store's 512 MB limit).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Deepest array nesting accepted in a reply. Pub/sub pushes are flat.
pub const MAX_NESTING: usize = 8;

/// RESP value, used for replies and for server-side encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK or +PONG style responses.
    Simple(Vec<u8>),
    /// -ERR ... responses.
    Error(Vec<u8>),
    /// :123 responses.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays (pub/sub pushes).
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Builds a simple status reply.
    pub fn simple(message: &str) -> Self {
        RespValue::Simple(message.as_bytes().to_vec())
    }

    /// Builds an error reply with the conventional `ERR` prefix.
    pub fn error(message: &str) -> Self {
        let mut buf = Vec::with_capacity(message.len() + 4);
        buf.extend_from_slice(b"ERR ");
        buf.extend_from_slice(message.as_bytes());
        RespValue::Error(buf)
    }

    /// Builds a bulk string reply.
    pub fn bulk(data: &[u8]) -> Self {
        RespValue::Bulk(Some(data.to_vec()))
    }

    /// The null bulk string.
    pub fn null() -> Self {
        RespValue::Bulk(None)
    }

    /// Returns a short name for the reply type, used in decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            RespValue::Simple(_) => "simple string",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::Bulk(Some(_)) => "bulk string",
            RespValue::Bulk(None) => "nil",
            RespValue::Array(_) => "array",
        }
    }

    /// Appends the wire encoding of this value to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            RespValue::Simple(text) => {
                out.push(b'+');
                out.extend_from_slice(text);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Error(text) => {
                out.push(b'-');
                out.extend_from_slice(text);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(value) => {
                out.push(b':');
                let (digits, len) = encode_i64(*value);
                out.extend_from_slice(&digits[..len]);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
            RespValue::Bulk(Some(data)) => {
                out.push(b'$');
                push_usize(out, data.len());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Array(items) => {
                out.push(b'*');
                push_usize(out, items.len());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

/// Encodes a RESP2 array command into the provided buffer.
pub fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    out.push(b'*');
    push_usize(out, args.len());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        push_usize(out, arg.len());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads one RESP value from the buffered reader.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> Result<RespValue, RespError> {
    read_nested(reader, line_buf, 0)
}

fn read_nested<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>, depth: usize) -> Result<RespValue, RespError> {
    read_line(reader, line_buf)?;
    if line_buf.is_empty() {
        return Err(RespError::Protocol("empty reply line"));
    }

    match line_buf[0] {
        b'+' => Ok(RespValue::Simple(line_buf[1..].to_vec())),
        b'-' => Ok(RespValue::Error(line_buf[1..].to_vec())),
        b':' => Ok(RespValue::Integer(parse_i64(&line_buf[1..])?)),
        b'$' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_bulk_len(reader, len, line_buf)
        }
        b'*' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_array_len(reader, len, line_buf, depth + 1)
        }
        _ => Err(RespError::Protocol("unknown reply type")),
    }
}

fn parse_bulk_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> Result<RespValue, RespError> {
    if len < 0 {
        return Ok(RespValue::Bulk(None));
    }
    let len = len as usize;
    if len > MAX_BULK_LEN {
        return Err(RespError::Protocol("bulk string too large"));
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != [b'\r', b'\n'] {
        return Err(RespError::Protocol("missing bulk terminator"));
    }

    line_buf.clear();
    Ok(RespValue::Bulk(Some(data)))
}

fn parse_array_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
    depth: usize,
) -> Result<RespValue, RespError> {
    if depth > MAX_NESTING {
        return Err(RespError::Protocol("arrays nested too deeply"));
    }
    if len <= 0 {
        return Ok(RespValue::Array(Vec::new()));
    }

    // The length is untrusted; grow on demand past a small reservation.
    let mut items = Vec::with_capacity((len as usize).min(16));
    for _ in 0..len {
        items.push(read_nested(reader, line_buf, depth)?);
    }
    Ok(RespValue::Array(items))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<(), RespError> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(RespError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed",
        )));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(RespError::Protocol("line without CRLF"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

/// Parses an ASCII decimal integer with an optional leading `-`.
pub fn parse_i64(data: &[u8]) -> Result<i64, RespError> {
    if data.is_empty() {
        return Err(RespError::Protocol("empty integer"));
    }
    let (negative, digits) = match data[0] {
        b'-' => (true, &data[1..]),
        _ => (false, data),
    };
    if digits.is_empty() {
        return Err(RespError::Protocol("empty integer"));
    }

    // Accumulate negatively so i64::MIN round-trips.
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(RespError::Protocol("invalid integer"));
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_sub((b - b'0') as i64))
            .ok_or(RespError::Protocol("integer out of range"))?;
    }

    if negative {
        Ok(value)
    } else {
        value
            .checked_neg()
            .ok_or(RespError::Protocol("integer out of range"))
    }
}

/// Formats an `i64` into a stack buffer, returning the buffer and length.
pub fn encode_i64(value: i64) -> ([u8; 20], usize) {
    // Stack buffer keeps conversion allocation-free.
    let mut buf = [0u8; 20];
    let mut len = 0;
    let mut magnitude = value.unsigned_abs();
    if magnitude == 0 {
        buf[0] = b'0';
        return (buf, 1);
    }
    while magnitude > 0 {
        buf[len] = b'0' + (magnitude % 10) as u8;
        magnitude /= 10;
        len += 1;
    }
    if value < 0 {
        buf[len] = b'-';
        len += 1;
    }
    buf[..len].reverse();
    (buf, len)
}

/// Formats a `u64` into a stack buffer, returning the buffer and length.
pub fn encode_u64(mut value: u64) -> ([u8; 20], usize) {
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        return (buf, 1);
    }
    while value > 0 {
        buf[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
    }
    buf[..len].reverse();
    (buf, len)
}

fn push_usize(out: &mut Vec<u8>, value: usize) {
    let (digits, len) = encode_u64(value as u64);
    out.extend_from_slice(&digits[..len]);
}

/// Incremental parser for client request frames.
///
/// Request frames are arrays of bulk strings. `parse` consumes one complete
/// frame from the front of the buffer, or returns `Ok(None)` and leaves the
/// buffer untouched when the frame is not complete yet.
#[derive(Debug, Default)]
pub struct RespParser {
    _private: (),
}

impl RespParser {
    /// Creates a parser.
    pub fn new() -> Self {
        RespParser { _private: () }
    }

    /// Parses the next request frame from `buf`.
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        match parse_frame(&buf[..])? {
            Some((args, consumed)) => {
                buf.advance(consumed);
                Ok(Some(args))
            }
            None => Ok(None),
        }
    }
}

fn parse_frame(data: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>, RespError> {
    let (line, mut pos) = match find_line(data, 0) {
        Some(found) => found,
        None => return Ok(None),
    };
    if line.first() != Some(&b'*') {
        return Err(RespError::Protocol("expected array frame"));
    }
    let count = parse_len(&line[1..])?;

    let mut args = Vec::with_capacity(count.min(16));
    for _ in 0..count {
        let (line, next) = match find_line(data, pos) {
            Some(found) => found,
            None => return Ok(None),
        };
        if line.first() != Some(&b'$') {
            return Err(RespError::Protocol("expected bulk string"));
        }
        let len = parse_len(&line[1..])?;
        if len > MAX_BULK_LEN {
            return Err(RespError::Protocol("bulk string too large"));
        }
        let end = next + len;
        if data.len() < end + 2 {
            return Ok(None);
        }
        if &data[end..end + 2] != b"\r\n" {
            return Err(RespError::Protocol("missing bulk terminator"));
        }
        args.push(data[next..end].to_vec());
        pos = end + 2;
    }

    Ok(Some((args, pos)))
}

fn find_line(data: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = data.get(start..)?;
    let offset = rest.windows(2).position(|window| window == b"\r\n")?;
    Some((&rest[..offset], start + offset + 2))
}

fn parse_len(data: &[u8]) -> Result<usize, RespError> {
    let value = parse_i64(data)?;
    if value < 0 {
        return Err(RespError::Protocol("negative length"));
    }
    Ok(value as usize)
}
