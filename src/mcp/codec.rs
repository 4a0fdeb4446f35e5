// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MCP Transport Codec.
//!
//! Newline-delimited JSON framing. The decoder buffers across arbitrary
//! chunk boundaries and yields one [`Frame`] per complete line. A line that
//! is not JSON, or is longer than the limit, becomes `Frame::Malformed` and
//! never disturbs the lines that follow it.

use anyhow::Result;
use bytes::{Buf, BytesMut};
use serde::Serialize;
use serde_json::Value;
use std::cmp;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use crate::core::constants::limits;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A syntactically valid JSON value. Not yet checked for JSON-RPC shape.
    Message(Value),
    /// The line could not be parsed; carries the parser's complaint.
    Malformed(String),
}

pub struct LineCodec {
    max_length: usize,
    // Bytes of the buffer already scanned for '\n'.
    next_index: usize,
    discarding: bool,
}

impl LineCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(limits::MAX_MESSAGE_SIZE_BYTES)
    }

    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// `None` for blank lines.
fn parse_line(line: &[u8]) -> Option<Frame> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    match serde_json::from_slice::<Value>(line) {
        Ok(val) => {
            trace!("Decoded message: {:?}", val);
            Some(Frame::Message(val))
        }
        Err(e) => {
            debug!("Undecodable line ({} bytes): {}", line.len(), e);
            Some(Frame::Malformed(e.to_string()))
        }
    }
}

impl Decoder for LineCodec {
    type Item = Frame;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            let read_to = cmp::min(self.max_length.saturating_add(1), src.len());
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    src.advance(self.next_index + offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                    return Ok(Some(Frame::Malformed(format!(
                        "line exceeds {} bytes",
                        self.max_length
                    ))));
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = src.split_to(end + 1);
                    if let Some(frame) = parse_line(&line[..end]) {
                        return Ok(Some(frame));
                    }
                }
                (false, None) if src.len() > self.max_length => {
                    debug!("Line exceeds {} bytes, discarding", self.max_length);
                    self.discarding = true;
                    self.next_index = 0;
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        self.next_index = 0;
        if self.discarding {
            self.discarding = false;
            src.clear();
            return Ok(Some(Frame::Malformed(format!(
                "line exceeds {} bytes",
                self.max_length
            ))));
        }
        // Unterminated final line.
        loop {
            if src.is_empty() {
                return Ok(None);
            }
            let line = src.split_to(src.len());
            if let Some(frame) = parse_line(&line) {
                return Ok(Some(frame));
            }
        }
    }
}

impl<T: Serialize> Encoder<T> for LineCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(&item)?;
        dst.reserve(body.len() + 1);
        dst.extend_from_slice(&body);
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_split_line_is_reassembled() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"{\"jsonrpc\":\"2.0\",\"me"[..]);
        assert!(drain(&mut codec, &mut buf).is_empty());

        buf.extend_from_slice(b"thod\":\"ping\",\"id\":1}\n");
        assert_eq!(
            drain(&mut codec, &mut buf),
            vec![Frame::Message(
                json!({"jsonrpc": "2.0", "method": "ping", "id": 1})
            )]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"{\"a\":1}\n\n   \r\n{\"b\":2}\r\n{\"c\""[..]);
        assert_eq!(
            drain(&mut codec, &mut buf),
            vec![
                Frame::Message(json!({"a": 1})),
                Frame::Message(json!({"b": 2}))
            ]
        );
        assert_eq!(&buf[..], b"{\"c\"");
    }

    #[test]
    fn test_garbage_does_not_poison_following_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"not json at all\n\xff\xfe\n{\"ok\":true}\n"[..]);
        let frames = drain(&mut codec, &mut buf);
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], Frame::Malformed(_)));
        assert!(matches!(frames[1], Frame::Malformed(_)));
        assert_eq!(frames[2], Frame::Message(json!({"ok": true})));
    }

    #[test]
    fn test_oversized_line_is_discarded() {
        let mut codec = LineCodec::with_max_length(16);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"[1,2,3,4,5,6,7,8,9,10,");
        assert!(drain(&mut codec, &mut buf).is_empty());
        buf.extend_from_slice(b"11,12]\n[1]\n");
        let frames = drain(&mut codec, &mut buf);
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], Frame::Malformed(m) if m.contains("exceeds 16 bytes")));
        assert_eq!(frames[1], Frame::Message(json!([1])));
    }

    #[test]
    fn test_unterminated_final_line_at_eof() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"{\"id\":9}"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap(),
            Some(Frame::Message(json!({"id": 9})))
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encoder_appends_single_newline() {
        let mut codec = LineCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(json!({"text": "line one\nline two"}), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], b"{\"text\":\"line one\\nline two\"}\n");
    }
}
