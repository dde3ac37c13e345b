//! Reader for the tracking service's `multipart/x-mixed-replace` camera stream.

use std::collections::VecDeque;

use futures::{stream::BoxStream, StreamExt};
use reqwest::{header::CONTENT_TYPE, Response};
use tracing::debug;

use crate::api::{ClientError, VIDEO_FEED_PATH};

const DEFAULT_BOUNDARY: &str = "frame";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

pub fn boundary_from_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').trim_start_matches("--").to_string())
        .filter(|boundary| !boundary.is_empty())
        .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Reads the `Content-Length` header of one part, if declared.
fn content_length(headers: &[u8]) -> Option<usize> {
    std::str::from_utf8(headers)
        .ok()?
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

#[derive(Debug, Clone, Copy)]
struct PartBody {
    start: usize,
    length: Option<usize>,
}

/// Incremental splitter turning arbitrary byte chunks into complete part bodies.
///
/// Parts that declare `Content-Length` are cut at that length. Others end
/// where the next delimiter begins, and are emitted once it has arrived.
#[derive(Debug)]
pub struct MultipartFrameParser {
    delimiter: Vec<u8>,
    buffer: Vec<u8>,
    part: Option<PartBody>,
    /// Buffer offset already searched for the closing delimiter.
    scanned: usize,
}

impl MultipartFrameParser {
    pub fn new(boundary: &str) -> Self {
        Self {
            delimiter: format!("--{boundary}").into_bytes(),
            buffer: Vec::new(),
            part: None,
            scanned: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            let Some(part) = self.part else {
                if !self.read_part_headers() {
                    break;
                }
                continue;
            };

            let body_end = match part.length {
                Some(length) if self.buffer.len() >= part.start + length => part.start + length,
                Some(_) => break,
                None => {
                    // Back up so a delimiter split across chunks is still found.
                    let from = self
                        .scanned
                        .saturating_sub(self.delimiter.len() - 1)
                        .max(part.start);
                    match find(&self.buffer[from..], &self.delimiter) {
                        Some(offset) => from + offset,
                        None => {
                            self.scanned = self.buffer.len();
                            break;
                        }
                    }
                }
            };

            let mut body = &self.buffer[part.start..body_end];
            if part.length.is_none() {
                if let Some(stripped) = body.strip_suffix(b"\r\n") {
                    body = stripped;
                }
            }
            if !body.is_empty() {
                frames.push(body.to_vec());
            }
            self.buffer.drain(..body_end);
            self.part = None;
            self.scanned = 0;
        }

        frames
    }

    /// Aligns the buffer on the next delimiter and records where its body
    /// starts. Returns `false` until the part's headers are complete.
    fn read_part_headers(&mut self) -> bool {
        let Some(start) = find(&self.buffer, &self.delimiter) else {
            // Keep only a tail that could still be the beginning of a delimiter.
            let keep = self.delimiter.len().saturating_sub(1);
            if self.buffer.len() > keep {
                let cut = self.buffer.len() - keep;
                self.buffer.drain(..cut);
            }
            return false;
        };
        if start > 0 {
            self.buffer.drain(..start);
        }

        let headers_start = self.delimiter.len();
        let Some(header_len) = find(&self.buffer[headers_start..], HEADER_TERMINATOR) else {
            return false;
        };
        let headers = &self.buffer[headers_start..headers_start + header_len];
        let body_start = headers_start + header_len + HEADER_TERMINATOR.len();
        self.part = Some(PartBody {
            start: body_start,
            length: content_length(headers),
        });
        self.scanned = body_start;
        true
    }
}

/// Live camera frames (JPEG bytes) read from the video feed endpoint.
pub struct VideoFeed {
    chunks: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    parser: MultipartFrameParser,
    ready: VecDeque<Vec<u8>>,
}

impl VideoFeed {
    pub fn from_response(response: Response) -> Self {
        let boundary = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(boundary_from_content_type)
            .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string());
        debug!(%boundary, "video feed opened");

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Self {
            chunks,
            parser: MultipartFrameParser::new(&boundary),
            ready: VecDeque::new(),
        }
    }

    /// Returns `None` once the stream has ended.
    pub async fn next_frame(&mut self) -> Option<Result<Vec<u8>, ClientError>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Some(Ok(frame));
            }
            match self.chunks.next().await? {
                Ok(chunk) => self.ready.extend(self.parser.push(&chunk)),
                Err(source) => {
                    return Some(Err(ClientError::Transport {
                        endpoint: VIDEO_FEED_PATH.to_string(),
                        source,
                    }))
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/video_feed_tests.rs"]
mod tests;
