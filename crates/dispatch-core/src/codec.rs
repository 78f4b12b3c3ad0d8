//! Document codec shared by the HTTP body, the gRPC messages and the
//! line-stream frames.

use crate::document::Document;
use crate::errors::DecodeError;

pub fn encode(doc: &Document) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(doc)
}

pub fn decode(bytes: &[u8]) -> Result<Document, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Single-line text form. Compact JSON never contains a raw newline, so
/// the result is safe to frame with a trailing `\n`.
pub fn encode_line(doc: &Document) -> Result<String, serde_json::Error> {
    serde_json::to_string(doc)
}

pub fn decode_line(line: &str) -> Result<Document, DecodeError> {
    Ok(serde_json::from_str(line.trim_end_matches(['\r', '\n']))?)
}
