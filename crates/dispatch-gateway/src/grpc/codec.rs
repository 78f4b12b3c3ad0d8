//! JSON document codecs for tonic.
//!
//! Frames carry a serialized [`Document`]; no protobuf schema is involved.
//! Clients use [`DocumentCodec`]. The server decodes with [`ServerCodec`],
//! which never fails a frame: a body that is not a document arrives as
//! [`Inbound::Undecodable`], so one bad frame cannot end or desynchronize a
//! stream.

use bytes::{Buf, BufMut};
use dispatch_core::{codec, Document};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentCodec;

impl Codec for DocumentCodec {
    type Encode = Document;
    type Decode = Document;
    type Encoder = DocumentEncoder;
    type Decoder = DocumentDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DocumentEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DocumentDecoder
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentEncoder;

impl Encoder for DocumentEncoder {
    type Item = Document;
    type Error = Status;

    fn encode(&mut self, item: Document, dst: &mut EncodeBuf<'_>) -> Result<(), Status> {
        let bytes = codec::encode(&item).map_err(|e| Status::internal(e.to_string()))?;
        dst.put_slice(&bytes);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentDecoder;

impl Decoder for DocumentDecoder {
    type Item = Document;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Document>, Status> {
        let bytes = src.copy_to_bytes(src.remaining());
        codec::decode(&bytes)
            .map(Some)
            .map_err(|e| Status::invalid_argument(e.to_string()))
    }
}

/// One inbound frame as seen by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Document(Document),
    /// The frame was consumed but did not hold a document; carries the
    /// decode error message.
    Undecodable(String),
}

impl Inbound {
    /// The reply for an undecodable frame, `Ok` for a document to dispatch.
    pub fn into_document(self) -> Result<Document, Document> {
        match self {
            Inbound::Document(doc) => Ok(doc),
            Inbound::Undecodable(message) => Err(Document::error(message)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServerCodec;

impl Codec for ServerCodec {
    type Encode = Document;
    type Decode = Inbound;
    type Encoder = DocumentEncoder;
    type Decoder = InboundDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DocumentEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        InboundDecoder
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InboundDecoder;

impl Decoder for InboundDecoder {
    type Item = Inbound;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Inbound>, Status> {
        let bytes = src.copy_to_bytes(src.remaining());
        Ok(Some(match codec::decode(&bytes) {
            Ok(doc) => Inbound::Document(doc),
            Err(e) => Inbound::Undecodable(e.to_string()),
        }))
    }
}
