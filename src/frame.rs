//! The length-prefixed, optionally zlib-compressed frame protocol that every
//! request/response message is wrapped in.

use std::io::Read;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// Four-byte magic that opens every response frame, little-endian on the
/// wire as `B1 CB 74 00`.
const RESPONSE_PREFIX: [u8; 4] = [0xB1, 0xCB, 0x74, 0x00];

/// Leading byte of every request frame.
const REQUEST_PREFIX: u8 = 0x0C;

/// A request frame, ready to be written to the socket.
#[derive(Debug, Clone)]
pub struct Frame {
    pub msg_id: u32,
    pub control: u8,
    pub r#type: u16,
    pub data: Vec<u8>,
}

impl Frame {
    /// Builds a new request frame carrying `data` as its payload.
    #[must_use]
    pub fn new(msg_id: u32, control: u8, r#type: u16, data: Vec<u8>) -> Self {
        Self {
            msg_id,
            control,
            r#type,
            data,
        }
    }

    /// Serializes this frame to its wire representation.
    ///
    /// Layout: `0x0C | msg_id(4,LE) | control(1) | len(2,LE) | len(2,LE) |
    /// type(2,LE) | data`, where `len = data.len() + 2` (the `+2` accounts
    /// for the type field itself, matching the vendor's own framing).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let length = (self.data.len() + 2) as u16;
        let mut out = Vec::with_capacity(12 + self.data.len());
        out.push(REQUEST_PREFIX);
        out.extend_from_slice(&self.msg_id.to_le_bytes());
        out.push(self.control);
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&self.r#type.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

/// A decoded response frame.
#[derive(Debug, Clone)]
pub struct Response {
    pub control: u8,
    pub msg_id: u32,
    pub r#type: u16,
    pub data: Vec<u8>,
}

impl Response {
    /// Decodes a full response frame, including the four-byte magic prefix,
    /// from `bytes`. `bytes` must contain exactly one frame: the 16-byte
    /// header plus `zip_len` body bytes, no more and no less.
    ///
    /// If `zip_len != raw_len` the body is zlib-compressed and is inflated;
    /// the inflated length is checked against `raw_len`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 16 {
            return Err(Error::protocol(format!(
                "response frame too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0..4] != RESPONSE_PREFIX {
            return Err(Error::protocol("response frame missing magic prefix"));
        }
        let control = bytes[4];
        let msg_id = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
        // bytes[9] is reserved/unknown.
        let r#type = u16::from_le_bytes([bytes[10], bytes[11]]);
        let zip_len = u16::from_le_bytes([bytes[12], bytes[13]]) as usize;
        let raw_len = u16::from_le_bytes([bytes[14], bytes[15]]) as usize;
        let body = &bytes[16..];
        if body.len() != zip_len {
            return Err(Error::protocol(format!(
                "response declared zip_len={zip_len} but carried {} body bytes",
                body.len()
            )));
        }
        let data = if zip_len == raw_len {
            body.to_vec()
        } else {
            let mut decoder = flate2::read::ZlibDecoder::new(body);
            let mut out = Vec::with_capacity(raw_len);
            decoder
                .read_to_end(&mut out)
                .map_err(|e| Error::protocol("zlib inflate failed").with_source(e))?;
            if out.len() != raw_len {
                return Err(Error::protocol(format!(
                    "inflated body is {} bytes, response declared raw_len={raw_len}",
                    out.len()
                )));
            }
            out
        };
        Ok(Response {
            control,
            msg_id,
            r#type,
            data,
        })
    }

    /// Reads exactly one response frame from an async stream, resyncing on
    /// the `B1 CB 74 00` magic prefix.
    ///
    /// The vendor's servers are known to occasionally emit a stray byte
    /// before a frame; rather than fail the whole connection on a prefix
    /// mismatch, this scans forward one byte at a time until it finds the
    /// magic, consuming (and discarding) anything before it.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let mut prefix = [0u8; 4];
        reader.read_exact(&mut prefix[..1]).await?;
        loop {
            if prefix == RESPONSE_PREFIX {
                break;
            }
            prefix.copy_within(1..4, 0);
            reader.read_exact(&mut prefix[3..4]).await?;
        }
        let mut header_rest = [0u8; 12];
        reader.read_exact(&mut header_rest).await?;
        let zip_len = u16::from_le_bytes([header_rest[7], header_rest[8]]) as usize;
        let mut body = vec![0u8; zip_len];
        reader.read_exact(&mut body).await?;

        let mut full = Vec::with_capacity(16 + zip_len);
        full.extend_from_slice(&prefix);
        full.extend_from_slice(&header_rest);
        full.extend_from_slice(&body);
        Self::decode(&full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_encodes_expected_layout() {
        let f = Frame::new(1, 0x01, 0x0C, vec![0xAA, 0xBB, 0xCC]);
        let bytes = f.to_bytes();
        assert_eq!(bytes[0], 0x0C);
        assert_eq!(&bytes[1..5], &1u32.to_le_bytes());
        assert_eq!(bytes[5], 0x01);
        let length = (3 + 2) as u16;
        assert_eq!(&bytes[6..8], &length.to_le_bytes());
        assert_eq!(&bytes[8..10], &length.to_le_bytes());
        assert_eq!(&bytes[10..12], &0x0Cu16.to_le_bytes());
        assert_eq!(&bytes[12..], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn response_decode_rejects_short_input() {
        let err = Response::decode(&[0; 10]).unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Protocol);
    }

    #[test]
    fn response_decode_uncompressed_round_trip() {
        let payload = vec![1u8, 2, 3, 4, 5];
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&RESPONSE_PREFIX);
        bytes.push(0x00);
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.push(0x00);
        bytes.extend_from_slice(&0x0Cu16.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&payload);

        let resp = Response::decode(&bytes).unwrap();
        assert_eq!(resp.msg_id, 7);
        assert_eq!(resp.r#type, 0x0C);
        assert_eq!(resp.data, payload);
    }

    #[test]
    fn response_decode_compressed_body() {
        use std::io::Write;
        let raw = b"hello frame world, this is the uncompressed payload".to_vec();
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&raw).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&RESPONSE_PREFIX);
        bytes.push(0x00);
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(0x00);
        bytes.extend_from_slice(&0x04u16.to_le_bytes());
        bytes.extend_from_slice(&(compressed.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&(raw.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&compressed);

        let resp = Response::decode(&bytes).unwrap();
        assert_eq!(resp.data, raw);
    }

    #[tokio::test]
    async fn read_from_resyncs_past_garbage_bytes() {
        let raw = b"abc".to_vec();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&RESPONSE_PREFIX);
        bytes.push(0x00);
        bytes.extend_from_slice(&9u32.to_le_bytes());
        bytes.push(0x00);
        bytes.extend_from_slice(&0x01u16.to_le_bytes());
        bytes.extend_from_slice(&(raw.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&(raw.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&raw);

        let mut garbage = vec![0xFFu8, 0x00, 0xB1];
        garbage.extend_from_slice(&bytes);
        let mut cursor = std::io::Cursor::new(garbage);

        let resp = Response::read_from(&mut cursor).await.unwrap();
        assert_eq!(resp.msg_id, 9);
        assert_eq!(resp.data, raw);
    }
}
