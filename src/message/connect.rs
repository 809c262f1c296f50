//! The handshake message sent immediately after dialing.

use crate::error::Result;
use crate::frame::Frame;

use super::MessageType;

/// The single-byte control payload every handshake carries.
const CONTROL_01: u8 = 0x01;

/// Builds the handshake request frame.
#[must_use]
pub fn request(msg_id: u32) -> Frame {
    Frame::new(msg_id, CONTROL_01, MessageType::Connect as u16, vec![CONTROL_01])
}

/// Decodes the handshake response: a fixed 68-byte header the server fills
/// with fields this client has no use for, followed by a GBK-encoded banner
/// naming the server software and version.
pub fn decode(data: &[u8]) -> Result<String> {
    let banner = if data.len() > 68 { &data[68..] } else { &[] };
    let (text, _, had_errors) = encoding_rs::GBK.decode(banner);
    if had_errors {
        tracing::warn!("handshake banner contained invalid GBK bytes");
    }
    Ok(text.trim_end_matches('\0').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_control_byte() {
        let f = request(1);
        assert_eq!(f.data, vec![CONTROL_01]);
        assert_eq!(f.control, CONTROL_01);
    }

    #[test]
    fn decode_short_banner_is_empty() {
        assert_eq!(decode(&[0u8; 10]).unwrap(), "");
    }

    #[test]
    fn decode_extracts_ascii_banner() {
        let mut data = vec![0u8; 68];
        data.extend_from_slice(b"TDX Quote Server v1\0");
        assert_eq!(decode(&data).unwrap(), "TDX Quote Server v1");
    }
}
