//! The periodic keep-alive message.

use crate::frame::Frame;

use super::connect::request as connect_request;
use super::MessageType;

/// Builds the heartbeat request frame. Same empty-connect shape as the
/// handshake, but tagged with the heartbeat wire type so the server does not
/// try to re-negotiate the session.
#[must_use]
pub fn request(msg_id: u32) -> Frame {
    let mut f = connect_request(msg_id);
    f.r#type = MessageType::Heart as u16;
    f
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_heart_type() {
        let f = request(5);
        assert_eq!(f.r#type, MessageType::Heart as u16);
    }
}
