//! Binary frame codec for the vehicle datagram link.
//!
//! Frame layout (all integers big-endian):
//!
//! | offset | size | field       | notes                                   |
//! |--------|------|-------------|-----------------------------------------|
//! | 0      | 2    | kind        | 0 = opaque/telemetry, 1 = text request  |
//! | 2      | 2    | reserved    | must be 0                               |
//! | 4      | 2    | length      | 10 + payload length                     |
//! | 6      | 8    | command id  | signed; 0 = unsolicited telemetry       |
//! | 14     | 2    | port        | destination onboard service             |
//! | 16     | N    | payload     | UTF-8 text when kind = 1                |
//!
//! Both directions are pure transforms; round trips are bit-exact.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::error::VehicleError;

/// Fixed header size: 6-byte primary + 10-byte secondary.
pub const HEADER_LEN: usize = 16;

/// The whole frame must fit the 16-bit length domain.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Largest payload `encode` accepts.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - HEADER_LEN;

/// Length-field bias: the secondary header counts toward it.
const SECONDARY_HEADER_LEN: u16 = 10;

/// Frame discriminator on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Opaque bytes; unsolicited telemetry travels this way
    Telemetry,
    /// UTF-8 request text (queries and mutations)
    Request,
}

impl FrameKind {
    /// Wire value of this kind.
    pub fn wire(self) -> u16 {
        match self {
            FrameKind::Telemetry => 0,
            FrameKind::Request => 1,
        }
    }

    /// Parse a wire kind tag; unknown tags are not-yet-supported.
    pub fn from_wire(value: u16) -> Option<Self> {
        match value {
            0 => Some(FrameKind::Telemetry),
            1 => Some(FrameKind::Request),
            _ => None,
        }
    }
}

/// One message exchanged with the vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Correlation id; 0 means "unsolicited telemetry, not a command reply"
    pub command_id: i64,
    /// Destination onboard service
    pub port: u16,
    pub payload: Bytes,
}

impl Frame {
    /// A request frame carrying UTF-8 text.
    pub fn request(command_id: i64, port: u16, text: &str) -> Self {
        Self {
            kind: FrameKind::Request,
            command_id,
            port,
            payload: Bytes::copy_from_slice(text.as_bytes()),
        }
    }

    /// The payload as text. Request payloads are UTF-8 by contract;
    /// telemetry payloads may or may not decode.
    pub fn payload_text(&self) -> Result<&str, VehicleError> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| VehicleError::InvalidFrame(format!("non-UTF-8 payload: {e}")))
    }
}

/// Encode a frame for transmission.
pub fn encode(frame: &Frame) -> Result<Bytes, VehicleError> {
    if frame.payload.len() > MAX_PAYLOAD_LEN {
        return Err(VehicleError::InvalidFrame(format!(
            "payload of {} bytes exceeds the {} byte frame limit",
            frame.payload.len(),
            MAX_PAYLOAD_LEN
        )));
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + frame.payload.len());
    buf.put_u16(frame.kind.wire());
    buf.put_u16(0); // reserved
    buf.put_u16(SECONDARY_HEADER_LEN + frame.payload.len() as u16);
    buf.put_i64(frame.command_id);
    buf.put_u16(frame.port);
    buf.put_slice(&frame.payload);
    Ok(buf.freeze())
}

/// Decode one received frame.
///
/// Fails on a truncated header or an unknown kind tag; a length field that
/// disagrees with the actual payload size is logged and the actual size
/// wins.
pub fn decode(data: &[u8]) -> Result<Frame, VehicleError> {
    if data.len() < HEADER_LEN {
        return Err(VehicleError::InvalidFrame(format!(
            "truncated header: {} of {HEADER_LEN} bytes",
            data.len()
        )));
    }

    let mut header = &data[..HEADER_LEN];
    let kind_tag = header.get_u16();
    let kind = FrameKind::from_wire(kind_tag).ok_or_else(|| {
        VehicleError::InvalidFrame(format!("unsupported frame kind {kind_tag}"))
    })?;
    let _reserved = header.get_u16();
    let declared = header.get_u16();
    let command_id = header.get_i64();
    let port = header.get_u16();

    let payload = &data[HEADER_LEN..];
    let expected = SECONDARY_HEADER_LEN as usize + payload.len();
    if declared as usize != expected {
        warn!(
            declared,
            actual = expected,
            "Frame length field disagrees with datagram size"
        );
    }

    Ok(Frame {
        kind,
        command_id,
        port,
        payload: Bytes::copy_from_slice(payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(FrameKind::Telemetry, 0, 0, b"".to_vec())]
    #[case(FrameKind::Telemetry, -1, 65535, b"\x00\xff raw".to_vec())]
    #[case(FrameKind::Request, i64::MIN, 8005, b"{ ping }".to_vec())]
    #[case(FrameKind::Request, i64::MAX, 1, vec![b'x'; MAX_PAYLOAD_LEN])]
    fn round_trip_is_exact(
        #[case] kind: FrameKind,
        #[case] command_id: i64,
        #[case] port: u16,
        #[case] payload: Vec<u8>,
    ) {
        let frame = Frame {
            kind,
            command_id,
            port,
            payload: Bytes::from(payload),
        };
        let decoded = decode(&encode(&frame).unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn header_layout_matches_the_wire_contract() {
        let frame = Frame::request(42, 8005, "{ ping }");
        let bytes = encode(&frame).unwrap();
        assert_eq!(&bytes[0..2], &[0, 1]); // kind = request
        assert_eq!(&bytes[2..4], &[0, 0]); // reserved
        assert_eq!(&bytes[4..6], &(10u16 + 8).to_be_bytes()); // length
        assert_eq!(&bytes[6..14], &42i64.to_be_bytes());
        assert_eq!(&bytes[14..16], &8005u16.to_be_bytes());
        assert_eq!(&bytes[16..], b"{ ping }");
    }

    #[test]
    fn oversized_payload_is_rejected_not_truncated() {
        let frame = Frame {
            kind: FrameKind::Request,
            command_id: 1,
            port: 1,
            payload: Bytes::from(vec![0u8; MAX_PAYLOAD_LEN + 1]),
        };
        assert!(matches!(
            encode(&frame),
            Err(VehicleError::InvalidFrame(_))
        ));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let frame = Frame::request(1, 1, "x");
        let bytes = encode(&frame).unwrap();
        assert!(matches!(
            decode(&bytes[..15]),
            Err(VehicleError::InvalidFrame(_))
        ));
    }

    #[test]
    fn unknown_kind_tag_is_rejected() {
        let frame = Frame::request(1, 1, "x");
        let mut bytes = encode(&frame).unwrap().to_vec();
        bytes[1] = 2;
        assert!(matches!(
            decode(&bytes),
            Err(VehicleError::InvalidFrame(_))
        ));
    }

    #[test]
    fn telemetry_payload_stays_opaque() {
        let frame = Frame {
            kind: FrameKind::Telemetry,
            command_id: 0,
            port: 8005,
            payload: Bytes::from_static(&[0xff, 0xfe, 0x00]),
        };
        let decoded = decode(&encode(&frame).unwrap()).unwrap();
        assert_eq!(decoded.payload.as_ref(), &[0xff, 0xfe, 0x00]);
        assert!(decoded.payload_text().is_err());
    }
}
