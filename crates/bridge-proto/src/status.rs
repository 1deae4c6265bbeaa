//! Status frames: `command_id` carries the status code itself, and the first
//! two payload bytes echo the command being reported on.

/// Status code, carried as the `command_id` of a status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Generic success.
    Ok,
    /// Acknowledges a command that `requires_ack`.
    Ack,
    /// Generic failure while executing a command.
    Error,
    /// Frame failed structural validation (length/version).
    Malformed,
    /// Frame failed CRC verification.
    CrcMismatch,
    /// The MCU did not respond to a request in time.
    Timeout,
    /// No handler registered for the requested command.
    NotImplemented,
}

impl Status {
    /// Wire id for this status, in the 0x00F0..=0x00F6 reserved range.
    ///
    /// These ids all have bit 15 clear, so they can never collide with
    /// [`crate::COMPRESSED_FLAG`] or with any command id.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Ok => 0x00F0,
            Self::Ack => 0x00F1,
            Self::Error => 0x00F2,
            Self::Malformed => 0x00F3,
            Self::CrcMismatch => 0x00F4,
            Self::Timeout => 0x00F5,
            Self::NotImplemented => 0x00F6,
        }
    }

    /// Parse a status code back from its wire id.
    #[must_use]
    pub fn from_u16(id: u16) -> Option<Self> {
        Some(match id {
            0x00F0 => Self::Ok,
            0x00F1 => Self::Ack,
            0x00F2 => Self::Error,
            0x00F3 => Self::Malformed,
            0x00F4 => Self::CrcMismatch,
            0x00F5 => Self::Timeout,
            0x00F6 => Self::NotImplemented,
            _ => return None,
        })
    }

    /// Build the payload for a status frame: `uint16_be(original_command_id)`
    /// followed by an optional diagnostic detail.
    #[must_use]
    pub fn payload(original_command_id: u16, detail: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(2 + detail.len());
        payload.extend_from_slice(&original_command_id.to_be_bytes());
        payload.extend_from_slice(detail);
        payload
    }

    /// Extract the original command id echoed at the front of a status
    /// frame's payload, if present.
    #[must_use]
    pub fn original_command_id(payload: &[u8]) -> Option<u16> {
        let bytes: [u8; 2] = payload.get(0..2)?.try_into().ok()?;
        Some(u16::from_be_bytes(bytes))
    }

    /// Placeholder used in status payloads when the offending command id is
    /// unknown (e.g. a CRC failure on a frame too short to carry one).
    pub const UNKNOWN_COMMAND: u16 = 0xFFFF;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_wire_id() {
        for status in
            [Status::Ok, Status::Ack, Status::Error, Status::Malformed, Status::CrcMismatch, Status::Timeout, Status::NotImplemented]
        {
            assert_eq!(Status::from_u16(status.to_u16()), Some(status));
        }
    }

    #[test]
    fn payload_echoes_original_command() {
        let payload = Status::payload(0x14, b"oops");
        assert_eq!(Status::original_command_id(&payload), Some(0x14));
        assert_eq!(&payload[2..], b"oops");
    }

    #[test]
    fn unrecognized_id_is_not_a_status() {
        assert_eq!(Status::from_u16(0x14), None);
    }
}
