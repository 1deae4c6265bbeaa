//! Command identifiers and their direction/ACK/response contracts.
//!
//! Mirrors the `Command` enumeration of the wire protocol: every request the
//! MCU or the daemon can make, tagged with which side may send it, whether
//! the MCU must answer with a [`crate::Status::Ack`] frame first, and which
//! command id (if any) carries the matching response payload.

/// Bit 15 of a 16-bit command id: payload is RLE-compressed.
pub const COMPRESSED_FLAG: u16 = 0x8000;

/// Which side(s) of the link may originate a given command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Only the daemon (Linux host) sends this command.
    LinuxToMcu,
    /// Only the MCU sends this command.
    McuToLinux,
    /// Either side may send it (used by a few handshake/status commands).
    Both,
}

/// Static metadata about a command id: direction, ACK requirement, and its
/// paired response id, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    /// Raw 16-bit command id, compression flag excluded.
    pub id: u16,
    /// Human-readable name, used in logs and status payload diagnostics.
    pub name: &'static str,
    /// Which side may originate this command.
    pub direction: Direction,
    /// Whether the MCU must send a [`crate::Status::Ack`] before anything else.
    pub requires_ack: bool,
    /// Command id of the paired response frame, if this command has one.
    pub response: Option<u16>,
}

macro_rules! commands {
    ($($konst:ident = $id:expr, $name:expr, $dir:expr, $ack:expr, $resp:expr;)+) => {
        $(
            #[doc = $name]
            pub const $konst: u16 = $id;
        )+

        /// All known command specs, in declaration order.
        pub const ALL: &[CommandSpec] = &[
            $(
                CommandSpec { id: $id, name: $name, direction: $dir, requires_ack: $ack, response: $resp },
            )+
        ];
    };
}

commands! {
    LINK_RESET = 0x01, "LINK_RESET", Direction::LinuxToMcu, false, Some(LINK_RESET_RESP);
    LINK_RESET_RESP = 0x81, "LINK_RESET_RESP", Direction::McuToLinux, false, None;
    LINK_SYNC = 0x02, "LINK_SYNC", Direction::LinuxToMcu, false, Some(LINK_SYNC_RESP);
    LINK_SYNC_RESP = 0x82, "LINK_SYNC_RESP", Direction::McuToLinux, false, None;
    SET_BAUDRATE = 0x03, "SET_BAUDRATE", Direction::LinuxToMcu, false, Some(SET_BAUDRATE_RESP);
    SET_BAUDRATE_RESP = 0x83, "SET_BAUDRATE_RESP", Direction::McuToLinux, false, None;
    CAPABILITIES = 0x04, "CAPABILITIES", Direction::LinuxToMcu, false, Some(CAPABILITIES_RESP);
    CAPABILITIES_RESP = 0x84, "CAPABILITIES_RESP", Direction::McuToLinux, false, None;
    VERSION = 0x05, "VERSION", Direction::LinuxToMcu, false, Some(VERSION_RESP);
    VERSION_RESP = 0x85, "VERSION_RESP", Direction::McuToLinux, false, None;

    SET_PIN_MODE = 0x10, "SET_PIN_MODE", Direction::LinuxToMcu, true, None;
    DIGITAL_WRITE = 0x11, "DIGITAL_WRITE", Direction::LinuxToMcu, true, None;
    ANALOG_WRITE = 0x12, "ANALOG_WRITE", Direction::LinuxToMcu, true, None;
    DIGITAL_READ = 0x13, "DIGITAL_READ", Direction::LinuxToMcu, false, Some(DIGITAL_READ_RESP);
    ANALOG_READ = 0x14, "ANALOG_READ", Direction::LinuxToMcu, false, Some(ANALOG_READ_RESP);
    DIGITAL_READ_RESP = 0x93, "DIGITAL_READ_RESP", Direction::McuToLinux, false, None;
    ANALOG_READ_RESP = 0x94, "ANALOG_READ_RESP", Direction::McuToLinux, false, None;

    CONSOLE_WRITE = 0x20, "CONSOLE_WRITE", Direction::LinuxToMcu, true, None;
    CONSOLE_DATA = 0x21, "CONSOLE_DATA", Direction::McuToLinux, false, None;

    DATASTORE_PUT = 0x30, "DATASTORE_PUT", Direction::LinuxToMcu, true, None;
    DATASTORE_GET = 0x31, "DATASTORE_GET", Direction::LinuxToMcu, false, Some(DATASTORE_GET_RESP);
    DATASTORE_GET_RESP = 0xB1, "DATASTORE_GET_RESP", Direction::McuToLinux, false, None;

    MAILBOX_WRITE = 0x40, "MAILBOX_WRITE", Direction::LinuxToMcu, true, None;
    MAILBOX_READ = 0x41, "MAILBOX_READ", Direction::LinuxToMcu, false, Some(MAILBOX_READ_RESP);
    MAILBOX_AVAILABLE = 0x42, "MAILBOX_AVAILABLE", Direction::LinuxToMcu, false, Some(MAILBOX_AVAILABLE_RESP);
    MAILBOX_READ_RESP = 0xC1, "MAILBOX_READ_RESP", Direction::McuToLinux, false, None;
    MAILBOX_AVAILABLE_RESP = 0xC2, "MAILBOX_AVAILABLE_RESP", Direction::McuToLinux, false, None;
    MAILBOX_INCOMING = 0x43, "MAILBOX_INCOMING", Direction::McuToLinux, true, None;

    FILE_WRITE = 0x50, "FILE_WRITE", Direction::LinuxToMcu, true, None;
    FILE_READ = 0x51, "FILE_READ", Direction::LinuxToMcu, false, Some(FILE_READ_RESP);
    FILE_REMOVE = 0x52, "FILE_REMOVE", Direction::LinuxToMcu, true, None;
    FILE_READ_RESP = 0xD1, "FILE_READ_RESP", Direction::McuToLinux, false, None;

    PROCESS_RUN = 0x60, "PROCESS_RUN", Direction::LinuxToMcu, false, Some(PROCESS_RUN_RESP);
    PROCESS_RUN_ASYNC = 0x61, "PROCESS_RUN_ASYNC", Direction::LinuxToMcu, false, Some(PROCESS_RUN_ASYNC_RESP);
    PROCESS_POLL = 0x62, "PROCESS_POLL", Direction::LinuxToMcu, false, Some(PROCESS_POLL_RESP);
    PROCESS_KILL = 0x63, "PROCESS_KILL", Direction::LinuxToMcu, true, None;
    PROCESS_RUN_RESP = 0xE0, "PROCESS_RUN_RESP", Direction::McuToLinux, false, None;
    PROCESS_RUN_ASYNC_RESP = 0xE1, "PROCESS_RUN_ASYNC_RESP", Direction::McuToLinux, false, None;
    PROCESS_POLL_RESP = 0xE2, "PROCESS_POLL_RESP", Direction::McuToLinux, false, None;
}

/// Look up static metadata for a command id (compression flag must already
/// be stripped).
#[must_use]
pub fn spec_for(id: u16) -> Option<&'static CommandSpec> {
    ALL.iter().find(|spec| spec.id == id)
}

/// True if `id` is one of the commands/responses a client may receive while
/// the link is not yet synchronized (handshake replies and status frames).
///
/// Matches the dispatcher's pre-sync allow-list from the protocol design:
/// everything else is dropped silently to avoid feedback loops during an
/// MCU reset.
#[must_use]
pub fn allowed_before_sync(id: u16) -> bool {
    matches!(id, LINK_SYNC_RESP | LINK_RESET_RESP | CAPABILITIES_RESP) || crate::Status::from_u16(id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_pairs_resolve() {
        let spec = spec_for(DIGITAL_READ).expect("known command");
        assert_eq!(spec.response, Some(DIGITAL_READ_RESP));
        assert!(!spec.requires_ack);
    }

    #[test]
    fn ack_required_commands_have_no_declared_response() {
        for spec in ALL.iter().filter(|s| s.requires_ack) {
            assert!(spec.response.is_none(), "{} declares both ACK and response", spec.name);
        }
    }
}
