//! Wire format for the three CDS control packets.
//!
//! ```text
//! BEACON           [tag=1] [sender_mac(6)] [is_dominant(1)]
//! NEIGHBOR_SET     [tag=2] [sender_mac(6)] [(nbr_mac(6), rssi_mag(1))]*
//! UPD_NEIGHBOR_SET [tag=3] [sender_mac(6)] [(nbr_mac(6), rssi_mag(1))]*
//! ```
//!
//! RSSI is carried on the wire as an unsigned magnitude byte (the negation
//! of the signed dBm value); a sender never lists its own MAC among its
//! neighbor entries.

use crate::mac::{Mac, MAC_LEN};

/// Control packet type tags.
pub const TAG_BEACON: u8 = 1;
pub const TAG_NEIGHBOR_SET: u8 = 2;
pub const TAG_UPD_NEIGHBOR_SET: u8 = 3;

// Tags defined by the original device firmware for a message-replay
// mechanism over the (out of scope) user-text forwarding path. Kept as
// named constants so a future text-forwarding implementation has somewhere
// to plug in; `decode` treats them like any other unknown tag.
#[allow(dead_code)]
pub const TAG_REQUEST_PREV_MSG: u8 = 5;
#[allow(dead_code)]
pub const TAG_REPLY_PREV_MSG: u8 = 6;

const ENTRY_LEN: usize = MAC_LEN + 1;

/// A single neighbor-set entry: a second-hop MAC and its magnitude-encoded
/// RSSI as seen by the sender of the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborEntry {
    pub mac: Mac,
    pub rssi_dbm: i16,
}

/// A decoded (or to-be-encoded) control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Beacon {
        sender: Mac,
        is_dominant: bool,
    },
    NeighborSet {
        sender: Mac,
        entries: Vec<NeighborEntry>,
    },
    UpdNeighborSet {
        sender: Mac,
        entries: Vec<NeighborEntry>,
    },
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::Beacon { sender, is_dominant } => {
                let mut buf = Vec::with_capacity(1 + MAC_LEN + 1);
                buf.push(TAG_BEACON);
                buf.extend_from_slice(sender.as_bytes());
                buf.push(if *is_dominant { 1 } else { 0 });
                buf
            }
            Packet::NeighborSet { sender, entries } => {
                encode_set(TAG_NEIGHBOR_SET, sender, entries)
            }
            Packet::UpdNeighborSet { sender, entries } => {
                encode_set(TAG_UPD_NEIGHBOR_SET, sender, entries)
            }
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Packet, CodecError> {
        if buf.is_empty() {
            return Err(CodecError::Truncated);
        }

        let tag = buf[0];
        let rest = &buf[1..];

        match tag {
            TAG_BEACON => {
                if rest.len() != MAC_LEN + 1 {
                    return Err(CodecError::BadLength {
                        expected: MAC_LEN + 1,
                        got: rest.len(),
                    });
                }
                let sender = decode_mac(&rest[..MAC_LEN]);
                let is_dominant = rest[MAC_LEN] != 0;
                Ok(Packet::Beacon { sender, is_dominant })
            }
            TAG_NEIGHBOR_SET => decode_set(rest).map(|(sender, entries)| Packet::NeighborSet {
                sender,
                entries,
            }),
            TAG_UPD_NEIGHBOR_SET => {
                decode_set(rest).map(|(sender, entries)| Packet::UpdNeighborSet { sender, entries })
            }
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

fn encode_set(tag: u8, sender: &Mac, entries: &[NeighborEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + MAC_LEN + entries.len() * ENTRY_LEN);
    buf.push(tag);
    buf.extend_from_slice(sender.as_bytes());
    for e in entries {
        buf.extend_from_slice(e.mac.as_bytes());
        buf.push(rssi_to_magnitude(e.rssi_dbm));
    }
    buf
}

fn decode_set(rest: &[u8]) -> Result<(Mac, Vec<NeighborEntry>), CodecError> {
    if rest.len() < MAC_LEN {
        return Err(CodecError::Truncated);
    }
    let sender = decode_mac(&rest[..MAC_LEN]);
    let payload = &rest[MAC_LEN..];

    if payload.len() % ENTRY_LEN != 0 {
        return Err(CodecError::BadLength {
            expected: round_up_to_multiple(payload.len(), ENTRY_LEN),
            got: payload.len(),
        });
    }

    let mut entries = Vec::with_capacity(payload.len() / ENTRY_LEN);
    for chunk in payload.chunks_exact(ENTRY_LEN) {
        let mac = decode_mac(&chunk[..MAC_LEN]);
        let rssi_dbm = magnitude_to_rssi(chunk[MAC_LEN]);
        entries.push(NeighborEntry { mac, rssi_dbm });
    }

    Ok((sender, entries))
}

fn decode_mac(bytes: &[u8]) -> Mac {
    let mut arr = [0u8; MAC_LEN];
    arr.copy_from_slice(bytes);
    Mac::from_bytes(arr)
}

/// Negate a signed dBm value into its unsigned wire magnitude.
pub fn rssi_to_magnitude(rssi_dbm: i16) -> u8 {
    (-rssi_dbm).clamp(0, 255) as u8
}

/// Recover the signed dBm value from a wire magnitude byte.
pub fn magnitude_to_rssi(magnitude: u8) -> i16 {
    -(magnitude as i16)
}

fn round_up_to_multiple(n: usize, m: usize) -> usize {
    ((n + m - 1) / m) * m
}

/// Errors a decoder can report. `decode` never panics, for any input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// First byte did not match a known packet type.
    UnknownTag(u8),
    /// Payload length after the header was not valid for this packet type.
    BadLength { expected: usize, got: usize },
    /// Buffer too short to contain even a tag.
    Truncated,
}

#[cfg(test)]
mod test {
    use super::*;

    fn mac(b: u8) -> Mac {
        Mac::from_bytes([b, b, b, b, b, b])
    }

    #[test]
    fn beacon_round_trip() {
        let p = Packet::Beacon {
            sender: mac(0xAA),
            is_dominant: true,
        };
        let buf = p.encode();
        assert_eq!(buf.len(), 8);
        assert_eq!(Packet::decode(&buf), Ok(p));
    }

    #[test]
    fn neighbor_set_round_trip_empty() {
        let p = Packet::NeighborSet {
            sender: mac(0x01),
            entries: vec![],
        };
        let buf = p.encode();
        assert_eq!(buf.len(), 7);
        assert_eq!(Packet::decode(&buf), Ok(p));
    }

    #[test]
    fn neighbor_set_round_trip_with_entries() {
        let p = Packet::UpdNeighborSet {
            sender: mac(0x01),
            entries: vec![
                NeighborEntry { mac: mac(0x02), rssi_dbm: -60 },
                NeighborEntry { mac: mac(0x03), rssi_dbm: 0 },
            ],
        };
        let buf = p.encode();
        assert_eq!(buf.len(), 1 + 6 + 2 * 7);
        assert_eq!(Packet::decode(&buf), Ok(p));
    }

    #[test]
    fn rejects_bad_length() {
        // tag + mac + 3 stray bytes: not a multiple of 7 after the header.
        let mut buf = vec![TAG_NEIGHBOR_SET];
        buf.extend_from_slice(&[0u8; 6]);
        buf.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(Packet::decode(&buf), Err(CodecError::BadLength { .. })));
    }

    #[test]
    fn rejects_unknown_tag() {
        assert_eq!(Packet::decode(&[42, 1, 2, 3]), Err(CodecError::UnknownTag(42)));
    }

    #[test]
    fn never_panics_on_arbitrary_input() {
        for len in 0..20 {
            let buf = vec![0u8; len];
            let _ = Packet::decode(&buf);
            let buf = vec![TAG_BEACON; len];
            let _ = Packet::decode(&buf);
        }
    }

    #[test]
    fn rssi_magnitude_is_negation() {
        assert_eq!(rssi_to_magnitude(-60), 60);
        assert_eq!(magnitude_to_rssi(60), -60);
        assert_eq!(rssi_to_magnitude(0), 0);
    }
}
