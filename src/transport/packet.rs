use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};

pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_DEST_UNREACHABLE: u8 = 3;
pub const ICMPV6_ECHO_REQUEST: u8 = 128;
pub const ICMPV6_ECHO_REPLY: u8 = 129;
pub const ICMPV6_DEST_UNREACHABLE: u8 = 1;

const HEADER_LEN: usize = 8;
const IPV6_HEADER_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoPacket {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

/// What an inbound datagram means to a waiting probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    EchoReply { identifier: u16, sequence: u16 },
    Unreachable { identifier: u16, sequence: u16 },
}

impl Inbound {
    pub fn sequence(&self) -> u16 {
        match self {
            Inbound::EchoReply { sequence, .. } | Inbound::Unreachable { sequence, .. } => *sequence,
        }
    }

    pub fn identifier(&self) -> u16 {
        match self {
            Inbound::EchoReply { identifier, .. } | Inbound::Unreachable { identifier, .. } => *identifier,
        }
    }
}

impl EchoPacket {
    pub fn echo_request(identifier: u16, sequence: u16, payload_size: usize, is_ipv6: bool) -> Self {
        let icmp_type = if is_ipv6 { ICMPV6_ECHO_REQUEST } else { ICMP_ECHO_REQUEST };

        let mut packet = Self {
            icmp_type,
            code: 0,
            checksum: 0,
            identifier,
            sequence,
            payload: vec![0x61; payload_size],
        };

        // The kernel fills in the ICMPv6 checksum (it covers a pseudo-header)
        if !is_ipv6 {
            packet.calculate_checksum();
        }
        packet
    }

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "ICMP packet too short"));
        }

        let mut cursor = Cursor::new(data);
        let icmp_type = cursor.read_u8()?;
        let code = cursor.read_u8()?;
        let checksum = cursor.read_u16::<BigEndian>()?;
        let identifier = cursor.read_u16::<BigEndian>()?;
        let sequence = cursor.read_u16::<BigEndian>()?;

        let mut payload = Vec::new();
        cursor.read_to_end(&mut payload)?;

        Ok(Self {
            icmp_type,
            code,
            checksum,
            identifier,
            sequence,
            payload,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.push(self.icmp_type);
        bytes.push(self.code);
        // Writing into a Vec cannot fail
        let _ = bytes.write_u16::<BigEndian>(self.checksum);
        let _ = bytes.write_u16::<BigEndian>(self.identifier);
        let _ = bytes.write_u16::<BigEndian>(self.sequence);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    pub fn calculate_checksum(&mut self) {
        self.checksum = 0;
        self.checksum = checksum(&self.to_bytes());
    }

    pub fn verify_checksum(&self) -> bool {
        checksum(&self.to_bytes()) == 0
    }
}

/// RFC 1071 internet checksum.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;

    while i + 1 < data.len() {
        sum += u16::from_be_bytes([data[i], data[i + 1]]) as u32;
        i += 2;
    }

    if i < data.len() {
        sum += (data[i] as u32) << 8;
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

/// Decode a datagram read from an ICMP socket.
///
/// IPv4 raw sockets hand us the IP header too, so it is skipped when the
/// version nibble says it is there. Destination-unreachable messages quote the
/// original IP header plus the first 8 bytes of our request, which is where
/// the identifier and sequence come from.
pub fn parse_inbound(data: &[u8], is_ipv6: bool) -> Option<Inbound> {
    let icmp = if is_ipv6 { data } else { strip_ipv4_header(data)? };
    let packet = EchoPacket::from_bytes(icmp).ok()?;

    let (echo_reply, unreachable) = if is_ipv6 {
        (ICMPV6_ECHO_REPLY, ICMPV6_DEST_UNREACHABLE)
    } else {
        (ICMP_ECHO_REPLY, ICMP_DEST_UNREACHABLE)
    };

    if packet.icmp_type == echo_reply {
        return Some(Inbound::EchoReply {
            identifier: packet.identifier,
            sequence: packet.sequence,
        });
    }

    if packet.icmp_type == unreachable {
        let quoted = &icmp[HEADER_LEN..];
        let original = if is_ipv6 {
            quoted.get(IPV6_HEADER_LEN..)?
        } else {
            strip_ipv4_header(quoted)?
        };
        let request = EchoPacket::from_bytes(original).ok()?;
        return Some(Inbound::Unreachable {
            identifier: request.identifier,
            sequence: request.sequence,
        });
    }

    log::debug!("Ignoring ICMP type {} code {}", packet.icmp_type, packet.code);
    None
}

fn strip_ipv4_header(data: &[u8]) -> Option<&[u8]> {
    let first = *data.first()?;
    if first >> 4 == 4 {
        let header_len = ((first & 0x0f) as usize) * 4;
        data.get(header_len..)
    } else {
        Some(data)
    }
}
