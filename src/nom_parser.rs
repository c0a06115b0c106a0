use nom::branch::alt;
use nom::bytes::complete::take;
use nom::combinator::{cut, map, opt, rest, value, verify};
use nom::number::complete::le_u16;
use nom::sequence::{preceded, tuple};
use nom::IResult;

use crate::packet::*;
use crate::types::DeviceId;

type Buf = [u8];

pub(crate) fn parse_packet(buf: &Buf) -> Option<Packet> {
    match packet(buf) {
        Ok((_rest, packet)) => Some(packet),
        Err(_) => None,
    }
}

fn packet(buf: &Buf) -> IResult<&Buf, Packet> {
    alt((
        preceded(code(CODE_RESPONSE), cut(response)),
        preceded(code(CODE_EVENT), cut(event)),
        preceded(code(CODE_TRANSFER), cut(transfer)),
        value(Packet::Echo, code(CODE_ECHO)),
        value(Packet::Quit, code(CODE_QUIT)),
        unknown,
    ))(buf)
}

fn response(buf: &Buf) -> IResult<&Buf, Packet> {
    map(tuple((opt(byte), rest)), |(status, data): (Option<u8>, &Buf)| {
        Packet::Response {
            status: status.unwrap_or(0),
            data: data.to_vec(),
        }
    })(buf)
}

fn event(buf: &Buf) -> IResult<&Buf, Packet> {
    map(tuple((byte, le_u16, le_u16)), |(code, device_id, data)| {
        Packet::Event(Event {
            code,
            device_id: DeviceId(device_id),
            data,
        })
    })(buf)
}

fn transfer(buf: &Buf) -> IResult<&Buf, Packet> {
    let (buf, (address, command, len, reply_len)) = tuple((byte, byte, byte, byte))(buf)?;
    map(take(len), move |data: &Buf| Packet::Transfer {
        address,
        command,
        data: data.to_vec(),
        reply_len,
    })(buf)
}

fn unknown(buf: &Buf) -> IResult<&Buf, Packet> {
    map(verify(rest, |bytes: &Buf| !bytes.is_empty()), |bytes: &Buf| {
        Packet::Unknown(bytes.to_vec())
    })(buf)
}

fn byte(buf: &Buf) -> IResult<&Buf, u8> {
    nom::number::complete::u8(buf)
}

fn code<'a>(code: u8) -> impl Fn(&'a Buf) -> IResult<&'a Buf, char> {
    nom::character::complete::char(code as char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        assert_eq!(
            parse_packet(b"R\x00\x05\x06"),
            Some(Packet::Response {
                status: 0,
                data: vec![5, 6]
            })
        );
        assert_eq!(
            parse_packet(b"R"),
            Some(Packet::Response {
                status: 0,
                data: vec![]
            })
        );
    }

    #[test]
    fn test_parse_event() {
        assert_eq!(
            parse_packet(&[b'V', 1, 0x05, 0x00, 0x01, 0x02]),
            Some(Packet::Event(Event {
                code: 1,
                device_id: DeviceId(5),
                data: 0x0201
            }))
        );
        // truncated events are malformed, not unknown
        assert_eq!(parse_packet(&[b'V', 1, 0x05]), None);
    }

    #[test]
    fn test_parse_transfer() {
        let request = [b'T', 9, 3, 3, 0, 0x05, 0x00, 10];
        assert_eq!(
            parse_packet(&request),
            Some(Packet::Transfer {
                address: 9,
                command: 3,
                data: vec![0x05, 0x00, 10],
                reply_len: 0
            })
        );
        assert_eq!(parse_packet(&request[..6]), None);
    }

    #[test]
    fn test_parse_other() {
        assert_eq!(parse_packet(b"X"), Some(Packet::Echo));
        assert_eq!(parse_packet(b"Q"), Some(Packet::Quit));
        assert_eq!(parse_packet(b"Zab"), Some(Packet::Unknown(b"Zab".to_vec())));
        assert_eq!(parse_packet(b""), None);
    }

    #[test]
    fn test_packet_bytes_parse_back() {
        let packets = [
            Packet::Transfer {
                address: 12,
                command: 0,
                data: vec![0x7E, 0x7D],
                reply_len: 2,
            },
            Packet::Response {
                status: 1,
                data: vec![1, 2, 3],
            },
            Packet::Echo,
        ];
        for packet in packets.iter() {
            assert_eq!(parse_packet(&packet.to_bytes()).as_ref(), Some(packet));
        }
    }
}
