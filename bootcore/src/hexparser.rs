//! A tolerant Intel HEX record parser (spec §4.2).
//!
//! `parse` never allocates, never retains state between calls, and never
//! reads past `buf[n-1]`. It distinguishes "need more bytes"
//! ([`Status::MissingLine`]) from "junk before the next record"
//! ([`Status::IncompleteLine`]) and "corrupt record" ([`Status::CRCError`])
//! so the upgrade engine can make forward progress on a lossy channel.

use nom::bytes::complete::take;
use nom::combinator::map_res;
use nom::IResult;

use crate::constants::INTELHEX_ALLOWED_MAX_DATA_LENGTH;

/// Minimum number of bytes required to read the record header `:LLAAAATT`.
const MIN_HEADER_LEN: usize = 9;
/// Trailing checksum field length, in hex characters.
const CRC_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Not enough bytes have arrived yet; all pending bytes are retained.
    MissingLine,
    /// A second `:` arrived before this record could complete; the caller
    /// discards this record and resumes from the reported offset.
    IncompleteLine,
    /// The checksum byte does not match the computed checksum.
    CRCError,
    /// `LL` exceeds [`INTELHEX_ALLOWED_MAX_DATA_LENGTH`]; a hard error.
    DataLengthExceedsAllowed,
    /// The record parsed and checksummed correctly.
    Success,
}

/// A successfully parsed Intel HEX record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub length: u8,
    pub address: u16,
    pub record_type: u8,
    pub data: [u8; INTELHEX_ALLOWED_MAX_DATA_LENGTH],
    pub crc: u8,
}

/// Result of one `parse` call: a status, the number of bytes consumed from
/// the front of `buf`, and the decoded record on `Success`.
pub struct ParseResult {
    pub status: Status,
    pub consumed: usize,
    pub record: Option<Record>,
}

fn hex_pair(input: &[u8]) -> IResult<&[u8], u8> {
    map_res(take(2usize), |bytes: &[u8]| {
        let s = core::str::from_utf8(bytes).map_err(|_| ())?;
        u8::from_str_radix(s, 16).map_err(|_| ())
    })(input)
}

fn hex_u16(input: &[u8]) -> IResult<&[u8], u16> {
    map_res(take(4usize), |bytes: &[u8]| {
        let s = core::str::from_utf8(bytes).map_err(|_| ())?;
        u16::from_str_radix(s, 16).map_err(|_| ())
    })(input)
}

/// Parse one record from the front of `buf[0..n]`.
///
/// `n` is implicit: callers pass exactly the pending slice, i.e. `n ==
/// buf.len()`.
pub fn parse(buf: &[u8]) -> ParseResult {
    let n = buf.len();

    if n < MIN_HEADER_LEN {
        return ParseResult {
            status: Status::MissingLine,
            consumed: n,
            record: None,
        };
    }

    // header is `:LLAAAATT`; buf[0] is the leading ':'.
    let header = &buf[1..MIN_HEADER_LEN];
    let (rest, length) = match hex_pair(header) {
        Ok(v) => v,
        Err(_) => {
            return ParseResult {
                status: Status::MissingLine,
                consumed: n,
                record: None,
            }
        }
    };
    let (rest, address) = match hex_u16(rest) {
        Ok(v) => v,
        Err(_) => {
            return ParseResult {
                status: Status::MissingLine,
                consumed: n,
                record: None,
            }
        }
    };
    let (_, record_type) = match hex_pair(rest) {
        Ok(v) => v,
        Err(_) => {
            return ParseResult {
                status: Status::MissingLine,
                consumed: n,
                record: None,
            }
        }
    };

    if length as usize > INTELHEX_ALLOWED_MAX_DATA_LENGTH {
        return ParseResult {
            status: Status::DataLengthExceedsAllowed,
            consumed: n,
            record: None,
        };
    }

    let expected_line_length = MIN_HEADER_LEN + 2 * (length as usize) + CRC_LEN;

    // search buf[1..n] for the next ':' (a second record starting early).
    if let Some(rel) = buf[1..n].iter().position(|&b| b == b':') {
        let k = rel + 1;
        if k < expected_line_length {
            return ParseResult {
                status: Status::IncompleteLine,
                consumed: k,
                record: None,
            };
        }
    }

    if n < expected_line_length {
        return ParseResult {
            status: Status::MissingLine,
            consumed: n,
            record: None,
        };
    }

    let mut data = [0u8; INTELHEX_ALLOWED_MAX_DATA_LENGTH];
    let mut payload = &buf[MIN_HEADER_LEN..MIN_HEADER_LEN + 2 * (length as usize)];
    let mut sum: u32 = length as u32 + (address >> 8) as u32 + (address & 0xFF) as u32 + record_type as u32;
    for slot in data.iter_mut().take(length as usize) {
        let (rest, byte) = match hex_pair(payload) {
            Ok(v) => v,
            Err(_) => {
                return ParseResult {
                    status: Status::MissingLine,
                    consumed: n,
                    record: None,
                }
            }
        };
        *slot = byte;
        sum += byte as u32;
        payload = rest;
    }

    let crc_field = &buf[MIN_HEADER_LEN + 2 * (length as usize)..expected_line_length];
    let crc = match hex_pair(crc_field) {
        Ok((_, v)) => v,
        Err(_) => {
            return ParseResult {
                status: Status::MissingLine,
                consumed: n,
                record: None,
            }
        }
    };

    let checksum = (!(sum as u8)).wrapping_add(1);

    if checksum != crc {
        return ParseResult {
            status: Status::CRCError,
            consumed: expected_line_length,
            record: None,
        };
    }

    ParseResult {
        status: Status::Success,
        consumed: expected_line_length,
        record: Some(Record {
            length,
            address,
            record_type,
            data,
            crc,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(record_type: u8, address: u16, payload: &[u8]) -> Vec<u8> {
        let length = payload.len() as u8;
        let mut sum: u32 =
            length as u32 + (address >> 8) as u32 + (address & 0xFF) as u32 + record_type as u32;
        for &b in payload {
            sum += b as u32;
        }
        let crc = (!(sum as u8)).wrapping_add(1);

        let mut s = String::new();
        s.push(':');
        s.push_str(&format!("{:02X}", length));
        s.push_str(&format!("{:04X}", address));
        s.push_str(&format!("{:02X}", record_type));
        for &b in payload {
            s.push_str(&format!("{:02X}", b));
        }
        s.push_str(&format!("{:02X}", crc));
        s.into_bytes()
    }

    #[test]
    fn missing_line_on_short_buffer() {
        let result = parse(b":1000");
        assert_eq!(result.status, Status::MissingLine);
        assert_eq!(result.consumed, 5);
        assert!(result.record.is_none());
    }

    #[test]
    fn missing_line_on_zero_length() {
        let result = parse(b"");
        assert_eq!(result.status, Status::MissingLine);
        assert_eq!(result.consumed, 0);
    }

    #[test]
    fn data_length_exceeds_allowed() {
        let line = encode(0x00, 0, &[0u8; 33]);
        let result = parse(&line);
        assert_eq!(result.status, Status::DataLengthExceedsAllowed);
    }

    #[test]
    fn parses_well_formed_data_record() {
        let payload = [0xDE, 0xAD, 0xBE, 0xEF];
        let line = encode(0x00, 0x1234, &payload);
        let result = parse(&line);
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.consumed, line.len());
        let record = result.record.unwrap();
        assert_eq!(record.length, 4);
        assert_eq!(record.address, 0x1234);
        assert_eq!(record.record_type, 0x00);
        assert_eq!(&record.data[..4], &payload);
    }

    #[test]
    fn corrupt_checksum_is_detected() {
        let payload = [0x01, 0x02, 0x03, 0x04];
        let mut line = encode(0x00, 0, &payload);
        // flip one payload nibble without touching the trailing checksum.
        let byte_idx = 9; // first hex digit of the payload
        line[byte_idx] ^= 1;
        let result = parse(&line);
        assert_eq!(result.status, Status::CRCError);
        assert_eq!(result.consumed, line.len());
    }

    #[test]
    fn eof_record_round_trips() {
        let line = encode(0x01, 0, &[]);
        let result = parse(&line);
        assert_eq!(result.status, Status::Success);
        let record = result.record.unwrap();
        assert_eq!(record.record_type, 0x01);
        assert_eq!(record.length, 0);
    }

    #[test]
    fn double_colon_merge_reports_incomplete_line() {
        // spec §8 scenario 5: ":10..A0:10..B0" delivered as one buffer.
        let first = encode(0x00, 0, &[0xAA; 16]);
        let second = encode(0x00, 0, &[0xBB; 16]);
        let mut combined = first.clone();
        combined.extend_from_slice(&second);
        // truncate the first record's checksum so the second ':' arrives early.
        let torn_len = first.len() - 1;
        let mut torn = first[..torn_len].to_vec();
        torn.extend_from_slice(&second);

        let result = parse(&torn);
        assert_eq!(result.status, Status::IncompleteLine);
        assert_eq!(result.consumed, torn_len);
    }

    #[test]
    fn parser_totality_property() {
        // spec §8 "Parser totality": consumed <= n for arbitrary buffers.
        let cases: &[&[u8]] = &[
            b"",
            b":",
            b":FF",
            b":10000000",
            b"garbage-before-a-colon:10000000DEADBEEF00000000000000000000",
        ];
        for &buf in cases {
            let result = parse(buf);
            assert!(result.consumed <= buf.len());
        }
    }
}
