//! BER encoding and decoding of SNMPv2c messages

use thiserror::Error;

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_IP_ADDRESS: u8 = 0x40;
pub const TAG_COUNTER32: u8 = 0x41;
pub const TAG_GAUGE32: u8 = 0x42;
pub const TAG_TIMETICKS: u8 = 0x43;
pub const TAG_OPAQUE: u8 = 0x44;
pub const TAG_COUNTER64: u8 = 0x46;
pub const TAG_NO_SUCH_OBJECT: u8 = 0x80;
pub const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
pub const TAG_END_OF_MIB_VIEW: u8 = 0x82;

pub const PDU_GET_REQUEST: u8 = 0xa0;
pub const PDU_RESPONSE: u8 = 0xa2;

/// SNMPv2c version field value
pub const VERSION_2C: i64 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Message truncated at offset {0}")]
    Truncated(usize),
    #[error("Unexpected tag 0x{found:02x}, expected 0x{expected:02x}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("Unsupported length encoding")]
    Length,
    #[error("Invalid object identifier: {0}")]
    InvalidOid(String),
    #[error("Integer too large")]
    IntegerOverflow,
}

/// A variable binding value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Vec<u32>),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    Opaque(Vec<u8>),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl SnmpValue {
    /// Render the value as text, or `None` when the agent returned no data
    pub fn to_text(&self) -> Option<String> {
        let text = match self {
            Self::Integer(v) => v.to_string(),
            Self::OctetString(bytes) | Self::Opaque(bytes) => {
                String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()
            }
            Self::ObjectId(arcs) => format_oid(arcs),
            Self::IpAddress(o) => format!("{}.{}.{}.{}", o[0], o[1], o[2], o[3]),
            Self::Counter32(v) | Self::Gauge32(v) | Self::TimeTicks(v) => v.to_string(),
            Self::Counter64(v) => v.to_string(),
            Self::Null | Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView => {
                return None
            }
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// A decoded SNMP message with its PDU flattened in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub version: i64,
    pub community: Vec<u8>,
    pub pdu_tag: u8,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<(Vec<u32>, SnmpValue)>,
}

impl Message {
    /// A GET request for a single object
    pub fn get_request(community: &str, request_id: i32, oid: &[u32]) -> Self {
        Self {
            version: VERSION_2C,
            community: community.as_bytes().to_vec(),
            pdu_tag: PDU_GET_REQUEST,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: vec![(oid.to_vec(), SnmpValue::Null)],
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut bindings = Vec::new();
        for (oid, value) in &self.varbinds {
            let mut binding = encode_oid(oid)?;
            binding.extend(encode_value(value));
            bindings.extend(tlv(TAG_SEQUENCE, &binding));
        }

        let mut pdu = encode_integer(TAG_INTEGER, self.request_id as i64);
        pdu.extend(encode_integer(TAG_INTEGER, self.error_status));
        pdu.extend(encode_integer(TAG_INTEGER, self.error_index));
        pdu.extend(tlv(TAG_SEQUENCE, &bindings));

        let mut body = encode_integer(TAG_INTEGER, self.version);
        body.extend(tlv(TAG_OCTET_STRING, &self.community));
        body.extend(tlv(self.pdu_tag, &pdu));

        Ok(tlv(TAG_SEQUENCE, &body))
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut outer = Reader::new(buf);
        let mut msg = Reader::new(outer.expect(TAG_SEQUENCE)?);

        let version = decode_integer(msg.expect(TAG_INTEGER)?)?;
        let community = msg.expect(TAG_OCTET_STRING)?.to_vec();
        let (pdu_tag, pdu_bytes) = msg.read_tlv()?;

        let mut pdu = Reader::new(pdu_bytes);
        let request_id = decode_integer(pdu.expect(TAG_INTEGER)?)? as i32;
        let error_status = decode_integer(pdu.expect(TAG_INTEGER)?)?;
        let error_index = decode_integer(pdu.expect(TAG_INTEGER)?)?;

        let mut list = Reader::new(pdu.expect(TAG_SEQUENCE)?);
        let mut varbinds = Vec::new();
        while !list.is_empty() {
            let mut binding = Reader::new(list.expect(TAG_SEQUENCE)?);
            let oid = decode_oid(binding.expect(TAG_OID)?)?;
            let (tag, content) = binding.read_tlv()?;
            varbinds.push((oid, decode_value(tag, content)?));
        }

        Ok(Self {
            version,
            community,
            pdu_tag,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }
}

/// Parse a dotted object identifier such as `1.3.6.1.2.1.1.1.0`
pub fn parse_oid(s: &str) -> Result<Vec<u32>, CodecError> {
    let arcs: Vec<u32> = s
        .trim()
        .trim_start_matches('.')
        .split('.')
        .map(|p| p.parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| CodecError::InvalidOid(s.to_string()))?;
    if arcs.len() < 2
        || arcs[0] > 2
        || (arcs[0] < 2 && arcs[1] >= 40)
        || first_subidentifier(&arcs).is_none()
    {
        return Err(CodecError::InvalidOid(s.to_string()));
    }
    Ok(arcs)
}

/// The first two arcs share one encoded sub-identifier, `X * 40 + Y`
fn first_subidentifier(arcs: &[u32]) -> Option<u32> {
    arcs.first()?.checked_mul(40)?.checked_add(*arcs.get(1)?)
}

pub fn format_oid(arcs: &[u32]) -> String {
    arcs.iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(tag);
    encode_length(&mut out, content.len());
    out.extend_from_slice(content);
    out
}

fn encode_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = (len as u32).to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (4 - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
}

fn encode_integer(tag: u8, value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    // Drop redundant sign bytes, keeping the sign bit of the next byte intact
    while start < 7 {
        let (b, next) = (bytes[start], bytes[start + 1]);
        if (b == 0x00 && next & 0x80 == 0) || (b == 0xff && next & 0x80 != 0) {
            start += 1;
        } else {
            break;
        }
    }
    tlv(tag, &bytes[start..])
}

fn encode_unsigned(tag: u8, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    let mut content = Vec::with_capacity(9);
    if bytes[skip] & 0x80 != 0 {
        content.push(0);
    }
    content.extend_from_slice(&bytes[skip..]);
    tlv(tag, &content)
}

fn encode_oid(arcs: &[u32]) -> Result<Vec<u8>, CodecError> {
    let first =
        first_subidentifier(arcs).ok_or_else(|| CodecError::InvalidOid(format_oid(arcs)))?;
    let mut content = Vec::new();
    push_base128(&mut content, first);
    for &arc in &arcs[2..] {
        push_base128(&mut content, arc);
    }
    Ok(tlv(TAG_OID, &content))
}

fn push_base128(out: &mut Vec<u8>, mut value: u32) {
    let mut stack = [0u8; 5];
    let mut n = 0;
    loop {
        stack[n] = (value & 0x7f) as u8;
        n += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i > 0 { 0x80 } else { 0 };
        out.push(stack[i] | continuation);
    }
}

fn encode_value(value: &SnmpValue) -> Vec<u8> {
    match value {
        SnmpValue::Integer(v) => encode_integer(TAG_INTEGER, *v),
        SnmpValue::OctetString(b) => tlv(TAG_OCTET_STRING, b),
        SnmpValue::Null => tlv(TAG_NULL, &[]),
        SnmpValue::ObjectId(arcs) => {
            encode_oid(arcs).unwrap_or_else(|_| tlv(TAG_OID, &[]))
        }
        SnmpValue::IpAddress(o) => tlv(TAG_IP_ADDRESS, o),
        SnmpValue::Counter32(v) => encode_unsigned(TAG_COUNTER32, *v as u64),
        SnmpValue::Gauge32(v) => encode_unsigned(TAG_GAUGE32, *v as u64),
        SnmpValue::TimeTicks(v) => encode_unsigned(TAG_TIMETICKS, *v as u64),
        SnmpValue::Counter64(v) => encode_unsigned(TAG_COUNTER64, *v),
        SnmpValue::Opaque(b) => tlv(TAG_OPAQUE, b),
        SnmpValue::NoSuchObject => tlv(TAG_NO_SUCH_OBJECT, &[]),
        SnmpValue::NoSuchInstance => tlv(TAG_NO_SUCH_INSTANCE, &[]),
        SnmpValue::EndOfMibView => tlv(TAG_END_OF_MIB_VIEW, &[]),
    }
}

fn decode_value(tag: u8, content: &[u8]) -> Result<SnmpValue, CodecError> {
    Ok(match tag {
        TAG_INTEGER => SnmpValue::Integer(decode_integer(content)?),
        TAG_OCTET_STRING => SnmpValue::OctetString(content.to_vec()),
        TAG_NULL => SnmpValue::Null,
        TAG_OID => SnmpValue::ObjectId(decode_oid(content)?),
        TAG_IP_ADDRESS if content.len() == 4 => {
            SnmpValue::IpAddress([content[0], content[1], content[2], content[3]])
        }
        TAG_COUNTER32 => SnmpValue::Counter32(decode_unsigned(content)? as u32),
        TAG_GAUGE32 => SnmpValue::Gauge32(decode_unsigned(content)? as u32),
        TAG_TIMETICKS => SnmpValue::TimeTicks(decode_unsigned(content)? as u32),
        TAG_COUNTER64 => SnmpValue::Counter64(decode_unsigned(content)?),
        TAG_NO_SUCH_OBJECT => SnmpValue::NoSuchObject,
        TAG_NO_SUCH_INSTANCE => SnmpValue::NoSuchInstance,
        TAG_END_OF_MIB_VIEW => SnmpValue::EndOfMibView,
        _ => SnmpValue::Opaque(content.to_vec()),
    })
}

fn decode_integer(content: &[u8]) -> Result<i64, CodecError> {
    if content.len() > 8 {
        return Err(CodecError::IntegerOverflow);
    }
    let negative = content.first().is_some_and(|b| b & 0x80 != 0);
    let mut value: i64 = if negative { -1 } else { 0 };
    for &b in content {
        value = (value << 8) | b as i64;
    }
    Ok(value)
}

fn decode_unsigned(content: &[u8]) -> Result<u64, CodecError> {
    let content = match content {
        [0, rest @ ..] => rest,
        _ => content,
    };
    if content.len() > 8 {
        return Err(CodecError::IntegerOverflow);
    }
    Ok(content.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

fn decode_oid(content: &[u8]) -> Result<Vec<u32>, CodecError> {
    let mut subids = Vec::new();
    let mut current: u32 = 0;
    for &b in content {
        current = current
            .checked_mul(128)
            .ok_or_else(|| CodecError::InvalidOid(format!("{:02x?}", content)))?
            | (b & 0x7f) as u32;
        if b & 0x80 == 0 {
            subids.push(current);
            current = 0;
        }
    }
    let Some((&first, rest)) = subids.split_first() else {
        return Err(CodecError::InvalidOid(String::new()));
    };
    let (a, b) = match first {
        0..=39 => (0, first),
        40..=79 => (1, first - 40),
        _ => (2, first - 80),
    };
    let mut arcs = vec![a, b];
    arcs.extend_from_slice(rest);
    Ok(arcs)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, CodecError> {
        let b = *self.buf.get(self.pos).ok_or(CodecError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), CodecError> {
        let tag = self.byte()?;
        let first = self.byte()?;
        let len = if first & 0x80 == 0 {
            first as usize
        } else {
            let n = (first & 0x7f) as usize;
            if n == 0 || n > 4 {
                return Err(CodecError::Length);
            }
            let mut len = 0usize;
            for _ in 0..n {
                len = (len << 8) | self.byte()? as usize;
            }
            len
        };
        let end = self.pos.checked_add(len).ok_or(CodecError::Length)?;
        let content = self.buf.get(self.pos..end).ok_or(CodecError::Truncated(self.pos))?;
        self.pos = end;
        Ok((tag, content))
    }

    fn expect(&mut self, expected: u8) -> Result<&'a [u8], CodecError> {
        let (found, content) = self.read_tlv()?;
        if found != expected {
            return Err(CodecError::UnexpectedTag { expected, found });
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_request_encoding() {
        let oid = parse_oid("1.3.6.1.2.1.1.1.0").unwrap();
        let bytes = Message::get_request("public", 1, &oid).encode().unwrap();
        let expected: Vec<u8> = vec![
            0x30, 0x26, // message
            0x02, 0x01, 0x01, // version 2c
            0x04, 0x06, b'p', b'u', b'b', b'l', b'i', b'c', // community
            0xa0, 0x19, // GetRequest
            0x02, 0x01, 0x01, // request id
            0x02, 0x01, 0x00, // error status
            0x02, 0x01, 0x00, // error index
            0x30, 0x0e, 0x30, 0x0c, // varbind list, varbind
            0x06, 0x08, 0x2b, 0x06, 0x01, 0x02, 0x01, 0x01, 0x01, 0x00, // oid
            0x05, 0x00, // null
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_decode_response_with_string() {
        let response = Message {
            version: VERSION_2C,
            community: b"public".to_vec(),
            pdu_tag: PDU_RESPONSE,
            request_id: 0x1234_5678,
            error_status: 0,
            error_index: 0,
            varbinds: vec![(
                vec![1, 3, 6, 1, 2, 1, 1, 5, 0],
                SnmpValue::OctetString(b"core-switch".to_vec()),
            )],
        };
        let decoded = Message::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, response);
        assert_eq!(
            decoded.varbinds[0].1.to_text().as_deref(),
            Some("core-switch")
        );
    }

    #[test]
    fn test_integer_edge_values() {
        for value in [0i64, 127, 128, 255, 256, -1, -128, -129, i32::MAX as i64, i32::MIN as i64] {
            let encoded = encode_integer(TAG_INTEGER, value);
            let mut reader = Reader::new(&encoded);
            let content = reader.expect(TAG_INTEGER).unwrap();
            assert_eq!(decode_integer(content).unwrap(), value, "{value}");
        }
        assert_eq!(encode_integer(TAG_INTEGER, 128), vec![0x02, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn test_unsigned_with_high_bit() {
        let encoded = encode_unsigned(TAG_TIMETICKS, 0xffff_ffff);
        assert_eq!(encoded, vec![0x43, 0x05, 0x00, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(decode_unsigned(&encoded[2..]).unwrap(), 0xffff_ffff);
    }

    #[test]
    fn test_oid_with_large_arcs() {
        let arcs = vec![1, 3, 6, 1, 4, 1, 2636, 3, 1, 0];
        let encoded = encode_oid(&arcs).unwrap();
        assert_eq!(decode_oid(&encoded[2..]).unwrap(), arcs);
    }

    #[test]
    fn test_parse_oid() {
        assert_eq!(parse_oid(".1.3.6.1").unwrap(), vec![1, 3, 6, 1]);
        assert!(parse_oid("1").is_err());
        assert!(parse_oid("1.3.x").is_err());
        assert!(parse_oid("3.1").is_err());
    }

    #[test]
    fn test_first_arcs_overflow_rejected() {
        assert!(matches!(
            parse_oid("2.4294967295.0"),
            Err(CodecError::InvalidOid(_))
        ));
        assert_eq!(parse_oid("2.999.1").unwrap(), vec![2, 999, 1]);

        let request = Message::get_request("public", 7, &[2, u32::MAX, 0]);
        assert!(matches!(request.encode(), Err(CodecError::InvalidOid(_))));
    }

    #[test]
    fn test_long_length_form() {
        let content = vec![b'x'; 300];
        let encoded = tlv(TAG_OCTET_STRING, &content);
        assert_eq!(&encoded[..4], &[0x04, 0x82, 0x01, 0x2c]);
        let mut reader = Reader::new(&encoded);
        assert_eq!(reader.expect(TAG_OCTET_STRING).unwrap().len(), 300);
    }

    #[test]
    fn test_exception_values_have_no_text() {
        assert_eq!(SnmpValue::NoSuchObject.to_text(), None);
        assert_eq!(SnmpValue::NoSuchInstance.to_text(), None);
        assert_eq!(SnmpValue::OctetString(Vec::new()).to_text(), None);
        assert_eq!(SnmpValue::TimeTicks(4200).to_text().as_deref(), Some("4200"));
        assert_eq!(
            SnmpValue::IpAddress([10, 0, 0, 1]).to_text().as_deref(),
            Some("10.0.0.1")
        );
    }

    #[test]
    fn test_truncated_message() {
        let oid = parse_oid("1.3.6.1.2.1.1.1.0").unwrap();
        let bytes = Message::get_request("public", 7, &oid).encode().unwrap();
        assert!(matches!(
            Message::decode(&bytes[..bytes.len() - 3]),
            Err(CodecError::Truncated(_))
        ));
    }
}
