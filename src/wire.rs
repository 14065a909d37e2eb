//! Shared low-level IPFIX wire structures (RFC 7011).
//!
//! The Message Header, Set Header, and Template record shapes, parsed
//! declaratively with `nom-derive`.

use nom_derive::{Nom, Parse};

use crate::ie::IeDef;

/// Set id reserved for Template Sets.
pub const TEMPLATE_SET_ID: u16 = 2;
/// Set id reserved for Options Template Sets.
pub const OPTIONS_TEMPLATE_SET_ID: u16 = 3;
/// Smallest set id that denotes a Data Set; ids below this are reserved.
pub const DATA_SET_MIN_ID: u16 = 256;

/// First Template id this engine assigns to a derived (extended) Template.
pub const FIRST_DERIVED_TEMPLATE_ID: u16 = 40000;

/// Bit marking an Information Element id as enterprise-specific (RFC 7011 §3.2).
pub const ENTERPRISE_BIT: u16 = 0x8000;

/// IPFIX Message Header: 16 bytes, fixed layout.
#[derive(Nom, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u16,
    pub length: u16,
    pub export_time: u32,
    pub sequence_number: u32,
    pub observation_domain_id: u32,
}

impl MessageHeader {
    pub const SIZE: usize = 16;

    pub fn to_be_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.version.to_be_bytes());
        buf[2..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4..8].copy_from_slice(&self.export_time.to_be_bytes());
        buf[8..12].copy_from_slice(&self.sequence_number.to_be_bytes());
        buf[12..16].copy_from_slice(&self.observation_domain_id.to_be_bytes());
        buf
    }
}

/// Set Header: 4 bytes, shared by Template Sets, Options Template Sets and
/// Data Sets.
#[derive(Nom, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetHeader {
    pub set_id: u16,
    pub length: u16,
}

impl SetHeader {
    pub const SIZE: usize = 4;

    pub fn to_be_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.set_id.to_be_bytes());
        buf[2..4].copy_from_slice(&self.length.to_be_bytes());
        buf
    }
}

/// A single field specifier inside a Template record.
///
/// `enterprise_number` is present only when bit 15 of the wire IE id is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpecifier {
    pub ie_id: u16,
    pub length: u16,
    pub enterprise_number: Option<u32>,
}

impl FieldSpecifier {
    /// Size on the wire: 4 bytes, plus 4 more when enterprise-specific.
    pub fn wire_len(self) -> usize {
        if self.enterprise_number.is_some() {
            8
        } else {
            4
        }
    }

    pub fn is_enterprise(self) -> bool {
        self.ie_id & ENTERPRISE_BIT != 0
    }

    /// Wire length a field specifier for `ie` would occupy, without having
    /// to construct one: 8 bytes for an enterprise-specific element, 4
    /// otherwise.
    pub fn wire_len_for_ie(ie: IeDef) -> usize {
        if ie.id & ENTERPRISE_BIT != 0 {
            8
        } else {
            4
        }
    }

    pub fn encode_into(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ie_id.to_be_bytes());
        out.extend_from_slice(&self.length.to_be_bytes());
        if let Some(en) = self.enterprise_number {
            out.extend_from_slice(&en.to_be_bytes());
        }
    }

    pub fn parse(input: &[u8]) -> nom::IResult<&[u8], FieldSpecifier> {
        use nom::number::complete::{be_u16, be_u32};
        let (input, ie_id) = be_u16(input)?;
        let (input, length) = be_u16(input)?;
        let (input, enterprise_number) = if ie_id & ENTERPRISE_BIT != 0 {
            let (input, en) = be_u32(input)?;
            (input, Some(en))
        } else {
            (input, None)
        };
        Ok((
            input,
            FieldSpecifier {
                ie_id,
                length,
                enterprise_number,
            },
        ))
    }
}

/// A parsed Template record header (template id + field count), preceding
/// its field specifiers.
#[derive(Nom, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateRecordHeader {
    pub template_id: u16,
    pub field_count: u16,
}

impl TemplateRecordHeader {
    pub const SIZE: usize = 4;

    pub fn to_be_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.template_id.to_be_bytes());
        buf[2..4].copy_from_slice(&self.field_count.to_be_bytes());
        buf
    }
}

/// Sentinel wire length marking a field as variable-length (RFC 7011 §7).
pub const VARLEN_MARKER: u16 = 0xFFFF;
/// Threshold above which the 1-byte length form can't be used.
const VARLEN_SHORT_MAX: usize = 254;
/// Escape byte for the 3-byte variable-length encoding.
const VARLEN_ESCAPE: u8 = 0xFF;

/// Encode a variable-length field's length prefix + payload (RFC 7011 §7).
pub fn encode_varlen(value: &[u8], out: &mut Vec<u8>) {
    if value.len() <= VARLEN_SHORT_MAX {
        out.push(value.len() as u8);
    } else {
        out.push(VARLEN_ESCAPE);
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    }
    out.extend_from_slice(value);
}

/// Decode a variable-length field's length prefix, returning the payload
/// length and the number of bytes consumed by the prefix itself.
pub fn decode_varlen_header(input: &[u8]) -> Option<(usize, usize)> {
    let first = *input.first()?;
    if first == VARLEN_ESCAPE {
        let hi = *input.get(1)?;
        let lo = *input.get(2)?;
        Some((usize::from(hi) << 8 | usize::from(lo), 3))
    } else {
        Some((usize::from(first), 1))
    }
}

/// Padding required to round a set's length up to a 4-byte boundary.
pub fn set_padding(content_len: usize) -> usize {
    (4 - (content_len % 4)) % 4
}

/// A Set as it appeared in an input message: the declared header, the
/// whole set's bytes (header + content + padding, for verbatim passthrough)
/// and the content bytes alone (header stripped, padding still included —
/// callers that need to walk records stop once remaining bytes can't form
/// another complete record and treat the rest as padding).
pub struct RawSet<'a> {
    pub set_id: u16,
    pub whole: &'a [u8],
    pub content: &'a [u8],
}

/// Walk a message body (bytes following the Message Header) into its Sets.
/// Stops early, without error, if a trailing Set's declared length doesn't
/// fit in the remaining bytes — such trailing garbage is not valid IPFIX
/// but this engine does not exist to validate upstream framing beyond what
/// it needs to re-serialize correctly.
pub fn parse_sets(body: &[u8]) -> Vec<RawSet<'_>> {
    let mut sets = Vec::new();
    let mut rest = body;
    while rest.len() >= SetHeader::SIZE {
        let Ok((_, header)) = SetHeader::parse(rest) else {
            break;
        };
        let total_len = usize::from(header.length);
        if total_len < SetHeader::SIZE || rest.len() < total_len {
            break;
        }
        sets.push(RawSet {
            set_id: header.set_id,
            whole: &rest[..total_len],
            content: &rest[SetHeader::SIZE..total_len],
        });
        rest = &rest[total_len..];
    }
    sets
}

/// Walk a Template Set's content into its individual Template records,
/// stopping once the remaining bytes can't hold another complete record
/// (trailing zero padding).
pub fn parse_template_records(content: &[u8]) -> Vec<(TemplateRecordHeader, &[u8])> {
    let mut records = Vec::new();
    let mut rest = content;
    loop {
        let Ok((after_header, header)) = TemplateRecordHeader::parse(rest) else {
            break;
        };
        let mut tail = after_header;
        let mut ok = true;
        for _ in 0..header.field_count {
            match FieldSpecifier::parse(tail) {
                Ok((t, _)) => tail = t,
                Err(_) => {
                    ok = false;
                    break;
                }
            }
        }
        if !ok {
            break;
        }
        let record_len = rest.len() - tail.len();
        records.push((header, &rest[..record_len]));
        rest = tail;
    }
    records
}

/// Parse the field specifiers out of a complete Template record's bytes
/// (header + field specifiers), as produced by [`parse_template_records`].
pub fn parse_field_specifiers_for(raw_record: &[u8]) -> Vec<FieldSpecifier> {
    let Ok((mut rest, header)) = TemplateRecordHeader::parse(raw_record) else {
        return Vec::new();
    };
    let mut fields = Vec::with_capacity(header.field_count as usize);
    for _ in 0..header.field_count {
        match FieldSpecifier::parse(rest) {
            Ok((tail, field)) => {
                fields.push(field);
                rest = tail;
            }
            Err(_) => break,
        }
    }
    fields
}

/// Options Template record header (RFC 7011 §3.4.2.2): template id, total
/// field count, and how many of those fields are scope fields.
#[derive(Nom, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionsTemplateRecordHeader {
    pub template_id: u16,
    pub field_count: u16,
    pub scope_field_count: u16,
}

impl OptionsTemplateRecordHeader {
    pub const SIZE: usize = 6;

    pub fn to_be_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.template_id.to_be_bytes());
        buf[2..4].copy_from_slice(&self.field_count.to_be_bytes());
        buf[4..6].copy_from_slice(&self.scope_field_count.to_be_bytes());
        buf
    }
}

/// Walk an Options Template Set's content into the template ids it defines.
/// This engine never extends Options Templates, so only the ids are
/// needed, to recognize and skip Data Sets that reference them.
pub fn parse_options_template_ids(content: &[u8]) -> Vec<u16> {
    let mut ids = Vec::new();
    let mut rest = content;
    loop {
        let Ok((after_header, header)) = OptionsTemplateRecordHeader::parse(rest) else {
            break;
        };
        let mut tail = after_header;
        let mut ok = true;
        for _ in 0..header.field_count {
            match FieldSpecifier::parse(tail) {
                Ok((t, _)) => tail = t,
                Err(_) => {
                    ok = false;
                    break;
                }
            }
        }
        if !ok {
            break;
        }
        ids.push(header.template_id);
        rest = tail;
    }
    ids
}
