//! Per-record Information Element enrichment.
//!
//! Given a Data Record's flat bytes and its Template's field layout, builds
//! the enriched record: the original bytes verbatim, followed by one value
//! per configured Extension, picked by evaluating each Extension's
//! Candidates in order and using the first filter that matches. Supports
//! every declared data type rather than only a fixed subset.

use crate::config::{Config, Extension};
use crate::filter::RecordFields;
use crate::wire::{decode_varlen_header, encode_varlen, FieldSpecifier, VARLEN_MARKER};

/// A read-only view over a Data Record's fields, keyed by Information
/// Element id, built by walking the record's bytes against its Template's
/// field specifiers.
pub struct RecordView<'a> {
    fields: Vec<(u16, &'a [u8])>,
}

impl<'a> RecordView<'a> {
    /// Parse `data` according to `template_fields`. Returns `None` if the
    /// record is too short for its Template's declared field layout.
    pub fn parse(template_fields: &[FieldSpecifier], data: &'a [u8]) -> Option<RecordView<'a>> {
        let mut fields = Vec::with_capacity(template_fields.len());
        let mut rest = data;
        for field in template_fields {
            let (value, tail) = if field.length == VARLEN_MARKER {
                let (len, prefix_len) = decode_varlen_header(rest)?;
                let body_start = prefix_len;
                let body_end = body_start.checked_add(len)?;
                if rest.len() < body_end {
                    return None;
                }
                (&rest[body_start..body_end], &rest[body_end..])
            } else {
                let len = usize::from(field.length);
                if rest.len() < len {
                    return None;
                }
                (&rest[..len], &rest[len..])
            };
            fields.push((field.ie_id, value));
            rest = tail;
        }
        Some(RecordView { fields })
    }
}

/// Number of bytes one Data Record occupies at the front of `data`, given
/// its Template's field layout. Returns `None` if `data` is too short to
/// hold a complete record (the caller should treat the remainder as
/// trailing Set padding).
pub fn record_wire_len(template_fields: &[FieldSpecifier], data: &[u8]) -> Option<usize> {
    let mut consumed = 0usize;
    for field in template_fields {
        if field.length == VARLEN_MARKER {
            let (len, prefix_len) = decode_varlen_header(&data[consumed..])?;
            consumed = consumed.checked_add(prefix_len)?.checked_add(len)?;
        } else {
            consumed = consumed.checked_add(usize::from(field.length))?;
        }
        if consumed > data.len() {
            return None;
        }
    }
    Some(consumed)
}

impl RecordFields for RecordView<'_> {
    fn field(&self, ie_id: u16) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|(id, _)| *id == ie_id)
            .map(|(_, bytes)| *bytes)
    }
}

/// Pick the value to append for one Extension: the first matching
/// Candidate's encoded value, or a zero/empty default if none match.
fn pick_value<'a>(extension: &'a Extension, record: &dyn RecordFields) -> &'a [u8] {
    extension
        .candidates()
        .iter()
        .find(|candidate| candidate.filter().evaluate(record))
        .map(|candidate| candidate.encoded_value())
        .unwrap_or(&[])
}

/// Build the enriched record: `original_record` verbatim, followed by one
/// value per `config`'s Extensions, each length-prefixed if its
/// Information Element is variable-length.
///
/// If `original_record` doesn't parse cleanly against `template_fields`
/// (e.g. it's shorter than the Template declares), every Extension falls
/// back to its zero/default value rather than evaluating filters against
/// incomplete data.
pub fn extend_record(
    original_record: &[u8],
    template_fields: &[FieldSpecifier],
    config: &Config,
) -> Vec<u8> {
    let view = RecordView::parse(template_fields, original_record);

    let mut out = Vec::with_capacity(original_record.len() + config.max_extension_len());
    out.extend_from_slice(original_record);

    for extension in config.extensions() {
        let value = match &view {
            Some(view) => pick_value(extension, view),
            None => &[],
        };
        append_value(extension, value, &mut out);
    }

    out
}

fn append_value(extension: &Extension, value: &[u8], out: &mut Vec<u8>) {
    match extension.ie().data_type.size_of() {
        Some(fixed_len) => {
            let fixed_len = usize::from(fixed_len);
            if value.len() == fixed_len {
                out.extend_from_slice(value);
            } else {
                out.resize(out.len() + fixed_len, 0);
            }
        }
        None => encode_varlen(value, out),
    }
}
