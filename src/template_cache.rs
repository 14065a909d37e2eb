//! Extended Template derivation and caching.
//!
//! Given an original Template record, derives a new Template that appends a
//! field specifier per configured Extension, caches it by the original
//! Template's id, and reuses the cached derivation for subsequent Data
//! Records that reference the same Template: lookup by old id, a
//! `next_template_id` counter starting at 40000, and a new raw buffer built
//! by copying the original record and appending field specifiers.

use std::collections::BTreeMap;

use log::debug;
use nom_derive::Parse;

use crate::config::Config;
use crate::error::ExtenderError;
use crate::events::{Event, EventHooks};
use crate::wire::{FieldSpecifier, TemplateRecordHeader, FIRST_DERIVED_TEMPLATE_ID, VARLEN_MARKER};

/// A derived extended Template, cached against the original Template's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTemplate {
    /// Template id assigned to the derived Template.
    pub new_id: u16,
    /// Number of fields in the *original* Template, before extension.
    pub original_field_count: u16,
    /// Bytes of the original Template record, kept to detect redefinition.
    source_bytes: Vec<u8>,
    /// Complete wire bytes of the derived Template record (header + all
    /// field specifiers, original followed by appended).
    pub extended_record: Vec<u8>,
    /// The original Template's field specifiers, kept so a Data Record's
    /// flat bytes can be carved up per field when evaluating filters.
    pub original_fields: Vec<FieldSpecifier>,
}

impl CachedTemplate {
    pub fn extended_record(&self) -> &[u8] {
        &self.extended_record
    }
}

/// Caches derived extended Templates, keyed by the original Template id.
///
/// No `Default` impl: a derived-zero `next_template_id` would violate the
/// invariant that new ids start at 40000, so [`TemplateCache::new`] is the
/// only way to build one.
#[derive(Debug)]
pub struct TemplateCache {
    entries: BTreeMap<u16, CachedTemplate>,
    next_template_id: u16,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_template_id: FIRST_DERIVED_TEMPLATE_ID,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the extended Template for `old_id`, deriving and caching one
    /// if absent, or invalidating and re-deriving one if the original
    /// Template's definition changed since it was cached.
    ///
    /// `original_record` is the complete wire bytes of the original
    /// Template record (header + field specifiers) as it appeared in its
    /// Template Set.
    pub fn resolve(
        &mut self,
        old_id: u16,
        original_record: &[u8],
        config: &Config,
        hooks: &EventHooks,
    ) -> Result<(bool, &CachedTemplate), ExtenderError> {
        if let Some(existing) = self.entries.get(&old_id) {
            if existing.source_bytes == original_record {
                debug!("reusing extended template {} for {old_id}", existing.new_id);
                hooks.trigger(&Event::Reused {
                    old_id,
                    new_id: existing.new_id,
                });
                return Ok((false, self.entries.get(&old_id).expect("just checked")));
            }
            debug!("template {old_id} redefined, invalidating cached derivation");
            hooks.trigger(&Event::Invalidated { old_id });
            self.entries.remove(&old_id);
        }

        let derived = self.derive(old_id, original_record, config)?;
        hooks.trigger(&Event::Derived {
            old_id,
            new_id: derived.new_id,
        });
        self.entries.insert(old_id, derived);
        Ok((true, self.entries.get(&old_id).expect("just inserted")))
    }

    fn derive(
        &mut self,
        old_id: u16,
        original_record: &[u8],
        config: &Config,
    ) -> Result<CachedTemplate, ExtenderError> {
        if original_record.len() < TemplateRecordHeader::SIZE {
            return Err(ExtenderError::MalformedTemplate {
                old_id,
                length: original_record.len(),
            });
        }

        let (_, header) = TemplateRecordHeader::parse(original_record).map_err(|e| {
            ExtenderError::TemplateParse {
                old_id,
                reason: format!("{e:?}"),
            }
        })?;

        let original_field_count = header.field_count;
        let original_fields_bytes = &original_record[TemplateRecordHeader::SIZE..];

        let original_fields = parse_field_specifiers(original_fields_bytes, original_field_count)
            .map_err(|reason| ExtenderError::TemplateParse { old_id, reason })?;

        let new_id = self.next_template_id;
        self.next_template_id = self.next_template_id.wrapping_add(1);

        let new_field_count = original_field_count
            .checked_add(config.extensions().len() as u16)
            .ok_or_else(|| ExtenderError::Resource(format!(
                "field count overflow deriving template from {old_id}"
            )))?;

        let mut extended_record = Vec::with_capacity(
            TemplateRecordHeader::SIZE
                + original_fields_bytes.len()
                + config.max_extension_len(),
        );
        extended_record.extend_from_slice(
            &TemplateRecordHeader {
                template_id: new_id,
                field_count: new_field_count,
            }
            .to_be_bytes(),
        );
        extended_record.extend_from_slice(original_fields_bytes);

        for extension in config.extensions() {
            let length = extension
                .ie()
                .data_type
                .size_of()
                .unwrap_or(VARLEN_MARKER);
            let is_enterprise = extension.ie().id & crate::wire::ENTERPRISE_BIT != 0;
            FieldSpecifier {
                ie_id: extension.ie().id,
                length,
                enterprise_number: is_enterprise.then_some(0),
            }
            .encode_into(&mut extended_record);
        }

        debug!("derived extended template {new_id} from {old_id}");
        Ok(CachedTemplate {
            new_id,
            original_field_count,
            source_bytes: original_record.to_vec(),
            extended_record,
            original_fields,
        })
    }
}

fn parse_field_specifiers(bytes: &[u8], field_count: u16) -> Result<Vec<FieldSpecifier>, String> {
    let mut rest = bytes;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let (tail, field) =
            FieldSpecifier::parse(rest).map_err(|e| format!("malformed field specifier: {e:?}"))?;
        rest = tail;
        fields.push(field);
    }
    Ok(fields)
}
