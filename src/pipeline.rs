//! End-to-end message driver.
//!
//! Walks an input IPFIX message set by set: non-Data Sets are copied
//! verbatim, Data Sets are split into records which are each enriched and
//! re-grouped under their (possibly newly derived) Template id. Template
//! binding is tracked by a small registry this engine owns, since this
//! crate has no host collector to consult for previously-seen Templates.

use std::collections::BTreeMap;

use log::warn;
use nom_derive::Parse;

use crate::config::Config;
use crate::error::ExtenderError;
use crate::events::{Event, EventHooks};
use crate::extend::{extend_record, record_wire_len};
use crate::template_cache::TemplateCache;
use crate::wire::{
    self, FieldSpecifier, MessageHeader, DATA_SET_MIN_ID, OPTIONS_TEMPLATE_SET_ID,
    TEMPLATE_SET_ID,
};

/// What a previously-seen Template id refers to: a regular Template (whose
/// field layout we need to split and enrich Data Records), or an Options
/// Template (left untouched).
enum TemplateKind {
    Regular {
        raw_record: Vec<u8>,
        fields: Vec<FieldSpecifier>,
    },
    Options,
}

/// Tracks every Template definition this engine has observed, across
/// messages, so a Data Set can be processed even when its defining
/// Template Set was sent in an earlier message and not repeated here.
#[derive(Default)]
pub struct TemplateRegistry {
    kinds: BTreeMap<u16, TemplateKind>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn learn_template(&mut self, id: u16, raw_record: Vec<u8>, fields: Vec<FieldSpecifier>) {
        self.kinds
            .insert(id, TemplateKind::Regular { raw_record, fields });
    }

    fn learn_options_template(&mut self, id: u16) {
        self.kinds.insert(id, TemplateKind::Options);
    }
}

/// Process one input IPFIX message, returning the enriched message bytes,
/// or `Ok(None)` if the result would contain nothing beyond a Message
/// Header (matching spec fidelity: a header-only message is discarded
/// rather than forwarded).
pub fn extend_message(
    registry: &mut TemplateRegistry,
    cache: &mut TemplateCache,
    hooks: &EventHooks,
    config: &Config,
    input: &[u8],
) -> Result<Option<Vec<u8>>, ExtenderError> {
    if input.len() < MessageHeader::SIZE {
        return Err(ExtenderError::MalformedMessage {
            length: input.len(),
        });
    }
    let (body, header) =
        MessageHeader::parse(input).map_err(|_| ExtenderError::MalformedMessage {
            length: input.len(),
        })?;

    let sets = wire::parse_sets(body);

    // Conservative upper bound: every byte of every Data Set's content
    // could, in the worst case, be its own one-byte record, each gaining
    // at most `max_extension_len` bytes. Avoids needing an exact record
    // count up front.
    let data_bytes: usize = sets
        .iter()
        .filter(|s| s.set_id >= DATA_SET_MIN_ID)
        .map(|s| s.content.len())
        .sum();
    let capacity = input.len() + config.max_extension_len() * data_bytes.max(1) + 4096;

    let mut builder = crate::builder::MessageBuilder::new(capacity, header);

    for set in &sets {
        match set.set_id {
            TEMPLATE_SET_ID => {
                builder.end_dset()?;
                builder.copy_set(set.whole)?;
                for (rec_header, raw_record) in wire::parse_template_records(set.content) {
                    let fields = wire::parse_field_specifiers_for(raw_record);
                    registry.learn_template(rec_header.template_id, raw_record.to_vec(), fields);
                }
            }
            OPTIONS_TEMPLATE_SET_ID => {
                builder.end_dset()?;
                builder.copy_set(set.whole)?;
                for id in wire::parse_options_template_ids(set.content) {
                    registry.learn_options_template(id);
                }
            }
            id if id < DATA_SET_MIN_ID => {
                builder.end_dset()?;
                builder.copy_set(set.whole)?;
            }
            data_set_id => {
                process_data_set(
                    &mut builder,
                    registry,
                    cache,
                    hooks,
                    config,
                    data_set_id,
                    set.content,
                )?;
            }
        }
    }
    builder.end_dset()?;

    if builder.is_empty_msg() {
        return Ok(None);
    }
    Ok(Some(builder.finish()?))
}

fn process_data_set(
    builder: &mut crate::builder::MessageBuilder,
    registry: &mut TemplateRegistry,
    cache: &mut TemplateCache,
    hooks: &EventHooks,
    config: &Config,
    data_set_id: u16,
    content: &[u8],
) -> Result<(), ExtenderError> {
    let kind = registry.kinds.get(&data_set_id);

    let (raw_record, fields) = match kind {
        Some(TemplateKind::Regular { raw_record, fields }) => (raw_record.clone(), fields.clone()),
        Some(TemplateKind::Options) => {
            warn!("data set {data_set_id} uses an options template, skipping its records");
            hooks.trigger(&Event::SkippedOptions { old_id: data_set_id });
            return Ok(());
        }
        None => {
            warn!("data set {data_set_id} references an unknown template, skipping its records");
            return Ok(());
        }
    };

    // With no configured Extensions there is nothing to append, so the
    // Template is left at its original id and the Data Set is copied
    // through unchanged rather than renumbered into a pointless derived
    // Template.
    if config.extensions().is_empty() {
        return copy_data_set_verbatim(builder, data_set_id, content);
    }

    let (is_new, derived) = cache.resolve(data_set_id, &raw_record, config, hooks)?;
    let new_id = derived.new_id;
    let extended_record = derived.extended_record().to_vec();
    if is_new {
        emit_template_set(builder, &extended_record)?;
    }

    builder.begin_dset(new_id)?;

    let mut rest = content;
    while !rest.is_empty() {
        let Some(len) = record_wire_len(&fields, rest) else {
            break;
        };
        if len == 0 {
            break;
        }
        let record = &rest[..len];
        let extended = extend_record(record, &fields, config);
        builder.write_record(&extended)?;
        rest = &rest[len..];
    }

    Ok(())
}

/// Copy a Data Set through unchanged under its original Set id: used only
/// for the no-configured-Extensions fast path, where there is nothing to
/// append and renumbering the Template would be pointless.
fn copy_data_set_verbatim(
    builder: &mut crate::builder::MessageBuilder,
    data_set_id: u16,
    content: &[u8],
) -> Result<(), ExtenderError> {
    builder.end_dset()?;
    let mut whole = Vec::with_capacity(crate::wire::SetHeader::SIZE + content.len());
    whole.extend_from_slice(
        &crate::wire::SetHeader {
            set_id: data_set_id,
            length: (crate::wire::SetHeader::SIZE + content.len()) as u16,
        }
        .to_be_bytes(),
    );
    whole.extend_from_slice(content);
    builder.copy_set(&whole)
}

fn emit_template_set(
    builder: &mut crate::builder::MessageBuilder,
    extended_record: &[u8],
) -> Result<(), ExtenderError> {
    builder.end_dset()?;
    let content_len = extended_record.len();
    let padding = crate::wire::set_padding(crate::wire::SetHeader::SIZE + content_len);
    let mut whole =
        Vec::with_capacity(crate::wire::SetHeader::SIZE + content_len + padding);
    whole.extend_from_slice(
        &crate::wire::SetHeader {
            set_id: TEMPLATE_SET_ID,
            length: (crate::wire::SetHeader::SIZE + content_len + padding) as u16,
        }
        .to_be_bytes(),
    );
    whole.extend_from_slice(extended_record);
    whole.resize(whole.len() + padding, 0);
    builder.copy_set(&whole)
}
