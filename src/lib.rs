#![doc = include_str!("../README.md")]

pub mod builder;
pub mod config;
pub mod error;
pub mod events;
pub mod extend;
pub mod filter;
pub mod ie;
pub mod pipeline;
pub mod template_cache;
pub mod wire;

use config::Config;
use error::ExtenderError;
use events::{EventHook, EventHooks};
use pipeline::TemplateRegistry;
use template_cache::TemplateCache;

// Re-export the pieces most callers need without drilling into submodules.
pub use config::ConfigBuilder;
pub use error::ConfigError;
pub use events::Event;
pub use ie::{IeDataType, IeDef, IeManager, StaticIeManager};

/// Drives the record extension engine across a sequence of IPFIX messages
/// from one exporting source.
///
/// Owns everything that must persist between messages: the derived-Template
/// cache, the registry of Template definitions learned from earlier
/// messages (since a Data Set's defining Template Set need not repeat in
/// every message), and any registered lifecycle hooks. Build once via
/// [`RecordExtender::builder`], then drive it one message at a time with
/// [`RecordExtender::process_message`].
pub struct RecordExtender {
    config: Config,
    cache: TemplateCache,
    registry: TemplateRegistry,
    hooks: EventHooks,
}

/// Builder for configuring and constructing a [`RecordExtender`].
///
/// # Examples
///
/// ```rust
/// use ipfix_extender::{IeManager, RecordExtender, StaticIeManager};
///
/// let ie_manager = StaticIeManager;
/// let extender = RecordExtender::builder()
///     .with_extension("applicationName", vec![("destinationTransportPort == 22", "ssh")], &ie_manager)
///     .expect("valid extension")
///     .build()
///     .expect("valid configuration");
/// assert_eq!(extender.config().extensions().len(), 1);
/// ```
#[derive(Default)]
pub struct RecordExtenderBuilder {
    config: ConfigBuilder,
    hooks: EventHooks,
}

impl RecordExtenderBuilder {
    /// Add one Extension (an Information Element to append, plus its
    /// ordered filter/value Candidates). Delegates to
    /// [`ConfigBuilder::with_extension`]; see its docs for validation rules.
    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_extension(
        mut self,
        ie_name: &str,
        candidates: Vec<(&str, &str)>,
        ie_manager: &dyn IeManager,
    ) -> Result<Self, ConfigError> {
        self.config = self.config.with_extension(ie_name, candidates, ie_manager)?;
        Ok(self)
    }

    /// Register a hook fired for every [`Event`] the Template cache raises.
    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn on_template_event(mut self, hook: EventHook) -> Self {
        self.hooks.register(hook);
        self
    }

    pub fn build(self) -> Result<RecordExtender, ConfigError> {
        Ok(RecordExtender {
            config: self.config.build()?,
            cache: TemplateCache::new(),
            registry: TemplateRegistry::new(),
            hooks: self.hooks,
        })
    }
}

impl RecordExtender {
    pub fn builder() -> RecordExtenderBuilder {
        RecordExtenderBuilder::default()
    }

    /// Construct directly from an already-validated [`Config`] (e.g. one
    /// loaded via [`config::loader::from_yaml`]), with no hooks registered.
    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            cache: TemplateCache::new(),
            registry: TemplateRegistry::new(),
            hooks: EventHooks::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register a hook fired for every [`Event`] the Template cache raises.
    pub fn on_template_event(&mut self, hook: EventHook) {
        self.hooks.register(hook);
    }

    /// Number of extended Templates currently cached.
    pub fn cached_template_count(&self) -> usize {
        self.cache.len()
    }

    /// Process one input IPFIX message (Message Header through its final
    /// Set), returning the enriched message's wire bytes, or `Ok(None)` if
    /// the result would be header-only: a header-only output message is
    /// destroyed rather than forwarded.
    pub fn process_message(&mut self, input: &[u8]) -> Result<Option<Vec<u8>>, ExtenderError> {
        pipeline::extend_message(
            &mut self.registry,
            &mut self.cache,
            &self.hooks,
            &self.config,
            input,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{
        FieldSpecifier, MessageHeader, SetHeader, TemplateRecordHeader, FIRST_DERIVED_TEMPLATE_ID,
        TEMPLATE_SET_ID,
    };
    use nom_derive::Parse;

    fn sample_message() -> Vec<u8> {
        let mut body = Vec::new();

        let mut template_record = TemplateRecordHeader {
            template_id: 256,
            field_count: 1,
        }
        .to_be_bytes()
        .to_vec();
        FieldSpecifier {
            ie_id: 8,
            length: 4,
            enterprise_number: None,
        }
        .encode_into(&mut template_record);
        let template_set_len = (SetHeader::SIZE + template_record.len()) as u16;
        body.extend_from_slice(
            &SetHeader {
                set_id: TEMPLATE_SET_ID,
                length: template_set_len,
            }
            .to_be_bytes(),
        );
        body.extend_from_slice(&template_record);

        let record = [192u8, 168, 1, 1];
        let dset_len = (SetHeader::SIZE + record.len()) as u16;
        body.extend_from_slice(
            &SetHeader {
                set_id: 256,
                length: dset_len,
            }
            .to_be_bytes(),
        );
        body.extend_from_slice(&record);

        let mut message = MessageHeader {
            version: 10,
            length: (MessageHeader::SIZE + body.len()) as u16,
            export_time: 1_700_000_000,
            sequence_number: 1,
            observation_domain_id: 1,
        }
        .to_be_bytes()
        .to_vec();
        message.extend_from_slice(&body);
        message
    }

    #[test]
    fn end_to_end_string_extension_match() {
        let ie_manager = StaticIeManager;
        let mut extender = RecordExtender::builder()
            .with_extension(
                "interfaceName",
                vec![("sourceIPv4Address == 192.168.1.1", "eth0")],
                &ie_manager,
            )
            .unwrap()
            .build()
            .unwrap();

        let output = extender
            .process_message(&sample_message())
            .unwrap()
            .expect("non-empty output");

        let (body, header) = MessageHeader::parse(&output).unwrap();
        assert_eq!(header.length as usize, output.len());

        let sets = wire::parse_sets(body);
        // [0] the original Template Set (256), passed through verbatim;
        // [1] the newly derived Template Set (40000); [2] the Data Set.
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].set_id, TEMPLATE_SET_ID);

        assert_eq!(sets[1].set_id, TEMPLATE_SET_ID);
        let (tmplt_header, raw_record) = wire::parse_template_records(sets[1].content)[0];
        assert_eq!(tmplt_header.template_id, FIRST_DERIVED_TEMPLATE_ID);
        let fields = wire::parse_field_specifiers_for(raw_record);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].ie_id, 82);

        assert_eq!(sets[2].set_id, FIRST_DERIVED_TEMPLATE_ID);
        assert_eq!(
            sets[2].content,
            &[192, 168, 1, 1, 4, b'e', b't', b'h', b'0', 0, 0, 0][..]
        );
    }

    #[test]
    fn no_matching_candidate_appends_empty_string() {
        let ie_manager = StaticIeManager;
        let mut extender = RecordExtender::builder()
            .with_extension(
                "interfaceName",
                vec![("sourceIPv4Address == 10.0.0.1", "eth0")],
                &ie_manager,
            )
            .unwrap()
            .build()
            .unwrap();

        let output = extender
            .process_message(&sample_message())
            .unwrap()
            .expect("non-empty output");
        let (body, _) = MessageHeader::parse(&output).unwrap();
        let sets = wire::parse_sets(body);
        // [0] original Template Set, [1] derived Template Set, [2] Data Set.
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[2].set_id, FIRST_DERIVED_TEMPLATE_ID);
        assert_eq!(sets[2].content, &[192, 168, 1, 1, 0, 0, 0, 0][..]);
    }

    #[test]
    fn u16_extension_match_appends_be_value() {
        let ie_manager = StaticIeManager;
        let mut extender = RecordExtender::builder()
            .with_extension(
                "destinationTransportPort",
                vec![("sourceIPv4Address == 192.168.1.1", "42")],
                &ie_manager,
            )
            .unwrap()
            .build()
            .unwrap();

        let output = extender
            .process_message(&sample_message())
            .unwrap()
            .expect("non-empty output");
        let (body, _) = MessageHeader::parse(&output).unwrap();
        let sets = wire::parse_sets(body);
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[2].set_id, FIRST_DERIVED_TEMPLATE_ID);
        // 4-byte original record + big-endian u16 0x002A, padded to 8 bytes.
        assert_eq!(sets[2].content, &[192, 168, 1, 1, 0, 0x2A, 0, 0][..]);
    }

    #[test]
    fn two_data_sets_sharing_one_template_emit_one_derived_template_set() {
        // Two Data Sets both keyed to input Template 256, separated by a
        // passthrough non-data set. Expect one derived Template Set (no
        // duplicate emission) and two separate output Data Sets, still
        // separated by the passthrough set.
        let mut body = Vec::new();

        let mut template_record = TemplateRecordHeader {
            template_id: 256,
            field_count: 1,
        }
        .to_be_bytes()
        .to_vec();
        FieldSpecifier {
            ie_id: 8,
            length: 4,
            enterprise_number: None,
        }
        .encode_into(&mut template_record);
        let template_set_len = (SetHeader::SIZE + template_record.len()) as u16;
        body.extend_from_slice(
            &SetHeader {
                set_id: TEMPLATE_SET_ID,
                length: template_set_len,
            }
            .to_be_bytes(),
        );
        body.extend_from_slice(&template_record);

        let record1 = [192u8, 168, 1, 1];
        let dset_len = (SetHeader::SIZE + record1.len()) as u16;
        body.extend_from_slice(
            &SetHeader {
                set_id: 256,
                length: dset_len,
            }
            .to_be_bytes(),
        );
        body.extend_from_slice(&record1);

        let passthrough = [9u8, 9, 9, 9];
        let passthrough_len = (SetHeader::SIZE + passthrough.len()) as u16;
        body.extend_from_slice(
            &SetHeader {
                set_id: 1,
                length: passthrough_len,
            }
            .to_be_bytes(),
        );
        body.extend_from_slice(&passthrough);

        let record2 = [10u8, 0, 0, 1];
        let dset_len = (SetHeader::SIZE + record2.len()) as u16;
        body.extend_from_slice(
            &SetHeader {
                set_id: 256,
                length: dset_len,
            }
            .to_be_bytes(),
        );
        body.extend_from_slice(&record2);

        let mut message = MessageHeader {
            version: 10,
            length: (MessageHeader::SIZE + body.len()) as u16,
            export_time: 1_700_000_000,
            sequence_number: 1,
            observation_domain_id: 1,
        }
        .to_be_bytes()
        .to_vec();
        message.extend_from_slice(&body);

        let ie_manager = StaticIeManager;
        let mut extender = RecordExtender::builder()
            .with_extension(
                "minimumTTL",
                vec![("sourceIPv4Address == 192.168.1.1", "30")],
                &ie_manager,
            )
            .unwrap()
            .build()
            .unwrap();

        let output = extender.process_message(&message).unwrap().unwrap();
        let (body, _) = MessageHeader::parse(&output).unwrap();
        let sets = wire::parse_sets(body);

        // [0] orig TS, [1] derived TS, [2] DS1, [3] passthrough, [4] DS2.
        assert_eq!(sets.len(), 5);
        assert_eq!(sets[0].set_id, TEMPLATE_SET_ID);
        assert_eq!(sets[1].set_id, TEMPLATE_SET_ID);
        let (tmplt_header, _) = wire::parse_template_records(sets[1].content)[0];
        assert_eq!(tmplt_header.template_id, FIRST_DERIVED_TEMPLATE_ID);

        assert_eq!(sets[2].set_id, FIRST_DERIVED_TEMPLATE_ID);
        assert_eq!(sets[2].content, &[192, 168, 1, 1, 30, 0, 0, 0][..]);

        assert_eq!(sets[3].set_id, 1);
        assert_eq!(sets[3].content, &[9, 9, 9, 9][..]);

        assert_eq!(sets[4].set_id, FIRST_DERIVED_TEMPLATE_ID);
        assert_eq!(sets[4].content, &[10, 0, 0, 1, 0, 0, 0, 0][..]);
    }

    #[test]
    fn options_template_records_are_skipped_not_extended() {
        let mut body = Vec::new();
        let opts_header = wire::OptionsTemplateRecordHeader {
            template_id: 300,
            field_count: 1,
            scope_field_count: 1,
        };
        let mut opts_record = opts_header.to_be_bytes().to_vec();
        FieldSpecifier {
            ie_id: 148,
            length: 4,
            enterprise_number: None,
        }
        .encode_into(&mut opts_record);
        let opts_set_len = (SetHeader::SIZE + opts_record.len()) as u16;
        body.extend_from_slice(
            &SetHeader {
                set_id: wire::OPTIONS_TEMPLATE_SET_ID,
                length: opts_set_len,
            }
            .to_be_bytes(),
        );
        body.extend_from_slice(&opts_record);

        let record = [0u8, 0, 0, 1];
        let dset_len = (SetHeader::SIZE + record.len()) as u16;
        body.extend_from_slice(
            &SetHeader {
                set_id: 300,
                length: dset_len,
            }
            .to_be_bytes(),
        );
        body.extend_from_slice(&record);

        let mut message = MessageHeader {
            version: 10,
            length: (MessageHeader::SIZE + body.len()) as u16,
            export_time: 1_700_000_000,
            sequence_number: 1,
            observation_domain_id: 1,
        }
        .to_be_bytes()
        .to_vec();
        message.extend_from_slice(&body);

        let ie_manager = StaticIeManager;
        let mut extender = RecordExtender::builder()
            .with_extension(
                "interfaceName",
                vec![("sourceIPv4Address == 192.168.1.1", "eth0")],
                &ie_manager,
            )
            .unwrap()
            .build()
            .unwrap();

        let output = extender.process_message(&message).unwrap().unwrap();
        let (body, _) = MessageHeader::parse(&output).unwrap();
        let sets = wire::parse_sets(body);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].set_id, wire::OPTIONS_TEMPLATE_SET_ID);
        assert_eq!(extender.cached_template_count(), 0);
    }

    #[test]
    fn data_set_with_no_known_template_is_dropped() {
        // No Template Set precedes this Data Set, so its Template is
        // unknown; its records cannot be laid out and are skipped.
        let record = [192u8, 168, 1, 1];
        let dset_len = (SetHeader::SIZE + record.len()) as u16;
        let mut body = Vec::new();
        body.extend_from_slice(
            &SetHeader {
                set_id: 500,
                length: dset_len,
            }
            .to_be_bytes(),
        );
        body.extend_from_slice(&record);

        let mut message = MessageHeader {
            version: 10,
            length: (MessageHeader::SIZE + body.len()) as u16,
            export_time: 1_700_000_000,
            sequence_number: 1,
            observation_domain_id: 1,
        }
        .to_be_bytes()
        .to_vec();
        message.extend_from_slice(&body);

        let ie_manager = StaticIeManager;
        let mut extender = RecordExtender::builder()
            .with_extension(
                "interfaceName",
                vec![("sourceIPv4Address == 192.168.1.1", "eth0")],
                &ie_manager,
            )
            .unwrap()
            .build()
            .unwrap();

        let output = extender.process_message(&message).unwrap();
        assert!(output.is_none(), "a header-only result is discarded");
    }

    #[test]
    fn empty_extension_list_round_trips_byte_identical() {
        // With no configured Extensions, nothing is appended, so the Data
        // Set is passed through under its original Template id rather than
        // pointlessly renumbered.
        let mut extender = RecordExtender::builder().build().unwrap();
        let input = sample_message();
        let output = extender.process_message(&input).unwrap().unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn shared_template_across_two_records_emits_one_template_set() {
        let mut body = Vec::new();
        let mut template_record = TemplateRecordHeader {
            template_id: 256,
            field_count: 1,
        }
        .to_be_bytes()
        .to_vec();
        FieldSpecifier {
            ie_id: 8,
            length: 4,
            enterprise_number: None,
        }
        .encode_into(&mut template_record);
        let template_set_len = (SetHeader::SIZE + template_record.len()) as u16;
        body.extend_from_slice(
            &SetHeader {
                set_id: TEMPLATE_SET_ID,
                length: template_set_len,
            }
            .to_be_bytes(),
        );
        body.extend_from_slice(&template_record);

        let records = [[192u8, 168, 1, 1], [10, 0, 0, 1]];
        let dset_len = (SetHeader::SIZE + records.len() * 4) as u16;
        body.extend_from_slice(
            &SetHeader {
                set_id: 256,
                length: dset_len,
            }
            .to_be_bytes(),
        );
        for record in &records {
            body.extend_from_slice(record);
        }

        let mut message = MessageHeader {
            version: 10,
            length: (MessageHeader::SIZE + body.len()) as u16,
            export_time: 1_700_000_000,
            sequence_number: 1,
            observation_domain_id: 1,
        }
        .to_be_bytes()
        .to_vec();
        message.extend_from_slice(&body);

        let ie_manager = StaticIeManager;
        let mut extender = RecordExtender::builder()
            .with_extension("minimumTTL", vec![("protocolIdentifier == 6", "30")], &ie_manager)
            .unwrap()
            .build()
            .unwrap();

        let output = extender.process_message(&message).unwrap().unwrap();
        let (body, _) = MessageHeader::parse(&output).unwrap();
        let sets = wire::parse_sets(body);
        // [0] original Template Set, [1] derived Template Set (only one,
        // shared by both records), [2] the Data Set holding both records.
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].set_id, TEMPLATE_SET_ID);
        assert_eq!(sets[1].set_id, TEMPLATE_SET_ID);
        assert_eq!(sets[2].set_id, FIRST_DERIVED_TEMPLATE_ID);
        // Two 5-byte records (4 + 1 appended byte) = 10 bytes content,
        // padded to a 4-byte boundary (12 bytes).
        assert_eq!(sets[2].content.len(), 12);
    }
}
