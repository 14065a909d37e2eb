//! Output message assembly.
//!
//! Builds a wire-exact IPFIX message incrementally: non-data sets are
//! copied verbatim, Data Sets are opened/closed around groups of records
//! sharing a Template id, and the message header's length is backpatched
//! once the whole message is known. Accumulates into a single pre-sized
//! buffer and patches lengths in place rather than building a tree of
//! owned structures first.

use crate::error::ExtenderError;
use crate::wire::{set_padding, MessageHeader, SetHeader};

struct OpenSet {
    /// Byte offset of this set's header within the output buffer.
    header_offset: usize,
    set_id: u16,
    record_count: u32,
}

/// Accumulates an output IPFIX message.
pub struct MessageBuilder {
    out: Vec<u8>,
    capacity: usize,
    open_set: Option<OpenSet>,
}

impl MessageBuilder {
    /// Start a new message, writing `header` immediately (its `length`
    /// field is backpatched by [`Self::finish`]). `capacity` bounds the
    /// total output size; exceeding it returns a [`ExtenderError::Resource`]
    /// rather than growing unboundedly.
    pub fn new(capacity: usize, header: MessageHeader) -> Self {
        let mut out = Vec::with_capacity(capacity);
        out.extend_from_slice(&header.to_be_bytes());
        Self {
            out,
            capacity,
            open_set: None,
        }
    }

    fn reserve(&mut self, additional: usize) -> Result<(), ExtenderError> {
        if self.out.len() + additional > self.capacity {
            return Err(ExtenderError::Resource(format!(
                "output message would exceed preallocated capacity of {} bytes",
                self.capacity
            )));
        }
        Ok(())
    }

    /// Append raw bytes with no Set-structure bookkeeping. Used internally;
    /// exposed so callers assembling raw extended Template Sets can reuse
    /// the same capacity check.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), ExtenderError> {
        self.reserve(bytes.len())?;
        self.out.extend_from_slice(bytes);
        Ok(())
    }

    /// Copy an entire non-Data Set (Template Set, Options Template Set, or
    /// a passthrough Set) verbatim, including its header and padding.
    ///
    /// Requires no Data Set is currently open; callers must `end_dset`
    /// first.
    pub fn copy_set(&mut self, set_bytes: &[u8]) -> Result<(), ExtenderError> {
        debug_assert!(
            self.open_set.is_none(),
            "copy_set called while a Data Set is open"
        );
        self.write(set_bytes)
    }

    /// Begin (or continue) a Data Set for `set_id`. If a different Data Set
    /// is currently open, it is closed first.
    pub fn begin_dset(&mut self, set_id: u16) -> Result<(), ExtenderError> {
        if let Some(open) = &self.open_set {
            if open.set_id == set_id {
                return Ok(());
            }
            self.end_dset()?;
        }
        self.reserve(SetHeader::SIZE)?;
        let header_offset = self.out.len();
        self.out.extend_from_slice(&[0u8; SetHeader::SIZE]);
        self.open_set = Some(OpenSet {
            header_offset,
            set_id,
            record_count: 0,
        });
        Ok(())
    }

    /// Append one Data Record's bytes to the currently open Data Set.
    ///
    /// Panics (via `debug_assert`) if no Data Set is open; callers must
    /// call [`Self::begin_dset`] first.
    pub fn write_record(&mut self, bytes: &[u8]) -> Result<(), ExtenderError> {
        debug_assert!(self.open_set.is_some(), "write_record with no open Data Set");
        self.reserve(bytes.len())?;
        self.out.extend_from_slice(bytes);
        if let Some(open) = &mut self.open_set {
            open.record_count += 1;
        }
        Ok(())
    }

    /// Close the currently open Data Set, if any. A Data Set that ended up
    /// with zero records is elided entirely rather than emitted as an empty
    /// set, matching spec fidelity around dropped/filtered records.
    pub fn end_dset(&mut self) -> Result<(), ExtenderError> {
        let Some(open) = self.open_set.take() else {
            return Ok(());
        };

        if open.record_count == 0 {
            self.out.truncate(open.header_offset);
            return Ok(());
        }

        let content_len = self.out.len() - open.header_offset - SetHeader::SIZE;
        let padding = set_padding(SetHeader::SIZE + content_len);
        self.reserve(padding)?;
        self.out.resize(self.out.len() + padding, 0);

        let total_len = self.out.len() - open.header_offset;
        let total_len: u16 = total_len
            .try_into()
            .map_err(|_| ExtenderError::Resource(format!("set length {total_len} exceeds u16")))?;

        let header = SetHeader {
            set_id: open.set_id,
            length: total_len,
        };
        self.out[open.header_offset..open.header_offset + SetHeader::SIZE]
            .copy_from_slice(&header.to_be_bytes());
        Ok(())
    }

    /// True if nothing beyond the Message Header has been written.
    pub fn is_empty_msg(&self) -> bool {
        self.out.len() == MessageHeader::SIZE
    }

    /// Close any open Data Set, backpatch the Message Header's length, and
    /// return the finished message bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, ExtenderError> {
        self.end_dset()?;
        let total_len: u16 = self
            .out
            .len()
            .try_into()
            .map_err(|_| ExtenderError::Resource(format!(
                "message length {} exceeds u16",
                self.out.len()
            )))?;
        self.out[2..4].copy_from_slice(&total_len.to_be_bytes());
        Ok(self.out)
    }
}
