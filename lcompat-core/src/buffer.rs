//! Growable string buffer
//!
//! Content starts out in an inline region. The first time it outgrows that
//! region the buffer moves into a full userdata block pushed on the host
//! stack, so the host owns and accounts for the memory. From then on the
//! block must stay at the top of the stack whenever the buffer grows or
//! finishes; each growth copies into a larger block that takes the old
//! block's slot.

use tracing::{debug, trace};

use crate::error::{CompatError, CompatResult};
use crate::host::{RawApi, ValueType};

/// Capacity of the inline region
pub const BUFFER_SIZE: usize = 8192;

enum Storage {
    Inline([u8; BUFFER_SIZE]),
    /// Userdata block at absolute stack position `slot`
    Managed { slot: i32, capacity: usize },
}

fn lost_block() -> CompatError {
    CompatError::Runtime("buffer block is no longer on the stack".to_string())
}

/// String accumulator bound to one host
pub struct Buffer<'h, H: RawApi> {
    host: &'h mut H,
    storage: Storage,
    len: usize,
}

impl<'h, H: RawApi> Buffer<'h, H> {
    /// Empty buffer over the inline region.
    pub fn new(host: &'h mut H) -> Self {
        Buffer {
            host,
            storage: Storage::Inline([0; BUFFER_SIZE]),
            len: 0,
        }
    }

    /// Empty buffer with room for at least `size` bytes.
    pub fn with_capacity(host: &'h mut H, size: usize) -> CompatResult<Self> {
        let mut buffer = Buffer::new(host);
        buffer.reserve(size)?;
        Ok(buffer)
    }

    /// Host the buffer pushes to; values pushed here feed [`Buffer::add_value`].
    pub fn host(&mut self) -> &mut H {
        &mut *self.host
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        match self.storage {
            Storage::Inline(_) => BUFFER_SIZE,
            Storage::Managed { capacity, .. } => capacity,
        }
    }

    /// Whether the content lives in a host userdata block
    pub fn is_managed(&self) -> bool {
        matches!(self.storage, Storage::Managed { .. })
    }

    pub fn as_bytes(&self) -> &[u8] {
        let region = match &self.storage {
            Storage::Inline(region) => &region[..],
            Storage::Managed { slot, .. } => self.host.userdata_bytes(*slot).unwrap_or_default(),
        };
        &region[..self.len.min(region.len())]
    }

    fn region_mut(&mut self) -> CompatResult<&mut [u8]> {
        match &mut self.storage {
            Storage::Inline(region) => Ok(&mut region[..]),
            Storage::Managed { slot, .. } => {
                self.host.userdata_bytes_mut(*slot).ok_or_else(lost_block)
            }
        }
    }

    /// Free region of at least `extra` bytes; commit what was written with
    /// [`Buffer::add_size`].
    pub fn reserve(&mut self, extra: usize) -> CompatResult<&mut [u8]> {
        if self.capacity() - self.len < extra {
            self.grow(extra)?;
        }
        let len = self.len;
        Ok(&mut self.region_mut()?[len..])
    }

    fn grow(&mut self, extra: usize) -> CompatResult<()> {
        let too_large = || CompatError::Resource("buffer too large".to_string());
        let doubled = self.capacity().checked_mul(2).ok_or_else(too_large)?;
        let needed = self.len.checked_add(extra).ok_or_else(too_large)?;
        let new_capacity = doubled.max(needed);

        if !self.host.check_stack(1) {
            return Err(CompatError::no_headroom("buffer"));
        }
        let content = self.as_bytes().to_vec();
        self.host.new_userdata(new_capacity);
        let block = self.host.userdata_bytes_mut(-1).ok_or_else(lost_block)?;
        block[..content.len()].copy_from_slice(&content);

        let slot = match self.storage {
            Storage::Managed { slot, .. } => {
                // the new block takes the old one's slot
                self.host.replace(slot);
                slot
            }
            Storage::Inline(_) => self.host.get_top(),
        };
        trace!(
            target: "lcompat::buffer",
            from = self.capacity(),
            to = new_capacity,
            "buffer grown"
        );
        self.storage = Storage::Managed {
            slot,
            capacity: new_capacity,
        };
        Ok(())
    }

    /// Commit `n` bytes written into the region returned by [`Buffer::reserve`].
    pub fn add_size(&mut self, n: usize) {
        debug_assert!(self.len + n <= self.capacity());
        self.len = (self.len + n).min(self.capacity());
    }

    pub fn add_bytes(&mut self, data: &[u8]) -> CompatResult<()> {
        let free = self.reserve(data.len())?;
        free[..data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    pub fn add_str(&mut self, s: &str) -> CompatResult<()> {
        self.add_bytes(s.as_bytes())
    }

    pub fn add_char(&mut self, c: u8) -> CompatResult<()> {
        self.add_bytes(&[c])
    }

    /// Append the string form of the top value and pop it.
    ///
    /// Values without a string form go through their `__tostring` hook.
    pub fn add_value(&mut self) -> CompatResult<()> {
        let bytes = match self.host.type_of(-1) {
            ValueType::String | ValueType::Number => self.host.to_bytes(-1).unwrap_or_default(),
            other => {
                if !self.host.check_stack(3) {
                    return Err(CompatError::no_headroom("not enough stack slots"));
                }
                if !self.host.call_meta(-1, "__tostring")? {
                    return Err(CompatError::Type(format!(
                        "cannot convert a {} value to string",
                        other.name()
                    )));
                }
                if !self.host.is_string(-1) {
                    return Err(CompatError::Type(
                        "'__tostring' must return a string".to_string(),
                    ));
                }
                let converted = self.host.to_bytes(-1).unwrap_or_default();
                self.host.set_top(-2);
                converted
            }
        };
        self.host.set_top(-2);
        self.add_bytes(&bytes)
    }

    /// Push the content as one string; it takes the block's slot if any.
    pub fn finish(self) {
        let managed = self.is_managed();
        debug!(target: "lcompat::buffer", len = self.len, managed, "buffer finished");
        let Buffer { host, storage, len } = self;
        match storage {
            Storage::Inline(region) => host.push_bytes(&region[..len]),
            Storage::Managed { slot, .. } => {
                let content = host
                    .userdata_bytes(slot)
                    .map(|block| block[..len.min(block.len())].to_vec())
                    .unwrap_or_default();
                host.push_bytes(&content);
                host.replace(slot);
            }
        }
    }

    /// Commit `n` reserved bytes, then finish.
    pub fn finish_with_size(mut self, n: usize) {
        self.add_size(n);
        self.finish();
    }
}
