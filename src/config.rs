use crate::error::{Error, Result};
use crate::page::SHIFT_MASK;

bitflags! {
    /// Runtime behavior switches stored in the pool header.
    pub struct PoolFlags: u32 {
        /// Emit an error-level diagnostic when the free-run list cannot
        /// satisfy a page request.
        const LOG_NOMEM = 1 << 0;
        /// Poison the data area at init and every freed chunk with 0xA5.
        const JUNK_FILL = 1 << 1;
    }
}

/// Pool geometry, fixed at `init` and stored in the in-region header.
///
/// `min_shift` is the log2 of the smallest object size; requests below it are
/// rounded up. `page_shift` is the log2 of the frame size, normally the
/// system page size. Every derived constant (`exact` size/shift, the maximum
/// slab size) comes from these two, so pools with different geometry can
/// coexist in one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub min_shift: u32,
    pub page_shift: u32,
    pub flags: PoolFlags,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_shift: 3,
            page_shift: 12,
            flags: PoolFlags::LOG_NOMEM,
        }
    }
}

impl PoolConfig {
    pub fn page_size(&self) -> usize {
        1 << self.page_shift
    }

    pub fn min_size(&self) -> usize {
        1 << self.min_shift
    }

    /// Number of size classes: one per power of two in
    /// `[min_size, page_size / 2]`.
    pub fn slot_count(&self) -> usize {
        (self.page_shift - self.min_shift) as usize
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.min_shift == 0 {
            return Err(Error::InvalidConfig("min_shift must be at least 1"));
        }
        if self.min_shift >= self.page_shift {
            return Err(Error::InvalidConfig("min_shift must be below page_shift"));
        }
        // Size-class shifts are stored in the low 4 bits of a descriptor word.
        if self.page_shift as usize > SHIFT_MASK + 1 {
            return Err(Error::InvalidConfig("page_shift must not exceed 16"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        let config = PoolConfig::default();
        assert_eq!(config.page_size(), 4096);
        assert_eq!(config.min_size(), 8);
        assert_eq!(config.slot_count(), 9);
        assert!(config.flags.contains(PoolFlags::LOG_NOMEM));
        assert!(!config.flags.contains(PoolFlags::JUNK_FILL));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_shifts() {
        let mut config = PoolConfig::default();
        config.min_shift = 0;
        assert!(config.validate().is_err());

        config.min_shift = 12;
        assert!(config.validate().is_err());

        config.min_shift = 3;
        config.page_shift = 17;
        assert!(config.validate().is_err());
    }
}
