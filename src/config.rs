// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Tunables shared by every slice in a [`crate::table::SliceTable`].
///
/// Immutable for the life of the table (spec §3). `block_size` is the
/// allocation and alignment quantum; `slice_size` fixes the logical region
/// each [`crate::slice::Slice`] covers; `prealloc_size` is the minimum
/// length of a speculative allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Config {
    block_size: u64,
    slice_size: u64,
    prealloc_size: u64,
}

impl Config {
    /// Build a new `Config`, validating the relationships spec §3 and §6
    /// require between the three tunables.
    pub fn new(block_size: u64, slice_size: u64, prealloc_size: u64) -> Result<Self> {
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(ConfigError::BlockSizeNotPowerOfTwo(block_size));
        }
        if slice_size % block_size != 0 {
            return Err(ConfigError::SliceSizeNotMultiple {
                slice_size,
                block_size,
            });
        }
        if prealloc_size % block_size != 0 {
            return Err(ConfigError::PreallocSizeNotMultiple {
                prealloc_size,
                block_size,
            });
        }

        Ok(Self {
            block_size,
            slice_size,
            prealloc_size,
        })
    }

    #[inline]
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    #[inline]
    pub fn slice_size(&self) -> u64 {
        self.slice_size
    }

    #[inline]
    pub fn prealloc_size(&self) -> u64 {
        self.prealloc_size
    }

    /// Round `offset` down to the nearest multiple of [`Self::block_size`].
    #[inline]
    pub fn align_down(&self, offset: u64) -> u64 {
        align_down(offset, self.block_size)
    }

    /// Round `offset` up to the nearest multiple of [`Self::block_size`].
    #[inline]
    pub fn align_up(&self, offset: u64) -> u64 {
        align_up(offset, self.block_size)
    }

    #[inline]
    pub fn is_aligned(&self, offset: u64) -> bool {
        is_aligned(offset, self.block_size)
    }

    /// Start offset of the slice region that contains `fs_offset`.
    #[inline]
    pub fn slice_start(&self, fs_offset: u64) -> u64 {
        align_down(fs_offset, self.slice_size)
    }
}

#[inline]
pub(crate) fn align_down(offset: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    offset & !(align - 1)
}

#[inline]
pub(crate) fn align_up(offset: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    align_down(offset + align - 1, align)
}

#[inline]
pub(crate) fn is_aligned(offset: u64, align: u64) -> bool {
    align_down(offset, align) == offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let cfg = Config::new(4096, 1 << 20, 64 * 1024).unwrap();
        assert_eq!(cfg.block_size(), 4096);
        assert_eq!(cfg.slice_size(), 1 << 20);
        assert_eq!(cfg.prealloc_size(), 64 * 1024);
    }

    #[test]
    fn test_block_size_must_be_power_of_two() {
        assert_eq!(
            Config::new(4097, 1 << 20, 4096).unwrap_err(),
            ConfigError::BlockSizeNotPowerOfTwo(4097),
        );
        assert_eq!(
            Config::new(0, 1 << 20, 4096).unwrap_err(),
            ConfigError::BlockSizeNotPowerOfTwo(0),
        );
    }

    #[test]
    fn test_slice_size_must_be_multiple_of_block_size() {
        assert_eq!(
            Config::new(4096, 4096 * 3 + 1, 4096).unwrap_err(),
            ConfigError::SliceSizeNotMultiple {
                slice_size: 4096 * 3 + 1,
                block_size: 4096,
            },
        );
    }

    #[test]
    fn test_prealloc_size_must_be_multiple_of_block_size() {
        assert_eq!(
            Config::new(4096, 1 << 20, 100).unwrap_err(),
            ConfigError::PreallocSizeNotMultiple {
                prealloc_size: 100,
                block_size: 4096,
            },
        );
    }

    #[test]
    fn test_align_helpers() {
        let cfg = Config::new(4096, 1 << 20, 4096).unwrap();
        assert_eq!(cfg.align_down(100), 0);
        assert_eq!(cfg.align_down(4096), 4096);
        assert_eq!(cfg.align_up(100), 4096);
        assert_eq!(cfg.align_up(4096), 4096);
        assert!(cfg.is_aligned(8192));
        assert!(!cfg.is_aligned(100));
    }
}
