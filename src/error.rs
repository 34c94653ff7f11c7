// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Errors raised while constructing a [`crate::config::Config`].
///
/// This is the only place in the crate that hands back a typed, recoverable
/// error. Every other precondition violation (see module docs on
/// [`crate::slice`]) indicates a bug in the caller and is checked with
/// `assert!`/`debug_assert!` instead, since by the time a slice or slice
/// table exists, its configuration is assumed valid.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("block size {0} must be a non-zero power of two")]
    BlockSizeNotPowerOfTwo(u64),
    #[error("slice size {slice_size} is not a multiple of block size {block_size}")]
    SliceSizeNotMultiple { slice_size: u64, block_size: u64 },
    #[error("prealloc size {prealloc_size} is not a multiple of block size {block_size}")]
    PreallocSizeNotMultiple {
        prealloc_size: u64,
        block_size: u64,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
