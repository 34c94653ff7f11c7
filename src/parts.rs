// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Work-list items emitted by the slice primitives (spec §3, §6).
//!
//! The core owns no buffers (spec Non-goals): every part borrows a slice of
//! the caller's data buffer for the duration of one `divide_for_*` call, the
//! same buffer-slicing idiom the reference crate's `MemoryCowFile` uses for
//! its `Read`/`Write` implementations.

use crate::extent::AllocInfo;

/// A physical write that can proceed immediately against already-backed
/// storage.
#[derive(Debug)]
pub struct WritePart<'a> {
    pub p_offset: u64,
    pub length: u64,
    pub data: &'a [u8],
}

/// A physical read against already-backed, written storage.
#[derive(Debug)]
pub struct ReadPart<'a> {
    pub p_offset: u64,
    pub length: u64,
    pub data: &'a mut [u8],
}

/// A read-side region with no backing data. The caller must zero-fill
/// `data`.
#[derive(Debug)]
pub struct HolePart<'a> {
    pub fs_offset: u64,
    pub length: u64,
    pub data: &'a mut [u8],
}

/// An allocation request that must be issued before the associated write.
///
/// `write_length` may be less than `alloc_info.len` when the allocation is
/// rounded up for alignment or speculative prealloc; `padding` is the
/// distance from the start of the allocated block to where the user's data
/// actually lands.
#[derive(Debug)]
pub struct AllocPart<'a> {
    pub alloc_info: AllocInfo,
    pub write_length: u64,
    pub padding: u64,
    pub data: &'a [u8],
}

impl AllocPart<'_> {
    /// Logical length actually covered by this part. Per spec §8 property 4,
    /// `divide_for_write` outputs must be counted by `write_length`, not
    /// `alloc_info.len`, when checking range coverage.
    #[inline]
    pub fn covered_len(&self) -> u64 {
        self.write_length
    }
}
