// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Dispatches whole-file requests across the fixed-size [`Slice`] regions
//! that cover them (spec §4.6).
//!
//! A request `[offset, offset+len)` is clipped at every `slice_size`
//! boundary it crosses; each clip is handed to the matching `Slice`, and the
//! per-slice outputs are concatenated in offset order. Slices are created
//! lazily, only when an operation can produce extents for them — a read
//! against a slice that has never been touched is a hole, not a reason to
//! allocate map storage for it.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::Config;
use crate::extent::PExtent;
use crate::parts::{AllocPart, HolePart, ReadPart, WritePart};
use crate::slice::Slice;

/// The full extent map for one file: a [`Config`] plus the sparse set of
/// [`Slice`]s that have ever held data.
#[derive(Debug, Clone)]
pub struct SliceTable {
    config: Config,
    slices: BTreeMap<u64, Slice>,
}

/// One `[offset, len)` request clipped to a single slice's region.
struct Clip {
    slice_start: u64,
    offset: u64,
    len: u64,
}

impl SliceTable {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            slices: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn slices(&self) -> impl Iterator<Item = &Slice> {
        self.slices.values()
    }

    /// Split `[offset, offset+len)` into per-slice clips in ascending order.
    fn clip(&self, offset: u64, len: u64) -> Vec<Clip> {
        if len == 0 {
            return Vec::new();
        }
        let slice_size = self.config.slice_size();
        let mut clips = Vec::new();
        let mut cur = offset;
        let end = offset + len;
        while cur < end {
            let slice_start = self.config.slice_start(cur);
            let slice_end = slice_start + slice_size;
            let clip_end = end.min(slice_end);
            clips.push(Clip {
                slice_start,
                offset: cur,
                len: clip_end - cur,
            });
            cur = clip_end;
        }
        clips
    }

    fn slice_mut(&mut self, slice_start: u64) -> &mut Slice {
        self.slices
            .entry(slice_start)
            .or_insert_with(|| Slice::new(slice_start))
    }

    /// Divide a whole-file write request across however many slices it
    /// spans (spec §4.6).
    pub fn divide_for_write<'a>(
        &mut self,
        offset: u64,
        len: u64,
        data: &'a [u8],
    ) -> (Vec<WritePart<'a>>, Vec<AllocPart<'a>>) {
        let clips = self.clip(offset, len);
        let mut allocated = Vec::new();
        let mut need_alloc = Vec::new();
        let mut data = data;

        for clip in clips {
            let (head, tail) = data.split_at(clip.len as usize);
            data = tail;
            let slice = self.slice_mut(clip.slice_start);
            let (mut w, mut a) = slice.divide_for_write(&self.config, clip.offset, clip.len, head);
            allocated.append(&mut w);
            need_alloc.append(&mut a);
        }

        debug!(
            offset,
            len,
            allocated = allocated.len(),
            need_alloc = need_alloc.len(),
            "table divide_for_write"
        );
        (allocated, need_alloc)
    }

    /// Divide a whole-file read request across however many slices it spans.
    /// A clip that falls in a slice that doesn't exist yet is a single hole.
    pub fn divide_for_read<'a>(
        &self,
        offset: u64,
        len: u64,
        data: &'a mut [u8],
    ) -> (Vec<ReadPart<'a>>, Vec<HolePart<'a>>) {
        let clips = self.clip(offset, len);
        let mut reads = Vec::new();
        let mut holes = Vec::new();
        let mut data = data;

        for clip in clips {
            let (head, tail) = data.split_at_mut(clip.len as usize);
            data = tail;
            match self.slices.get(&clip.slice_start) {
                Some(slice) => {
                    let (mut r, mut h) =
                        slice.divide_for_read(&self.config, clip.offset, clip.len, head);
                    reads.append(&mut r);
                    holes.append(&mut h);
                }
                None => holes.push(HolePart {
                    fs_offset: clip.offset,
                    length: clip.len,
                    data: head,
                }),
            }
        }

        debug!(
            offset,
            len,
            reads = reads.len(),
            holes = holes.len(),
            "table divide_for_read"
        );
        (reads, holes)
    }

    /// Record a completed allocation, inserting and coalescing `extent`
    /// into the slice covering `l_offset` (spec §4.6).
    pub fn merge(&mut self, l_offset: u64, extent: PExtent) {
        let slice_start = self.config.slice_start(l_offset);
        debug_assert!(
            l_offset + extent.len <= slice_start + self.config.slice_size(),
            "merge: extent crosses a slice boundary"
        );
        self.slice_mut(slice_start).merge(l_offset, extent);
    }

    /// Flip the `unwritten` bit across `[offset, len)`, which may itself
    /// span several slices.
    pub fn mark_written(&mut self, offset: u64, len: u64) {
        for clip in self.clip(offset, len) {
            self.slice_mut(clip.slice_start)
                .mark_written(&self.config, clip.offset, clip.len);
        }
    }

    /// Drop any slice left with no extents, keeping the table sparse
    /// (spec invariant: no empty slices persist).
    pub fn prune_empty(&mut self) {
        self.slices.retain(|_, slice| !slice.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SliceTable {
        SliceTable::new(Config::new(4096, 1 << 20, 64 * 1024).unwrap())
    }

    #[test]
    fn write_spanning_two_slices_creates_both() {
        let mut t = table();
        let slice_size = 1u64 << 20;
        let offset = slice_size - 100;
        let data = vec![7u8; 200];

        let (allocated, need_alloc) = t.divide_for_write(offset, 200, &data);
        assert!(allocated.is_empty());
        assert_eq!(need_alloc.len(), 2);
        assert_eq!(t.slices.len(), 2);
        assert!(t.slices.contains_key(&0));
        assert!(t.slices.contains_key(&slice_size));
    }

    #[test]
    fn read_against_untouched_slice_is_a_single_hole() {
        let t = table();
        let mut buf = vec![0u8; 4096];
        let (reads, holes) = t.divide_for_read(0, 4096, &mut buf);
        assert!(reads.is_empty());
        assert_eq!(holes.len(), 1);
        assert_eq!(holes[0].fs_offset, 0);
        assert_eq!(holes[0].length, 4096);
    }

    #[test]
    fn merge_rejects_extent_crossing_slice_boundary() {
        let mut t = table();
        let slice_size = 1u64 << 20;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            t.merge(slice_size - 100, PExtent::written(0, 200));
        }));
        assert!(result.is_err());
    }

    #[test]
    fn prune_empty_removes_slices_with_no_extents() {
        let mut t = table();
        t.slices.insert(0, Slice::new(0));
        assert!(!t.slices.is_empty());
        t.prune_empty();
        assert!(t.slices.is_empty());
    }

    #[test]
    fn mark_written_spans_slices_independently() {
        let mut t = table();
        let slice_size = 1u64 << 20;
        t.merge(slice_size - 4096, PExtent::reserved(0x9000, 4096));
        t.merge(slice_size, PExtent::reserved(0xA000, 4096));

        t.mark_written(slice_size - 4096, 8192);

        let s0 = t.slices.get(&0).unwrap();
        let s1 = t.slices.get(&slice_size).unwrap();
        let e0: Vec<_> = s0.extents().collect();
        let e1: Vec<_> = s1.extents().collect();
        assert!(!e0[0].1.unwritten);
        assert!(!e1[0].1.unwritten);
    }
}
