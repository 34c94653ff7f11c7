// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! A fixed-size, fixed-aligned region of a file's logical address space,
//! holding a sorted, disjoint set of [`PExtent`]s (spec §3, §4.1–§4.4).
//!
//! All four primitives are implemented as a single-pass walk over the
//! extents that can possibly overlap the request, keyed by logical offset
//! in a [`BTreeMap`]. The walk tracks a `boundary` — the key of the last
//! extent it fully considered — so each step either re-derives the extent
//! containing the cursor (first step only, via [`Slice::floor_or_next`]) or
//! asks for the next key strictly past `boundary`. This mirrors the
//! std::map iterator walk in `extent_slice.cpp` without needing a live
//! cursor across mutation.
//!
//! Preconditions (request lies inside the slice region, `merge`'s new
//! extent is disjoint from existing ones) are caller obligations per spec
//! §7; violations are checked with `assert!`/`debug_assert!`, never
//! returned as `Result`.

use std::collections::BTreeMap;
use std::ops::Bound;

use tracing::trace;

use crate::config::Config;
use crate::extent::{AllocInfo, PExtent};
use crate::parts::{AllocPart, HolePart, ReadPart, WritePart};

/// One logical region of a file, `[offset, offset + config.slice_size())`,
/// holding the extents that back it.
#[derive(Debug, Clone, Default)]
pub struct Slice {
    offset: u64,
    extents: BTreeMap<u64, PExtent>,
}

fn apply_hint(info: &mut AllocInfo, left_hint: Option<u64>, right_hint: Option<u64>) {
    if let Some(left) = left_hint {
        info.left_hint = Some(left);
    } else if let Some(right) = right_hint {
        info.right_hint = Some(right);
    }
}

/// `true` if `[off1, off1+len1)` and `[off2, off2+len2)` share no bytes.
fn nonoverlap(off1: u64, len1: u64, off2: u64, len2: u64) -> bool {
    off1 + len1 <= off2 || off2 + len2 <= off1
}

impl Slice {
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            extents: BTreeMap::new(),
        }
    }

    pub fn from_extents(offset: u64, extents: BTreeMap<u64, PExtent>) -> Self {
        Self { offset, extents }
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn extents(&self) -> impl Iterator<Item = (u64, &PExtent)> {
        self.extents.iter().map(|(&k, v)| (k, v))
    }

    fn assert_in_region(&self, config: &Config, offset: u64, len: u64) {
        assert!(
            offset >= self.offset && offset + len <= self.offset + config.slice_size(),
            "request [{offset}, {end}) escapes slice region [{start}, {region_end})",
            end = offset + len,
            start = self.offset,
            region_end = self.offset + config.slice_size(),
        );
    }

    /// Greatest key `<= off`, else the least key in the map.
    fn floor_or_next(&self, off: u64) -> Option<(u64, PExtent)> {
        self.extents
            .range(..=off)
            .next_back()
            .or_else(|| self.extents.iter().next())
            .map(|(&k, &v)| (k, v))
    }

    /// Least key strictly greater than `after`.
    fn next_after(&self, after: u64) -> Option<(u64, PExtent)> {
        self.extents
            .range((Bound::Excluded(after), Bound::Unbounded))
            .next()
            .map(|(&k, &v)| (k, v))
    }

    fn candidate(&self, cur_off: u64, boundary: Option<u64>) -> Option<(u64, PExtent)> {
        match boundary {
            None => self.floor_or_next(cur_off),
            Some(b) => self.next_after(b),
        }
    }

    /// Divide a write request into already-backed [`WritePart`]s and
    /// [`AllocPart`]s that require allocation first (spec §4.1).
    pub fn divide_for_write<'a>(
        &self,
        config: &Config,
        offset: u64,
        len: u64,
        data: &'a [u8],
    ) -> (Vec<WritePart<'a>>, Vec<AllocPart<'a>>) {
        let mut allocated = Vec::new();
        let mut need_alloc = Vec::new();

        if len == 0 {
            return (allocated, need_alloc);
        }
        self.assert_in_region(config, offset, len);
        debug_assert_eq!(data.len() as u64, len, "data buffer must match len");

        let block = config.block_size();
        let mut cur_off = offset;
        let cur_end = offset + len;
        let mut data_off = 0u64;
        let mut boundary: Option<u64> = None;
        let mut left_hint: Option<u64> = None;
        let mut right_hint: Option<u64> = None;

        while cur_off < cur_end {
            let Some((ext_start, ext)) = self.candidate(cur_off, boundary) else {
                break;
            };
            let ext_end = ext_start + ext.len;

            if cur_off < ext_start {
                if cur_end <= ext_start {
                    // write    |----|           |----|
                    // extent        |----|               |----|
                    let aligned_off = config.align_down(cur_off);
                    let aligned_end = config.align_up(cur_end);
                    debug_assert!(aligned_end <= ext_start);

                    let write_length = cur_end - cur_off;
                    let padding = cur_off - aligned_off;

                    if cur_end == ext_start && left_hint.is_none() {
                        right_hint = Some(ext.p_offset);
                    }

                    let mut alloc_info = AllocInfo::new(aligned_off, aligned_end - aligned_off);
                    apply_hint(&mut alloc_info, left_hint, right_hint);
                    need_alloc.push(AllocPart {
                        alloc_info,
                        write_length,
                        padding,
                        data: &data[data_off as usize..][..write_length as usize],
                    });

                    cur_off += write_length;
                    data_off += write_length;
                    boundary = Some(ext_start);
                } else {
                    // write   |-----|       |-------|    |--------|
                    // extent      |----|       |----|      |----|
                    let aligned_off = config.align_down(cur_off);
                    debug_assert!(config.is_aligned(ext_start));

                    let write_length = ext_start - cur_off;
                    let padding = cur_off - aligned_off;

                    if left_hint.is_none() {
                        right_hint = Some(ext.p_offset);
                    }

                    let mut alloc_info = AllocInfo::new(aligned_off, ext_start - aligned_off);
                    apply_hint(&mut alloc_info, left_hint, right_hint);
                    need_alloc.push(AllocPart {
                        alloc_info,
                        write_length,
                        padding,
                        data: &data[data_off as usize..][..write_length as usize],
                    });

                    cur_off += write_length;
                    data_off += write_length;
                    // boundary left unchanged: next iteration revisits this
                    // same extent, now from curOff == extStart.
                }
            } else if cur_off == ext_start {
                // write   |----|   |----|      |-------|
                // extent  |----|   |--------|  |----|
                if cur_end <= ext_end {
                    let length = cur_end - cur_off;
                    allocated.push(WritePart {
                        p_offset: ext.p_offset,
                        length,
                        data: &data[data_off as usize..][..length as usize],
                    });
                    cur_off += length;
                    data_off += length;
                } else {
                    let length = ext_end - ext_start;
                    allocated.push(WritePart {
                        p_offset: ext.p_offset,
                        length,
                        data: &data[data_off as usize..][..length as usize],
                    });
                    left_hint = Some(ext.p_end());
                    cur_off += length;
                    data_off += length;
                    boundary = Some(ext_start);
                }
            } else {
                // curOff > extStart
                if cur_off >= ext_end {
                    if cur_off == ext_end || config.align_down(cur_off) == ext_end {
                        left_hint = Some(ext.p_end());
                    }
                    boundary = Some(ext_start);
                    continue;
                } else if cur_end <= ext_end {
                    let length = cur_end - cur_off;
                    allocated.push(WritePart {
                        p_offset: ext.p_offset + (cur_off - ext_start),
                        length,
                        data: &data[data_off as usize..][..length as usize],
                    });
                    cur_off += length;
                    data_off += length;
                } else {
                    let length = ext_end - cur_off;
                    allocated.push(WritePart {
                        p_offset: ext.p_offset + (cur_off - ext_start),
                        length,
                        data: &data[data_off as usize..][..length as usize],
                    });
                    left_hint = Some(ext.p_end());
                    cur_off += length;
                    data_off += length;
                    boundary = Some(ext_start);
                }
            }
        }

        if cur_off < cur_end {
            let aligned_off = config.align_down(cur_off);
            let aligned_end = config.align_up(cur_end);

            let mut alloc_len =
                config.align_up((aligned_end - aligned_off).max(config.prealloc_size()));

            if let Some((next_key, _)) = self.next_after(cur_end) {
                alloc_len = alloc_len.min(next_key - aligned_off);
                debug_assert!(config.is_aligned(alloc_len));
            }

            let write_length = cur_end - cur_off;
            let padding = cur_off - aligned_off;

            let mut alloc_info = AllocInfo::new(aligned_off, alloc_len);
            apply_hint(&mut alloc_info, left_hint, right_hint);
            need_alloc.push(AllocPart {
                alloc_info,
                write_length,
                padding,
                data: &data[data_off as usize..][..write_length as usize],
            });
        }

        trace!(
            offset,
            len,
            allocated = allocated.len(),
            need_alloc = need_alloc.len(),
            "divide_for_write"
        );

        (allocated, need_alloc)
    }

    /// Divide a read request into already-backed [`ReadPart`]s and
    /// [`HolePart`]s (spec §4.2).
    pub fn divide_for_read<'a>(
        &self,
        config: &Config,
        offset: u64,
        len: u64,
        data: &'a mut [u8],
    ) -> (Vec<ReadPart<'a>>, Vec<HolePart<'a>>) {
        let mut reads = Vec::new();
        let mut holes = Vec::new();

        if len == 0 {
            return (reads, holes);
        }
        self.assert_in_region(config, offset, len);
        debug_assert_eq!(data.len() as u64, len, "data buffer must match len");

        let mut cur_off = offset;
        let cur_end = offset + len;
        let mut remaining: &'a mut [u8] = data;
        let mut boundary: Option<u64> = None;

        macro_rules! split_take {
            ($n:expr) => {{
                let n = $n as usize;
                let (head, tail) = std::mem::take(&mut remaining).split_at_mut(n);
                remaining = tail;
                head
            }};
        }

        loop {
            if cur_off >= cur_end {
                break;
            }
            let Some((ext_start, ext)) = self.candidate(cur_off, boundary) else {
                break;
            };
            let ext_end = ext_start + ext.len;

            if cur_off < ext_start {
                if cur_end <= ext_start {
                    let length = cur_end - cur_off;
                    holes.push(HolePart {
                        fs_offset: cur_off,
                        length,
                        data: split_take!(length),
                    });
                    cur_off = cur_end;
                    break;
                } else {
                    let length = ext_start - cur_off;
                    holes.push(HolePart {
                        fs_offset: cur_off,
                        length,
                        data: split_take!(length),
                    });
                    cur_off = ext_start;
                    // boundary unchanged: revisit this same extent next.
                }
            } else if cur_off == ext_start {
                if cur_end <= ext_end {
                    let length = cur_end - cur_off;
                    if ext.unwritten {
                        holes.push(HolePart {
                            fs_offset: cur_off,
                            length,
                            data: split_take!(length),
                        });
                    } else {
                        reads.push(ReadPart {
                            p_offset: ext.p_offset,
                            length,
                            data: split_take!(length),
                        });
                    }
                    cur_off = cur_end;
                    break;
                } else {
                    let length = ext_end - cur_off;
                    if ext.unwritten {
                        holes.push(HolePart {
                            fs_offset: cur_off,
                            length,
                            data: split_take!(length),
                        });
                    } else {
                        reads.push(ReadPart {
                            p_offset: ext.p_offset,
                            length,
                            data: split_take!(length),
                        });
                    }
                    cur_off = ext_end;
                    boundary = Some(ext_start);
                }
            } else {
                // curOff > extStart
                if cur_off >= ext_end {
                    boundary = Some(ext_start);
                    continue;
                } else if cur_end <= ext_end {
                    let length = cur_end - cur_off;
                    if ext.unwritten {
                        holes.push(HolePart {
                            fs_offset: cur_off,
                            length,
                            data: split_take!(length),
                        });
                    } else {
                        reads.push(ReadPart {
                            p_offset: ext.p_offset + (cur_off - ext_start),
                            length,
                            data: split_take!(length),
                        });
                    }
                    cur_off = cur_end;
                    break;
                } else {
                    let length = ext_end - cur_off;
                    if ext.unwritten {
                        holes.push(HolePart {
                            fs_offset: cur_off,
                            length,
                            data: split_take!(length),
                        });
                    } else {
                        reads.push(ReadPart {
                            p_offset: ext.p_offset + (cur_off - ext_start),
                            length,
                            data: split_take!(length),
                        });
                    }
                    cur_off = ext_end;
                    boundary = Some(ext_start);
                }
            }
        }

        if cur_off < cur_end {
            let length = cur_end - cur_off;
            holes.push(HolePart {
                fs_offset: cur_off,
                length,
                data: split_take!(length),
            });
        }

        trace!(
            offset,
            len,
            reads = reads.len(),
            holes = holes.len(),
            "divide_for_read"
        );

        (reads, holes)
    }

    fn mergeable(&self, prev_key: Option<u64>, cur_key: u64) -> bool {
        let Some(pk) = prev_key else { return false };
        let Some(prev) = self.extents.get(&pk) else {
            return false;
        };
        let Some(cur) = self.extents.get(&cur_key) else {
            return false;
        };
        !prev.unwritten
            && !cur.unwritten
            && pk + prev.len == cur_key
            && prev.p_offset + prev.len == cur.p_offset
    }

    /// Insert `new_ext` at `l_offset`, eagerly coalescing with an abutting
    /// written neighbour on either side (spec §4.3).
    ///
    /// `new_ext`'s range must be disjoint from every existing extent; this
    /// is a caller obligation (spec §7), checked with `debug_assert!`.
    pub fn merge(&mut self, l_offset: u64, new_ext: PExtent) {
        debug_assert!(
            self.extents
                .range(..)
                .all(|(&k, v)| nonoverlap(l_offset, new_ext.len, k, v.len)),
            "merge: new extent overlaps an existing one"
        );

        let left_key = self
            .extents
            .range(..l_offset)
            .next_back()
            .map(|(&k, _)| k);

        let inserted_key = if let Some(lk) = left_key {
            let left = self.extents[&lk];
            if !left.unwritten
                && !new_ext.unwritten
                && lk + left.len == l_offset
                && left.p_offset + left.len == new_ext.p_offset
            {
                self.extents.get_mut(&lk).unwrap().len += new_ext.len;
                lk
            } else {
                self.extents.insert(l_offset, new_ext);
                l_offset
            }
        } else {
            self.extents.insert(l_offset, new_ext);
            l_offset
        };

        let inserted = self.extents[&inserted_key];
        let end_off = inserted_key + inserted.len;

        // Per spec §9, the original reads the right-neighbour iterator
        // without an end-of-map check in every path; this port checks
        // presence before dereferencing.
        if let Some(right) = self.extents.get(&end_off).copied() {
            if !inserted.unwritten
                && !right.unwritten
                && inserted.p_offset + inserted.len == right.p_offset
            {
                self.extents.get_mut(&inserted_key).unwrap().len += right.len;
                self.extents.remove(&end_off);
            }
        }

        trace!(l_offset, len = new_ext.len, "merge");
    }

    /// Flip the `unwritten` bit to `false` over `[offset, offset+len)`,
    /// splitting extents as needed to keep the flag uniform per extent
    /// (spec §4.4).
    pub fn mark_written(&mut self, config: &Config, offset: u64, len: u64) {
        if len == 0 {
            return;
        }
        self.assert_in_region(config, offset, len);

        let mut cur_off = offset;
        let cur_end = offset + len;
        let mut boundary: Option<u64> = None;
        let mut prev_key: Option<u64> = None;

        loop {
            if cur_off >= cur_end {
                break;
            }
            let Some((ext_start, ext)) = self.candidate(cur_off, boundary) else {
                break;
            };
            let ext_end = ext_start + ext.len;

            if nonoverlap(cur_off, cur_end - cur_off, ext_start, ext.len) {
                prev_key = Some(ext_start);
                boundary = Some(ext_start);
                continue;
            }

            if !ext.unwritten {
                if self.mergeable(prev_key, ext_start) {
                    let pk = prev_key.unwrap();
                    let ext_len = ext.len;
                    self.extents.get_mut(&pk).unwrap().len += ext_len;
                    self.extents.remove(&ext_start);
                    boundary = prev_key;
                } else {
                    prev_key = Some(ext_start);
                    boundary = Some(ext_start);
                }
                continue;
            }

            // ext.unwritten, and overlaps the request.
            if cur_off < ext_start {
                if cur_end >= ext_end {
                    self.extents.get_mut(&ext_start).unwrap().unwritten = false;
                    if self.mergeable(prev_key, ext_start) {
                        let pk = prev_key.unwrap();
                        let ext_len = self.extents[&ext_start].len;
                        self.extents.get_mut(&pk).unwrap().len += ext_len;
                        self.extents.remove(&ext_start);
                        boundary = prev_key;
                    } else {
                        prev_key = Some(ext_start);
                        boundary = Some(ext_start);
                    }
                    cur_off = ext_end;
                } else {
                    // write   |----|
                    // extent      |----|
                    let overlap = cur_end - ext_start;
                    let sep = PExtent::reserved(ext.p_offset + overlap, ext.len - overlap);

                    let e = self.extents.get_mut(&ext_start).unwrap();
                    e.len = overlap;
                    e.unwritten = false;

                    self.extents.insert(ext_start + overlap, sep);
                    return;
                }
            } else if cur_off == ext_start {
                if ext_end <= cur_end {
                    self.extents.get_mut(&ext_start).unwrap().unwritten = false;
                    if self.mergeable(prev_key, ext_start) {
                        let pk = prev_key.unwrap();
                        let ext_len = self.extents[&ext_start].len;
                        self.extents.get_mut(&pk).unwrap().len += ext_len;
                        self.extents.remove(&ext_start);
                        boundary = prev_key;
                    } else {
                        prev_key = Some(ext_start);
                        boundary = Some(ext_start);
                    }
                    cur_off = ext_end;
                } else {
                    // write   |----|
                    // extent  |--------|
                    let overlap = cur_end - cur_off;
                    let sep = PExtent::reserved(ext.p_offset + overlap, ext.len - overlap);

                    let e = self.extents.get_mut(&ext_start).unwrap();
                    e.len = overlap;
                    e.unwritten = false;

                    if self.mergeable(prev_key, ext_start) {
                        let pk = prev_key.unwrap();
                        let ext_len = self.extents[&ext_start].len;
                        self.extents.get_mut(&pk).unwrap().len += ext_len;
                        self.extents.remove(&ext_start);
                    }

                    self.extents.insert(cur_end, sep);
                    return;
                }
            } else {
                // curOff > extStart
                if cur_end == ext_end {
                    // write       |----|
                    // extents   |------|
                    let overlap = cur_end - cur_off;
                    let sep = PExtent::written(ext.p_offset + (cur_off - ext_start), overlap);

                    self.extents.get_mut(&ext_start).unwrap().len -= overlap;
                    self.extents.insert(cur_off, sep);

                    // Early exit mandated by spec §9: the request is fully
                    // consumed at this point.
                    return;
                } else if cur_end < ext_end {
                    // write        |----|
                    // extents    |--------|
                    let overlap = cur_end - cur_off;
                    let middle = PExtent::written(ext.p_offset + (cur_off - ext_start), overlap);
                    let right = PExtent::reserved(middle.p_offset + overlap, ext_end - cur_end);

                    self.extents.get_mut(&ext_start).unwrap().len = cur_off - ext_start;
                    self.extents.insert(cur_off, middle);
                    self.extents.insert(cur_end, right);

                    return;
                } else {
                    // write        |----|
                    // extents    |----|
                    let overlap = ext_end - cur_off;
                    let sep = PExtent::written(ext.p_offset + (cur_off - ext_start), overlap);

                    self.extents.get_mut(&ext_start).unwrap().len -= overlap;
                    self.extents.insert(cur_off, sep);

                    cur_off = ext_end;
                    prev_key = Some(ext_start);
                    boundary = Some(ext_start);
                }
            }
        }

        trace!(offset, len, "mark_written");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::new(4096, 1 << 20, 64 * 1024).unwrap()
    }

    // Scenario 1: first write to empty slice.
    #[test]
    fn scenario_first_write_to_empty_slice() {
        let slice = Slice::new(0);
        let cfg = cfg();
        let data = vec![0u8; 200];
        let (allocated, need_alloc) = slice.divide_for_write(&cfg, 100, 200, &data);

        assert!(allocated.is_empty());
        assert_eq!(need_alloc.len(), 1);
        let part = &need_alloc[0];
        assert_eq!(part.alloc_info.l_offset, 0);
        assert_eq!(part.alloc_info.len, 65536);
        assert_eq!(part.write_length, 200);
        assert_eq!(part.padding, 100);
        assert!(part.alloc_info.left_hint.is_none());
        assert!(part.alloc_info.right_hint.is_none());
    }

    // Scenario 2: write entirely inside a written extent.
    #[test]
    fn scenario_write_inside_written_extent() {
        let mut slice = Slice::new(0);
        let cfg = cfg();
        slice.merge(0, PExtent::written(10000, 8192));

        let data = vec![0u8; 100];
        let (allocated, need_alloc) = slice.divide_for_write(&cfg, 4000, 100, &data);

        assert!(need_alloc.is_empty());
        assert_eq!(allocated.len(), 1);
        assert_eq!(allocated[0].p_offset, 14000);
        assert_eq!(allocated[0].length, 100);
    }

    // Scenario 3: write straddling the right edge of a written extent.
    #[test]
    fn scenario_write_straddling_written_extent() {
        let mut slice = Slice::new(0);
        let cfg = cfg();
        slice.merge(0, PExtent::written(10000, 8192));

        let data = vec![0u8; 8192];
        let (allocated, need_alloc) = slice.divide_for_write(&cfg, 4000, 8192, &data);

        assert_eq!(allocated.len(), 1);
        assert_eq!(allocated[0].p_offset, 14000);
        assert_eq!(allocated[0].length, 4192);

        assert_eq!(need_alloc.len(), 1);
        let part = &need_alloc[0];
        assert_eq!(part.alloc_info.l_offset, 8192);
        assert_eq!(part.alloc_info.len, 65536);
        assert_eq!(part.write_length, 4000);
        assert_eq!(part.padding, 0);
        assert_eq!(part.alloc_info.left_hint, Some(18192));
        assert!(part.alloc_info.right_hint.is_none());
    }

    // Scenario 4: read over a hole between two written extents.
    #[test]
    fn scenario_read_over_hole_between_extents() {
        let mut slice = Slice::new(0);
        let cfg = cfg();
        slice.merge(0, PExtent::written(0xA000, 4096));
        slice.merge(8192, PExtent::written(0xB000, 4096));

        let mut buf = vec![0u8; 12288];
        let (reads, holes) = slice.divide_for_read(&cfg, 0, 12288, &mut buf);

        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].p_offset, 0xA000);
        assert_eq!(reads[0].length, 4096);
        assert_eq!(reads[1].p_offset, 0xB000);
        assert_eq!(reads[1].length, 4096);

        assert_eq!(holes.len(), 1);
        assert_eq!(holes[0].fs_offset, 4096);
        assert_eq!(holes[0].length, 4096);
    }

    // Scenario 5: mark-written partial on an unwritten extent.
    #[test]
    fn scenario_mark_written_partial_on_unwritten() {
        const P: u64 = 0x5000_0000;
        let mut slice = Slice::new(0);
        let cfg = cfg();
        slice.merge(0, PExtent::reserved(P, 8192));

        slice.mark_written(&cfg, 2048, 2048);

        let extents: Vec<_> = slice.extents().map(|(k, v)| (k, *v)).collect();
        assert_eq!(extents.len(), 3);
        assert_eq!(extents[0], (0, PExtent::reserved(P, 2048)));
        assert_eq!(extents[1], (2048, PExtent::written(P + 2048, 2048)));
        assert_eq!(extents[2], (4096, PExtent::reserved(P + 4096, 4096)));
    }

    // Scenario 6: coalesce on mark-written.
    #[test]
    fn scenario_coalesce_on_mark_written() {
        const P: u64 = 0x5000_0000;
        let mut slice = Slice::new(0);
        let cfg = cfg();
        slice.merge(0, PExtent::written(P, 4096));
        slice.merge(4096, PExtent::reserved(P + 4096, 4096));

        slice.mark_written(&cfg, 4096, 4096);

        let extents: Vec<_> = slice.extents().map(|(k, v)| (k, *v)).collect();
        assert_eq!(extents, vec![(0, PExtent::written(P, 8192))]);
    }

    #[test]
    fn zero_length_write_and_read_are_no_ops() {
        let slice = Slice::new(0);
        let cfg = cfg();
        let data = [];
        let (allocated, need_alloc) = slice.divide_for_write(&cfg, 100, 0, &data);
        assert!(allocated.is_empty() && need_alloc.is_empty());

        let mut buf = [];
        let (reads, holes) = slice.divide_for_read(&cfg, 100, 0, &mut buf);
        assert!(reads.is_empty() && holes.is_empty());
    }

    #[test]
    fn merge_coalesces_both_sides() {
        let mut slice = Slice::new(0);
        slice.merge(0, PExtent::written(1000, 4096));
        slice.merge(8192, PExtent::written(1000 + 4096 + 4096, 4096));

        // The middle piece abuts both neighbours logically and physically.
        slice.merge(4096, PExtent::written(1000 + 4096, 4096));

        let extents: Vec<_> = slice.extents().map(|(k, v)| (k, *v)).collect();
        assert_eq!(extents, vec![(0, PExtent::written(1000, 4096 * 3))]);
    }

    #[test]
    fn merge_never_coalesces_unwritten_extents() {
        let mut slice = Slice::new(0);
        slice.merge(0, PExtent::reserved(1000, 4096));
        slice.merge(4096, PExtent::reserved(1000 + 4096, 4096));

        let extents: Vec<_> = slice.extents().map(|(k, v)| (k, *v)).collect();
        assert_eq!(extents.len(), 2);
    }

    #[test]
    fn merge_does_not_absorb_unwritten_extent_into_written_neighbour() {
        const P: u64 = 0x5000_0000;
        let mut slice = Slice::new(0);
        slice.merge(0, PExtent::written(P, 2048));
        slice.merge(2048, PExtent::reserved(P + 2048, 2048));

        let extents: Vec<_> = slice.extents().map(|(k, v)| (k, *v)).collect();
        assert_eq!(
            extents,
            vec![
                (0, PExtent::written(P, 2048)),
                (2048, PExtent::reserved(P + 2048, 2048)),
            ]
        );
    }

    #[test]
    fn merge_does_not_absorb_written_extent_into_unwritten_neighbour() {
        const P: u64 = 0x5000_0000;
        let mut slice = Slice::new(0);
        slice.merge(0, PExtent::reserved(P, 2048));
        slice.merge(2048, PExtent::written(P + 2048, 2048));

        let extents: Vec<_> = slice.extents().map(|(k, v)| (k, *v)).collect();
        assert_eq!(
            extents,
            vec![
                (0, PExtent::reserved(P, 2048)),
                (2048, PExtent::written(P + 2048, 2048)),
            ]
        );
    }

    #[test]
    fn divide_for_write_covers_request_exactly() {
        let mut slice = Slice::new(0);
        let cfg = cfg();
        slice.merge(0, PExtent::written(0x1000, 4096));

        let data = vec![1u8; 20000];
        let (allocated, need_alloc) = slice.divide_for_write(&cfg, 0, 20000, &data);

        let mut covered = 0u64;
        for w in &allocated {
            covered += w.length;
        }
        for a in &need_alloc {
            covered += a.covered_len();
        }
        assert_eq!(covered, 20000);
    }

    #[test]
    fn divide_for_read_covers_request_exactly() {
        let mut slice = Slice::new(0);
        let cfg = cfg();
        slice.merge(1000, PExtent::written(0x2000, 500));

        let mut buf = vec![0u8; 5000];
        let (reads, holes) = slice.divide_for_read(&cfg, 0, 5000, &mut buf);

        let covered: u64 =
            reads.iter().map(|r| r.length).sum::<u64>() + holes.iter().map(|h| h.length).sum::<u64>();
        assert_eq!(covered, 5000);
    }
}
