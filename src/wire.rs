// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! On-disk/wire representation of a [`Slice`] (spec §4.5, §6).
//!
//! A slice serializes as its region offset plus a flat, ascending list of
//! extent records — no coalescing happens at this layer, and none is
//! expected: the in-memory map is already maximally coalesced by
//! [`Slice::merge`] and [`Slice::mark_written`], so encode/decode is a
//! straight structural transcription.

use serde::{Deserialize, Serialize};

use crate::extent::PExtent;
use crate::slice::Slice;

/// One extent record in wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ExtentRecord {
    pub fs_offset: u64,
    pub volume_offset: u64,
    pub length: u64,
    pub is_used: bool,
}

/// A whole slice's extents, ready to serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SliceRecord {
    pub offset: u64,
    pub extents: Vec<ExtentRecord>,
}

impl From<&Slice> for SliceRecord {
    fn from(slice: &Slice) -> Self {
        let extents = slice
            .extents()
            .map(|(fs_offset, ext)| ExtentRecord {
                fs_offset,
                volume_offset: ext.p_offset,
                length: ext.len,
                is_used: !ext.unwritten,
            })
            .collect();
        SliceRecord {
            offset: slice.offset(),
            extents,
        }
    }
}

impl From<&SliceRecord> for Slice {
    fn from(record: &SliceRecord) -> Self {
        let extents = record
            .extents
            .iter()
            .map(|rec| {
                (
                    rec.fs_offset,
                    PExtent::new(rec.volume_offset, rec.length, !rec.is_used),
                )
            })
            .collect();
        Slice::from_extents(record.offset, extents)
    }
}

/// Serialize a slice to its JSON wire form.
pub fn to_json(slice: &Slice) -> serde_json::Result<String> {
    serde_json::to_string(&SliceRecord::from(slice))
}

/// Parse a slice back from its JSON wire form.
pub fn from_json(json: &str) -> serde_json::Result<Slice> {
    let record: SliceRecord = serde_json::from_str(json)?;
    Ok(Slice::from(&record))
}
