// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! A small inspection CLI that replays a scenario of write/read/
//! mark-written commands against an in-memory [`extentmap::SliceTable`] and
//! prints the work lists each step produces.
//!
//! This binary is demo tooling, not part of the crate's semantics: the
//! "physical I/O" it performs is an in-memory bump allocator standing in
//! for a real block device, wired up the same way `nudl`'s CLI front end
//! wires a `reqwest` client in `main.rs` — argument parsing and logging
//! setup live here, never in the library.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tracing::info;

use extentmap::{Config, PExtent, SliceTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Replay an extent-map scenario and print the work lists it produces.
#[derive(Debug, Parser)]
#[command(name = "extentsim", version, about)]
struct Cli {
    /// Path to a scenario file describing the config and commands to run.
    scenario: PathBuf,

    /// Log verbosity.
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Emit each step's result as a JSON line instead of human-readable text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct Scenario {
    config: Config,
    commands: Vec<Command>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase", tag = "type")]
enum Command {
    Write { offset: u64, len: u64 },
    Read { offset: u64, len: u64 },
    MarkWritten { offset: u64, len: u64 },
}

/// Stands in for a real block allocator: hands out ever-increasing physical
/// offsets and never reclaims them.
struct FakeAllocator {
    next_p_offset: u64,
}

impl FakeAllocator {
    fn new() -> Self {
        Self {
            next_p_offset: 1 << 30,
        }
    }

    fn allocate(&mut self, len: u64) -> u64 {
        let p_offset = self.next_p_offset;
        self.next_p_offset += len;
        p_offset
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level.as_level())
        .with_target(false)
        .init();

    let raw = std::fs::read_to_string(&cli.scenario)
        .with_context(|| format!("reading scenario file {}", cli.scenario.display()))?;
    let scenario: Scenario = serde_json::from_str(&raw)
        .with_context(|| format!("parsing scenario file {}", cli.scenario.display()))?;

    let mut table = SliceTable::new(scenario.config);
    let mut allocator = FakeAllocator::new();
    // In-memory stand-in for the file's contents, keyed by physical offset,
    // so reads can be validated against what was last written.
    let mut backing: HashMap<u64, u8> = HashMap::new();

    for (i, command) in scenario.commands.into_iter().enumerate() {
        run_command(
            &mut table,
            &mut allocator,
            &mut backing,
            i,
            command,
            cli.json,
        )?;
    }

    table.prune_empty();
    info!(slices = table.slices().count(), "scenario complete");

    Ok(())
}

fn run_command(
    table: &mut SliceTable,
    allocator: &mut FakeAllocator,
    backing: &mut HashMap<u64, u8>,
    index: usize,
    command: Command,
    json: bool,
) -> Result<()> {
    match command {
        Command::Write { offset, len } => {
            let data = vec![0xABu8; len as usize];
            let (writes, needs_alloc) = table.divide_for_write(offset, len, &data);

            for w in &writes {
                for (byte_off, &b) in w.data.iter().enumerate() {
                    backing.insert(w.p_offset + byte_off as u64, b);
                }
            }

            let mut fulfilled = Vec::new();
            for part in &needs_alloc {
                let p_offset = allocator.allocate(part.alloc_info.len);
                fulfilled.push((part.alloc_info.l_offset, part.alloc_info.len, p_offset));
            }
            for (l_offset, alloc_len, p_offset) in &fulfilled {
                table.merge(*l_offset, PExtent::reserved(*p_offset, *alloc_len));
            }
            for part in &needs_alloc {
                // The portion actually covered by this write becomes
                // written immediately; the rest of the (possibly
                // speculative) allocation stays unwritten until used.
                table.mark_written(
                    part.alloc_info.l_offset + part.padding,
                    part.write_length,
                );
            }

            if json {
                println!(
                    r#"{{"step":{index},"op":"write","writes":{w},"allocs":{a}}}"#,
                    w = writes.len(),
                    a = needs_alloc.len(),
                );
            } else {
                println!(
                    "[{index}] write {offset}..{end}: {w} immediate write(s), {a} allocation(s)",
                    end = offset + len,
                    w = writes.len(),
                    a = needs_alloc.len(),
                );
            }
        }
        Command::Read { offset, len } => {
            let mut buf = vec![0u8; len as usize];
            let (reads, holes) = table.divide_for_read(offset, len, &mut buf);

            if json {
                println!(
                    r#"{{"step":{index},"op":"read","reads":{r},"holes":{h}}}"#,
                    r = reads.len(),
                    h = holes.len(),
                );
            } else {
                println!(
                    "[{index}] read {offset}..{end}: {r} backed read(s), {h} hole(s)",
                    end = offset + len,
                    r = reads.len(),
                    h = holes.len(),
                );
            }
        }
        Command::MarkWritten { offset, len } => {
            table.mark_written(offset, len);
            if json {
                println!(r#"{{"step":{index},"op":"markWritten"}}"#);
            } else {
                println!("[{index}] markWritten {offset}..{end}", end = offset + len);
            }
        }
    }

    Ok(())
}
