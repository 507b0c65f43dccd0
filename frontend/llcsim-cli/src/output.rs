//! The simulation log writer. Owns the output file and the console mode:
//! every record lands in the file unconditionally, and is echoed to stdout
//! in `normal` mode. Bus and L2→L1 events format themselves in emission
//! order through the [`BusInterface`] implementation.

use crate::trace::TraceLineError;
use llc_core::traits::{BusInterface, BusOp, L1Message, SnoopResult};
use llc_core::{AccessKind, Cache, CacheAddress, CacheOp, CacheStats, OpResult};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub struct SimulationWriter {
    file: BufWriter<File>,
    echo: bool,
    error: Option<io::Error>,
}

impl SimulationWriter {
    pub fn create(path: &Path, echo: bool) -> io::Result<Self> {
        Ok(Self {
            file: BufWriter::new(File::create(path)?),
            echo,
            error: None,
        })
    }

    /// A record that respects the console mode.
    fn record(&mut self, args: fmt::Arguments<'_>) {
        let echo = self.echo;
        self.emit(echo, args);
    }

    /// A record that always reaches the console (cache dumps, summary).
    fn announce(&mut self, args: fmt::Arguments<'_>) {
        self.emit(true, args);
    }

    fn emit(&mut self, echo: bool, args: fmt::Arguments<'_>) {
        if echo {
            println!("{args}");
        }
        if self.error.is_none() {
            if let Err(err) = writeln!(self.file, "{args}") {
                self.error = Some(err);
            }
        }
    }

    pub fn log_operation(&mut self, op: CacheOp) {
        match op.address() {
            Some(address) => {
                let parsed = CacheAddress::decompose(address);
                self.record(format_args!(
                    "Operation: {} (code {}), Address: 0x{address:08X}",
                    op.name(),
                    op.code()
                ));
                self.record(format_args!(
                    "  Decomposed Address: Byte Offset=0x{:X}, Index=0x{:X}, Tag=0x{:X}",
                    parsed.byte_offset, parsed.index, parsed.tag
                ));
            }
            None => {
                self.record(format_args!("Operation: {} (code {})", op.name(), op.code()));
            }
        }
    }

    pub fn log_result(&mut self, cache: &Cache, result: OpResult) {
        match result {
            OpResult::Access { kind, way, prior, state, evicted, plru } => {
                match kind {
                    AccessKind::Hit => {
                        let prior = prior.unwrap_or(state);
                        self.record(format_args!("  Cache Hit: Way={way}, State={prior} -> {state}"));
                    }
                    AccessKind::MissEmptySlot => {
                        self.record(format_args!(
                            "  Cache Miss (empty slot): installed Way={way}, State={state}"
                        ));
                    }
                    AccessKind::MissEviction => {
                        self.record(format_args!(
                            "  Cache Miss (eviction): installed Way={way}, State={state}"
                        ));
                    }
                }
                if let Some(victim) = evicted {
                    self.record(format_args!(
                        "  Evicted: Address=0x{:08X}, State={}",
                        victim.address, victim.state
                    ));
                }
                self.record(format_args!("  PLRU after update: 0x{plru:04X}"));
            }
            OpResult::SnoopApplied { prior, state } => {
                self.record(format_args!("  Snoop: {prior} -> {state}"));
            }
            OpResult::SnoopMiss => {
                self.record(format_args!("  Snoop: line not present, no action"));
            }
            OpResult::ProtocolError { state } => {
                self.record(format_args!(
                    "  Error: snooped invalidate for a line held {state}; no action taken"
                ));
            }
            OpResult::Cleared { writebacks } => {
                self.record(format_args!(
                    "  Cache cleared; {writebacks} dirty lines written back"
                ));
            }
            OpResult::Printed => self.print_cache_state(cache),
        }
        self.record(format_args!(""));
    }

    fn print_cache_state(&mut self, cache: &Cache) {
        self.announce(format_args!("Cache Contents and States:"));
        let mut current_index = None;
        for (index, way, line) in cache.valid_lines() {
            if current_index != Some(index) {
                self.announce(format_args!("Index 0x{index:X}:"));
                current_index = Some(index);
            }
            self.announce(format_args!(
                "  Way {way}: Tag=0x{:03X}, State={}, Dirty={}",
                line.tag,
                line.state,
                u8::from(line.dirty)
            ));
        }
    }

    pub fn log_parse_error(&mut self, line_number: usize, line: &str, error: &TraceLineError) {
        log::error!("trace line {line_number}: {error} (`{line}`)");
        self.emit(false, format_args!("Error: trace line {line_number}: {error}"));
    }

    pub fn log_summary(&mut self, stats: CacheStats) {
        self.announce(format_args!("{stats}"));
    }

    pub fn finish(mut self) -> io::Result<()> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.file.flush()
    }
}

impl BusInterface for SimulationWriter {
    fn bus_op(&mut self, op: BusOp, address: u32) -> SnoopResult {
        // The byte offset selects the snoop response; the record carries
        // the cache-aligned address.
        let result = SnoopResult::for_address(address);
        let aligned = CacheAddress::align(address);
        self.record(format_args!(
            "  BusOp: {op}, Address: 0x{aligned:08X}, Snoop Result: {result}"
        ));
        result
    }

    fn put_snoop_result(&mut self, address: u32, result: SnoopResult) {
        self.record(format_args!(
            "  SnoopResult: Address: 0x{address:08X}, SnoopResult: {result}"
        ));
    }

    fn message_to_cache(&mut self, message: L1Message, address: u32) {
        self.record(format_args!(
            "  L2 to L1 Message: {message}, Address: 0x{address:08X}"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_land_in_the_file_in_emission_order() {
        let path = std::env::temp_dir()
            .join(format!("llcsim-writer-test-{}.txt", std::process::id()));

        {
            let mut writer = SimulationWriter::create(&path, false).unwrap();
            let mut cache = Cache::new();

            let op = CacheOp::DataRead(0x40);
            writer.log_operation(op);
            let result = cache.apply(op, &mut writer);
            writer.log_result(&cache, result);
            writer.log_summary(cache.stats());
            writer.finish().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let bus_line = content.find("BusOp: READ, Address: 0x00000040").unwrap();
        let msg_line = content.find("L2 to L1 Message: SENDLINE").unwrap();
        assert!(bus_line < msg_line, "bus read must precede the L1 message");
        assert!(content.contains("Operation: Read request from L1 data cache (code 0)"));
        assert!(content.contains("Cache Miss (empty slot)"));
        assert!(content.contains("Cache Statistics:"));

        std::fs::remove_file(&path).ok();
    }
}
