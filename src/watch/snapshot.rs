//! Line-oriented text snapshot of a [`CandidateStore`].
//!
//! ```text
//! branchwatch 1
//! phase reduction
//! <origin> <destination> <instruction> <total> <recent> <checked> <condition> <inspected> <state>
//! ```
//!
//! Addresses and the instruction are hexadecimal, counters decimal, `condition` and
//! `inspected` are `0`/`1`, and `state` is one of `c` (collected), `b` (blacklisted) or
//! `s` (selected). Selected lines appear in selection order. Symbol names are not stored;
//! they are resolved again after loading.

use std::{
    collections::HashMap,
    io::{BufRead, Write},
};

use crate::{
    watch::{
        store::{CandidateStore, Entry},
        CandidateKey, CandidateRecord, Phase,
    },
    Result,
};

const MAGIC: &str = "branchwatch";
const VERSION: u32 = 1;

pub(crate) fn write(store: &CandidateStore, writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "{MAGIC} {VERSION}")?;
    writeln!(
        writer,
        "phase {}",
        match store.phase {
            Phase::Blacklist => "blacklist",
            Phase::Reduction => "reduction",
        }
    )?;

    let selected: &[usize] = match store.phase {
        Phase::Blacklist => &[],
        Phase::Reduction => &store.rows,
    };
    let mut is_selected = vec![false; store.entries.len()];
    for &index in selected {
        is_selected[index] = true;
    }

    let mut write_entry = |entry: &Entry, state: char| -> Result<()> {
        let record = &entry.record;
        writeln!(
            writer,
            "{:08x} {:08x} {:08x} {} {} {} {} {} {}",
            record.key.origin_address,
            record.key.destination_address,
            record.key.raw_instruction,
            record.hits_total,
            record.hits_recent,
            entry.hits_snapshot,
            u8::from(record.condition_taken),
            u8::from(record.inspected),
            state
        )?;
        Ok(())
    };

    for &index in selected {
        write_entry(&store.entries[index], 's')?;
    }
    for (entry, &selected) in store.entries.iter().zip(&is_selected) {
        if selected {
            continue;
        }
        write_entry(entry, if entry.blacklisted { 'b' } else { 'c' })?;
    }

    writer.flush()?;
    Ok(())
}

fn parse_hex(field: Option<&str>, line: usize, name: &str) -> Result<u32> {
    let text = field.ok_or_else(|| malformed_error!("line {}: missing {}", line, name))?;
    u32::from_str_radix(text, 16)
        .map_err(|_| malformed_error!("line {}: invalid {} - {:?}", line, name, text))
}

fn parse_dec<T: std::str::FromStr>(field: Option<&str>, line: usize, name: &str) -> Result<T> {
    let text = field.ok_or_else(|| malformed_error!("line {}: missing {}", line, name))?;
    text.parse()
        .map_err(|_| malformed_error!("line {}: invalid {} - {:?}", line, name, text))
}

fn parse_flag(field: Option<&str>, line: usize, name: &str) -> Result<bool> {
    match field {
        Some("0") => Ok(false),
        Some("1") => Ok(true),
        other => Err(malformed_error!(
            "line {}: invalid {} - {:?}",
            line,
            name,
            other
        )),
    }
}

pub(crate) fn read(reader: &mut dyn BufRead) -> Result<CandidateStore> {
    let mut lines = reader.lines();

    let header = lines
        .next()
        .transpose()?
        .ok_or_else(|| malformed_error!("empty snapshot"))?;
    if header.trim() != format!("{MAGIC} {VERSION}") {
        return Err(malformed_error!("unsupported snapshot header - {:?}", header));
    }

    let phase_line = lines
        .next()
        .transpose()?
        .ok_or_else(|| malformed_error!("missing phase"))?;
    let phase = match phase_line.trim() {
        "phase blacklist" => Phase::Blacklist,
        "phase reduction" => Phase::Reduction,
        other => return Err(malformed_error!("invalid phase - {:?}", other)),
    };

    let mut store = CandidateStore::new();
    store.phase = phase;
    let mut lookup = HashMap::new();
    let mut selection = Vec::new();

    for (offset, line) in lines.enumerate() {
        let line = line?;
        let number = offset + 3;
        if line.trim().is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let key = CandidateKey::new(
            parse_hex(fields.next(), number, "origin")?,
            parse_hex(fields.next(), number, "destination")?,
            parse_hex(fields.next(), number, "instruction")?,
        );
        let hits_total: u64 = parse_dec(fields.next(), number, "total hits")?;
        let hits_recent: u32 = parse_dec(fields.next(), number, "recent hits")?;
        let hits_snapshot: u64 = parse_dec(fields.next(), number, "checked hits")?;
        let condition_taken = parse_flag(fields.next(), number, "condition")?;
        let inspected = parse_flag(fields.next(), number, "inspected")?;
        let state = fields.next();
        if fields.next().is_some() {
            return Err(malformed_error!("line {}: trailing data", number));
        }

        let blacklisted = match (state, phase) {
            (Some("c"), _) => false,
            (Some("b"), _) => true,
            (Some("s"), Phase::Reduction) => false,
            (other, _) => {
                return Err(malformed_error!("line {}: invalid state - {:?}", number, other))
            }
        };

        let index = store.entries.len();
        if lookup.insert(key, index).is_some() {
            return Err(malformed_error!("line {}: duplicate candidate {}", number, key));
        }
        if state == Some("s") {
            selection.push(index);
        }

        let mut record = CandidateRecord::new(key, condition_taken);
        record.hits_total = hits_total;
        record.hits_recent = hits_recent;
        record.inspected = inspected;
        store.entries.push(Entry {
            record,
            hits_snapshot,
            blacklisted,
        });
    }

    store.lookup = lookup;
    store.blacklist_size = store.entries.iter().filter(|e| e.blacklisted).count();
    store.rows = match phase {
        Phase::Blacklist => (0..store.entries.len())
            .filter(|&index| !store.entries[index].blacklisted)
            .collect(),
        Phase::Reduction => selection,
    };

    Ok(store)
}
