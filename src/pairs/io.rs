//! Text pair lists.
//!
//! A line `I J K ...` pairs view `I` with every following id. Pairs are written
//! one per line as `I J`.

use crate::pairs::{Pair, PairSet};
use crate::util::{PairMatchError, PairMatchResult};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes a pair list.
pub fn save_pairs<P: AsRef<Path>>(path: P, pairs: &PairSet) -> PairMatchResult<()> {
    let path = path.as_ref();
    let file = fs::File::create(path).map_err(|err| PairMatchError::io(path, err))?;
    let mut out = BufWriter::new(file);
    for pair in pairs {
        writeln!(out, "{} {}", pair.first(), pair.second())
            .map_err(|err| PairMatchError::io(path, err))?;
    }
    out.flush().map_err(|err| PairMatchError::io(path, err))
}

/// Reads a pair list for a scene of `view_count` views.
///
/// Ids must be below `view_count`; self pairs are rejected and duplicates
/// collapse.
pub fn load_pairs<P: AsRef<Path>>(path: P, view_count: usize) -> PairMatchResult<PairSet> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|err| PairMatchError::io(path, err))?;
    let mut pairs = PairSet::new();
    for (line_idx, line) in text.lines().enumerate() {
        let line_no = line_idx + 1;
        let ids = line
            .split_whitespace()
            .map(str::parse::<u32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| PairMatchError::parse(path, line_no, err.to_string()))?;
        let Some((&first, rest)) = ids.split_first() else {
            continue;
        };
        if rest.is_empty() {
            return Err(PairMatchError::parse(path, line_no, "line holds a single id"));
        }
        for &id in ids.iter() {
            if id as usize >= view_count {
                return Err(PairMatchError::parse(
                    path,
                    line_no,
                    format!("view id {id} out of range for {view_count} views"),
                ));
            }
        }
        for &other in rest {
            let pair = Pair::new(first, other).ok_or_else(|| {
                PairMatchError::parse(path, line_no, format!("self pair ({first}, {first})"))
            })?;
            pairs.insert(pair);
        }
    }
    Ok(pairs)
}
