//! Persistence of `PairwiseMatches`.
//!
//! The format follows the file extension: `.txt` for the block text layout,
//! `.json` for a list of `{ "pair": [I, J], "matches": [[i, j], ...] }`.

use crate::matches::{IndMatch, IndMatches, PairwiseMatches};
use crate::pairs::Pair;
use crate::util::{PairMatchError, PairMatchResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MatchesFormat {
    Text,
    Json,
}

fn format_of(path: &Path) -> PairMatchResult<MatchesFormat> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("txt") => Ok(MatchesFormat::Text),
        Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(MatchesFormat::Json),
        _ => Err(PairMatchError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

#[derive(Serialize, Deserialize)]
struct MatchRecord {
    pair: [u32; 2],
    matches: Vec<[u32; 2]>,
}

/// Writes a collection; the extension selects the format.
pub fn save_matches<P: AsRef<Path>>(path: P, matches: &PairwiseMatches) -> PairMatchResult<()> {
    let path = path.as_ref();
    let format = format_of(path)?;
    let file = fs::File::create(path).map_err(|err| PairMatchError::io(path, err))?;
    let mut out = BufWriter::new(file);
    match format {
        MatchesFormat::Text => {
            for (pair, list) in matches {
                writeln!(out, "{} {}\n{}", pair.first(), pair.second(), list.len())
                    .map_err(|err| PairMatchError::io(path, err))?;
                for m in list {
                    writeln!(out, "{} {}", m.i, m.j).map_err(|err| PairMatchError::io(path, err))?;
                }
            }
        }
        MatchesFormat::Json => {
            let records: Vec<MatchRecord> = matches
                .iter()
                .map(|(pair, list)| MatchRecord {
                    pair: [pair.first(), pair.second()],
                    matches: list.iter().map(|m| [m.i, m.j]).collect(),
                })
                .collect();
            serde_json::to_writer(&mut out, &records)
                .map_err(|err| PairMatchError::json(path, err))?;
        }
    }
    out.flush().map_err(|err| PairMatchError::io(path, err))
}

/// Reads a collection written by [`save_matches`].
pub fn load_matches<P: AsRef<Path>>(path: P) -> PairMatchResult<PairwiseMatches> {
    let path = path.as_ref();
    let format = format_of(path)?;
    let text = fs::read_to_string(path).map_err(|err| PairMatchError::io(path, err))?;
    match format {
        MatchesFormat::Text => parse_text(path, &text),
        MatchesFormat::Json => {
            let records: Vec<MatchRecord> =
                serde_json::from_str(&text).map_err(|err| PairMatchError::json(path, err))?;
            let mut matches = PairwiseMatches::new();
            for (idx, record) in records.into_iter().enumerate() {
                let list = record
                    .matches
                    .iter()
                    .map(|&[i, j]| IndMatch::new(i, j))
                    .collect();
                insert_record(path, idx + 1, &mut matches, record.pair, list)?;
            }
            Ok(matches)
        }
    }
}

fn insert_record(
    path: &Path,
    line: usize,
    matches: &mut PairwiseMatches,
    [a, b]: [u32; 2],
    mut list: IndMatches,
) -> PairMatchResult<()> {
    let pair = Pair::new(a, b)
        .ok_or_else(|| PairMatchError::parse(path, line, format!("self pair ({a}, {a})")))?;
    if a > b {
        for m in &mut list {
            std::mem::swap(&mut m.i, &mut m.j);
        }
    }
    if matches.insert(pair, list).is_some() {
        return Err(PairMatchError::parse(path, line, format!("duplicate pair {pair}")));
    }
    Ok(())
}

fn parse_numbers<const N: usize>(
    path: &Path,
    line_no: usize,
    line: &str,
) -> PairMatchResult<[u64; N]> {
    let mut out = [0u64; N];
    let mut tokens = line.split_whitespace();
    for slot in out.iter_mut() {
        let token = tokens
            .next()
            .ok_or_else(|| PairMatchError::parse(path, line_no, "too few values"))?;
        *slot = token.parse().map_err(|err: std::num::ParseIntError| {
            PairMatchError::parse(path, line_no, err.to_string())
        })?;
    }
    if tokens.next().is_some() {
        return Err(PairMatchError::parse(path, line_no, "too many values"));
    }
    Ok(out)
}

fn to_u32(path: &Path, line_no: usize, value: u64) -> PairMatchResult<u32> {
    u32::try_from(value).map_err(|_| PairMatchError::parse(path, line_no, "index exceeds u32"))
}

fn parse_text(path: &Path, text: &str) -> PairMatchResult<PairwiseMatches> {
    let mut matches = PairwiseMatches::new();
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line))
        .filter(|(_, line)| !line.trim().is_empty());
    while let Some((header_no, header)) = lines.next() {
        let [a, b] = parse_numbers::<2>(path, header_no, header)?;
        let (count_no, count_line) = lines
            .next()
            .ok_or_else(|| PairMatchError::parse(path, header_no, "missing match count"))?;
        let [count] = parse_numbers::<1>(path, count_no, count_line)?;
        let mut list = IndMatches::with_capacity(count as usize);
        for _ in 0..count {
            let (line_no, line) = lines
                .next()
                .ok_or_else(|| PairMatchError::parse(path, count_no, "truncated match block"))?;
            let [i, j] = parse_numbers::<2>(path, line_no, line)?;
            list.push(IndMatch::new(to_u32(path, line_no, i)?, to_u32(path, line_no, j)?));
        }
        let pair = [to_u32(path, header_no, a)?, to_u32(path, header_no, b)?];
        insert_record(path, header_no, &mut matches, pair, list)?;
    }
    Ok(matches)
}
