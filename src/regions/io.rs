//! On-disk layout of regions.
//!
//! Each view owns two companion files in the matches directory, named after
//! the image stem: `<stem>.feat` (text, `x y scale orientation` per line) and
//! `<stem>.desc` (little-endian `u64` count followed by packed descriptors).
//! The descriptor encoding is declared once per directory in
//! `image_describer.json`.

use crate::regions::{Descriptors, Feature, Regions, RegionsType};
use crate::scene::View;
use crate::util::{PairMatchError, PairMatchResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of the descriptor sidecar.
pub const IMAGE_DESCRIBER_FILE: &str = "image_describer.json";

/// Content of the `image_describer.json` sidecar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriber {
    /// Name of the extractor, informational only.
    #[serde(default)]
    pub describer: String,
    /// Descriptor encoding of every `.desc` file in the directory.
    pub regions_type: RegionsType,
}

impl ImageDescriber {
    /// Reads and validates the sidecar.
    pub fn load<P: AsRef<Path>>(path: P) -> PairMatchResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| PairMatchError::io(path, err))?;
        let describer: ImageDescriber =
            serde_json::from_str(&text).map_err(|err| PairMatchError::json(path, err))?;
        describer.regions_type.validate()?;
        Ok(describer)
    }

    /// Writes the sidecar.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> PairMatchResult<()> {
        let path = path.as_ref();
        let json =
            serde_json::to_string_pretty(self).map_err(|err| PairMatchError::json(path, err))?;
        fs::write(path, json).map_err(|err| PairMatchError::io(path, err))
    }
}

/// Paths of the feature and descriptor files of a view.
pub fn region_paths(dir: &Path, view: &View) -> PairMatchResult<(PathBuf, PathBuf)> {
    let stem = view
        .stem()
        .ok_or(PairMatchError::InvalidInput("view path has no file stem"))?;
    Ok((
        dir.join(format!("{stem}.feat")),
        dir.join(format!("{stem}.desc")),
    ))
}

/// Parses a `.feat` file.
pub fn read_features(path: &Path) -> PairMatchResult<Vec<Feature>> {
    let text = fs::read_to_string(path).map_err(|err| PairMatchError::io(path, err))?;
    let mut features = Vec::new();
    for (line_idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let values = line
            .split_whitespace()
            .map(str::parse::<f32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| PairMatchError::parse(path, line_idx + 1, err.to_string()))?;
        if values.len() != 4 {
            return Err(PairMatchError::parse(
                path,
                line_idx + 1,
                format!("expected 4 values, found {}", values.len()),
            ));
        }
        features.push(Feature::new(values[0], values[1], values[2], values[3]));
    }
    Ok(features)
}

/// Writes a `.feat` file.
pub fn write_features(path: &Path, features: &[Feature]) -> PairMatchResult<()> {
    let file = fs::File::create(path).map_err(|err| PairMatchError::io(path, err))?;
    let mut out = BufWriter::new(file);
    for f in features {
        writeln!(out, "{} {} {} {}", f.x, f.y, f.scale, f.orientation)
            .map_err(|err| PairMatchError::io(path, err))?;
    }
    out.flush().map_err(|err| PairMatchError::io(path, err))
}

/// Parses a `.desc` file with the given encoding.
pub fn read_descriptors(path: &Path, regions_type: RegionsType) -> PairMatchResult<Descriptors> {
    let bytes = fs::read(path).map_err(|err| PairMatchError::io(path, err))?;
    let (header, body) = bytes
        .split_first_chunk::<8>()
        .ok_or_else(|| PairMatchError::parse(path, 0, "missing descriptor count"))?;
    let count = u64::from_le_bytes(*header) as usize;
    let row = regions_type.descriptor_bytes();
    let expected = count
        .checked_mul(row)
        .ok_or_else(|| PairMatchError::parse(path, 0, "descriptor count overflow"))?;
    if body.len() != expected {
        return Err(PairMatchError::parse(
            path,
            0,
            format!("expected {expected} descriptor bytes, found {}", body.len()),
        ));
    }
    Ok(match regions_type {
        RegionsType::Scalar { dimension } => Descriptors::Scalar {
            dimension,
            data: body
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        },
        RegionsType::Binary { .. } => Descriptors::Binary {
            bytes: row,
            data: body.to_vec(),
        },
    })
}

/// Writes a `.desc` file.
pub fn write_descriptors(path: &Path, descriptors: &Descriptors) -> PairMatchResult<()> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(descriptors.len() as u64).to_le_bytes());
    match descriptors {
        Descriptors::Scalar { data, .. } => {
            for v in data {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        Descriptors::Binary { data, .. } => bytes.extend_from_slice(data),
    }
    fs::write(path, bytes).map_err(|err| PairMatchError::io(path, err))
}

/// Reads both companion files of a view.
pub fn read_regions(
    feat_path: &Path,
    desc_path: &Path,
    regions_type: RegionsType,
) -> PairMatchResult<Regions> {
    let features = read_features(feat_path)?;
    let descriptors = read_descriptors(desc_path, regions_type)?;
    if features.len() != descriptors.len() {
        return Err(PairMatchError::parse(
            desc_path,
            0,
            format!(
                "{} descriptors for {} features",
                descriptors.len(),
                features.len()
            ),
        ));
    }
    Regions::new(features, descriptors)
}

/// Writes both companion files of a view into `dir`.
pub fn write_regions(dir: &Path, view: &View, regions: &Regions) -> PairMatchResult<()> {
    let (feat_path, desc_path) = region_paths(dir, view)?;
    write_features(&feat_path, regions.features())?;
    write_descriptors(&desc_path, regions.descriptors())
}
