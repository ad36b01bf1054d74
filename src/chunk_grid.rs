//! Regular chunk grid: chunk-grid extent and the mapping between chunk
//! coordinates and chunk keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ZarrError, ZarrResult};

/// Separator between coordinate components in a chunk key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DimensionSeparator {
    #[default]
    #[serde(rename = ".")]
    Dot,
    #[serde(rename = "/")]
    Slash,
}

impl DimensionSeparator {
    pub fn as_str(self) -> &'static str {
        match self {
            DimensionSeparator::Dot => ".",
            DimensionSeparator::Slash => "/",
        }
    }

    pub fn parse(s: &str) -> ZarrResult<Self> {
        match s {
            "." => Ok(DimensionSeparator::Dot),
            "/" => Ok(DimensionSeparator::Slash),
            other => Err(ZarrError::InvalidMetadata(format!(
                "dimension_separator must be \".\" or \"/\", got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for DimensionSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key suffix used by zero-dimensional arrays, whose single chunk has an
/// empty coordinate.
const SCALAR_CHUNK_KEY: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGrid {
    shape: Vec<usize>,
    chunks: Vec<usize>,
    grid_shape: Vec<usize>,
    num_chunks: usize,
    chunk_num_elements: usize,
}

impl ChunkGrid {
    pub fn new(shape: &[usize], chunks: &[usize]) -> ZarrResult<Self> {
        if shape.len() != chunks.len() {
            return Err(ZarrError::InvalidMetadata(format!(
                "shape has rank {} but chunks has rank {}",
                shape.len(),
                chunks.len()
            )));
        }
        if let Some(d) = chunks.iter().position(|c| *c == 0) {
            return Err(ZarrError::InvalidMetadata(format!(
                "chunk extent in dimension {d} must be >= 1"
            )));
        }
        let grid_shape: Vec<usize> = shape
            .iter()
            .zip(chunks)
            .map(|(s, c)| s.div_ceil(*c))
            .collect();
        let overflow = |what: &str, dims: &[usize]| {
            ZarrError::InvalidMetadata(format!("{what} {dims:?} overflows usize"))
        };
        let num_chunks =
            checked_product(&grid_shape).ok_or_else(|| overflow("chunk grid", &grid_shape))?;
        let chunk_num_elements =
            checked_product(chunks).ok_or_else(|| overflow("chunk shape", chunks))?;
        Ok(Self {
            shape: shape.to_vec(),
            chunks: chunks.to_vec(),
            grid_shape,
            num_chunks,
            chunk_num_elements,
        })
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn chunk_shape(&self) -> &[usize] {
        &self.chunks
    }

    /// Number of chunks along each dimension, `ceil(shape / chunks)`.
    pub fn grid_shape(&self) -> &[usize] {
        &self.grid_shape
    }

    /// Total number of chunks in the grid.
    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    /// Elements in one (full-size) chunk. Edge chunks are stored at full
    /// size too.
    pub fn chunk_num_elements(&self) -> usize {
        self.chunk_num_elements
    }

    pub fn check_coord(&self, coord: &[usize]) -> ZarrResult<()> {
        let bad = |reason: String| ZarrError::InvalidChunkCoordinate {
            coord: format!("{coord:?}"),
            reason,
        };
        if coord.len() != self.rank() {
            return Err(bad(format!(
                "expected {} components, got {}",
                self.rank(),
                coord.len()
            )));
        }
        for (d, (c, extent)) in coord.iter().zip(&self.grid_shape).enumerate() {
            if c >= extent {
                return Err(bad(format!(
                    "component {d} must be < {extent}, got {c}"
                )));
            }
        }
        Ok(())
    }

    /// Storage key for the chunk at `coord`.
    pub fn key_for(
        &self,
        coord: &[usize],
        prefix: &str,
        separator: DimensionSeparator,
    ) -> ZarrResult<String> {
        self.check_coord(coord)?;
        if coord.is_empty() {
            return Ok(format!("{prefix}{SCALAR_CHUNK_KEY}"));
        }
        let suffix = coord
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(separator.as_str());
        Ok(format!("{prefix}{suffix}"))
    }

    /// Inverse of [`ChunkGrid::key_for`]: parse the coordinate out of a key.
    pub fn coord_for(
        &self,
        key: &str,
        prefix: &str,
        separator: DimensionSeparator,
    ) -> ZarrResult<Vec<usize>> {
        let bad = |reason: &str| ZarrError::InvalidChunkCoordinate {
            coord: key.to_string(),
            reason: reason.to_string(),
        };
        let suffix = key
            .strip_prefix(prefix)
            .ok_or_else(|| bad("key does not start with the array prefix"))?;
        if self.rank() == 0 {
            return if suffix == SCALAR_CHUNK_KEY {
                Ok(Vec::new())
            } else {
                Err(bad("zero-dimensional arrays only have chunk \"0\""))
            };
        }
        let coord = suffix
            .split(separator.as_str())
            .map(|segment| {
                if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(bad("segment is not a non-negative integer"));
                }
                if segment.len() > 1 && segment.starts_with('0') {
                    return Err(bad("segment has leading zeros"));
                }
                segment.parse::<usize>().map_err(|_| bad("segment out of range"))
            })
            .collect::<ZarrResult<Vec<usize>>>()?;
        if coord.len() != self.rank() {
            return Err(bad("wrong number of coordinate components"));
        }
        Ok(coord)
    }

    /// Every chunk coordinate in the grid, in C order.
    pub fn chunk_coords(&self) -> Vec<Vec<usize>> {
        cartesian_product(&self.grid_shape)
    }
}

fn checked_product(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d))
}

fn cartesian_product(dims: &[usize]) -> Vec<Vec<usize>> {
    if dims.is_empty() {
        return vec![vec![]];
    }
    let first = dims[0];
    let rest = cartesian_product(&dims[1..]);
    let mut result = Vec::new();
    for i in 0..first {
        for r in &rest {
            let mut v = vec![i];
            v.extend_from_slice(r);
            result.push(v);
        }
    }
    result
}
