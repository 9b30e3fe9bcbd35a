use crate::error::{IngestError, SearchError};
use std::fs;
use std::path::Path;

const INDEX_MAGIC: &[u8; 4] = b"RSIX";
const INDEX_VERSION: u32 = 1;
const HEADER_LEN: usize = 24;

/// Flat nearest-neighbor index over fixed-dimension vectors, ranked by
/// squared Euclidean distance.
///
/// Position equals insertion order and is the only way to map a vector
/// back to its chunk record, so entries are never reordered.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Result<Self, IngestError> {
        if dimension == 0 {
            return Err(IngestError::InvalidArgument(
                "index dimension must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    pub fn build(dimension: usize, vectors: &[Vec<f32>]) -> Result<Self, IngestError> {
        let mut index = Self::new(dimension)?;
        index.add(vectors)?;
        Ok(index)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn ntotal(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends vectors in order. A dimension mismatch is fatal and leaves
    /// the index unchanged.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IngestError> {
        for vector in vectors {
            if vector.len() != self.dimension {
                return Err(IngestError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.ntotal() {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// K nearest entries as `(position, distance)`, ascending by distance
    /// with position as the tie-break. Asking for more results than the
    /// index holds returns everything; an empty index returns nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, SearchError> {
        if query.len() != self.dimension {
            return Err(SearchError::Request(format!(
                "query vector dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = (0..self.ntotal())
            .map(|position| {
                let start = position * self.dimension;
                let stored = &self.data[start..start + self.dimension];
                let distance = stored
                    .iter()
                    .zip(query.iter())
                    .map(|(lhs, rhs)| {
                        let delta = lhs - rhs;
                        delta * delta
                    })
                    .sum::<f32>();
                (position, distance)
            })
            .collect();

        scored.sort_by(|left, right| left.1.total_cmp(&right.1).then(left.0.cmp(&right.0)));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn save(&self, path: &Path) -> Result<(), IngestError> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(INDEX_MAGIC);
        bytes.extend_from_slice(&INDEX_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u64).to_le_bytes());
        bytes.extend_from_slice(&(self.ntotal() as u64).to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_LEN {
            return Err(IngestError::CorruptIndex(format!(
                "file too short: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0..4] != INDEX_MAGIC {
            return Err(IngestError::CorruptIndex("bad magic".to_string()));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != INDEX_VERSION {
            return Err(IngestError::CorruptIndex(format!(
                "unsupported version {version}"
            )));
        }

        let dimension = read_u64(&bytes[8..16]) as usize;
        let count = read_u64(&bytes[16..24]) as usize;
        if dimension == 0 {
            return Err(IngestError::CorruptIndex("zero dimension".to_string()));
        }
        let expected = dimension
            .checked_mul(count)
            .and_then(|floats| floats.checked_mul(4))
            .ok_or_else(|| IngestError::CorruptIndex("size overflow".to_string()))?;
        if bytes.len() != HEADER_LEN + expected {
            return Err(IngestError::CorruptIndex(format!(
                "expected {} data bytes, found {}",
                expected,
                bytes.len() - HEADER_LEN
            )));
        }

        let data = bytes[HEADER_LEN..]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self { dimension, data })
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buffer = [0u8; 8];
    buffer.copy_from_slice(bytes);
    u64::from_le_bytes(buffer)
}
