//! Marker dictionaries loaded as data.

use crate::rotate_code_u64;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum DictionaryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("marker_size {marker_size} implies {bits} bits (supported: 1..=64)")]
    UnsupportedMarkerSize { marker_size: usize, bits: usize },
    #[error("dictionary '{name}' has no codes")]
    Empty { name: String },
    #[error("code for id {id} does not fit in {bits} bits")]
    CodeTooWide { id: u32, bits: usize },
}

/// An ArUco-style dictionary: one packed code per marker id.
///
/// Bits are stored row-major (`idx = y * marker_size + x`) with black = 1.
/// The fields are only reachable through accessors so every instance,
/// including deserialized ones, has passed [`Dictionary::new`]'s checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDictionary")]
pub struct Dictionary {
    name: String,
    marker_size: usize,
    max_correction_bits: u8,
    codes: Vec<u64>,
}

#[derive(Deserialize)]
struct RawDictionary {
    name: String,
    marker_size: usize,
    #[serde(default)]
    max_correction_bits: u8,
    codes: Vec<u64>,
}

impl TryFrom<RawDictionary> for Dictionary {
    type Error = DictionaryError;

    fn try_from(raw: RawDictionary) -> Result<Self, Self::Error> {
        Dictionary::new(raw.name, raw.marker_size, raw.max_correction_bits, raw.codes)
    }
}

impl Dictionary {
    pub fn new(
        name: impl Into<String>,
        marker_size: usize,
        max_correction_bits: u8,
        codes: Vec<u64>,
    ) -> Result<Self, DictionaryError> {
        let name = name.into();
        let bits = marker_size * marker_size;
        if bits == 0 || bits > 64 {
            return Err(DictionaryError::UnsupportedMarkerSize { marker_size, bits });
        }
        if codes.is_empty() {
            return Err(DictionaryError::Empty { name });
        }
        if bits < 64 {
            if let Some(id) = codes.iter().position(|&c| c >> bits != 0) {
                return Err(DictionaryError::CodeTooWide {
                    id: id as u32,
                    bits,
                });
            }
        }
        Ok(Self {
            name,
            marker_size,
            max_correction_bits,
            codes,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, DictionaryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inner bits per side, border excluded.
    #[inline]
    pub fn marker_size(&self) -> usize {
        self.marker_size
    }

    #[inline]
    pub fn max_correction_bits(&self) -> u8 {
        self.max_correction_bits
    }

    #[inline]
    pub fn codes(&self) -> &[u64] {
        &self.codes
    }

    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    /// Number of marker ids.
    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    #[inline]
    pub fn contains_id(&self, id: u32) -> bool {
        (id as usize) < self.codes.len()
    }

    #[inline]
    pub fn code(&self, id: u32) -> Option<u64> {
        self.codes.get(id as usize).copied()
    }

    /// Smallest Hamming distance between a code and any quarter turn of
    /// another code, or a non-trivial quarter turn of itself.
    ///
    /// Correcting `k` bits is unambiguous only when this exceeds `2 * k`.
    pub fn min_distance(&self) -> u32 {
        let n = self.marker_size;
        let mut best = u32::MAX;
        for (i, &a) in self.codes.iter().enumerate() {
            for rot in 1..4 {
                best = best.min((a ^ rotate_code_u64(a, n, rot)).count_ones());
            }
            for &b in &self.codes[i + 1..] {
                for rot in 0..4 {
                    best = best.min((a ^ rotate_code_u64(b, n, rot)).count_ones());
                }
            }
        }
        best
    }
}
