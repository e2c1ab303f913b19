//! Surrogate-key hashing strategies
//!
//! Keys are FNV-1a over the byte encodings of the dimension values, each
//! preceded by its length so that value boundaries stay distinct. The
//! strategy is a trait object handed to each builder, so callers can plug in
//! their own.

use crate::keys::encoder::encode_into;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const FNV32_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV32_PRIME: u32 = 16_777_619;
const FNV64_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Length prefix written for a Null value, which has an empty encoding
const NULL_MARKER: u32 = u32::MAX;

/// Row identity used for deduplication; ordered so builders can keep rows sorted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SurrogateKey(pub u64);

impl fmt::Display for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Computes a fixed-width key over an ordered sequence of values
pub trait KeyFactory: Send + Sync {
    fn calculate_key(&self, values: &[&Value]) -> SurrogateKey;
}

/// FNV-1a, 32-bit width (widened into the key)
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1a32;

impl Fnv1a32 {
    pub fn hash_bytes(bytes: &[u8]) -> u32 {
        bytes.iter().fold(FNV32_OFFSET_BASIS, |hash, b| {
            (hash ^ u32::from(*b)).wrapping_mul(FNV32_PRIME)
        })
    }
}

impl KeyFactory for Fnv1a32 {
    fn calculate_key(&self, values: &[&Value]) -> SurrogateKey {
        SurrogateKey(u64::from(Self::hash_bytes(&key_bytes(values))))
    }
}

/// FNV-1a, 64-bit width
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1a64;

impl Fnv1a64 {
    pub fn hash_bytes(bytes: &[u8]) -> u64 {
        bytes.iter().fold(FNV64_OFFSET_BASIS, |hash, b| {
            (hash ^ u64::from(*b)).wrapping_mul(FNV64_PRIME)
        })
    }
}

impl KeyFactory for Fnv1a64 {
    fn calculate_key(&self, values: &[&Value]) -> SurrogateKey {
        SurrogateKey(Self::hash_bytes(&key_bytes(values)))
    }
}

/// Length-prefixed encodings of `values`, in order
fn key_bytes(values: &[&Value]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 12);
    for value in values {
        let prefix_at = bytes.len();
        bytes.extend_from_slice(&[0; 4]);
        encode_into(value, &mut bytes);
        let len = if value.is_null() {
            NULL_MARKER
        } else {
            (bytes.len() - prefix_at - 4) as u32
        };
        bytes[prefix_at..prefix_at + 4].copy_from_slice(&len.to_le_bytes());
    }
    bytes
}

/// Named key algorithm, as written in job configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAlgorithm {
    #[default]
    Fnv1a32,
    Fnv1a64,
}

impl KeyAlgorithm {
    pub fn factory(self) -> Arc<dyn KeyFactory> {
        match self {
            KeyAlgorithm::Fnv1a32 => Arc::new(Fnv1a32),
            KeyAlgorithm::Fnv1a64 => Arc::new(Fnv1a64),
        }
    }
}
