//! Surrogate keys: byte encoding of values and the hashing strategies over it

pub mod encoder;
pub mod factory;

pub use encoder::{encode, ticks};
pub use factory::{Fnv1a32, Fnv1a64, KeyAlgorithm, KeyFactory, SurrogateKey};
