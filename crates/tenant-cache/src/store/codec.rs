//! MessagePack encoding of cached values.
//!
//! Named fields are kept so entries written by an older build stay readable
//! after a field is added with `#[serde(default)]`.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::CacheError;

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CacheError> {
    rmp_serde::to_vec_named(value).map_err(|e| CacheError::Serialization(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
    rmp_serde::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
}
