//! Byte sizes of MPI datatypes.
//!
//! Primitive types are registered with the size the interception layer
//! reported. Derived types are sized once, when they are created, from the
//! types they are built from; the size is never recomputed afterwards.

use crate::error::{Error, Result};
use crate::types::DatatypeId;
use log::warn;
use std::collections::HashMap;

/// Size assumed for a type the registry has never seen
pub const DEFAULT_TYPE_SIZE: u64 = 4;

/// How a derived datatype is built from existing ones
#[derive(Debug, Clone, PartialEq)]
pub enum TypeConstructor {
    /// `count` consecutive copies of `old`
    Contiguous { count: u64, old: DatatypeId },
    /// `count` blocks of `block_length` elements; strides do not add bytes
    Vector {
        count: u64,
        block_length: u64,
        old: DatatypeId,
    },
    /// Blocks of varying length over one type
    Indexed { lengths: Vec<u64>, old: DatatypeId },
    /// Blocks of varying length over varying types
    Struct { blocks: Vec<(u64, DatatypeId)> },
    /// A sub-array of `subsizes` elements per dimension.
    ///
    /// Sized as the product of the sub-sizes, the bytes the sub-array
    /// actually selects, not the sum of the sub-sizes.
    Subarray { subsizes: Vec<u64>, old: DatatypeId },
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    sizes: HashMap<DatatypeId, u64>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a primitive type with a known size
    pub fn register(&mut self, datatype: DatatypeId, size: u64) {
        self.sizes.insert(datatype, size);
    }

    pub fn size_of(&self, datatype: DatatypeId) -> Option<u64> {
        self.sizes.get(&datatype).copied()
    }

    pub fn is_known(&self, datatype: DatatypeId) -> bool {
        self.sizes.contains_key(&datatype)
    }

    /// Bytes in `count` elements, assuming a 4-byte type when it is unknown
    pub fn count_bytes(&self, datatype: DatatypeId, count: u64) -> u64 {
        match self.size_of(datatype) {
            Some(size) => size.saturating_mul(count),
            None => {
                warn!(
                    "Unknown data type ({}). Assuming {} bytes in size.",
                    datatype, DEFAULT_TYPE_SIZE
                );
                DEFAULT_TYPE_SIZE.saturating_mul(count)
            }
        }
    }

    /// Size and register `new`, returning its size.
    ///
    /// Fails with [`Error::UnknownType`] if any constituent is unknown, in
    /// which case `new` is left without a size.
    pub fn derive(&mut self, new: DatatypeId, constructor: &TypeConstructor) -> Result<u64> {
        match self.derived_size(constructor) {
            Ok(size) => {
                self.sizes.insert(new, size);
                Ok(size)
            }
            Err(e) => {
                self.sizes.remove(&new);
                Err(e)
            }
        }
    }

    fn derived_size(&self, constructor: &TypeConstructor) -> Result<u64> {
        let size = match constructor {
            TypeConstructor::Contiguous { count, old } => self.known(*old)?.saturating_mul(*count),
            TypeConstructor::Vector {
                count,
                block_length,
                old,
            } => self
                .known(*old)?
                .saturating_mul(*block_length)
                .saturating_mul(*count),
            TypeConstructor::Indexed { lengths, old } => {
                self.known(*old)?.saturating_mul(saturating_sum(lengths))
            }
            TypeConstructor::Struct { blocks } => {
                let mut sum: u64 = 0;
                for (length, old) in blocks {
                    sum = sum.saturating_add(self.known(*old)?.saturating_mul(*length));
                }
                sum
            }
            TypeConstructor::Subarray { subsizes, old } => {
                self.known(*old)?.saturating_mul(
                    subsizes
                        .iter()
                        .fold(1u64, |acc, &n| acc.saturating_mul(n)),
                )
            }
        };
        Ok(size)
    }

    fn known(&self, datatype: DatatypeId) -> Result<u64> {
        self.size_of(datatype).ok_or(Error::UnknownType(datatype))
    }
}

/// Sum of element counts, clamped at `u64::MAX`
pub fn saturating_sum(counts: &[u64]) -> u64 {
    counts.iter().fold(0, |acc, &n| acc.saturating_add(n))
}
