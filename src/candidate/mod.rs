//! Candidate selection and pruning utilities.
//!
//! Includes deterministic peak ordering and spatial non-maximum suppression,
//! used to pick corner responses during feature extraction.

pub(crate) mod nms;
pub(crate) mod peak;
