//! Error taxonomy for the datapool and the slab/item allocator.
//!
//! Library functions return `anyhow::Result`; the failures a caller is expected
//! to react to are raised as [`CacheError`] and can be told apart with
//! [`kind_of`] (which also looks through `.context(..)` layers).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Bad pool tag, oversized user data, inconsistent slab geometry.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Mapping, creation or locking of the backing file failed.
    #[error("{what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },

    /// The header is valid but the pool belongs to another owner.
    #[error("foreign pool: expected tag '{expected}', found '{found}'")]
    ForeignPool { expected: String, found: String },

    /// No chunk could be reserved and eviction did not free one.
    #[error("out of memory: no chunk for {need} B")]
    OutOfMemory { need: usize },

    /// Annex could neither grow in place nor reallocate.
    #[error("not enough memory to annex: need {need} B")]
    NotEnoughMemory { need: usize },

    /// The record can never fit the largest size class.
    #[error("item of {need} B exceeds the largest chunk ({max} B)")]
    Oversized { need: usize, max: usize },

    #[error("invalid key length {len} (must be 1..=255)")]
    InvalidKey { len: usize },
}

impl CacheError {
    pub(crate) fn io(what: impl Into<String>, source: std::io::Error) -> Self {
        CacheError::Io {
            what: what.into(),
            source,
        }
    }
}

/// Classify an error returned by this crate.
pub fn kind_of(err: &anyhow::Error) -> Option<&CacheError> {
    err.downcast_ref::<CacheError>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn kind_survives_context() {
        let r: anyhow::Result<()> = Err(CacheError::OutOfMemory { need: 64 }.into());
        let err = r.context("reserve key").unwrap_err();
        assert!(matches!(
            kind_of(&err),
            Some(CacheError::OutOfMemory { need: 64 })
        ));
    }
}
