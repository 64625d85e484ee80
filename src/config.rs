/*!
 * Allocator Configuration
 */

use crate::{
    block::{DSIZE, MIN_BLOCK_SIZE},
    error::{AllocError, AllocResult},
};

/// Bytes the arena grows by when no free block fits (and on init).
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 9;

/// Tunables of an [`crate::Allocator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Minimum growth requested from the backing store.
    pub chunk_size: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl AllocatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Checks that every growth produces a well formed free block.
    pub fn validate(&self) -> AllocResult<()> {
        if self.chunk_size < MIN_BLOCK_SIZE {
            return Err(AllocError::InvalidConfig(format!(
                "chunk size {} is below the minimum block size {MIN_BLOCK_SIZE}",
                self.chunk_size
            )));
        }

        if self.chunk_size % DSIZE != 0 {
            return Err(AllocError::InvalidConfig(format!(
                "chunk size {} is not a multiple of {DSIZE}",
                self.chunk_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = AllocatorConfig::new();

        assert_eq!(config.chunk_size, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_chunk_sizes() {
        assert!(matches!(
            AllocatorConfig::new().chunk_size(8).validate(),
            Err(AllocError::InvalidConfig(_))
        ));
        assert!(matches!(
            AllocatorConfig::new().chunk_size(100).validate(),
            Err(AllocError::InvalidConfig(_))
        ));
        assert!(AllocatorConfig::new().chunk_size(4096).validate().is_ok());
    }
}
