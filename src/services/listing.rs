use std::fmt;

use crate::error::{CosError, Result};
use crate::services::storage::StorageClient;

/// Page size of the single list request.
pub const MAX_KEYS: i32 = 1000;
/// Keys printed before the remainder is summarised.
pub const DISPLAY_LIMIT: usize = 10;

/// Flat listing of the first page under `prefix`. An empty bucket is a
/// successful, empty result.
pub async fn list<S>(storage: &S, prefix: &str) -> Result<Vec<String>>
where
    S: StorageClient + ?Sized,
{
    storage
        .list_objects(prefix, MAX_KEYS)
        .await
        .map_err(CosError::remote)
}

/// Console rendering of a listing: the first few keys and a count of the rest.
pub struct ListingSummary<'a> {
    keys: &'a [String],
    shown: usize,
}

impl<'a> ListingSummary<'a> {
    pub fn new(keys: &'a [String]) -> Self {
        Self::with_limit(keys, DISPLAY_LIMIT)
    }

    pub fn with_limit(keys: &'a [String], shown: usize) -> Self {
        Self { keys, shown }
    }

    pub fn hidden(&self) -> usize {
        self.keys.len().saturating_sub(self.shown)
    }
}

impl fmt::Display for ListingSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.keys.is_empty() {
            return write!(
                f,
                "✓ Configuration is correct! Bucket is accessible but empty in root directory."
            );
        }

        write!(
            f,
            "✓ Configuration is correct! Found {} object(s):",
            self.keys.len()
        )?;
        for key in self.keys.iter().take(self.shown) {
            write!(f, "\n  - {}", key)?;
        }
        if self.hidden() > 0 {
            write!(f, "\n  ... and {} more objects", self.hidden())?;
        }
        Ok(())
    }
}
