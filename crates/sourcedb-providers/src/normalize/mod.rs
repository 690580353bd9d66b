//! Per-platform normalizers: raw provider JSON in, canonical [`Post`]s out.
//!
//! All four normalizers share the same contract: extract defensively across
//! the field-name variants the scrapers emit, coerce timestamps to UTC,
//! default counters to zero, keep the full raw payload in `raw_data`, and
//! drop in-batch duplicates by content fingerprint. A malformed record
//! never fails the batch; at worst it contributes an empty-ish post.

pub mod instagram;
pub mod tiktok;
pub mod twitter;
pub mod youtube;

use std::collections::HashSet;

use sourcedb_core::{fingerprint, Platform};
use tracing::debug;

pub use instagram::normalize_instagram;
pub use tiktok::normalize_tiktok;
pub use twitter::normalize_twitter;
pub use youtube::normalize_youtube;

/// Tracks fingerprints already seen within one normalization batch.
pub(crate) struct DedupSet {
    platform: Platform,
    seen: HashSet<String>,
}

impl DedupSet {
    pub(crate) fn new(platform: Platform) -> Self {
        Self {
            platform,
            seen: HashSet::new(),
        }
    }

    /// Fingerprints the key and returns it if unseen; `None` marks an
    /// in-batch duplicate.
    pub(crate) fn admit(&mut self, discriminator: &str, extra: &str) -> Option<String> {
        let hash = fingerprint(self.platform, discriminator, extra);
        if self.seen.insert(hash.clone()) {
            Some(hash)
        } else {
            debug!(platform = %self.platform, discriminator, "dropping in-batch duplicate");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_admits_once_per_key() {
        let mut seen = DedupSet::new(Platform::Tiktok);
        let first = seen.admit("https://a", "2024");
        assert!(first.is_some());
        assert!(seen.admit("https://a", "2024").is_none());
        assert!(seen.admit("https://b", "2024").is_some());
    }
}
