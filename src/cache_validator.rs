use hex;
use sha2::{Digest, Sha256};

/// Validates cached board snapshots and stored queue blobs using SHA-256
/// checksums.
///
/// The board cache holds gateway responses and the blob store holds the
/// offline queue; both are plain JSON strings that other processes or a
/// crashed write could corrupt. A checksum recorded at write time lets
/// readers detect corruption and fall back to a fresh fetch (or an empty
/// queue) instead of feeding garbage into the service.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidatedCacheEntry {
    /// The actual payload (JSON string)
    pub data: String,
    /// SHA-256 checksum of the payload (hex encoded)
    pub checksum: String,
}

impl ValidatedCacheEntry {
    /// Creates a new validated entry with computed checksum.
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Whether the payload still matches its recorded checksum.
    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    /// Serializes the entry (payload + checksum) for storage.
    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Deserializes an entry and returns the payload only if the checksum
    /// holds. Returns `None` for corrupted or unparseable entries.
    pub fn deserialize_and_validate(serialized: &str) -> Option<String> {
        let entry: ValidatedCacheEntry = serde_json::from_str(serialized).ok()?;

        if entry.is_valid() {
            Some(entry.data)
        } else {
            tracing::warn!(
                "Cache validation failed: checksum mismatch. Expected: {}, Data length: {}",
                entry.checksum,
                entry.data.len()
            );
            None
        }
    }
}
