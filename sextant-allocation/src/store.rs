//! On-disk store metadata used for replica placement
//!
//! A node answering a store-listing fan-out describes the segment files it
//! holds for a shard. Replica placement compares a candidate's files against
//! the active primary's to estimate how many bytes of recovery traffic a
//! placement would save.

use serde::{Deserialize, Serialize};

/// A single store file as reported by a data node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFileMetadata {
    /// File name, unique within one shard store
    pub name: String,

    /// File length in bytes
    pub length: u64,

    /// Content checksum; files written by very old engine versions may not
    /// carry one
    pub checksum: Option<String>,
}

impl StoreFileMetadata {
    pub fn new(name: impl Into<String>, length: u64, checksum: Option<String>) -> Self {
        Self {
            name: name.into(),
            length,
            checksum,
        }
    }

    /// Whether this file is byte-identical to `other`. A missing checksum on
    /// either side means identity cannot be proven and the answer is no.
    pub fn is_same(&self, other: &StoreFileMetadata) -> bool {
        match (&self.checksum, &other.checksum) {
            (Some(ours), Some(theirs)) => self.length == other.length && ours == theirs,
            _ => false,
        }
    }
}

/// Store listing for one shard on one node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreFilesMetadata {
    /// The node already holds a live copy of the shard
    pub allocated: bool,

    /// Commit marker; two stores sharing a sync id are segment-identical
    pub sync_id: Option<String>,

    /// Files present in the store
    pub files: Vec<StoreFileMetadata>,
}

impl StoreFilesMetadata {
    /// Look up a file by name
    pub fn file(&self, name: &str) -> Option<&StoreFileMetadata> {
        self.files.iter().find(|file| file.name == name)
    }

    /// Whether both stores carry the same sync id
    pub fn sync_id_matches(&self, other: &StoreFilesMetadata) -> bool {
        matches!(
            (&self.sync_id, &other.sync_id),
            (Some(ours), Some(theirs)) if ours == theirs
        )
    }

    /// Bytes this store shares with `primary`: the summed length of every
    /// file that exists under the same name in the primary store with a
    /// matching identity.
    pub fn matching_bytes(&self, primary: &StoreFilesMetadata) -> u64 {
        self.files
            .iter()
            .filter(|file| primary.file(&file.name).is_some_and(|p| file.is_same(p)))
            .map(|file| file.length)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, length: u64, checksum: &str) -> StoreFileMetadata {
        StoreFileMetadata::new(name, length, Some(checksum.to_string()))
    }

    #[test]
    fn test_is_same_requires_checksums() {
        let a = file("_0.cfs", 100, "abc");
        assert!(a.is_same(&file("_0.cfs", 100, "abc")));
        assert!(!a.is_same(&file("_0.cfs", 100, "xyz")));
        assert!(!a.is_same(&file("_0.cfs", 99, "abc")));
        assert!(!a.is_same(&StoreFileMetadata::new("_0.cfs", 100, None)));

        let unchecksummed = StoreFileMetadata::new("_0.cfs", 100, None);
        assert!(!unchecksummed.is_same(&unchecksummed.clone()));
    }

    #[test]
    fn test_matching_bytes() {
        let primary = StoreFilesMetadata {
            allocated: true,
            sync_id: None,
            files: vec![
                file("_0.cfs", 100, "a"),
                file("_1.cfs", 200, "b"),
                file("segments_2", 50, "c"),
            ],
        };
        let candidate = StoreFilesMetadata {
            allocated: false,
            sync_id: None,
            files: vec![
                file("_0.cfs", 100, "a"),      // identical
                file("_1.cfs", 200, "stale"),  // same name, different content
                file("_9.cfs", 400, "d"),      // unknown to the primary
            ],
        };
        assert_eq!(candidate.matching_bytes(&primary), 100);
    }

    #[test]
    fn test_sync_id_matches() {
        let with = |sync_id: Option<&str>| StoreFilesMetadata {
            allocated: false,
            sync_id: sync_id.map(|s| s.to_string()),
            files: Vec::new(),
        };
        assert!(with(Some("xyz")).sync_id_matches(&with(Some("xyz"))));
        assert!(!with(Some("xyz")).sync_id_matches(&with(Some("abc"))));
        assert!(!with(Some("xyz")).sync_id_matches(&with(None)));
        assert!(!with(None).sync_id_matches(&with(None)));
    }
}
