//! Staging store
//!
//! Named binary-blob persistence used to pass intermediate artifacts
//! between pipeline phases, plus the self-describing format those blobs
//! are written in. The original dumps were raw fixed-width arrays whose
//! reader had to know the element width out of band; here every blob
//! carries a header with magic, version, kind tag, element width, and
//! element count.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::StagingError;

/// Flat key/blob persistence contract.
pub trait StagingStore {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<(), StagingError>;

    fn get(&self, name: &str) -> Result<Vec<u8>, StagingError>;
}

/// Per-chunk ciphertext blob key.
pub fn ciphertext_name(index: usize) -> String {
    format!("ciphertext{index}")
}

/// Per-chunk residue-table blob key.
pub fn residue_name(index: usize) -> String {
    format!("residue{index}")
}

/// Per-chunk reconstructed-bytes blob key.
pub fn aggregate_name(index: usize) -> String {
    format!("aggregate{index}")
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl StagingStore for MemoryStore {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<(), StagingError> {
        self.blobs.insert(name.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, StagingError> {
        self.blobs
            .get(name)
            .cloned()
            .ok_or_else(|| StagingError::MissingBlob(name.to_owned()))
    }
}

/// One file per key under a root directory.
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StagingError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl StagingStore for DirStore {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<(), StagingError> {
        fs::write(self.path_for(name), bytes)?;
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, StagingError> {
        match fs::read(self.path_for(name)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StagingError::MissingBlob(name.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

const BLOB_MAGIC: &[u8; 4] = b"RRNS";
const BLOB_VERSION: u32 = 1;

/// What a staged blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Ciphertext,
    ResidueTable,
    Aggregate,
}

impl BlobKind {
    fn tag(self) -> u8 {
        match self {
            BlobKind::Ciphertext => 1,
            BlobKind::ResidueTable => 2,
            BlobKind::Aggregate => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, StagingError> {
        match tag {
            1 => Ok(BlobKind::Ciphertext),
            2 => Ok(BlobKind::ResidueTable),
            3 => Ok(BlobKind::Aggregate),
            other => Err(StagingError::MalformedBlob(format!(
                "unknown blob kind tag {other}"
            ))),
        }
    }
}

/// A decoded staged blob: kind, element width (1, 4, or 8 bytes), elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBlob {
    pub kind: BlobKind,
    pub width: u8,
    pub elements: Vec<u64>,
}

impl StagedBlob {
    pub fn new(kind: BlobKind, width: u8, elements: Vec<u64>) -> Result<Self, StagingError> {
        if !matches!(width, 1 | 4 | 8) {
            return Err(StagingError::MalformedBlob(format!(
                "unsupported element width {width}"
            )));
        }

        if width < 8 {
            let limit = 1u64 << (width * 8);
            if let Some(&v) = elements.iter().find(|&&v| v >= limit) {
                return Err(StagingError::MalformedBlob(format!(
                    "element {v} does not fit width {width}"
                )));
            }
        }

        Ok(Self { kind, width, elements })
    }

    /// Serialize: `RRNS | version u32 | kind u8 | width u8 | count u64 |
    /// payload`, everything little-endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(18 + self.elements.len() * self.width as usize);
        bytes.extend_from_slice(BLOB_MAGIC);
        bytes.extend_from_slice(&BLOB_VERSION.to_le_bytes());
        bytes.push(self.kind.tag());
        bytes.push(self.width);
        bytes.extend_from_slice(&(self.elements.len() as u64).to_le_bytes());

        for &v in &self.elements {
            bytes.extend_from_slice(&v.to_le_bytes()[..self.width as usize]);
        }

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StagingError> {
        if bytes.len() < 18 {
            return Err(StagingError::MalformedBlob("truncated header".into()));
        }
        if &bytes[0..4] != BLOB_MAGIC {
            return Err(StagingError::MalformedBlob("bad magic".into()));
        }

        let mut word4 = [0u8; 4];
        word4.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(word4);
        if version != BLOB_VERSION {
            return Err(StagingError::MalformedBlob(format!(
                "unsupported blob version {version}"
            )));
        }

        let kind = BlobKind::from_tag(bytes[8])?;
        let width = bytes[9];
        if !matches!(width, 1 | 4 | 8) {
            return Err(StagingError::MalformedBlob(format!(
                "unsupported element width {width}"
            )));
        }

        let mut word8 = [0u8; 8];
        word8.copy_from_slice(&bytes[10..18]);
        let count = u64::from_le_bytes(word8) as usize;

        let payload = &bytes[18..];
        if payload.len() != count * width as usize {
            return Err(StagingError::MalformedBlob(format!(
                "expected {} payload bytes for {count} elements of width {width}, found {}",
                count * width as usize,
                payload.len()
            )));
        }

        let mut elements = Vec::with_capacity(count);
        for chunk in payload.chunks_exact(width as usize) {
            let mut word = [0u8; 8];
            word[..width as usize].copy_from_slice(chunk);
            elements.push(u64::from_le_bytes(word));
        }

        Ok(Self { kind, width, elements })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryStore::new();
        store.put(&residue_name(3), &[1, 2, 3, 255]).unwrap();
        assert_eq!(store.get(&residue_name(3)).unwrap(), vec![1, 2, 3, 255]);
    }

    #[test]
    fn test_memory_store_missing_blob() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get("nope"),
            Err(StagingError::MissingBlob(_))
        ));
    }

    #[test]
    fn test_dir_store_round_trip() {
        let root = std::env::temp_dir().join(format!(
            "rrns-staging-test-{}",
            std::process::id()
        ));
        let mut store = DirStore::new(&root).unwrap();

        store.put(&ciphertext_name(0), b"opaque bytes").unwrap();
        assert_eq!(store.get(&ciphertext_name(0)).unwrap(), b"opaque bytes");
        assert!(matches!(
            store.get(&ciphertext_name(1)),
            Err(StagingError::MissingBlob(_))
        ));

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_blob_round_trip_all_widths() {
        for (width, elements) in [
            (1u8, vec![0u64, 7, 255]),
            (4, vec![0, 65537, u32::MAX as u64]),
            (8, vec![0, u64::MAX, 810_162_134_158_954_261]),
        ] {
            let blob = StagedBlob::new(BlobKind::ResidueTable, width, elements).unwrap();
            let decoded = StagedBlob::from_bytes(&blob.to_bytes()).unwrap();
            assert_eq!(decoded, blob);
        }
    }

    #[test]
    fn test_blob_rejects_oversized_elements() {
        assert!(StagedBlob::new(BlobKind::Aggregate, 1, vec![256]).is_err());
        assert!(StagedBlob::new(BlobKind::Aggregate, 4, vec![1 << 32]).is_err());
    }

    #[test]
    fn test_blob_rejects_bad_headers() {
        assert!(StagedBlob::from_bytes(b"RRNS").is_err());

        let blob = StagedBlob::new(BlobKind::Ciphertext, 1, vec![9]).unwrap();
        let mut bytes = blob.to_bytes();
        bytes[0] = b'X';
        assert!(StagedBlob::from_bytes(&bytes).is_err());

        let mut truncated = blob.to_bytes();
        truncated.pop();
        assert!(StagedBlob::from_bytes(&truncated).is_err());
    }

    #[test]
    fn test_key_naming() {
        assert_eq!(ciphertext_name(2), "ciphertext2");
        assert_eq!(residue_name(0), "residue0");
        assert_eq!(aggregate_name(11), "aggregate11");
    }
}
