//! Binary persistence for the flat index.
//!
//! File format: index.bin
//!
//! Header (80 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - metric: u8 (0 = l2, 1 = cosine)
//! - dimensions: u16 (little-endian)
//! - vector_count: u64 (little-endian)
//! - fingerprint: [u8; 32] (SHA256 over the corpus cache keys)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Payload: vector_count * dimensions f32 values (little-endian), in
//! insertion order. The i-th stored vector is ordinal i.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::retriever::index::{DistanceMetric, FlatIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + metric(1) +
/// dimensions(2) + vector_count(8) + fingerprint(32) + checksum(4)
const HEADER_SIZE: usize = 80;

/// Errors that can occur during index storage operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Index error: {0}")]
    Index(#[from] crate::retriever::index::IndexError),
}

/// An index loaded back from disk, together with the fingerprint of the
/// corpus it was built from.
pub struct PersistedIndex {
    pub index: FlatIndex,
    pub fingerprint: [u8; 32],
}

/// Storage manager for the persisted index file.
pub struct IndexStorage {
    path: PathBuf,
}

impl IndexStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the index from storage.
    ///
    /// The header must match the expected model and dimensions; the
    /// stored metric tags the index itself, so it is taken from the file.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<PersistedIndex, IndexStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        Self::validate_header(&header, expected_model_id, expected_dimensions)?;

        let dimensions = header.dimensions as usize;
        let mut index = FlatIndex::new(dimensions, header.metric);
        for _ in 0..header.vector_count {
            index.push(Self::read_vector(&mut reader, dimensions)?)?;
        }

        Ok(PersistedIndex {
            index,
            fingerprint: header.fingerprint,
        })
    }

    /// Save the index to storage, overwriting any previous file.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(
        &self,
        index: &FlatIndex,
        model_id: &[u8; 32],
        fingerprint: &[u8; 32],
    ) -> Result<(), IndexStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path, index, model_id, fingerprint);
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Delete the storage file if it exists.
    pub fn delete(&self) -> Result<(), IndexStorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn write_to_file(
        &self,
        path: &Path,
        index: &FlatIndex,
        model_id: &[u8; 32],
        fingerprint: &[u8; 32],
    ) -> Result<(), IndexStorageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            metric: index.metric(),
            dimensions: index.dimensions() as u16,
            vector_count: index.len() as u64,
            fingerprint: *fingerprint,
        };
        Self::write_header(&mut writer, &header)?;

        for ordinal in 0..index.len() {
            // len() bounds the loop, vector() cannot miss
            if let Some(vector) = index.vector(ordinal) {
                for &value in vector {
                    writer.write_all(&value.to_le_bytes())?;
                }
            }
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(reader: &mut BufReader<File>) -> Result<Header, IndexStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;

        let version = header_bytes[0];
        if version > FORMAT_VERSION {
            return Err(IndexStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header_bytes[1..33]);

        let metric = DistanceMetric::from_u8(header_bytes[33]).ok_or_else(|| {
            IndexStorageError::InvalidFormat(format!(
                "unknown distance metric tag {}",
                header_bytes[33]
            ))
        })?;

        let dimensions = u16::from_le_bytes([header_bytes[34], header_bytes[35]]);

        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&header_bytes[36..44]);
        let vector_count = u64::from_le_bytes(count_bytes);

        let mut fingerprint = [0u8; 32];
        fingerprint.copy_from_slice(&header_bytes[44..76]);

        let mut checksum_bytes = [0u8; 4];
        checksum_bytes.copy_from_slice(&header_bytes[76..80]);
        let stored_checksum = u32::from_le_bytes(checksum_bytes);

        // Verify checksum (computed over header without checksum field)
        let computed_checksum = crc32fast::hash(&header_bytes[0..76]);
        if stored_checksum != computed_checksum {
            return Err(IndexStorageError::ChecksumMismatch);
        }

        Ok(Header {
            version,
            model_id,
            metric,
            dimensions,
            vector_count,
            fingerprint,
        })
    }

    fn validate_header(
        header: &Header,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<(), IndexStorageError> {
        if header.model_id != *expected_model_id {
            return Err(IndexStorageError::ModelMismatch);
        }

        if header.dimensions as usize != expected_dimensions {
            return Err(IndexStorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        Ok(())
    }

    fn write_header(
        writer: &mut BufWriter<File>,
        header: &Header,
    ) -> Result<(), IndexStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = header.version;
        header_bytes[1..33].copy_from_slice(&header.model_id);
        header_bytes[33] = header.metric.as_u8();
        header_bytes[34..36].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[36..44].copy_from_slice(&header.vector_count.to_le_bytes());
        header_bytes[44..76].copy_from_slice(&header.fingerprint);

        let checksum = crc32fast::hash(&header_bytes[0..76]);
        header_bytes[76..80].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_vector(
        reader: &mut BufReader<File>,
        dimensions: usize,
    ) -> Result<Vec<f32>, IndexStorageError> {
        let mut vector = Vec::with_capacity(dimensions);
        let mut float_bytes = [0u8; 4];
        for _ in 0..dimensions {
            reader.read_exact(&mut float_bytes)?;
            vector.push(f32::from_le_bytes(float_bytes));
        }
        Ok(vector)
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    metric: DistanceMetric,
    dimensions: u16,
    vector_count: u64,
    fingerprint: [u8; 32],
}
