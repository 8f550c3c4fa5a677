use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

use crate::core::profile::{Profile, ProfileError};
use crate::core::types::{ErrorKind, KitId};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to access snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Snapshot profile {kit} is invalid: {source}")]
    InvalidProfile { kit: KitId, source: ProfileError },
}

impl SnapshotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::StoreUnavailable,
            Self::Parse(_) | Self::InvalidProfile { .. } => ErrorKind::InvalidInput,
        }
    }
}

/// Snapshot format version for compatibility checking
pub const SNAPSHOT_VERSION: &str = "1.0.0";

/// Serializable population snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotData {
    pub version: String,
    pub created_at: String,
    pub profiles: Vec<Profile>,
}

fn is_gzipped(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Read profiles from a `.json` or `.json.gz` snapshot.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if any profile
/// breaks the marker invariant.
pub fn read_snapshot(path: &Path) -> Result<Vec<Profile>, SnapshotError> {
    let file = File::open(path)?;
    let mut content = String::new();
    if is_gzipped(path) {
        GzDecoder::new(BufReader::new(file)).read_to_string(&mut content)?;
    } else {
        BufReader::new(file).read_to_string(&mut content)?;
    }
    parse_snapshot(&content)
}

/// Parse snapshot JSON
///
/// # Errors
///
/// Returns an error if the JSON is malformed or a profile is invalid.
pub fn parse_snapshot(json: &str) -> Result<Vec<Profile>, SnapshotError> {
    let data: SnapshotData = serde_json::from_str(json)?;

    // Version check (warn but don't fail)
    if data.version != SNAPSHOT_VERSION {
        tracing::warn!(
            expected = SNAPSHOT_VERSION,
            found = %data.version,
            "Snapshot version mismatch"
        );
    }

    let mut profiles = data.profiles;
    for profile in &mut profiles {
        profile
            .validate()
            .map_err(|source| SnapshotError::InvalidProfile {
                kit: profile.kit_number.clone(),
                source,
            })?;
    }
    Ok(profiles)
}

/// Write profiles to a snapshot, gzip-compressed when the path ends in `.gz`.
///
/// The file is written next to its destination and renamed into place, so a
/// crash never leaves a truncated snapshot behind.
///
/// # Errors
///
/// Returns an error if serialization or any filesystem step fails.
pub fn write_snapshot(path: &Path, profiles: &[Profile]) -> Result<(), SnapshotError> {
    let data = SnapshotData {
        version: SNAPSHOT_VERSION.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
        profiles: profiles.to_vec(),
    };

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = std::path::PathBuf::from(staging);

    {
        let writer = BufWriter::new(File::create(&staging)?);
        if is_gzipped(path) {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            serde_json::to_writer(&mut encoder, &data)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = writer;
            serde_json::to_writer_pretty(&mut writer, &data)?;
            writer.flush()?;
        }
    }

    std::fs::rename(&staging, path)?;
    Ok(())
}
