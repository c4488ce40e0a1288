//! Error types for the versioned store.
//!
//! Every variant carries a stable numeric code (see [`StoreError::code`])
//! so machine callers (a CLI exit status, for example) can react without
//! parsing messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used by all fallible store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Any filesystem error not otherwise classified.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A version named in an operation does not exist on disk.
    #[error("version {0} does not exist")]
    VersionMissing(String),

    /// The per-version metadata directory is absent. Usually means the
    /// version was never properly reserved.
    #[error("metadata directory {} does not exist", .0.display())]
    MetadataMissing(PathBuf),

    /// delete-version refused because one or more pins target the victim.
    #[error("cannot delete version {}: pinned by {}", .version, .pins.join(", "))]
    PinOnVictim { version: String, pins: Vec<String> },

    /// The next version number would exceed the design maximum of 9999.
    #[error("asset has too many revisions (maximum is 9999)")]
    VersionOverflow,

    /// The mkdir reservation loop ran out of attempts.
    #[error("could not reserve a version for {} after {} attempts", .asset, .attempts)]
    ReservationExhausted { asset: String, attempts: u32 },

    /// A pin (or the `.metadata` link) would overwrite something that is
    /// not a symlink.
    #[error("refusing to overwrite {0}: it exists but is not a symlink")]
    PinOverwriteNonLink(String),

    /// The source path of a publish (or a thumbnail) was not found.
    #[error("source path not found: {}", .0.display())]
    SourceMissing(PathBuf),

    /// The asset parent directory is missing or not a directory.
    #[error("asset parent is unusable: {}", .0.display())]
    DestinationUnusable(PathBuf),

    /// Verify-copy found differing digests between the source and its
    /// pool copy.
    #[error(
        "copy verification failed: {} ({}) differs from {} ({})",
        .source_file.display(), .source_digest, .pool_file.display(), .pool_digest
    )]
    PoolCorruption {
        source_file: PathBuf,
        source_digest: String,
        pool_file: PathBuf,
        pool_digest: String,
    },

    /// A thumbnail file name does not match `<asset>.<frame>.<ext>`.
    #[error("thumbnail {file} is not named {asset}.<frame>.<ext>")]
    ThumbnailNameInvalid { file: String, asset: String },

    /// Thumbnail frame numbers must run 1..=N with no holes, and the
    /// poster frame must be one of them.
    #[error("thumbnail frames do not form a contiguous range starting at 1")]
    ThumbnailRangeNonContiguous,

    /// Asset name validation failure (see [`NameError`]).
    #[error(transparent)]
    Name(#[from] NameError),
}

impl StoreError {
    /// Stable numeric code for this error.
    pub fn code(&self) -> i32 {
        match self {
            StoreError::Io(_) => 1,
            StoreError::VersionMissing(_) => 100,
            StoreError::MetadataMissing(_) => 101,
            StoreError::PinOnVictim { .. } => 102,
            StoreError::VersionOverflow => 103,
            StoreError::ReservationExhausted { .. } => 105,
            StoreError::PinOverwriteNonLink(_) => 106,
            StoreError::SourceMissing(_) => 107,
            StoreError::DestinationUnusable(_) => 108,
            StoreError::PoolCorruption { .. } => 110,
            StoreError::ThumbnailNameInvalid { .. } => 111,
            StoreError::ThumbnailRangeNonContiguous => 112,
            StoreError::Name(e) => e.code(),
        }
    }
}

/// Ways an asset name can fail validation against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("name contains doubled underscores")]
    DoubledUnderscore,

    #[error("name begins with an underscore")]
    LeadingUnderscore,

    #[error("name ends with an underscore")]
    TrailingUnderscore,

    #[error("name does not end with a one or two letter uppercase variant")]
    MissingVariant,

    #[error("name does not begin with any known schema token")]
    MissingTokens,

    #[error("token path {0} does not reach a leaf of the schema")]
    IncompleteTokens(String),

    #[error("name has no description between the tokens and the variant")]
    MissingDescription,
}

impl NameError {
    pub fn code(&self) -> i32 {
        match self {
            NameError::DoubledUnderscore => 900,
            NameError::MissingVariant => 901,
            NameError::MissingTokens => 904,
            NameError::IncompleteTokens(_) => 905,
            NameError::MissingDescription => 906,
            NameError::LeadingUnderscore => 907,
            NameError::TrailingUnderscore => 908,
        }
    }
}
