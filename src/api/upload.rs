//! Upload validation.
//!
//! Uploaded annotation blobs are checked synchronously before a job is
//! created: size cap, expected extension, UTF-8, and a recognizable
//! version header.

/// 100 MiB cap on uploaded blobs.
pub const MAX_FILE_SIZE: usize = 100 * 1024 * 1024;

const EXPECTED_EXTENSION: &str = ".csv_bi";

#[derive(Debug, Clone)]
pub enum UploadError {
    TooLarge(usize),
    BadExtension(String),
    NotUtf8,
    Empty,
    MissingHeader,
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLarge(size) => write!(f, "file too large: {size} bytes"),
            Self::BadExtension(name) => write!(f, "invalid extension: {name}"),
            Self::NotUtf8 => write!(f, "file is not valid UTF-8"),
            Self::Empty => write!(f, "empty file"),
            Self::MissingHeader => write!(f, "missing version header"),
        }
    }
}

impl std::error::Error for UploadError {}

/// Validate one uploaded annotation blob.
pub fn validate_csv_bi(content: &[u8], filename: &str) -> Result<(), UploadError> {
    if content.len() > MAX_FILE_SIZE {
        return Err(UploadError::TooLarge(content.len()));
    }
    if !filename.ends_with(EXPECTED_EXTENSION) {
        return Err(UploadError::BadExtension(filename.to_string()));
    }

    let text = std::str::from_utf8(content).map_err(|_| UploadError::NotUtf8)?;
    let Some(first_line) = text.trim().lines().next() else {
        return Err(UploadError::Empty);
    };
    if !(first_line.starts_with("version =") || first_line.starts_with("# version =")) {
        return Err(UploadError::MissingHeader);
    }

    Ok(())
}
