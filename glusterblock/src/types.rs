//! Strongly typed values resolved from configuration and create options.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{BlockError, BlockResult};

// ============================================================================
// BYTES
// ============================================================================

/// Byte size of a backing file.
///
/// # Example
///
/// ```
/// use glusterblock::types::Bytes;
///
/// let size: Bytes = "10G".parse().unwrap();
/// assert_eq!(size, Bytes::from_gib(10));
/// assert_eq!(size.to_string(), "10 GiB");
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Bytes(pub u64);

impl Bytes {
    #[inline]
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn from_mib(mib: u64) -> Self {
        Self(mib * 1024 * 1024)
    }

    #[inline]
    pub const fn from_gib(gib: u64) -> Self {
        Self(gib * 1024 * 1024 * 1024)
    }

    #[inline]
    pub const fn as_bytes(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Bytes {
    fn from(bytes: u64) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: &[(u64, &str)] = &[
            (1 << 40, "TiB"),
            (1 << 30, "GiB"),
            (1 << 20, "MiB"),
            (1 << 10, "KiB"),
        ];
        for (scale, unit) in UNITS {
            if self.0 >= *scale && self.0.is_multiple_of(*scale) {
                return write!(f, "{} {}", self.0 / scale, unit);
            }
        }
        write!(f, "{} bytes", self.0)
    }
}

/// Parses `1024`, `512M`, `10G`, `10Gi`, `10GiB`, `2t` and similar.
///
/// Suffixes are binary multiples. Zero is rejected because a zero-length
/// backing file cannot hold a filesystem.
impl FromStr for Bytes {
    type Err = BlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(raw.len());
        let (digits, suffix) = raw.split_at(split);

        if digits.is_empty() {
            return Err(BlockError::InvalidArgument(format!("invalid size '{s}'")));
        }
        let value: u64 = digits
            .parse()
            .map_err(|e| BlockError::InvalidArgument(format!("invalid size '{s}': {e}")))?;

        let shift = match suffix.to_ascii_lowercase().as_str() {
            "" | "b" => 0,
            "k" | "ki" | "kb" | "kib" => 10,
            "m" | "mi" | "mb" | "mib" => 20,
            "g" | "gi" | "gb" | "gib" => 30,
            "t" | "ti" | "tb" | "tib" => 40,
            "p" | "pi" | "pb" | "pib" => 50,
            other => {
                return Err(BlockError::InvalidArgument(format!(
                    "invalid size '{s}': unknown unit '{other}'"
                )));
            }
        };

        let bytes = value
            .checked_mul(1u64 << shift)
            .ok_or_else(|| BlockError::InvalidArgument(format!("size '{s}' overflows")))?;
        if bytes == 0 {
            return Err(BlockError::InvalidArgument(format!(
                "size '{s}' must be greater than zero"
            )));
        }
        Ok(Self(bytes))
    }
}

// ============================================================================
// FILESYSTEM
// ============================================================================

/// Filesystem a backing file is formatted with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filesystem {
    Ext2,
    Ext3,
    #[default]
    Ext4,
    Xfs,
    Btrfs,
}

impl Filesystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Xfs => "xfs",
            Self::Btrfs => "btrfs",
        }
    }

    /// Name of the formatting utility, e.g. `mkfs.ext4`.
    pub fn mkfs_program(&self) -> String {
        format!("mkfs.{}", self.as_str())
    }

    /// Arguments that make the formatting utility overwrite without prompting.
    pub fn mkfs_force_args(&self) -> &'static [&'static str] {
        match self {
            // mke2fs asks before formatting a regular file unless forced
            Self::Ext2 | Self::Ext3 | Self::Ext4 => &["-F", "-q"],
            Self::Xfs => &["-f", "-q"],
            Self::Btrfs => &["-f", "-q"],
        }
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown filesystem identifiers are a [`BlockError::Format`] error.
impl FromStr for Filesystem {
    type Err = BlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ext2" => Ok(Self::Ext2),
            "ext3" => Ok(Self::Ext3),
            "ext4" => Ok(Self::Ext4),
            "xfs" => Ok(Self::Xfs),
            "btrfs" => Ok(Self::Btrfs),
            other => Err(BlockError::Format(format!(
                "unsupported filesystem '{other}'"
            ))),
        }
    }
}

// ============================================================================
// FILENAME FORMAT
// ============================================================================

/// Placeholder substituted with the volume name.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Template deriving a backing file name from a volume name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilenameFormat(String);

impl FilenameFormat {
    pub fn new(template: impl Into<String>) -> BlockResult<Self> {
        let template = template.into();
        if !template.contains(NAME_PLACEHOLDER) {
            return Err(BlockError::InvalidArgument(format!(
                "filename format '{template}' must contain {NAME_PLACEHOLDER}"
            )));
        }
        if template.contains('/') {
            return Err(BlockError::InvalidArgument(format!(
                "filename format '{template}' must not contain '/'"
            )));
        }
        Ok(Self(template))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the backing file name for `name`.
    pub fn render(&self, name: &str) -> BlockResult<String> {
        validate_volume_name(name)?;
        let file_name = self.0.replace(NAME_PLACEHOLDER, name);
        if file_name == "." || file_name == ".." {
            return Err(BlockError::InvalidArgument(format!(
                "filename format '{}' renders to '{file_name}'",
                self.0
            )));
        }
        Ok(file_name)
    }
}

impl Default for FilenameFormat {
    fn default() -> Self {
        Self(format!("{NAME_PLACEHOLDER}.img"))
    }
}

impl TryFrom<String> for FilenameFormat {
    type Error = BlockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FilenameFormat> for String {
    fn from(format: FilenameFormat) -> Self {
        format.0
    }
}

impl fmt::Display for FilenameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Volume names become path components, so they are restricted to a single
/// non-special component.
pub fn validate_volume_name(name: &str) -> BlockResult<()> {
    if name.is_empty() {
        return Err(BlockError::InvalidArgument(
            "volume name must not be empty".to_string(),
        ));
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(BlockError::InvalidArgument(format!(
            "invalid volume name '{}'",
            name.escape_default()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sizes() {
        let cases = [
            ("1024", 1024),
            ("4k", 4 * 1024),
            ("512M", 512 * 1024 * 1024),
            ("10G", 10 * 1024 * 1024 * 1024),
            ("10Gi", 10 * 1024 * 1024 * 1024),
            ("10GiB", 10 * 1024 * 1024 * 1024),
            ("1T", 1 << 40),
            (" 2g ", 2 * 1024 * 1024 * 1024),
        ];
        for (input, expected) in cases {
            let parsed: Bytes = input.parse().unwrap();
            assert_eq!(parsed.as_bytes(), expected, "input {input}");
        }
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        for input in ["", "G", "0", "0G", "10X", "-1G", "1.5G", "99999999999P"] {
            let result = input.parse::<Bytes>();
            assert!(
                matches!(result, Err(BlockError::InvalidArgument(_))),
                "input {input:?} gave {result:?}"
            );
        }
    }

    #[test]
    fn test_bytes_display() {
        assert_eq!(Bytes::from_gib(10).to_string(), "10 GiB");
        assert_eq!(Bytes::from_mib(1536).to_string(), "1536 MiB");
        assert_eq!(Bytes(1000).to_string(), "1000 bytes");
    }

    #[test]
    fn test_filesystem_parse() {
        assert_eq!("ext4".parse::<Filesystem>().unwrap(), Filesystem::Ext4);
        assert_eq!("XFS".parse::<Filesystem>().unwrap(), Filesystem::Xfs);
        assert!(matches!(
            "zfs".parse::<Filesystem>(),
            Err(BlockError::Format(_))
        ));
    }

    #[test]
    fn test_filesystem_serde_lowercase() {
        let json = serde_json::to_string(&Filesystem::Btrfs).unwrap();
        assert_eq!(json, "\"btrfs\"");
    }

    #[test]
    fn test_filename_format_render() {
        let format = FilenameFormat::default();
        assert_eq!(format.render("db").unwrap(), "db.img");

        let format = FilenameFormat::new("vol-{name}.raw").unwrap();
        assert_eq!(format.render("db").unwrap(), "vol-db.raw");
    }

    #[test]
    fn test_filename_format_validation() {
        assert!(FilenameFormat::new("static.img").is_err());
        assert!(FilenameFormat::new("sub/{name}.img").is_err());
        assert!(FilenameFormat::new("{name}").unwrap().render("..").is_err());
    }

    #[test]
    fn test_volume_name_validation() {
        assert!(validate_volume_name("db-01").is_ok());
        assert!(validate_volume_name("").is_err());
        assert!(validate_volume_name("a/b").is_err());
        assert!(validate_volume_name(".").is_err());
        assert!(validate_volume_name("..").is_err());
    }
}
