use std::collections::HashMap;
use std::ffi::OsStr;

use crate::config::BlockFileDefaults;
use crate::constants::create_options;
use crate::errors::{BlockError, BlockResult};
use crate::state::BlockVolume;
use crate::types::{Bytes, FilenameFormat, Filesystem, validate_volume_name};

/// Create options resolved against the process defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CreateRequest {
    pub filesystem: Filesystem,
    pub size: Bytes,
    /// Backing file name rendered from the filename format.
    pub file_name: String,
}

impl CreateRequest {
    pub(crate) fn resolve(
        name: &str,
        defaults: &BlockFileDefaults,
        options: &HashMap<String, String>,
    ) -> BlockResult<Self> {
        validate_volume_name(name)?;

        if let Some(unknown) = options
            .keys()
            .find(|key| !create_options::ALL.contains(&key.as_str()))
        {
            return Err(BlockError::InvalidArgument(format!(
                "unknown option '{unknown}' (supported: {})",
                create_options::ALL.join(", ")
            )));
        }

        let filesystem = match options.get(create_options::FILESYSTEM) {
            Some(value) => value.parse()?,
            None => defaults.filesystem,
        };
        let size = match options.get(create_options::SIZE) {
            Some(value) => value.parse()?,
            None => defaults.size,
        };
        let format = match options.get(create_options::FILENAME_FORMAT) {
            Some(value) => FilenameFormat::new(value.as_str())?,
            None => defaults.filename_format.clone(),
        };

        Ok(Self {
            filesystem,
            size,
            file_name: format.render(name)?,
        })
    }

    /// Why an existing record does not satisfy this request, if it doesn't.
    pub(crate) fn mismatch(&self, existing: &BlockVolume) -> Option<String> {
        if existing.filesystem != self.filesystem {
            return Some(format!(
                "filesystem {} requested, volume has {}",
                self.filesystem, existing.filesystem
            ));
        }
        if existing.size_bytes != self.size {
            return Some(format!(
                "size {} requested, volume has {}",
                self.size, existing.size_bytes
            ));
        }
        if existing.backing_file.file_name() != Some(OsStr::new(&self.file_name)) {
            return Some(format!(
                "backing file {} requested, volume uses {}",
                self.file_name,
                existing.backing_file.display()
            ));
        }
        None
    }
}
