//! Mount table parsing.
//!
//! Live mount state is read from `/proc/self/mounts` rather than inferred
//! from directory contents. Fields are separated by whitespace and the kernel
//! escapes space, tab, newline and backslash in paths as octal (`\040`).

use std::path::{Path, PathBuf};

/// One line of the mount table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub target: PathBuf,
    pub fstype: String,
}

/// Parse mount table contents. Malformed lines are skipped.
pub fn parse(contents: &str) -> Vec<MountEntry> {
    contents
        .lines()
        .filter_map(|line| {
            // <source> <target> <fstype> <options> <dump> <pass>
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            let fstype = fields.next()?;
            Some(MountEntry {
                source: unescape(source),
                target: PathBuf::from(unescape(target)),
                fstype: fstype.to_string(),
            })
        })
        .collect()
}

/// Most recent entry mounted at `target`, if any.
///
/// Later lines shadow earlier ones when a path is mounted over.
pub fn find(contents: &str, target: &Path) -> Option<MountEntry> {
    parse(contents)
        .into_iter()
        .rev()
        .find(|entry| entry.target == target)
}

fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let octal = (bytes[i] == b'\\' && i + 3 < bytes.len())
            .then(|| &bytes[i + 1..i + 4])
            .filter(|digits| digits.iter().all(|b| (b'0'..=b'7').contains(b)))
            .map(|digits| {
                digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'))
            })
            .and_then(|code| u8::try_from(code).ok());

        if let Some(code) = octal {
            out.push(code);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
