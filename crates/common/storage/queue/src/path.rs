// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entry naming: `<prefix>/<sequence:010>-<sub_index:02>`.

use snafu::ensure;

use crate::{Result, error::InvalidPrefixSnafu};

/// Decimal digits of the sequence part of an entry name.
pub const SEQUENCE_DIGITS: usize = 10;

/// Length of a bare entry name: `NNNNNNNNNN-SS`.
pub const ENTRY_NAME_LEN: usize = SEQUENCE_DIGITS + 1 + 2;

/// Normalizes a queue prefix to a leading `/` and no trailing `/`.
///
/// An empty prefix stays empty and addresses the filesystem root.
pub fn normalize_prefix(prefix: &str) -> String {
    let mut normalized = if prefix.is_empty() || prefix.starts_with('/') {
        prefix.to_owned()
    } else {
        format!("/{prefix}")
    };
    while normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Rejects prefixes whose entry paths would not fit in `max_path_len`.
pub fn validate_prefix(prefix: &str, max_path_len: usize) -> Result<()> {
    let path_len = prefix.len() + 1 + ENTRY_NAME_LEN;
    ensure!(
        path_len <= max_path_len,
        InvalidPrefixSnafu {
            prefix,
            reason: format!("entry paths would be {path_len} bytes, limit is {max_path_len}"),
        }
    );
    ensure!(
        !prefix.contains("//"),
        InvalidPrefixSnafu {
            prefix,
            reason: "empty path component",
        }
    );
    Ok(())
}

/// Generates an entry name: `NNNNNNNNNN-SS`.
pub fn entry_name(sequence: u32, sub_index: u8) -> String {
    format!("{sequence:010}-{sub_index:02}")
}

/// Returns the full path of an entry under `prefix`.
pub fn entry_path(prefix: &str, sequence: u32, sub_index: u8) -> String {
    child_path(prefix, &entry_name(sequence, sub_index))
}

pub fn child_path(prefix: &str, name: &str) -> String { format!("{prefix}/{name}") }

/// Strips any directory part some drivers include in enumerated names.
pub fn bare_name(name: &str) -> &str { name.rsplit('/').next().unwrap_or(name) }

/// Decodes the sequence number from a bare entry name.
///
/// Reads the leading digits of the first [`SEQUENCE_DIGITS`] characters.
/// Returns `None` for names that do not start with a number, that decode to
/// zero unless the field is literally `"0"`, or that overflow `u32`.
pub fn parse_sequence(name: &str) -> Option<u32> {
    let end = name
        .char_indices()
        .nth(SEQUENCE_DIGITS)
        .map_or(name.len(), |(idx, _)| idx);
    let field = &name[..end];
    let digits = field.bytes().take_while(u8::is_ascii_digit).count();
    let value: u64 = field[..digits].parse().ok()?;
    if value == 0 && field != "0" {
        return None;
    }
    u32::try_from(value).ok()
}
