//! Name matching over an already-listed folder.
//!
//! Everything here is pure: the caller supplies the file list (normally from
//! the session cache) and the URL formatter.

use std::collections::BTreeMap;

use crate::store::{FileEntry, PublicUrls, DELIMITER};

const SUFFIX_SEPARATOR: char = '_';

/// Numeric suffix → entry for one base name. Suffix 0 means "no suffix".
pub type BaseNameGroup<'a> = BTreeMap<u64, &'a FileEntry>;

/// Name without its extension: everything before the last `.`.
pub fn stem_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(index) => &name[..index],
        None => name,
    }
}

fn eq_ignore_case(left: &str, right: &str) -> bool {
    left == right || left.to_lowercase() == right.to_lowercase()
}

/// Splits a stem into its base name and numeric suffix.
///
/// `logo` → `("logo", 0)`, `logo_2` → `("logo", 2)`. A suffix that is not
/// made of ASCII digits only (including one containing a second `_`) yields
/// `None`.
pub fn split_base_name(stem: &str) -> Option<(&str, u64)> {
    match stem.split_once(SUFFIX_SEPARATOR) {
        None => Some((stem, 0)),
        Some((base, suffix)) => {
            if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            suffix.parse().ok().map(|number| (base, number))
        }
    }
}

/// Appends the delimiter when missing. The rest of the name is kept as is,
/// spaces included, since it is part of the object prefix.
pub fn normalize_folder_path(folder: &str) -> String {
    if folder.ends_with(DELIMITER) {
        folder.to_string()
    } else {
        format!("{folder}{DELIMITER}")
    }
}

pub fn find_by_exact_stem(
    urls: &PublicUrls,
    folder_prefix: &str,
    files: &[FileEntry],
    target_stem: &str,
) -> Vec<String> {
    files
        .iter()
        .filter(|file| eq_ignore_case(stem_of(&file.name), target_stem))
        .map(|file| urls.for_file(folder_prefix, file))
        .collect()
}

/// Groups the entries whose base name matches `base_name`. When two entries
/// share a suffix the one listed later replaces the earlier one.
pub fn group_by_base_name<'a>(files: &'a [FileEntry], base_name: &str) -> BaseNameGroup<'a> {
    let mut group = BaseNameGroup::new();
    for file in files {
        let Some((base, suffix)) = split_base_name(stem_of(&file.name)) else {
            continue;
        };
        if eq_ignore_case(base, base_name) {
            if let Some(previous) = group.insert(suffix, file) {
                tracing::debug!(
                    suffix,
                    replaced = %previous.name,
                    kept = %file.name,
                    "duplicate suffix in base-name group"
                );
            }
        }
    }
    group
}

/// URLs of `base_name` and its numbered variants, in ascending suffix order.
pub fn find_by_base_name(
    urls: &PublicUrls,
    folder_prefix: &str,
    files: &[FileEntry],
    base_name: &str,
) -> Vec<String> {
    group_by_base_name(files, base_name)
        .into_values()
        .map(|file| urls.for_file(folder_prefix, file))
        .collect()
}

/// Case-insensitive starts-with filter for search-as-you-type.
pub fn filter_by_prefix(names: &[String], prefix: &str) -> Vec<String> {
    let prefix = prefix.to_lowercase();
    names
        .iter()
        .filter(|name| name.to_lowercase().starts_with(&prefix))
        .cloned()
        .collect()
}
