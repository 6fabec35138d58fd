//! Destination path resolution.
//!
//! Pure mapping from a source path (plus optional roots and rename rule) to
//! the destination path an operation should produce. No filesystem access.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// Resolve the destination path for a source file.
///
/// - With a `source_root`, the path of `source` relative to that root is
///   preserved under `dest_root`; a source outside the root is an error.
/// - Without a `source_root`, only the base name is used.
/// - When `apply_rename` is set and the prefix or suffix is non-empty, the
///   file stem becomes `prefix + stem + suffix` with the extension kept.
/// - Without a `dest_root` the result stays in the source's own directory,
///   which is what makes in-place renames work.
pub fn resolve_destination(
    source: &Path,
    source_root: Option<&Path>,
    dest_root: Option<&Path>,
    prefix: &str,
    suffix: &str,
    apply_rename: bool,
) -> Result<PathBuf, EngineError> {
    let relative = match source_root {
        Some(root) => source
            .strip_prefix(root)
            .map_err(|_| EngineError::PathOutsideRoot {
                path: source.to_path_buf(),
                root: root.to_path_buf(),
            })?
            .to_path_buf(),
        None => PathBuf::from(source.file_name().ok_or_else(|| EngineError::InvalidPath {
            path: source.to_path_buf(),
            reason: "path has no file name".to_string(),
        })?),
    };

    let file_name = relative
        .file_name()
        .ok_or_else(|| EngineError::InvalidPath {
            path: source.to_path_buf(),
            reason: "path has no file name".to_string(),
        })?
        .to_os_string();

    let new_name = if apply_rename && (!prefix.is_empty() || !suffix.is_empty()) {
        renamed_file_name(Path::new(&file_name), prefix, suffix)
    } else {
        file_name
    };

    let relative_dir = relative.parent().unwrap_or_else(|| Path::new(""));

    match dest_root {
        Some(root) => Ok(root.join(relative_dir).join(new_name)),
        None => {
            let dir = source.parent().unwrap_or_else(|| Path::new(""));
            Ok(dir.join(new_name))
        }
    }
}

/// Apply the prefix/suffix rule to a file name, preserving the extension.
fn renamed_file_name(name: &Path, prefix: &str, suffix: &str) -> OsString {
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut renamed = format!("{prefix}{stem}{suffix}");
    if let Some(ext) = name.extension() {
        renamed.push('.');
        renamed.push_str(&ext.to_string_lossy());
    }
    OsString::from(renamed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_place_rename_with_prefix() {
        let dest = resolve_destination(
            Path::new("/data/report.txt"),
            None,
            None,
            "new_",
            "",
            true,
        )
        .expect("Failed to resolve");
        assert_eq!(dest, PathBuf::from("/data/new_report.txt"));
    }

    #[test]
    fn test_suffix_preserves_extension() {
        let dest = resolve_destination(
            Path::new("/data/report.txt"),
            None,
            None,
            "",
            "_v2",
            true,
        )
        .expect("Failed to resolve");
        assert_eq!(dest, PathBuf::from("/data/report_v2.txt"));
    }

    #[test]
    fn test_roots_preserve_relative_structure() {
        let dest = resolve_destination(
            Path::new("/src/sub/dir/file.log"),
            Some(Path::new("/src")),
            Some(Path::new("/dst")),
            "",
            "",
            false,
        )
        .expect("Failed to resolve");
        assert_eq!(dest, PathBuf::from("/dst/sub/dir/file.log"));
    }

    #[test]
    fn test_rename_rule_ignored_when_not_applied() {
        let dest = resolve_destination(
            Path::new("/src/file.log"),
            Some(Path::new("/src")),
            Some(Path::new("/dst")),
            "pre_",
            "_post",
            false,
        )
        .expect("Failed to resolve");
        assert_eq!(dest, PathBuf::from("/dst/file.log"));
    }

    #[test]
    fn test_rename_rule_applied_under_roots() {
        let dest = resolve_destination(
            Path::new("/src/sub/file.log"),
            Some(Path::new("/src")),
            Some(Path::new("/dst")),
            "pre_",
            "_post",
            true,
        )
        .expect("Failed to resolve");
        assert_eq!(dest, PathBuf::from("/dst/sub/pre_file_post.log"));
    }

    #[test]
    fn test_no_source_root_uses_base_name_only() {
        let dest = resolve_destination(
            Path::new("/deep/nested/file.txt"),
            None,
            Some(Path::new("/dst")),
            "",
            "",
            false,
        )
        .expect("Failed to resolve");
        assert_eq!(dest, PathBuf::from("/dst/file.txt"));
    }

    #[test]
    fn test_source_outside_root_is_an_error() {
        let result = resolve_destination(
            Path::new("/elsewhere/file.txt"),
            Some(Path::new("/src")),
            Some(Path::new("/dst")),
            "",
            "",
            false,
        );
        assert!(matches!(result, Err(EngineError::PathOutsideRoot { .. })));
    }

    #[test]
    fn test_file_without_extension() {
        let dest = resolve_destination(Path::new("/data/Makefile"), None, None, "old_", "", true)
            .expect("Failed to resolve");
        assert_eq!(dest, PathBuf::from("/data/old_Makefile"));
    }

    #[test]
    fn test_empty_rule_keeps_name_even_when_applied() {
        let dest = resolve_destination(Path::new("/data/file.txt"), None, None, "", "", true)
            .expect("Failed to resolve");
        assert_eq!(dest, PathBuf::from("/data/file.txt"));
    }
}
