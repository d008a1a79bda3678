use std::path::Path;

use crate::shared::outcome::FailureKind;

/// Derives the subject label for an image.
///
/// A non-empty `label_override` wins for every file. Otherwise the label is
/// the exact name of the file's immediate parent directory (lossy UTF-8, no
/// trimming or case folding). A file whose parent is the dataset root itself,
/// or that does not live under the root at all, has no label.
pub fn label_for(
    path: &Path,
    root: &Path,
    label_override: Option<&str>,
) -> Result<String, FailureKind> {
    if let Some(name) = label_override.filter(|name| !name.is_empty()) {
        return Ok(name.to_string());
    }

    let parent = path.parent().ok_or(FailureKind::NoLabel)?;
    if parent == root || !parent.starts_with(root) {
        return Err(FailureKind::NoLabel);
    }

    parent
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .ok_or(FailureKind::NoLabel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::immediate_parent("/data/alice/1.jpg", "alice")]
    #[case::nested_uses_innermost("/data/people/bob/2.jpg", "bob")]
    #[case::spaces_preserved("/data/sub dir/3.jpg", "sub dir")]
    #[case::case_preserved("/data/Magic Johnson/4.jpg", "Magic Johnson")]
    fn test_label_is_parent_directory(#[case] path: &str, #[case] expected: &str) {
        let label = label_for(Path::new(path), Path::new("/data"), None).unwrap();
        assert_eq!(label, expected);
    }

    #[test]
    fn test_file_directly_under_root_has_no_label() {
        let result = label_for(Path::new("/data/1.jpg"), Path::new("/data"), None);
        assert_eq!(result, Err(FailureKind::NoLabel));
    }

    #[test]
    fn test_file_outside_root_has_no_label() {
        let result = label_for(Path::new("/other/alice/1.jpg"), Path::new("/data"), None);
        assert_eq!(result, Err(FailureKind::NoLabel));
    }

    #[rstest]
    #[case("/data/alice/1.jpg")]
    #[case("/data/1.jpg")]
    #[case("/data/a/b/c/1.jpg")]
    fn test_override_applies_everywhere(#[case] path: &str) {
        let label = label_for(Path::new(path), Path::new("/data"), Some("unknown")).unwrap();
        assert_eq!(label, "unknown");
    }

    #[test]
    fn test_empty_override_falls_back_to_directory() {
        let label = label_for(Path::new("/data/alice/1.jpg"), Path::new("/data"), Some("")).unwrap();
        assert_eq!(label, "alice");
    }
}
