use std::path::PathBuf;

/// The three on-disk artifacts backing one named memory set.
pub struct StorePaths {
    pub index: PathBuf,
    pub text: PathBuf,
    pub meta: PathBuf,
}

/// Resolves `base` to its three store paths. If `base` already contains a
/// path separator it is used verbatim; otherwise it is placed under `db/`.
pub fn resolve(base: &str) -> StorePaths {
    let root = if base.contains('/') || base.contains(std::path::MAIN_SEPARATOR) {
        PathBuf::from(base)
    } else {
        PathBuf::from("db").join(base)
    };
    StorePaths {
        index: root.with_extension("memo"),
        text: root.with_extension("txt"),
        meta: root.with_extension("meta"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_base_is_placed_under_db() {
        let paths = resolve("notes");
        assert_eq!(paths.index, PathBuf::from("db/notes.memo"));
        assert_eq!(paths.text, PathBuf::from("db/notes.txt"));
        assert_eq!(paths.meta, PathBuf::from("db/notes.meta"));
    }

    #[test]
    fn base_with_separator_is_used_verbatim() {
        let paths = resolve("/tmp/custom/notes");
        assert_eq!(paths.index, PathBuf::from("/tmp/custom/notes.memo"));
        assert_eq!(paths.text, PathBuf::from("/tmp/custom/notes.txt"));
        assert_eq!(paths.meta, PathBuf::from("/tmp/custom/notes.meta"));
    }
}
