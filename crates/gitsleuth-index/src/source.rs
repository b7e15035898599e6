//! Repository file discovery.

use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};

/// Extensions accepted by [`WalkSource`], lowercase with leading dot.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".ts", ".jsx", ".tsx", ".java", ".cpp", ".c", ".h", ".cs", ".php", ".rb", ".go",
    ".rs", ".swift", ".kt", ".scala", ".md", ".txt", ".json", ".yaml", ".yml", ".xml", ".html",
    ".css", ".scss", ".sass", ".less", ".vue", ".svelte",
];

/// Directory names never descended into.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    "venv",
    "env",
    ".venv",
    ".env",
    "dist",
    "build",
    "target",
    ".next",
    ".nuxt",
    "coverage",
    ".nyc_output",
    "vendor",
    "bower_components",
    ".gradle",
    ".idea",
    ".vscode",
];

/// Files larger than this are skipped (1 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// A file to index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub abs_path: PathBuf,
    /// Path relative to the repository root, `/`-separated.
    pub rel_path: String,
}

impl SourceFile {
    /// Extension with leading dot, lowercased; empty when there is none.
    #[must_use]
    pub fn extension(&self) -> String {
        Path::new(&self.rel_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        self.rel_path.rsplit('/').next().unwrap_or(&self.rel_path)
    }
}

/// Supplies the pre-filtered files of one repository.
pub trait Source: Send + Sync {
    /// Enumerate files to index.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be enumerated at all.
    fn files(&self) -> Result<Vec<SourceFile>>;
}

impl Source for Vec<SourceFile> {
    fn files(&self) -> Result<Vec<SourceFile>> {
        Ok(self.clone())
    }
}

/// Walks a local directory with the `ignore` crate.
#[derive(Debug, Clone)]
pub struct WalkSource {
    root: PathBuf,
    extensions: Vec<String>,
    max_file_size: u64,
}

impl WalkSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Replace the extension allow-list. Entries may omit the leading dot.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| format!(".{}", e.as_ref().trim_start_matches('.').to_ascii_lowercase()))
            .collect();
        self
    }

    fn accepts(&self, file: &SourceFile) -> bool {
        let ext = file.extension();
        !ext.is_empty() && self.extensions.iter().any(|e| *e == ext)
    }
}

impl Source for WalkSource {
    fn files(&self) -> Result<Vec<SourceFile>> {
        if !self.root.is_dir() {
            return Err(IndexError::Source(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let walker = ignore::WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(|entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| IGNORED_DIRS.contains(&name)))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let abs_path = entry.path().to_path_buf();
            let rel_path = abs_path
                .strip_prefix(&self.root)
                .unwrap_or(&abs_path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let file = SourceFile { abs_path, rel_path };
            if !self.accepts(&file) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) if meta.len() > self.max_file_size => {
                    tracing::debug!(file = %file.rel_path, size = meta.len(), "skipping large file");
                }
                Ok(_) => files.push(file),
                Err(e) => tracing::warn!(file = %file.rel_path, "cannot stat file: {e}"),
            }
        }

        tracing::debug!(root = %self.root.display(), files = files.len(), "source enumerated");
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn rel_paths(files: &[SourceFile]) -> Vec<&str> {
        files.iter().map(|f| f.rel_path.as_str()).collect()
    }

    #[test]
    fn walks_allowed_extensions_and_skips_ignored_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.rs", "fn main() {}");
        write(dir.path(), "README.md", "# readme");
        write(dir.path(), "logo.png", "binary");
        write(dir.path(), "node_modules/pkg/index.js", "x");
        write(dir.path(), "target/debug/build.rs", "x");
        write(dir.path(), "app/.venv/lib.py", "x");

        let files = WalkSource::new(dir.path()).files().unwrap();
        assert_eq!(rel_paths(&files), vec!["README.md", "src/main.rs"]);
        assert_eq!(files[1].extension(), ".rs");
        assert_eq!(files[1].file_name(), "main.rs");
    }

    #[test]
    fn large_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "small.py", "x = 1");
        write(dir.path(), "big.py", &"x = 1\n".repeat(100));

        let files = WalkSource::new(dir.path())
            .with_max_file_size(64)
            .files()
            .unwrap();
        assert_eq!(rel_paths(&files), vec!["small.py"]);
    }

    #[test]
    fn custom_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.rs", "fn a() {}");
        write(dir.path(), "b.toml", "[x]");

        let files = WalkSource::new(dir.path())
            .with_extensions(["toml"])
            .files()
            .unwrap();
        assert_eq!(rel_paths(&files), vec!["b.toml"]);
    }

    #[test]
    fn missing_root_is_a_source_error() {
        let err = WalkSource::new("/definitely/not/here").files().unwrap_err();
        assert!(matches!(err, IndexError::Source(_)));
    }

    #[test]
    fn extension_is_lowercased() {
        let file = SourceFile {
            abs_path: PathBuf::from("/r/Main.JAVA"),
            rel_path: "Main.JAVA".into(),
        };
        assert_eq!(file.extension(), ".java");
        let bare = SourceFile {
            abs_path: PathBuf::from("/r/Makefile"),
            rel_path: "Makefile".into(),
        };
        assert_eq!(bare.extension(), "");
    }
}
