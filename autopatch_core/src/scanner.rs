use autopatch_common::{AutoPatchError, FilePair, PatchOptions};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Matches relative file paths across the left and right trees
pub struct PathReconciler {
    follow_symlinks: bool,
    ignore: Option<Gitignore>,
}

impl PathReconciler {
    /// Fails with a config error when an ignore pattern does not parse
    pub fn new(options: &PatchOptions) -> Result<Self, AutoPatchError> {
        Ok(Self {
            follow_symlinks: options.follow_symlinks,
            ignore: Self::build_ignore(&options.ignore_patterns)?,
        })
    }

    /// Build a Gitignore from ignore patterns
    fn build_ignore(patterns: &[String]) -> Result<Option<Gitignore>, AutoPatchError> {
        if patterns.is_empty() {
            return Ok(None);
        }

        let mut builder = GitignoreBuilder::new("");
        for pattern in patterns {
            builder.add_line(None, pattern).map_err(|e| {
                AutoPatchError::Config(format!("Invalid ignore pattern '{}': {}", pattern, e))
            })?;
        }

        let ignore = builder
            .build()
            .map_err(|e| AutoPatchError::Config(format!("Failed to build ignore matcher: {}", e)))?;
        debug!("Built ignore matcher with {} patterns", patterns.len());
        Ok(Some(ignore))
    }

    /// Every regular file under `scope` in either tree, sorted by relative path.
    ///
    /// Relative paths are taken from the scope directory, not the tree root.
    pub fn reconcile(
        &self,
        left_root: &Path,
        right_root: &Path,
        scope: Option<&Path>,
    ) -> Result<Vec<FilePair>, AutoPatchError> {
        let scope = validate_scope(scope)?;
        let left_base = scoped_root(left_root, scope);
        let right_base = scoped_root(right_root, scope);

        let mut pairs: BTreeMap<PathBuf, FilePair> = BTreeMap::new();

        for path in self.scan_files(&left_base)? {
            pairs.insert(
                path.clone(),
                FilePair {
                    relative_path: path,
                    left_exists: true,
                    right_exists: false,
                },
            );
        }

        for path in self.scan_files(&right_base)? {
            pairs
                .entry(path.clone())
                .or_insert_with(|| FilePair {
                    relative_path: path,
                    left_exists: false,
                    right_exists: false,
                })
                .right_exists = true;
        }

        debug!(
            "Reconciled {} paths between {:?} and {:?}",
            pairs.len(),
            left_base,
            right_base
        );
        Ok(pairs.into_values().collect())
    }

    /// Scan a directory and return the relative paths of all regular files
    pub fn scan_files(&self, root: &Path) -> Result<Vec<PathBuf>, AutoPatchError> {
        if !root.exists() {
            debug!("{:?} does not exist, contributing no paths", root);
            return Ok(Vec::new());
        }
        if !root.is_dir() {
            return Err(AutoPatchError::Path(format!(
                "Scope is not a directory: {}",
                root.display()
            )));
        }

        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .skip_hidden(false)
            .sort(true);

        for entry in walker {
            let entry = entry.map_err(|e| AutoPatchError::Walk(e.to_string()))?;

            let path = entry.path();
            let relative_path = path
                .strip_prefix(root)
                .map_err(|e| AutoPatchError::Path(e.to_string()))?
                .to_path_buf();

            // Skip the synthetic root entry (empty path)
            if relative_path.as_os_str().is_empty() {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            let is_file = if file_type.is_file() {
                true
            } else if self.follow_symlinks && file_type.is_symlink() {
                // Dangling links have no metadata
                fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false)
            } else {
                false
            };

            if !is_file {
                debug!("Skipping non-regular file {:?}", relative_path);
                continue;
            }

            if self.should_ignore_with_parents(&relative_path) {
                continue;
            }

            files.push(relative_path);
        }

        debug!("Scanned {} files from {:?}", files.len(), root);
        Ok(files)
    }

    /// Check if a file or any of its parent directories should be ignored
    fn should_ignore_with_parents(&self, path: &Path) -> bool {
        let Some(ref ignore) = self.ignore else {
            return false;
        };

        if ignore.matched(path, false).is_ignore() {
            return true;
        }

        let mut current = path;
        while let Some(parent) = current.parent() {
            if !parent.as_os_str().is_empty() && ignore.matched(parent, true).is_ignore() {
                return true;
            }
            current = parent;
        }
        false
    }
}

/// Reject absolute scopes and scopes that climb out of the tree.
///
/// An empty scope is the same as no scope.
pub fn validate_scope(scope: Option<&Path>) -> Result<Option<&Path>, AutoPatchError> {
    let Some(scope) = scope.filter(|s| !s.as_os_str().is_empty()) else {
        return Ok(None);
    };

    for component in scope.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(AutoPatchError::Config(format!(
                    "Scope subdirectory must be a relative path inside the tree: {}",
                    scope.display()
                )))
            }
        }
    }

    Ok(Some(scope))
}

fn scoped_root(root: &Path, scope: Option<&Path>) -> PathBuf {
    match scope {
        Some(scope) => root.join(scope),
        None => root.to_path_buf(),
    }
}
