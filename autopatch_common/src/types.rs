use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A relative path present in at least one of the two trees
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilePair {
    /// Path relative to the scope subdirectory
    pub relative_path: PathBuf,
    pub left_exists: bool,
    pub right_exists: bool,
}

impl FilePair {
    pub fn is_added(&self) -> bool {
        !self.left_exists && self.right_exists
    }

    pub fn is_removed(&self) -> bool {
        self.left_exists && !self.right_exists
    }

    pub fn change_kind(&self) -> ChangeKind {
        if self.is_added() {
            ChangeKind::Added
        } else if self.is_removed() {
            ChangeKind::Removed
        } else {
            ChangeKind::Modified
        }
    }
}

/// How a file changed between the left and right tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Modified,
    Added,
    Removed,
}

/// A patch file written for one relative path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenPatch {
    pub relative_path: PathBuf,
    pub patch_path: PathBuf,
    pub change: ChangeKind,
    pub bytes: u64,
}

/// Outcome of one generation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchReport {
    pub written: Vec<WrittenPatch>,
    pub unchanged: Vec<PathBuf>,
}

impl PatchReport {
    pub fn files_processed(&self) -> usize {
        self.written.len() + self.unchanged.len()
    }

    pub fn count(&self, change: ChangeKind) -> usize {
        self.written.iter().filter(|p| p.change == change).count()
    }

    /// Sort both lists by relative path
    pub fn normalize(&mut self) {
        self.written
            .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        self.unchanged.sort();
    }
}

/// Line diff algorithm used by the in-process engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAlgorithm {
    #[default]
    Myers,
    Patience,
}

/// Which diff engine backs a run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DiffEngineKind {
    /// Line diff computed inside the process
    #[default]
    InProcess,
    /// A `diff -u` compatible program found on PATH or given by path
    External { program: String },
}

/// Settings handed to the diff engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSettings {
    /// Unchanged lines kept around each change
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    #[serde(default)]
    pub algorithm: DiffAlgorithm,

    /// Treat `\r\n` and `\n` line endings as equal
    #[serde(default)]
    pub ignore_cr_at_eol: bool,

    #[serde(default)]
    pub engine: DiffEngineKind,
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            algorithm: DiffAlgorithm::default(),
            ignore_cr_at_eol: false,
            engine: DiffEngineKind::default(),
        }
    }
}

/// Options for one patch generation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOptions {
    /// Report every processed file at info level
    #[serde(default)]
    pub verbose: bool,

    /// Environment passed to an external diff program
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Text prepended verbatim to every patch file
    #[serde(default)]
    pub patch_header: String,

    /// Appended to each relative path to form the patch file name
    #[serde(default = "default_patch_suffix")]
    pub patch_file_name_suffix: String,

    /// Restrict the comparison to this subdirectory of both trees
    #[serde(default)]
    pub scope_subdirectory: Option<PathBuf>,

    /// Drop file header lines and reduce hunk headers to a bare `@@`
    #[serde(default)]
    pub strip_file_names_and_line_numbers: bool,

    /// Ignore patterns (e.g., "*.o", "node_modules/")
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Whether to follow symbolic links
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Diff and write file pairs on the rayon thread pool
    #[serde(default)]
    pub parallel: bool,

    #[serde(default)]
    pub diff: DiffSettings,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            environment: BTreeMap::new(),
            patch_header: String::new(),
            patch_file_name_suffix: default_patch_suffix(),
            scope_subdirectory: None,
            strip_file_names_and_line_numbers: false,
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
            parallel: false,
            diff: DiffSettings::default(),
        }
    }
}

fn default_context_lines() -> usize {
    3
}

fn default_patch_suffix() -> String {
    ".patch".to_string()
}
