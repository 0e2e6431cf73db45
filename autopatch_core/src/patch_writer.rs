use autopatch_common::{AutoPatchError, ChangeKind, WrittenPatch};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes one patch file per non-empty diff under an output root
#[derive(Debug, Clone)]
pub struct PatchWriter {
    output_root: PathBuf,
    header: String,
    suffix: String,
    verbose: bool,
}

impl PatchWriter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            header: String::new(),
            suffix: ".patch".to_string(),
            verbose: false,
        }
    }

    /// Text written verbatim before every diff
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// `<output_root>/<relative_path><suffix>`
    pub fn patch_path(&self, relative_path: &Path) -> PathBuf {
        let mut name = OsString::from(relative_path.as_os_str());
        name.push(&self.suffix);
        self.output_root.join(name)
    }

    /// Write `diff` for `relative_path`, or do nothing if `diff` is empty.
    ///
    /// Returns the written patch, `None` when nothing was written.
    pub fn write(
        &self,
        relative_path: &Path,
        change: ChangeKind,
        diff: &[u8],
    ) -> Result<Option<WrittenPatch>, AutoPatchError> {
        if diff.is_empty() {
            if self.verbose {
                info!("{}: no changes", relative_path.display());
            } else {
                debug!("{}: no changes", relative_path.display());
            }
            return Ok(None);
        }

        let patch_path = self.patch_path(relative_path);
        if let Some(parent) = patch_path.parent() {
            fs::create_dir_all(parent).map_err(|source| AutoPatchError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut contents = Vec::with_capacity(self.header.len() + diff.len());
        contents.extend_from_slice(self.header.as_bytes());
        contents.extend_from_slice(diff);

        fs::write(&patch_path, &contents).map_err(|source| AutoPatchError::Write {
            path: patch_path.clone(),
            source,
        })?;

        if self.verbose {
            info!(
                "{}: wrote {} ({} bytes)",
                relative_path.display(),
                patch_path.display(),
                contents.len()
            );
        } else {
            debug!("Wrote {}", patch_path.display());
        }

        Ok(Some(WrittenPatch {
            relative_path: relative_path.to_path_buf(),
            patch_path,
            change,
            bytes: contents.len() as u64,
        }))
    }
}
