use crate::unified::{labels, UnifiedDiffRenderer, DEV_NULL};
use autopatch_common::{AutoPatchError, DiffEngineKind, DiffSettings};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// One file pair to diff
#[derive(Debug, Clone)]
pub struct DiffRequest {
    /// Path relative to the tree root, used for labels and error reports
    pub tree_relative_path: PathBuf,
    /// Absolute left file, `None` when the file was added
    pub left: Option<PathBuf>,
    /// Absolute right file, `None` when the file was removed
    pub right: Option<PathBuf>,
    /// Variables for an external diff process, applied over the engine's own
    pub environment: BTreeMap<String, String>,
}

impl DiffRequest {
    pub fn labels(&self) -> (String, String) {
        labels(
            &self.tree_relative_path,
            self.left.is_some(),
            self.right.is_some(),
        )
    }
}

/// Produces unified-diff text for a file pair.
///
/// An empty result means the two sides do not differ. Failures to read
/// either side are errors, never an empty diff.
pub trait DiffEngine: Send + Sync {
    fn unified_diff(&self, request: &DiffRequest) -> Result<Vec<u8>, AutoPatchError>;

    fn name(&self) -> &str;
}

/// Build the engine described by `settings`
pub fn engine_from_settings(
    settings: &DiffSettings,
    environment: &BTreeMap<String, String>,
) -> Box<dyn DiffEngine> {
    match &settings.engine {
        DiffEngineKind::InProcess => Box::new(InProcessDiffEngine::new(settings)),
        DiffEngineKind::External { program } => Box::new(
            ExternalDiffEngine::new(program.clone(), settings).with_environment(environment.clone()),
        ),
    }
}

/// Line diff computed in this process with `similar`
pub struct InProcessDiffEngine {
    renderer: UnifiedDiffRenderer,
}

impl InProcessDiffEngine {
    pub fn new(settings: &DiffSettings) -> Self {
        Self {
            renderer: UnifiedDiffRenderer::new(settings),
        }
    }

    fn read_side(request: &DiffRequest, path: Option<&Path>) -> Result<Option<Vec<u8>>, AutoPatchError> {
        match path {
            Some(path) => fs::read(path).map(Some).map_err(|e| {
                AutoPatchError::diff_invocation(
                    &request.tree_relative_path,
                    format!("cannot read {}: {}", path.display(), e),
                )
            }),
            None => Ok(None),
        }
    }
}

impl Default for InProcessDiffEngine {
    fn default() -> Self {
        Self::new(&DiffSettings::default())
    }
}

impl DiffEngine for InProcessDiffEngine {
    fn unified_diff(&self, request: &DiffRequest) -> Result<Vec<u8>, AutoPatchError> {
        let left = Self::read_side(request, request.left.as_deref())?;
        let right = Self::read_side(request, request.right.as_deref())?;

        if left == right {
            return Ok(Vec::new());
        }

        let (left_label, right_label) = request.labels();
        Ok(self
            .renderer
            .render(left.as_deref(), right.as_deref(), &left_label, &right_label))
    }

    fn name(&self) -> &str {
        "in-process"
    }
}

/// Delegates to a `diff -u` compatible program.
///
/// Exit status 0 means no differences, 1 means differences, anything else
/// is a failure.
pub struct ExternalDiffEngine {
    program: String,
    context_lines: usize,
    ignore_cr_at_eol: bool,
    environment: BTreeMap<String, String>,
}

impl ExternalDiffEngine {
    pub fn new(program: impl Into<String>, settings: &DiffSettings) -> Self {
        Self {
            program: program.into(),
            context_lines: settings.context_lines,
            ignore_cr_at_eol: settings.ignore_cr_at_eol,
            environment: BTreeMap::new(),
        }
    }

    /// Variables set on the child process in addition to the inherited ones
    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    fn build_command(&self, request: &DiffRequest) -> Command {
        let (left_label, right_label) = request.labels();
        let null = Path::new(DEV_NULL);

        let mut command = Command::new(&self.program);
        command
            .arg(format!("-U{}", self.context_lines))
            .arg("-L")
            .arg(left_label)
            .arg("-L")
            .arg(right_label);
        if self.ignore_cr_at_eol {
            command.arg("--strip-trailing-cr");
        }
        command
            .arg(request.left.as_deref().unwrap_or(null))
            .arg(request.right.as_deref().unwrap_or(null))
            .envs(&self.environment)
            .envs(&request.environment)
            .stdin(Stdio::null());
        command
    }
}

impl DiffEngine for ExternalDiffEngine {
    fn unified_diff(&self, request: &DiffRequest) -> Result<Vec<u8>, AutoPatchError> {
        let output = self.build_command(request).output().map_err(|e| {
            AutoPatchError::diff_invocation(
                &request.tree_relative_path,
                format!("cannot run '{}': {}", self.program, e),
            )
        })?;

        match output.status.code() {
            Some(0) => Ok(Vec::new()),
            Some(1) => Ok(output.stdout),
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                debug!("'{}' exited with {:?}: {}", self.program, code, stderr.trim());
                Err(AutoPatchError::diff_invocation(
                    &request.tree_relative_path,
                    format!(
                        "'{}' failed ({}): {}",
                        self.program,
                        output.status,
                        stderr.trim()
                    ),
                ))
            }
        }
    }

    fn name(&self) -> &str {
        &self.program
    }
}
