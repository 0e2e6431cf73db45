use crate::diff_engine::{engine_from_settings, DiffEngine, DiffRequest};
use crate::patch_writer::PatchWriter;
use crate::scanner::{validate_scope, PathReconciler};
use crate::unified::{file_header, strip_file_names_and_line_numbers};
use autopatch_common::{
    AutoPatchError, ChangeKind, FilePair, PatchOptions, PatchReport, RootSide, WrittenPatch,
};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

enum Outcome {
    Written(WrittenPatch),
    Unchanged(PathBuf),
}

/// Write one patch file into `output_root` for every file that differs
/// between `left_root` and `right_root`.
///
/// All three roots must be existing directories; this is checked before
/// anything is written. The first diff or write failure aborts the run.
pub fn generate_patch_files(
    left_root: &Path,
    right_root: &Path,
    output_root: &Path,
    options: &PatchOptions,
    engine: &dyn DiffEngine,
) -> Result<PatchReport, AutoPatchError> {
    require_dir(RootSide::Left, left_root)?;
    require_dir(RootSide::Right, right_root)?;
    require_dir(RootSide::Output, output_root)?;

    let scope = validate_scope(options.scope_subdirectory.as_deref())?;

    info!(
        "Generating patches for {} -> {} into {} using {}",
        left_root.display(),
        right_root.display(),
        output_root.display(),
        engine.name()
    );

    let pairs = PathReconciler::new(options)?.reconcile(left_root, right_root, scope)?;
    debug!("{} candidate files", pairs.len());

    let writer = PatchWriter::new(output_root)
        .with_header(options.patch_header.clone())
        .with_suffix(options.patch_file_name_suffix.clone())
        .with_verbose(options.verbose);

    let job = PatchJob {
        left_root,
        right_root,
        scope,
        strip: options.strip_file_names_and_line_numbers,
        environment: &options.environment,
        engine,
        writer: &writer,
    };

    let outcomes: Vec<Outcome> = if options.parallel {
        pairs
            .par_iter()
            .map(|pair| job.process(pair))
            .collect::<Result<_, _>>()?
    } else {
        pairs
            .iter()
            .map(|pair| job.process(pair))
            .collect::<Result<_, _>>()?
    };

    let mut report = PatchReport::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Written(patch) => report.written.push(patch),
            Outcome::Unchanged(path) => report.unchanged.push(path),
        }
    }
    report.normalize();

    info!(
        "Processed {} files: {} patches written ({} added, {} removed), {} unchanged",
        report.files_processed(),
        report.written.len(),
        report.count(ChangeKind::Added),
        report.count(ChangeKind::Removed),
        report.unchanged.len()
    );
    Ok(report)
}

/// Same as [`generate_patch_files`] with the engine described by
/// `options.diff`
pub fn generate_patch_files_with_defaults(
    left_root: &Path,
    right_root: &Path,
    output_root: &Path,
    options: &PatchOptions,
) -> Result<PatchReport, AutoPatchError> {
    let engine = engine_from_settings(&options.diff, &options.environment);
    generate_patch_files(left_root, right_root, output_root, options, engine.as_ref())
}

struct PatchJob<'a> {
    left_root: &'a Path,
    right_root: &'a Path,
    scope: Option<&'a Path>,
    strip: bool,
    environment: &'a BTreeMap<String, String>,
    engine: &'a dyn DiffEngine,
    writer: &'a PatchWriter,
}

impl PatchJob<'_> {
    fn process(&self, pair: &FilePair) -> Result<Outcome, AutoPatchError> {
        let tree_relative_path = match self.scope {
            Some(scope) => scope.join(&pair.relative_path),
            None => pair.relative_path.clone(),
        };

        let request = DiffRequest {
            left: pair
                .left_exists
                .then(|| self.left_root.join(&tree_relative_path)),
            right: pair
                .right_exists
                .then(|| self.right_root.join(&tree_relative_path)),
            tree_relative_path,
            environment: self.environment.clone(),
        };

        let change = pair.change_kind();
        let mut diff = self.engine.unified_diff(&request)?;
        if diff.is_empty() {
            // An empty file added or removed has no hunks; the header alone
            // records the change and survives strip mode
            if change != ChangeKind::Modified {
                let (left_label, right_label) = request.labels();
                diff = file_header(&left_label, &right_label);
            }
        } else if self.strip {
            diff = strip_file_names_and_line_numbers(&diff);
        }

        Ok(match self.writer.write(&pair.relative_path, change, &diff)? {
            Some(patch) => Outcome::Written(patch),
            None => Outcome::Unchanged(pair.relative_path.clone()),
        })
    }
}

fn require_dir(side: RootSide, path: &Path) -> Result<(), AutoPatchError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(AutoPatchError::MissingRoot {
            side,
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff_engine::InProcessDiffEngine;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const HEADER: &str = "This is a generated patch file!\n";
    const SOME_DIR: &str = "some/dir";

    struct Fixture {
        _temp: TempDir,
        left: PathBuf,
        right: PathBuf,
        out: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let left = temp.path().join("left");
            let right = temp.path().join("right");
            let out = temp.path().join("out");
            for dir in [&left, &right, &out] {
                fs::create_dir_all(dir).unwrap();
            }
            Self {
                _temp: temp,
                left,
                right,
                out,
            }
        }

        fn write(root: &Path, path: &str, contents: &str) {
            let file = root.join(path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, contents).unwrap();
        }

        fn left(&self, path: &str, contents: &str) {
            Self::write(&self.left, path, contents);
        }

        fn right(&self, path: &str, contents: &str) {
            Self::write(&self.right, path, contents);
        }

        fn run(&self, options: &PatchOptions) -> Result<PatchReport, AutoPatchError> {
            generate_patch_files_with_defaults(&self.left, &self.right, &self.out, options)
        }

        fn out_files(&self) -> usize {
            jwalk::WalkDir::new(&self.out)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .count()
        }
    }

    fn scoped_options() -> PatchOptions {
        PatchOptions {
            verbose: true,
            patch_header: HEADER.to_string(),
            scope_subdirectory: Some(PathBuf::from(SOME_DIR)),
            strip_file_names_and_line_numbers: true,
            ..PatchOptions::default()
        }
    }

    #[test]
    fn test_patch_files_generated_and_written() {
        let fx = Fixture::new();
        fx.left("some/dir/file1.txt", "foo-left");
        fx.left("some/dir/file2.txt", "bar-left");
        fx.right("some/dir/file1.txt", "foo-right");
        fx.right("some/dir/file2.txt", "bar-right");

        let report = fx.run(&scoped_options()).unwrap();

        assert_eq!(report.written.len(), 2);
        assert_eq!(
            fs::read_to_string(fx.out.join("file1.txt.patch")).unwrap(),
            format!(
                "{HEADER}@@\n-foo-left\n\\ No newline at end of file\n\
                 +foo-right\n\\ No newline at end of file\n"
            )
        );
        assert_eq!(
            fs::read_to_string(fx.out.join("file2.txt.patch")).unwrap(),
            format!(
                "{HEADER}@@\n-bar-left\n\\ No newline at end of file\n\
                 +bar-right\n\\ No newline at end of file\n"
            )
        );
    }

    #[test]
    fn test_empty_diff_generates_no_patch_files() {
        let fx = Fixture::new();
        fx.left("some/dir/file1.txt", "foo");
        fx.left("some/dir/b/file2.txt", "bar");
        fx.right("some/dir/file1.txt", "foo");
        fx.right("some/dir/b/file2.txt", "bar");

        let report = fx.run(&scoped_options()).unwrap();

        assert!(report.written.is_empty());
        assert_eq!(report.unchanged.len(), 2);
        assert_eq!(fx.out_files(), 0);
        assert!(!fx.out.join("b").exists());
    }

    #[test]
    fn test_unstripped_patch_keeps_tree_relative_labels() {
        let fx = Fixture::new();
        fx.left("some/dir/x.txt", "one\ntwo\n");
        fx.right("some/dir/x.txt", "one\n2\n");

        let options = PatchOptions {
            strip_file_names_and_line_numbers: false,
            ..scoped_options()
        };
        fx.run(&options).unwrap();

        assert_eq!(
            fs::read_to_string(fx.out.join("x.txt.patch")).unwrap(),
            format!(
                "{HEADER}--- a/some/dir/x.txt\n+++ b/some/dir/x.txt\n\
                 @@ -1,2 +1,2 @@\n one\n-two\n+2\n"
            )
        );
    }

    #[test]
    fn test_added_and_removed_files_emit_full_hunks() {
        let fx = Fixture::new();
        fx.left("gone.txt", "old\n");
        fx.right("nested/new.txt", "fresh\nlines\n");

        let report = fx.run(&PatchOptions::default()).unwrap();

        assert_eq!(report.written.len(), 2);
        assert_eq!(report.written[0].change, ChangeKind::Removed);
        assert_eq!(report.written[1].change, ChangeKind::Added);
        assert_eq!(
            fs::read_to_string(fx.out.join("gone.txt.patch")).unwrap(),
            "--- a/gone.txt\n+++ /dev/null\n@@ -1 +0,0 @@\n-old\n"
        );
        assert_eq!(
            fs::read_to_string(fx.out.join("nested/new.txt.patch")).unwrap(),
            "--- /dev/null\n+++ b/nested/new.txt\n@@ -0,0 +1,2 @@\n+fresh\n+lines\n"
        );
    }

    #[test]
    fn test_empty_added_and_removed_files_are_recorded() {
        let fx = Fixture::new();
        fx.left("gone_empty.txt", "");
        fx.right("new_empty.txt", "");
        fx.left("same_empty.txt", "");
        fx.right("same_empty.txt", "");

        for strip in [false, true] {
            let options = PatchOptions {
                strip_file_names_and_line_numbers: strip,
                ..PatchOptions::default()
            };
            let report = fx.run(&options).unwrap();

            assert_eq!(report.count(ChangeKind::Removed), 1);
            assert_eq!(report.count(ChangeKind::Added), 1);
            assert_eq!(report.unchanged, vec![PathBuf::from("same_empty.txt")]);
            assert_eq!(
                fs::read_to_string(fx.out.join("gone_empty.txt.patch")).unwrap(),
                "--- a/gone_empty.txt\n+++ /dev/null\n"
            );
            assert_eq!(
                fs::read_to_string(fx.out.join("new_empty.txt.patch")).unwrap(),
                "--- /dev/null\n+++ b/new_empty.txt\n"
            );
        }
    }

    #[test]
    fn test_round_trip_applies_to_left() {
        let fx = Fixture::new();
        let left = "alpha\nbeta\ngamma\ndelta\nepsilon\nzeta\neta\ntheta\niota\nkappa";
        let right = "alpha\nBETA\ngamma\ndelta\nepsilon\nzeta\neta\ntheta\niota\nkappa\nlambda\n";
        fx.left("doc.txt", left);
        fx.right("doc.txt", right);

        fx.run(&PatchOptions::default()).unwrap();

        let patch_text = fs::read_to_string(fx.out.join("doc.txt.patch")).unwrap();
        let patch = diffy::Patch::from_str(&patch_text).unwrap();
        assert_eq!(diffy::apply(left, &patch).unwrap(), right);
    }

    #[test]
    fn test_custom_suffix_and_parallel() {
        let fx = Fixture::new();
        for i in 0..20 {
            fx.left(&format!("d{}/f{}.txt", i % 3, i), &format!("{}\n", i));
            fx.right(&format!("d{}/f{}.txt", i % 3, i), &format!("{}\n", i * 2));
        }

        let options = PatchOptions {
            parallel: true,
            patch_file_name_suffix: ".diff".to_string(),
            ..PatchOptions::default()
        };
        let report = fx.run(&options).unwrap();

        // i == 0 is unchanged
        assert_eq!(report.written.len(), 19);
        assert_eq!(report.unchanged, vec![PathBuf::from("d0/f0.txt")]);
        assert!(fx.out.join("d1/f1.txt.diff").is_file());
        assert_eq!(fx.out_files(), 19);
    }

    #[test]
    fn test_missing_output_root_aborts_before_writes() {
        let fx = Fixture::new();
        fx.left("a.txt", "x");
        fx.right("a.txt", "y");
        let missing = fx.out.join("absent");

        let err = generate_patch_files_with_defaults(
            &fx.left,
            &fx.right,
            &missing,
            &PatchOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            AutoPatchError::MissingRoot {
                side: RootSide::Output,
                ..
            }
        ));
        assert_eq!(fx.out_files(), 0);
    }

    #[test]
    fn test_left_root_must_be_directory() {
        let fx = Fixture::new();
        let file = fx.out.join("file");
        fs::write(&file, "x").unwrap();

        let err = generate_patch_files_with_defaults(&file, &fx.right, &fx.out, &PatchOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            AutoPatchError::MissingRoot {
                side: RootSide::Left,
                ..
            }
        ));
    }

    struct FailingEngine {
        calls: AtomicUsize,
    }

    impl DiffEngine for FailingEngine {
        fn unified_diff(&self, request: &DiffRequest) -> Result<Vec<u8>, AutoPatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AutoPatchError::diff_invocation(
                &request.tree_relative_path,
                "engine crashed",
            ))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_diff_failure_is_not_treated_as_identical() {
        let fx = Fixture::new();
        fx.left("some/dir/a.txt", "same");
        fx.right("some/dir/a.txt", "same");

        let engine = FailingEngine {
            calls: AtomicUsize::new(0),
        };
        let err = generate_patch_files(&fx.left, &fx.right, &fx.out, &scoped_options(), &engine)
            .unwrap_err();

        match err {
            AutoPatchError::DiffInvocation { path, .. } => {
                assert_eq!(path, PathBuf::from("some/dir/a.txt"))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[derive(Default)]
    struct RecordingEngine {
        environments: Mutex<Vec<BTreeMap<String, String>>>,
    }

    impl DiffEngine for RecordingEngine {
        fn unified_diff(&self, request: &DiffRequest) -> Result<Vec<u8>, AutoPatchError> {
            self.environments
                .lock()
                .unwrap()
                .push(request.environment.clone());
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_environment_reaches_injected_engine() {
        let fx = Fixture::new();
        fx.left("a.txt", "x");
        fx.right("a.txt", "y");
        fx.left("b.txt", "x");
        fx.right("b.txt", "x");

        let mut options = PatchOptions::default();
        options
            .environment
            .insert("LC_ALL".to_string(), "C".to_string());

        let engine = RecordingEngine::default();
        let report = generate_patch_files(&fx.left, &fx.right, &fx.out, &options, &engine).unwrap();

        assert_eq!(report.unchanged.len(), 2);
        let environments = engine.environments.lock().unwrap();
        assert_eq!(environments.len(), 2);
        assert!(environments.iter().all(|env| env == &options.environment));
    }

    #[test]
    fn test_invalid_ignore_pattern_aborts_before_writes() {
        let fx = Fixture::new();
        fx.left("a.txt", "x");
        fx.right("a.txt", "y");

        let options = PatchOptions {
            ignore_patterns: vec!["a[".to_string()],
            ..PatchOptions::default()
        };
        let err = fx.run(&options).unwrap_err();

        assert!(matches!(err, AutoPatchError::Config(_)));
        assert_eq!(fx.out_files(), 0);
    }

    #[test]
    fn test_identity_with_explicit_engine() {
        let fx = Fixture::new();
        fx.left("x/y.bin", "\u{0}\u{1}binary-ish");
        fx.right("x/y.bin", "\u{0}\u{1}binary-ish");

        let engine = InProcessDiffEngine::default();
        let report =
            generate_patch_files(&fx.left, &fx.right, &fx.out, &PatchOptions::default(), &engine)
                .unwrap();

        assert!(report.written.is_empty());
        assert_eq!(fx.out_files(), 0);
    }
}
