pub mod scanner;
pub mod unified;
pub mod diff_engine;
pub mod patch_writer;
pub mod generator;

pub use scanner::PathReconciler;
pub use unified::{file_header, strip_file_names_and_line_numbers, UnifiedDiffRenderer};
pub use diff_engine::{engine_from_settings, DiffEngine, DiffRequest, ExternalDiffEngine, InProcessDiffEngine};
pub use patch_writer::PatchWriter;
pub use generator::{generate_patch_files, generate_patch_files_with_defaults};
