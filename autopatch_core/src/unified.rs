use autopatch_common::{DiffAlgorithm, DiffSettings};
use similar::{capture_diff_slices, group_diff_ops, Algorithm, DiffOp, DiffTag};
use std::path::{Component, Path};

/// Marker following a line that has no trailing newline
pub const NO_NEWLINE_MARKER: &[u8] = b"\\ No newline at end of file\n";

/// Label used for the absent side of an added or removed file
pub const DEV_NULL: &str = "/dev/null";

/// Lines before the first hunk that only describe file names and modes
const FILE_HEADER_PREFIXES: &[&[u8]] = &[
    b"diff ",
    b"index ",
    b"--- ",
    b"+++ ",
    b"new file mode",
    b"deleted file mode",
    b"old mode",
    b"new mode",
];

/// Renders GNU-style unified diffs from raw file contents.
///
/// Contents are compared line by line as bytes, so files that are not valid
/// UTF-8 still round-trip through the patch unchanged.
#[derive(Debug, Clone)]
pub struct UnifiedDiffRenderer {
    context_lines: usize,
    algorithm: Algorithm,
    ignore_cr_at_eol: bool,
}

/// Comparison key for one line: the content without its terminator, and
/// whether a terminator was present.
type LineKey<'a> = (&'a [u8], bool);

impl UnifiedDiffRenderer {
    pub fn new(settings: &DiffSettings) -> Self {
        Self {
            context_lines: settings.context_lines,
            algorithm: match settings.algorithm {
                DiffAlgorithm::Myers => Algorithm::Myers,
                DiffAlgorithm::Patience => Algorithm::Patience,
            },
            ignore_cr_at_eol: settings.ignore_cr_at_eol,
        }
    }

    /// Render the diff between `left` and `right`; `None` is an absent file.
    ///
    /// Returns an empty buffer when there is no difference.
    pub fn render(
        &self,
        left: Option<&[u8]>,
        right: Option<&[u8]>,
        left_label: &str,
        right_label: &str,
    ) -> Vec<u8> {
        let left_lines = split_lines(left.unwrap_or_default());
        let right_lines = split_lines(right.unwrap_or_default());

        let left_keys: Vec<LineKey<'_>> =
            left_lines.iter().map(|l| self.line_key(l)).collect();
        let right_keys: Vec<LineKey<'_>> =
            right_lines.iter().map(|l| self.line_key(l)).collect();

        if left_keys == right_keys {
            return Vec::new();
        }

        let ops = capture_diff_slices(self.algorithm, &left_keys, &right_keys);
        let groups = group_diff_ops(ops, self.context_lines);
        if groups.is_empty() {
            return Vec::new();
        }

        let mut out = file_header(left_label, right_label);

        for group in &groups {
            let (Some(first), Some(last)) = (group.first(), group.last()) else {
                continue;
            };
            let old_start = first.old_range().start;
            let new_start = first.new_range().start;
            let old_len = last.old_range().end - old_start;
            let new_len = last.new_range().end - new_start;

            out.extend_from_slice(
                format!(
                    "@@ -{} +{} @@\n",
                    format_range(old_start, old_len),
                    format_range(new_start, new_len)
                )
                .as_bytes(),
            );

            for op in group {
                self.render_op(&mut out, op, &left_lines, &right_lines);
            }
        }

        out
    }

    fn render_op(&self, out: &mut Vec<u8>, op: &DiffOp, left: &[&[u8]], right: &[&[u8]]) {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => emit_lines(out, b' ', &left[old_range]),
            DiffTag::Delete => emit_lines(out, b'-', &left[old_range]),
            DiffTag::Insert => emit_lines(out, b'+', &right[new_range]),
            DiffTag::Replace => {
                emit_lines(out, b'-', &left[old_range]);
                emit_lines(out, b'+', &right[new_range]);
            }
        }
    }

    fn line_key<'a>(&self, line: &'a [u8]) -> LineKey<'a> {
        match line.strip_suffix(b"\n") {
            Some(content) if self.ignore_cr_at_eol => {
                (content.strip_suffix(b"\r").unwrap_or(content), true)
            }
            Some(content) => (content, true),
            None if self.ignore_cr_at_eol => (line.strip_suffix(b"\r").unwrap_or(line), false),
            None => (line, false),
        }
    }
}

/// The `---`/`+++` lines naming both sides of a diff
pub fn file_header(left_label: &str, right_label: &str) -> Vec<u8> {
    format!("--- {}\n+++ {}\n", left_label, right_label).into_bytes()
}

/// Diff labels for a tree-relative path, `/dev/null` for an absent side
pub fn labels(tree_relative: &Path, left_exists: bool, right_exists: bool) -> (String, String) {
    let path = to_slash(tree_relative);
    let left = if left_exists {
        format!("a/{}", path)
    } else {
        DEV_NULL.to_string()
    };
    let right = if right_exists {
        format!("b/{}", path)
    } else {
        DEV_NULL.to_string()
    };
    (left, right)
}

/// Join path components with `/` regardless of platform
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Remove file header lines and reduce every hunk header to a bare `@@`.
///
/// Only lines before the first hunk are treated as file headers, so removed
/// lines that happen to start with `-- ` survive.
pub fn strip_file_names_and_line_numbers(diff: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(diff.len());
    let mut in_hunks = false;

    for line in diff.split_inclusive(|b| *b == b'\n') {
        if line.starts_with(b"@@") {
            in_hunks = true;
            out.extend_from_slice(b"@@\n");
        } else if !in_hunks && FILE_HEADER_PREFIXES.iter().any(|p| line.starts_with(p)) {
            continue;
        } else {
            out.extend_from_slice(line);
        }
    }

    out
}

fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    data.split_inclusive(|b| *b == b'\n').collect()
}

fn emit_lines(out: &mut Vec<u8>, sign: u8, lines: &[&[u8]]) {
    for line in lines {
        out.push(sign);
        out.extend_from_slice(line);
        if !line.ends_with(b"\n") {
            out.push(b'\n');
            out.extend_from_slice(NO_NEWLINE_MARKER);
        }
    }
}

/// `start` is zero-based; an empty range names the line before it
fn format_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, len),
    }
}
