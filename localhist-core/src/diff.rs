use crate::error::PatchError;
use similar::{ChangeTag, DiffOp, TextDiff};
use std::fmt;
use std::str::FromStr;

/// Lines of unchanged context written around each hunk.
const CONTEXT_LINES: usize = 3;

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Computes the patch blob that turns `old` into `new`.
///
/// The blob is a unified diff. Identical inputs produce a header with no
/// hunks, which applies as a no-op.
pub fn create_patch(old: &str, new: &str) -> String {
    UnifiedPatch::between(old, new).to_string()
}

/// Applies a patch blob produced by [`create_patch`] to `base`.
///
/// Application is strict: every context and deletion line has to match
/// `base` at the position the hunk names.
pub fn apply_patch(base: &str, patch: &str) -> Result<String, PatchError> {
    patch.parse::<UnifiedPatch>()?.apply(base)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineType {
    Context,
    Addition,
    Deletion,
}

impl DiffLineType {
    pub fn prefix(self) -> char {
        match self {
            DiffLineType::Context => ' ',
            DiffLineType::Addition => '+',
            DiffLineType::Deletion => '-',
        }
    }

    fn from_tag(tag: ChangeTag) -> Self {
        match tag {
            ChangeTag::Equal => DiffLineType::Context,
            ChangeTag::Insert => DiffLineType::Addition,
            ChangeTag::Delete => DiffLineType::Deletion,
        }
    }
}

/// One line of a hunk. `content` keeps its trailing newline when the source
/// line had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub line_type: DiffLineType,
    pub content: String,
}

impl DiffLine {
    pub fn has_newline(&self) -> bool {
        self.content.ends_with('\n')
    }

    /// Line text without its terminator.
    pub fn text(&self) -> &str {
        self.content.strip_suffix('\n').unwrap_or(&self.content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// Zero-based index of the first old line the hunk covers.
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    fn from_ops(diff: &TextDiff<'_, '_, '_, str>, ops: &[DiffOp]) -> Self {
        let (first, last) = (&ops[0], &ops[ops.len() - 1]);
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;

        let mut lines = Vec::new();
        for op in ops {
            for change in diff.iter_changes(op) {
                lines.push(DiffLine {
                    line_type: DiffLineType::from_tag(change.tag()),
                    content: change.value().to_string(),
                });
            }
        }

        Hunk {
            old_start: old_range.start,
            old_len: old_range.len(),
            new_start: new_range.start,
            new_len: new_range.len(),
            lines,
        }
    }

    pub fn header(&self) -> String {
        format!(
            "@@ -{} +{} @@",
            format_range(self.old_start, self.old_len),
            format_range(self.new_start, self.new_len)
        )
    }

    fn parse_header(line: &str) -> Result<Self, PatchError> {
        let malformed = || PatchError::Malformed(format!("bad hunk header {line:?}"));
        let body = line
            .strip_prefix("@@ -")
            .and_then(|rest| rest.split(" @@").next())
            .ok_or_else(malformed)?;
        let (old, new) = body.split_once(" +").ok_or_else(malformed)?;
        let (old_start, old_len) = parse_range(old).ok_or_else(malformed)?;
        let (new_start, new_len) = parse_range(new).ok_or_else(malformed)?;

        Ok(Hunk {
            old_start,
            old_len,
            new_start,
            new_len,
            lines: Vec::new(),
        })
    }
}

// Unified ranges are one-based; an empty range names the line before it.
fn format_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, len),
    }
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    let (start, len) = match range.split_once(',') {
        Some((start, len)) => (start.parse::<usize>().ok()?, len.parse::<usize>().ok()?),
        None => (range.parse::<usize>().ok()?, 1),
    };
    if len == 0 {
        Some((start, 0))
    } else {
        Some((start.checked_sub(1)?, len))
    }
}

/// A parsed unified diff for a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnifiedPatch {
    pub hunks: Vec<Hunk>,
}

impl UnifiedPatch {
    pub fn between(old: &str, new: &str) -> Self {
        // Lines end at '\n' only, the same split `apply` uses; a lone '\r'
        // stays part of its line.
        let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
        let new_lines: Vec<&str> = new.split_inclusive('\n').collect();
        let diff = TextDiff::configure().diff_slices(&old_lines, &new_lines);
        let hunks = diff
            .grouped_ops(CONTEXT_LINES)
            .iter()
            .filter(|group| group.iter().any(|op| !matches!(op, DiffOp::Equal { .. })))
            .map(|group| Hunk::from_ops(&diff, group))
            .collect();

        UnifiedPatch { hunks }
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn apply(&self, base: &str) -> Result<String, PatchError> {
        let old: Vec<&str> = base.split_inclusive('\n').collect();
        let mut out = String::with_capacity(base.len());
        let mut cursor = 0;

        for (n, hunk) in self.hunks.iter().enumerate() {
            if hunk.old_start < cursor || hunk.old_start > old.len() {
                return Err(PatchError::OutOfBounds {
                    hunk: n,
                    line: hunk.old_start + 1,
                    len: old.len(),
                });
            }
            old[cursor..hunk.old_start]
                .iter()
                .for_each(|line| out.push_str(line));
            cursor = hunk.old_start;

            for line in &hunk.lines {
                if line.line_type == DiffLineType::Addition {
                    out.push_str(&line.content);
                    continue;
                }
                let found = old.get(cursor).copied();
                if found != Some(line.content.as_str()) {
                    return Err(PatchError::Mismatch {
                        hunk: n,
                        line: cursor + 1,
                        expected: line.content.clone(),
                        found: found.map(str::to_string),
                    });
                }
                if line.line_type == DiffLineType::Context {
                    out.push_str(&line.content);
                }
                cursor += 1;
            }
        }

        old[cursor..].iter().for_each(|line| out.push_str(line));
        Ok(out)
    }
}

impl fmt::Display for UnifiedPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- a")?;
        writeln!(f, "+++ b")?;
        for hunk in &self.hunks {
            writeln!(f, "{}", hunk.header())?;
            for line in &hunk.lines {
                writeln!(f, "{}{}", line.line_type.prefix(), line.text())?;
                if !line.has_newline() {
                    writeln!(f, "{NO_NEWLINE_MARKER}")?;
                }
            }
        }
        Ok(())
    }
}

impl FromStr for UnifiedPatch {
    type Err = PatchError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut hunks = Vec::new();
        let mut lines = text.split('\n').peekable();

        while let Some(line) = lines.next() {
            // File headers and anything else before a hunk are ignored.
            if !line.starts_with("@@") {
                continue;
            }
            let mut hunk = Hunk::parse_header(line)?;
            let (mut old_seen, mut new_seen) = (0, 0);

            while old_seen < hunk.old_len || new_seen < hunk.new_len {
                let raw = match lines.next() {
                    Some(raw) if !(raw.is_empty() && lines.peek().is_none()) => raw,
                    _ => {
                        return Err(PatchError::Malformed(format!(
                            "hunk {} ends early",
                            hunk.header()
                        )))
                    }
                };
                let line_type = match raw.chars().next() {
                    Some(' ') | None => DiffLineType::Context,
                    Some('+') => DiffLineType::Addition,
                    Some('-') => DiffLineType::Deletion,
                    Some('\\') => {
                        strip_newline(&mut hunk.lines)?;
                        continue;
                    }
                    Some(other) => {
                        return Err(PatchError::Malformed(format!(
                            "unexpected line prefix {other:?}"
                        )))
                    }
                };
                match line_type {
                    DiffLineType::Context => {
                        old_seen += 1;
                        new_seen += 1;
                    }
                    DiffLineType::Addition => new_seen += 1,
                    DiffLineType::Deletion => old_seen += 1,
                }
                let body = raw.get(1..).unwrap_or("");
                hunk.lines.push(DiffLine {
                    line_type,
                    content: format!("{body}\n"),
                });
            }

            if lines.peek().is_some_and(|next| next.starts_with('\\')) {
                lines.next();
                strip_newline(&mut hunk.lines)?;
            }
            hunks.push(hunk);
        }

        Ok(UnifiedPatch { hunks })
    }
}

fn strip_newline(lines: &mut [DiffLine]) -> Result<(), PatchError> {
    let last = lines.last_mut().ok_or_else(|| {
        PatchError::Malformed("newline marker before any hunk line".to_string())
    })?;
    last.content.pop();
    Ok(())
}
