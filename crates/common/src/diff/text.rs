//! Token-level text diffing for markup and style snapshots

use serde::{Deserialize, Serialize};

use crate::types::SnapshotKind;

/// Classification of a diff segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Added,
    Removed,
    Unchanged,
}

/// A run of consecutive tokens sharing one classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSegment {
    pub kind: SegmentKind,
    pub value: String,
}

impl DiffSegment {
    pub fn is_added(&self) -> bool {
        self.kind == SegmentKind::Added
    }

    pub fn is_removed(&self) -> bool {
        self.kind == SegmentKind::Removed
    }
}

/// Ordered sequence of diff segments between a baseline and a new snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDiff {
    pub segments: Vec<DiffSegment>,
}

impl TextDiff {
    /// True if any segment is added or removed
    pub fn has_changes(&self) -> bool {
        self.segments.iter().any(|s| s.kind != SegmentKind::Unchanged)
    }

    /// Number of added or removed segments
    pub fn changed_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.kind != SegmentKind::Unchanged)
            .count()
    }

    /// The "previous version" pane: everything that is not added
    pub fn left_view(&self) -> impl Iterator<Item = &DiffSegment> {
        self.segments.iter().filter(|s| !s.is_added())
    }

    /// The "current version" pane: everything that is not removed
    pub fn right_view(&self) -> impl Iterator<Item = &DiffSegment> {
        self.segments.iter().filter(|s| !s.is_removed())
    }

    /// Reconstruct the baseline text
    pub fn old_text(&self) -> String {
        self.left_view().map(|s| s.value.as_str()).collect()
    }

    /// Reconstruct the new text
    pub fn new_text(&self) -> String {
        self.right_view().map(|s| s.value.as_str()).collect()
    }

    /// Line-oriented plain text rendering with `+`/`-` markers for changed segments
    pub fn to_unified(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            let marker = match segment.kind {
                SegmentKind::Added => '+',
                SegmentKind::Removed => '-',
                SegmentKind::Unchanged => continue,
            };
            for line in segment.value.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                out.push(marker);
                out.push(' ');
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    fn push(&mut self, kind: SegmentKind, token: &str) {
        match self.segments.last_mut() {
            Some(last) if last.kind == kind => last.value.push_str(token),
            _ => self.segments.push(DiffSegment {
                kind,
                value: token.to_string(),
            }),
        }
    }
}

/// Pluggable text comparison capability
pub trait TextDiffer: Send + Sync {
    fn diff(&self, kind: SnapshotKind, old: &str, new: &str) -> TextDiff;
}

/// Default differ: markup is tokenized on tag boundaries, style text on lines,
/// and the token streams are compared with the Myers shortest edit script.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenDiffer;

impl TextDiffer for TokenDiffer {
    fn diff(&self, kind: SnapshotKind, old: &str, new: &str) -> TextDiff {
        let (old_tokens, new_tokens) = match kind {
            SnapshotKind::Markup => (tokenize_markup(old), tokenize_markup(new)),
            SnapshotKind::Style => (tokenize_lines(old), tokenize_lines(new)),
        };
        diff_tokens(&old_tokens, &new_tokens)
    }
}

/// Diff two snapshots of the given kind with the default differ.
///
/// An absent side is treated as an empty baseline. Equal inputs yield a diff
/// with no changes.
pub fn diff_text(kind: SnapshotKind, old: Option<&str>, new: Option<&str>) -> TextDiff {
    TokenDiffer.diff(kind, old.unwrap_or(""), new.unwrap_or(""))
}

/// Split markup into tags, whitespace runs and text words
pub fn tokenize_markup(input: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut start = 0;

    while start < bytes.len() {
        let end = match bytes[start] {
            b'<' => match input[start..].find('>') {
                Some(close) => start + close + 1,
                None => bytes.len(),
            },
            b if b.is_ascii_whitespace() => {
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_whitespace() {
                    end += 1;
                }
                end
            }
            _ => {
                let mut end = start;
                while end < bytes.len() && bytes[end] != b'<' && !bytes[end].is_ascii_whitespace() {
                    end += 1;
                }
                end
            }
        };
        tokens.push(&input[start..end]);
        start = end;
    }

    tokens
}

/// Split text into lines, keeping line terminators
pub fn tokenize_lines(input: &str) -> Vec<&str> {
    input.split_inclusive('\n').collect()
}

fn diff_tokens(old: &[&str], new: &[&str]) -> TextDiff {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let mut diff = TextDiff::default();
    for token in &old[..prefix] {
        diff.push(SegmentKind::Unchanged, token);
    }
    for (kind, token) in myers(&old[prefix..old.len() - suffix], &new[prefix..new.len() - suffix]) {
        diff.push(kind, token);
    }
    for token in &old[old.len() - suffix..] {
        diff.push(SegmentKind::Unchanged, token);
    }
    diff
}

/// Myers O((N+M)D) shortest edit script over token slices
fn myers<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<(SegmentKind, &'a str)> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = (n + m) as usize;
    let offset = max as isize;
    let mut v = vec![0isize; 2 * max + 2];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'search: for d in 0..=offset {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                break 'search;
            }
            k += 2;
        }
    }

    let mut ops = Vec::with_capacity(max);
    let (mut x, mut y) = (n, m);
    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let idx = (k + offset) as usize;
        let prev_k = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            ops.push((SegmentKind::Unchanged, a[(x - 1) as usize]));
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                ops.push((SegmentKind::Added, b[(y - 1) as usize]));
            } else {
                ops.push((SegmentKind::Removed, a[(x - 1) as usize]));
            }
        }
        x = prev_x;
        y = prev_y;
    }

    ops.reverse();
    ops
}
