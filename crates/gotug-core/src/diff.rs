//! Unified diff generation.
//!
//! Produces standard unified diff text between the original and rewritten
//! contents of a file, with three lines of context around each hunk.

use std::fmt::Write as _;

const CONTEXT: usize = 3;

/// Upper bound on the line-matching table for one diff.
///
/// Larger inputs degrade to a single replace-everything hunk.
const MAX_TABLE_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Keep,
    Remove,
    Add,
}

/// Generate a unified diff for one file.
///
/// Returns an empty string when the contents are identical.
pub fn unified_diff(path: &str, old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    let a: Vec<&str> = old.split_inclusive('\n').collect();
    let b: Vec<&str> = new.split_inclusive('\n').collect();
    let script = edit_script(&a, &b);

    let mut out = String::new();
    let _ = writeln!(out, "--- a/{}", path);
    let _ = writeln!(out, "+++ b/{}", path);

    for (start, end) in hunk_ranges(&script) {
        let (mut old_line, mut new_line) = (1usize, 1usize);
        for (op, _) in &script[..start] {
            match op {
                Op::Keep => {
                    old_line += 1;
                    new_line += 1;
                }
                Op::Remove => old_line += 1,
                Op::Add => new_line += 1,
            }
        }
        let body = &script[start..end];
        let old_count = body.iter().filter(|(op, _)| *op != Op::Add).count();
        let new_count = body.iter().filter(|(op, _)| *op != Op::Remove).count();
        let _ = writeln!(
            out,
            "@@ -{} +{} @@",
            hunk_header(old_line, old_count),
            hunk_header(new_line, new_count)
        );
        for (op, line) in body {
            let prefix = match op {
                Op::Keep => ' ',
                Op::Remove => '-',
                Op::Add => '+',
            };
            out.push(prefix);
            out.push_str(line);
            if !line.ends_with('\n') {
                out.push_str("\n\\ No newline at end of file\n");
            }
        }
    }
    out
}

fn hunk_header(start: usize, count: usize) -> String {
    match count {
        0 => format!("{},0", start.saturating_sub(1)),
        1 => format!("{}", start),
        n => format!("{},{}", start, n),
    }
}

/// Compute a line-level edit script from a longest-common-subsequence table
/// over the region between the common prefix and suffix.
fn edit_script<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<(Op, &'a str)> {
    let prefix = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let mid_a = &a[prefix..a.len() - suffix];
    let mid_b = &b[prefix..b.len() - suffix];

    let mut script: Vec<(Op, &str)> = a[..prefix].iter().map(|l| (Op::Keep, *l)).collect();

    let (n, m) = (mid_a.len(), mid_b.len());
    if n.saturating_mul(m) > MAX_TABLE_CELLS {
        script.extend(mid_a.iter().map(|l| (Op::Remove, *l)));
        script.extend(mid_b.iter().map(|l| (Op::Add, *l)));
    } else {
        // lcs[i][j] = LCS length of mid_a[i..] and mid_b[j..]
        let width = m + 1;
        let mut lcs = vec![0u32; (n + 1) * width];
        for i in (0..n).rev() {
            for j in (0..m).rev() {
                lcs[i * width + j] = if mid_a[i] == mid_b[j] {
                    lcs[(i + 1) * width + j + 1] + 1
                } else {
                    lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
                };
            }
        }
        let (mut i, mut j) = (0, 0);
        while i < n && j < m {
            if mid_a[i] == mid_b[j] {
                script.push((Op::Keep, mid_a[i]));
                i += 1;
                j += 1;
            } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
                script.push((Op::Remove, mid_a[i]));
                i += 1;
            } else {
                script.push((Op::Add, mid_b[j]));
                j += 1;
            }
        }
        script.extend(mid_a[i..].iter().map(|l| (Op::Remove, *l)));
        script.extend(mid_b[j..].iter().map(|l| (Op::Add, *l)));
    }

    script.extend(a[a.len() - suffix..].iter().map(|l| (Op::Keep, *l)));
    script
}

/// Group changed lines into hunk ranges over the script, merging hunks whose
/// context would overlap.
fn hunk_ranges(script: &[(Op, &str)]) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (idx, (op, _)) in script.iter().enumerate() {
        if *op == Op::Keep {
            continue;
        }
        let start = idx.saturating_sub(CONTEXT);
        let end = (idx + 1 + CONTEXT).min(script.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => ranges.push((start, end)),
        }
    }
    ranges
}

// ============================================================================
// Tests
// ============================================================================
