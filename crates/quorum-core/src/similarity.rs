//! String similarity and location matching used to decide when two findings
//! describe the same defect.

use std::sync::OnceLock;

use regex::Regex;

/// Default similarity at or above which two descriptions are the same issue.
pub const DEDUP_THRESHOLD: f64 = 0.7;

/// Matching-subsequence ratio of two strings, case-insensitive.
///
/// `2 * LCS(a, b) / (len(a) + len(b))` over characters, in [0, 1]. Two empty
/// strings are identical (1.0).
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(&a, &b)) as f64 / total as f64
}

/// Length of the longest common subsequence, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `anchor:start` or `anchor:start-end`, e.g. `src/lib.rs:10-14`.
fn line_range_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<anchor>.+?):(?P<start>\d+)(?:-(?P<end>\d+))?$").ok())
        .as_ref()
}

fn normalize_location(loc: &str) -> String {
    loc.trim().to_lowercase()
}

fn parse_line_range(loc: &str) -> Option<(String, u64, u64)> {
    let caps = line_range_regex()?.captures(loc)?;
    let anchor = caps.name("anchor")?.as_str().to_string();
    let start: u64 = caps.name("start")?.as_str().parse().ok()?;
    let end: u64 = match caps.name("end") {
        Some(m) => m.as_str().parse().ok()?,
        None => start,
    };
    Some((anchor, start.min(end), start.max(end)))
}

/// Whether two locations refer to the same artifact region.
///
/// Locations match when they are equal after trimming and lowercasing, or
/// when both are `anchor:line[-line]` references to the same anchor with
/// overlapping line ranges.
pub fn same_region(a: &str, b: &str) -> bool {
    let a = normalize_location(a);
    let b = normalize_location(b);
    if a == b {
        return true;
    }
    match (parse_line_range(&a), parse_line_range(&b)) {
        (Some((anchor_a, start_a, end_a)), Some((anchor_b, start_b, end_b))) => {
            anchor_a == anchor_b && start_a <= end_b && start_b <= end_a
        }
        _ => false,
    }
}
