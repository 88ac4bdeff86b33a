use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiffCounts {
    pub additions: u32,
    pub deletions: u32,
}

impl DiffCounts {
    pub fn is_empty(&self) -> bool {
        self.additions == 0 && self.deletions == 0
    }
}

/// Counts added and removed lines of a unified diff.
///
/// `+++`/`---` file headers are excluded by checking the second character,
/// so a header is never mistaken for a change even when it is the only line.
pub fn count_diff_lines(diff: &str) -> DiffCounts {
    let mut counts = DiffCounts::default();
    for line in diff.lines() {
        if line.starts_with('+') && !line.starts_with("++") {
            counts.additions += 1;
        } else if line.starts_with('-') && !line.starts_with("--") {
            counts.deletions += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_excluded() {
        let diff = "+++ header\n--- header\n+added line\n-removed line\n";
        assert_eq!(
            count_diff_lines(diff),
            DiffCounts {
                additions: 1,
                deletions: 1
            }
        );
    }

    #[test]
    fn context_and_hunk_lines_are_ignored() {
        let diff = "--- a/main.py\n+++ b/main.py\n@@ -1,3 +1,4 @@\n import os\n-x = 1\n+x = 2\n+y = 3\n \n";
        let counts = count_diff_lines(diff);
        assert_eq!(counts.additions, 2);
        assert_eq!(counts.deletions, 1);
    }

    #[test]
    fn bare_markers_count_as_blank_line_changes() {
        let counts = count_diff_lines("+\n-\r\n+x");
        assert_eq!(counts.additions, 2);
        assert_eq!(counts.deletions, 1);
    }

    #[test]
    fn empty_diff_has_no_changes() {
        assert!(count_diff_lines("").is_empty());
    }
}
