//! Unified diffs between original and healed files.

use colored::Colorize;
use similar::TextDiff;

use crate::analyzer::kubecuro::analyze::FileOutcome;

/// Unified diff for one file, empty when nothing changed.
pub fn unified(outcome: &FileOutcome) -> String {
    if !outcome.changed() {
        return String::new();
    }
    let name = outcome.path.display().to_string();
    TextDiff::from_lines(&outcome.original, &outcome.healed)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{}", name), &format!("b/{}", name))
        .to_string()
}

/// Unified diffs for every changed file, colored for a terminal.
pub fn render<'f>(outcomes: impl IntoIterator<Item = &'f FileOutcome>) -> String {
    let mut output = String::new();
    for outcome in outcomes {
        for line in unified(outcome).lines() {
            let styled = if line.starts_with("+++") || line.starts_with("---") {
                line.bold().to_string()
            } else if line.starts_with("@@") {
                line.cyan().to_string()
            } else if line.starts_with('+') {
                line.green().to_string()
            } else if line.starts_with('-') {
                line.red().to_string()
            } else {
                line.to_string()
            };
            output.push_str(&styled);
            output.push('\n');
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn outcome(original: &str, healed: &str) -> FileOutcome {
        FileOutcome {
            path: PathBuf::from("deploy.yaml"),
            original: original.to_string(),
            healed: healed.to_string(),
        }
    }

    #[test]
    fn test_unified_diff() {
        let diff = unified(&outcome("metadata:\n    name: web\n", "metadata:\n  name: web\n"));
        assert!(diff.starts_with("--- a/deploy.yaml\n+++ b/deploy.yaml\n"));
        assert!(diff.contains("-    name: web\n"));
        assert!(diff.contains("+  name: web\n"));
    }

    #[test]
    fn test_unchanged_file_has_no_diff() {
        assert!(unified(&outcome("a: 1\n", "a: 1\n")).is_empty());
    }
}
