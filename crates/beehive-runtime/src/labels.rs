//! Path-pattern label taxonomy.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Ordered (label, path pattern) rules. A file may match several labels.
static RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("infra", r"netlify\.toml|[Dd]ockerfile|\.github/workflows"),
        ("dependencies", r"package\.json|lock\.json|pnpm-lock\.yaml|Cargo\.lock"),
        ("routing", r"^src/routes|router"),
        ("auth", r"auth|login|session|token"),
        ("scripts", r"^scripts/"),
        ("database", r"supabase|schema|database|migrations/"),
    ]
    .into_iter()
    .filter_map(|(label, pattern)| Regex::new(pattern).ok().map(|re| (label, re)))
    .collect()
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelReport {
    /// Labels in taxonomy order, each at most once.
    pub labels: Vec<String>,
    /// Files matched per label.
    pub matches: BTreeMap<String, Vec<String>>,
    /// Files no rule matched. Recorded, never blocking.
    pub unmatched: Vec<String>,
}

pub fn classify(files: &[String]) -> LabelReport {
    let mut report = LabelReport::default();

    for file in files {
        let mut matched = false;
        for (label, pattern) in RULES.iter() {
            if pattern.is_match(file) {
                matched = true;
                report.matches.entry(label.to_string()).or_default().push(file.clone());
            }
        }
        if !matched {
            report.unmatched.push(file.clone());
        }
    }

    report.labels = RULES
        .iter()
        .map(|(label, _)| label.to_string())
        .filter(|label| report.matches.contains_key(label))
        .collect();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_taxonomy_covers_every_label() {
        let report = classify(&files(&[
            ".github/workflows/ci.yml",
            "package.json",
            "src/routes/home.ts",
            "lib/session.ts",
            "scripts/deploy.sh",
            "supabase/schema.sql",
        ]));
        assert_eq!(
            report.labels,
            vec!["infra", "dependencies", "routing", "auth", "scripts", "database"]
        );
        assert!(report.unmatched.is_empty());
    }

    #[test]
    fn test_unmatched_files_are_recorded() {
        let report = classify(&files(&["README.md", "Dockerfile"]));
        assert_eq!(report.labels, vec!["infra"]);
        assert_eq!(report.unmatched, vec!["README.md"]);
    }

    #[test]
    fn test_file_can_carry_several_labels() {
        let report = classify(&files(&["src/routes/auth.ts"]));
        assert_eq!(report.labels, vec!["routing", "auth"]);
        assert_eq!(report.matches["auth"], vec!["src/routes/auth.ts"]);
    }

    #[test]
    fn test_scripts_anchor_to_root() {
        let report = classify(&files(&["tools/scripts/run.sh"]));
        assert!(report.labels.is_empty());
        assert_eq!(report.unmatched.len(), 1);
    }
}
