use std::collections::BTreeMap;
use std::path::Path;

use crate::workspace::SECTION_DELIMITER;

/// Repository outputs that mean nothing happened.
pub const NO_OP_BODIES: &[&str] = &["Already up to date.", "Already up-to-date."];

/// Per-repository sections of a merge transcript worth showing to a human.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    entries: BTreeMap<String, String>,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries sorted by repository name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render one quoted block per repository, in repository order.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(repository, body)| format!("h6. {repository}\n{{quote}}{body}{{quote}}\n\n"))
            .collect()
    }
}

/// Split a fan-out transcript into per-repository sections.
///
/// Sections start at a `>>> <path>` line; the repository is the last
/// component of the path. Bodies are trimmed, empty and no-op bodies are
/// dropped, and a repository appearing twice keeps its last body. Text
/// before the first delimiter is ignored.
pub fn parse_merge_output(text: &str) -> MergeReport {
    let mut report = MergeReport::default();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(header) = line.strip_prefix(SECTION_DELIMITER) {
            close(&mut report, current.take());
            let path = header.trim();
            let name = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string());
            current = Some((name, Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    close(&mut report, current);
    report
}

fn close(report: &mut MergeReport, section: Option<(String, Vec<&str>)>) {
    let Some((name, lines)) = section else {
        return;
    };
    let body = lines.join("\n");
    let body = body.trim();
    if name.is_empty() || body.is_empty() || NO_OP_BODIES.contains(&body) {
        return;
    }
    report.entries.insert(name, body.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSCRIPT: &str = "\
>>> /var/pool/0/web
Auto-merging app.js
CONFLICT (content): Merge conflict in app.js
Automatic merge failed; fix conflicts and then commit the result.
>>> /var/pool/0/billing
Already up to date.
>>> /var/pool/0/api
CONFLICT (modify/delete): routes.php deleted in feature and modified in HEAD.
";

    #[test]
    fn keeps_sorted_non_noop_sections() {
        let report = parse_merge_output(TRANSCRIPT);
        let names: Vec<_> = report.entries().map(|(name, _)| name).collect();
        assert_eq!(names, ["api", "web"]);
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn renders_one_quote_per_repository() {
        let report = parse_merge_output(TRANSCRIPT);
        assert_eq!(
            report.render(),
            "h6. api\n{quote}CONFLICT (modify/delete): routes.php deleted in feature and modified in HEAD.{quote}\n\n\
             h6. web\n{quote}Auto-merging app.js\nCONFLICT (content): Merge conflict in app.js\n\
             Automatic merge failed; fix conflicts and then commit the result.{quote}\n\n"
        );
    }

    #[test]
    fn empty_and_noop_sections_are_omitted() {
        let text = ">>> /p/0/a\n\n>>> /p/0/b\n  Already up-to-date.  \n>>> /p/0/c\n";
        assert!(parse_merge_output(text).is_empty());
        assert_eq!(parse_merge_output(text).render(), "");
    }

    #[test]
    fn preamble_is_ignored_and_last_section_wins() {
        let text = "node git-all starting\n>>> /p/0/a\nfirst\n>>> /p/0/a\nsecond\n";
        let report = parse_merge_output(text);
        assert_eq!(report.entries().collect::<Vec<_>>(), [("a", "second")]);
    }
}
