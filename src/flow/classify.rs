use crate::insights::IssueRecord;

/// Derives `(issue_type, is_bug)` for an issue.
///
/// A structured type from the tracker wins. Otherwise the first label that
/// looks like a work category decides, defaulting to `task`.
pub fn classify(issue: &IssueRecord) -> (String, bool) {
    let labelled_bug = issue
        .labels
        .iter()
        .any(|l| l.trim().eq_ignore_ascii_case("bug"));

    let issue_type = issue
        .issue_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .or_else(|| issue.labels.iter().find_map(|l| type_from_label(l)))
        .unwrap_or_else(|| "task".to_string());

    let is_bug = labelled_bug || issue_type == "bug";
    (issue_type, is_bug)
}

fn type_from_label(label: &str) -> Option<String> {
    let label = label.trim().to_lowercase();
    let kind = if label == "bug" {
        "bug"
    } else if label.contains("feature") {
        "feature"
    } else if label == "chore" || label == "refactor" {
        "chore"
    } else if label.contains("doc") {
        "docs"
    } else {
        return None;
    };
    Some(kind.to_string())
}
