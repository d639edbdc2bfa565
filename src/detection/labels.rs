use std::path::Path;

use anyhow::Context;

/// Read a newline-delimited label file. Line order defines the class index.
pub fn read_labels<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<String>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read label file {:?}", path))?;
    Ok(parse_labels(&text))
}

/// One label per non-blank line, trimmed.
pub fn parse_labels(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strip a leading index token such as `"3 golden retriever"` -> `"golden retriever"`.
///
/// Labels without a purely numeric first token are returned trimmed but otherwise intact.
pub fn clean_label(label: &str) -> String {
    let trimmed = label.trim();
    if let Some((head, rest)) = trimmed.split_once(char::is_whitespace) {
        if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()) {
            let rest = rest.trim_start();
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Resolve a user-supplied class reference, either an index or a (cleaned) label name.
pub fn resolve_class(labels: &[String], reference: &str) -> Option<(usize, String)> {
    if let Ok(index) = reference.trim().parse::<usize>() {
        return labels.get(index).map(|label| (index, clean_label(label)));
    }
    labels
        .iter()
        .map(|label| clean_label(label))
        .enumerate()
        .find(|(_, label)| label.eq_ignore_ascii_case(reference.trim()))
}
