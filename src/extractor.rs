use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Commit, ParsedCommit};

static TICKET_PATTERN: OnceLock<Regex> = OnceLock::new();

fn ticket_pattern() -> &'static Regex {
    // 2-10 uppercase letters, hyphen, digits, as a whole word. Brackets and
    // parentheses around the identifier are word boundaries, so bare,
    // bracketed and parenthesized forms all match.
    TICKET_PATTERN.get_or_init(|| Regex::new(r"\b[A-Z]{2,10}-\d+\b").unwrap())
}

/// Extract ticket identifiers from free text, unique, in first-seen order.
///
/// Case-sensitive: lowercase and mixed-case candidates never match.
pub fn extract_ticket_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for m in ticket_pattern().find_iter(text) {
        if !ids.iter().any(|id| id == m.as_str()) {
            ids.push(m.as_str().to_string());
        }
    }
    ids
}

/// Parse raw commits into [`ParsedCommit`] entries.
///
/// When a grouping key is supplied, only identifiers with the prefix
/// `{key}-` survive. Commits that end up with zero identifiers are dropped
/// entirely rather than kept as empty entries.
pub fn parse_commits(commits: &[Commit], grouping_key: Option<&str>) -> Vec<ParsedCommit> {
    let prefix = grouping_key.map(|key| format!("{key}-"));

    commits
        .iter()
        .filter_map(|commit| {
            let mut ticket_ids = extract_ticket_ids(&commit.message);
            if let Some(prefix) = &prefix {
                ticket_ids.retain(|id| id.starts_with(prefix.as_str()));
            }
            if ticket_ids.is_empty() {
                return None;
            }
            Some(ParsedCommit {
                sha: commit.sha.clone(),
                message: commit.message.lines().next().unwrap_or_default().to_string(),
                author: commit.author.clone(),
                ticket_ids,
            })
        })
        .collect()
}

/// Merge every commit's identifiers into one deduplicated list, preserving
/// first-seen order across the whole commit list.
pub fn all_ticket_ids(commits: &[ParsedCommit]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for commit in commits {
        for id in &commit.ticket_ids {
            if !ids.iter().any(|seen| seen == id) {
                ids.push(id.clone());
            }
        }
    }
    ids
}
