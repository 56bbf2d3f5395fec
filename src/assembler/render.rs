//! Section rendering for briefing output.
//!
//! Every renderer produces either a complete section (title plus item lines)
//! or nothing; the assembler never emits an empty-bodied section header.

use crate::current_timestamp;
use crate::models::{AgentSummary, ContextEntry, Mark, MessageSummary, TaskSummary};

/// Character cap for one rendered item body.
const ITEM_SNIPPET_CHARS: usize = 200;

/// Renders a titled section, or `None` when there are no lines.
pub(crate) fn section(title: &str, lines: Vec<String>) -> Option<String> {
    if lines.is_empty() {
        return None;
    }
    Some(format!("## {title}\n{}", lines.join("\n")))
}

/// Lines for a task listing (assumes the input is already priority-ordered).
pub(crate) fn task_lines(tasks: &[TaskSummary]) -> Vec<String> {
    tasks
        .iter()
        .map(|task| {
            let mut line = format!("- [{}] {}", task.status, task.title);
            let description = snippet(&task.description, ITEM_SNIPPET_CHARS);
            if !description.is_empty() {
                line.push_str(": ");
                line.push_str(&description);
            }
            line
        })
        .collect()
}

/// Lines for pending messages.
pub(crate) fn message_lines(messages: &[MessageSummary]) -> Vec<String> {
    messages
        .iter()
        .map(|message| {
            let from = message.from_agent.as_deref().unwrap_or("unknown");
            format!(
                "- from {from}: {} ({})",
                snippet(&message.content, ITEM_SNIPPET_CHARS),
                format_age(message.created_at)
            )
        })
        .collect()
}

/// Lines for completed agents, skipping any without a usable summary.
pub(crate) fn agent_lines(agents: &[AgentSummary]) -> Vec<String> {
    agents
        .iter()
        .filter(|agent| agent.has_usable_summary())
        .map(|agent| {
            let summary = agent.summary.as_deref().unwrap_or_default();
            format!(
                "- {}{}: {}",
                agent.name,
                role_suffix(agent),
                snippet(summary, ITEM_SNIPPET_CHARS)
            )
        })
        .collect()
}

/// Roster lines for active agents (names and roles only).
pub(crate) fn roster_lines(agents: &[AgentSummary]) -> Vec<String> {
    agents
        .iter()
        .map(|agent| format!("- {}{}", agent.name, role_suffix(agent)))
        .collect()
}

/// Lines for session notes.
pub(crate) fn note_lines(notes: &[ContextEntry]) -> Vec<String> {
    notes
        .iter()
        .map(|note| {
            format!(
                "- [{}] {} ({})",
                note.entry_type,
                snippet(&note.content, ITEM_SNIPPET_CHARS),
                format_age(note.created_at)
            )
        })
        .collect()
}

/// Lines for retrieved marks.
pub(crate) fn mark_lines(marks: &[Mark]) -> Vec<String> {
    marks
        .iter()
        .map(|mark| {
            let mut line = format!("- [{}] {}", mark.mark_type, mark.title);
            if let Some(narrative) = mark.narrative.as_deref() {
                let body = snippet(narrative, ITEM_SNIPPET_CHARS);
                if !body.is_empty() {
                    line.push_str(": ");
                    line.push_str(&body);
                }
            }
            line.push_str(&format!(" ({})", format_age(mark.created_at)));
            line
        })
        .collect()
}

fn role_suffix(agent: &AgentSummary) -> String {
    agent
        .agent_type
        .as_deref()
        .map(|role| format!(" ({role})"))
        .unwrap_or_default()
}

/// Collapses whitespace and caps the text at `max_chars` characters.
pub(crate) fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &flat[..byte_idx]),
        None => flat,
    }
}

/// Renders the age of a timestamp relative to now.
pub(crate) fn format_age(created_at: u64) -> String {
    format_age_at(created_at, current_timestamp())
}

/// Clock-injected variant of [`format_age`]. Ages beyond a week render as a
/// calendar date.
fn format_age_at(created_at: u64, now: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 3_600;
    const DAY: u64 = 86_400;
    const WEEK: u64 = 7 * DAY;

    let elapsed = now.saturating_sub(created_at);
    if elapsed < MINUTE {
        "just now".to_string()
    } else if elapsed < HOUR {
        format!("{}m ago", elapsed / MINUTE)
    } else if elapsed < DAY {
        format!("{}h ago", elapsed / HOUR)
    } else if elapsed < WEEK {
        format!("{}d ago", elapsed / DAY)
    } else {
        i64::try_from(created_at)
            .ok()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map_or_else(
                || "long ago".to_string(),
                |date| date.format("%Y-%m-%d").to_string(),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentStatus, TaskStatus};

    #[test]
    fn test_section_none_when_empty() {
        assert!(section("Anything", Vec::new()).is_none());
        let rendered = section("Tasks", vec!["- a".to_string(), "- b".to_string()]).unwrap();
        assert_eq!(rendered, "## Tasks\n- a\n- b");
    }

    #[test]
    fn test_task_lines_include_status_and_description() {
        let mut task = TaskSummary::new("s1", "Fix parser");
        task.status = TaskStatus::InProgress;
        task.description = "handle  multiline\ninput".to_string();

        let lines = task_lines(std::slice::from_ref(&task));
        assert_eq!(lines, vec!["- [in_progress] Fix parser: handle multiline input"]);
    }

    #[test]
    fn test_agent_lines_skip_unusable_summaries() {
        let mut done = AgentSummary::new("s1", "backend");
        done.status = AgentStatus::Completed;
        done.summary = Some("built the cache".to_string());
        done.agent_type = Some("builder".to_string());
        let active = AgentSummary::new("s1", "frontend");

        let lines = agent_lines(&[done, active]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("- backend (builder): built the cache"));
    }

    #[test]
    fn test_snippet_collapses_and_caps() {
        assert_eq!(snippet("  a \n b   c ", 100), "a b c");
        assert_eq!(snippet("abcdef", 3), "abc...");
        assert_eq!(snippet("", 10), "");
    }

    #[test]
    fn test_format_age_buckets() {
        assert_eq!(format_age_at(1_000, 1_030), "just now");
        assert_eq!(format_age_at(1_000, 1_000 + 120), "2m ago");
        assert_eq!(format_age_at(1_000, 1_000 + 7_200), "2h ago");
        assert_eq!(format_age_at(1_000, 1_000 + 3 * 86_400), "3d ago");
        // 1970-01-10 is more than a week before the given "now".
        assert_eq!(format_age_at(800_000, 800_000 + 30 * 86_400), "1970-01-10");
    }
}
