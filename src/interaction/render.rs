//! Slack mrkdwn rendering of bot replies.

use crate::base::types::{Milestone, Ticket};

pub const NO_ACTIVE_SPRINT: &str = "No active sprint.";
pub const SPRINT_UNAVAILABLE: &str = "Unable to fetch the current sprint right now.";

/// Escapes the characters Slack treats as control sequences.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Renders a ticket as a bold title, its description as a code block, then status and assignee.
pub fn ticket(ticket: &Ticket) -> String {
    let mut lines = vec![format!("*#{} {}*", escape(&ticket.number), escape(&ticket.summary))];

    let description = ticket.description.trim();
    if !description.is_empty() {
        lines.push(format!("```{}```", escape(description)));
    }

    let status = format!("`{}`", escape(&ticket.status));
    if ticket.assigned_user.is_empty() {
        lines.push(status);
    } else {
        lines.push(format!("{status} {}", escape(&ticket.assigned_user)));
    }

    lines.join("\n")
}

/// Renders the current sprint with its branch name.
pub fn milestone(milestone: &Milestone) -> String {
    let start = milestone.start_date.map(|date| date.to_string()).unwrap_or_else(|| "unscheduled".to_string());

    format!("{} ({})  -  `{}`", escape(&milestone.title), start, escape(&milestone.branch_name()))
}

/// Greeting for `/start`, naming the configured backends.
pub fn greeting(backends: &[&str]) -> String {
    match backends {
        [] => "Hello! No ticket backends are configured yet.".to_string(),
        [only] => format!("Hello! Paste a ticket link from {only} to get started!"),
        [rest @ .., last] => format!("Hello! Paste a ticket link from {} or {last} to get started!", rest.join(", ")),
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn sample_ticket() -> Ticket {
        Ticket {
            id: "42".to_string(),
            number: "42".to_string(),
            summary: "Fix <login> & logout".to_string(),
            description: "Steps:\n1. log in".to_string(),
            status: "Test".to_string(),
            assigned_user: "Ada Lovelace".to_string(),
            assigned_user_id: None,
        }
    }

    #[test]
    fn test_ticket_rendering() {
        assert_eq!(ticket(&sample_ticket()), "*#42 Fix &lt;login&gt; &amp; logout*\n```Steps:\n1. log in```\n`Test` Ada Lovelace");
    }

    #[test]
    fn test_ticket_rendering_without_description_or_assignee() {
        let mut sample = sample_ticket();
        sample.description = "   ".to_string();
        sample.assigned_user = String::new();

        assert_eq!(ticket(&sample), "*#42 Fix &lt;login&gt; &amp; logout*\n`Test`");
    }

    #[test]
    fn test_milestone_rendering() {
        let sprint = Milestone {
            title: "Sprint 12 Apollo".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 4),
            is_active: true,
        };

        assert_eq!(milestone(&sprint), "Sprint 12 Apollo (2024-03-04)  -  `sprint-12-apollo`");
    }

    #[test]
    fn test_milestone_rendering_unscheduled() {
        let sprint = Milestone {
            title: "Backlog".to_string(),
            start_date: None,
            is_active: false,
        };

        assert_eq!(milestone(&sprint), "Backlog (unscheduled)  -  `backlog`");
    }

    #[test]
    fn test_greeting() {
        assert_eq!(greeting(&["Assembla"]), "Hello! Paste a ticket link from Assembla to get started!");
        assert_eq!(greeting(&["Assembla", "Jira"]), "Hello! Paste a ticket link from Assembla or Jira to get started!");
        assert!(greeting(&[]).contains("No ticket backends"));
    }
}
