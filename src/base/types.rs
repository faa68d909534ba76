use chrono::NaiveDate;

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// A ticket, normalized across all backends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    pub number: String,
    pub summary: String,
    pub description: String,
    pub status: String,
    pub assigned_user: String,
    /// Raw assignee identifier, for backends that only return ids.
    pub assigned_user_id: Option<String>,
}

/// A sprint or milestone, as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Milestone {
    pub title: String,
    pub start_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl Milestone {
    /// The git branch name conventionally used for this milestone.
    pub fn branch_name(&self) -> String {
        self.title.replace(' ', "-").to_lowercase()
    }
}

/// A backend-tagged ticket identifier extracted from a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendReference {
    pub backend_name: String,
    pub raw_id: String,
}

/// Byte range of a URL inside a message's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlSpan {
    pub offset: usize,
    pub length: usize,
}

impl UrlSpan {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// Slices the span out of `text`, or `None` if it does not fit.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        let end = self.offset.checked_add(self.length)?;
        text.get(self.offset..end)
    }
}

/// Who sent a message or command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub id: String,
    pub username: Option<String>,
}

impl SenderIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), username: None }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// The most readable label for audit lines.
    pub fn label(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.id)
    }
}

/// A chat message, as delivered by the transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: String,
    pub sender: SenderIdentity,
    pub text: String,
    pub url_spans: Vec<UrlSpan>,
}

/// Commands the bot responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Sprint,
}

impl BotCommand {
    /// Parses a slash command such as `/sprint`.
    pub fn parse(command: &str) -> Option<Self> {
        match command.trim().trim_start_matches('/').to_lowercase().as_str() {
            "start" => Some(Self::Start),
            "sprint" => Some(Self::Sprint),
            _ => None,
        }
    }
}

impl std::fmt::Display for BotCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "/start"),
            Self::Sprint => write!(f, "/sprint"),
        }
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_span_slice_rejects_out_of_range() {
        let text = "see https://x";

        assert_eq!(UrlSpan::new(4, 9).slice(text), Some("https://x"));
        assert_eq!(UrlSpan::new(4, 10).slice(text), None);
        assert_eq!(UrlSpan::new(usize::MAX, 2).slice(text), None);
    }

    #[test]
    fn test_url_span_slice_rejects_split_characters() {
        let text = "é https://x";

        assert_eq!(UrlSpan::new(1, 3).slice(text), None);
    }

    #[test]
    fn test_bot_command_parse() {
        assert_eq!(BotCommand::parse("/start"), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/Sprint "), Some(BotCommand::Sprint));
        assert_eq!(BotCommand::parse("/deploy"), None);
    }

    #[test]
    fn test_milestone_branch_name() {
        let milestone = Milestone {
            title: "Sprint 42 Rocket Fuel".to_string(),
            start_date: None,
            is_active: true,
        };

        assert_eq!(milestone.branch_name(), "sprint-42-rocket-fuel");
    }
}
