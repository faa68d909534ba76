//! Sender allow-list.

use std::{collections::HashSet, sync::Arc};

use super::types::SenderIdentity;

/// Set of sender ids and usernames that may use the bot.
///
/// This is trivially cloneable.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    allowed: Arc<HashSet<String>>,
}

impl AllowList {
    /// Parses a comma-separated list, ignoring blanks and surrounding whitespace.
    pub fn parse(csv: &str) -> Self {
        let allowed = csv.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();

        Self { allowed: Arc::new(allowed) }
    }

    pub fn is_allowed(&self, sender: &SenderIdentity) -> bool {
        self.allowed.contains(&sender.id) || sender.username.as_ref().is_some_and(|name| self.allowed.contains(name))
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_matches_id_or_username() {
        let access = AllowList::parse(" alice, U123 ,,");

        assert_eq!(access.len(), 2);
        assert!(access.is_allowed(&SenderIdentity::new("U123")));
        assert!(access.is_allowed(&SenderIdentity::new("U999").with_username("alice")));
        assert!(!access.is_allowed(&SenderIdentity::new("U999").with_username("mallory")));
    }

    #[test]
    fn test_empty_allow_list_denies_everyone() {
        let access = AllowList::parse("");

        assert!(access.is_empty());
        assert!(!access.is_allowed(&SenderIdentity::new("")));
        assert!(!access.is_allowed(&SenderIdentity::new("U1")));
    }
}
