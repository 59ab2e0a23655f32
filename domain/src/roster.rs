//! The roster of people a cycle contacts

use serde::{Deserialize, Serialize};

/// A contactable person who reports which days they are free.
///
/// Immutable for the lifetime of a cycle; sourced from configuration.
/// The request and response channels may name different adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Unique name identifying the person across the system
    pub name: String,
    /// Channel used to ask for availability
    pub request_channel: String,
    /// Channel used to deliver the final result
    pub response_channel: String,
    /// Channel-specific identifier (Discord user ID, Telegram chat ID, ...)
    #[serde(rename = "id")]
    pub channel_id: String,
}

/// An ordered list of persons.
///
/// Roster order is the deterministic order for anything reported per person
/// (most importantly the unknowns list).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    persons: Vec<Person>,
}

impl Roster {
    pub fn new(persons: Vec<Person>) -> Self {
        Self { persons }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Person> {
        self.persons.iter()
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Person> {
        self.persons.iter().find(|p| p.name == name)
    }

    /// Every distinct channel name the roster refers to.
    pub fn channel_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .persons
            .iter()
            .flat_map(|p| [p.request_channel.as_str(), p.response_channel.as_str()])
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(name: &str, channel: &str) -> Person {
        Person {
            name: name.to_string(),
            request_channel: channel.to_string(),
            response_channel: channel.to_string(),
            channel_id: format!("{name}-id"),
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let roster = Roster::new(vec![person("alice", "discord"), person("bob", "telegram")]);
        assert_eq!(roster.get("bob").unwrap().request_channel, "telegram");
        assert!(roster.get("carol").is_none());
    }

    #[test]
    fn test_channel_names_deduplicated() {
        let mut mixed = person("carol", "discord");
        mixed.response_channel = "telegram".to_string();
        let roster = Roster::new(vec![person("alice", "discord"), mixed]);
        assert_eq!(roster.channel_names(), vec!["discord", "telegram"]);
    }
}
