//! Task type and metadata hints.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata key for the complexity hint.
pub const META_COMPLEXITY: &str = "complexity";
/// Metadata key for the priority hint.
pub const META_PRIORITY: &str = "priority";
/// Metadata key for an explicit context size (tokens).
pub const META_CONTEXT_SIZE: &str = "context_size";
/// Metadata key for a requested capability tag.
pub const META_CAPABILITY: &str = "capability";

/// Declared complexity of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "simple" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" | "complex" => Some(Self::High),
            _ => None,
        }
    }
}

/// Declared priority of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" | "medium" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" | "critical" => Some(Self::Urgent),
            _ => None,
        }
    }

    /// High and urgent tasks prefer providers without process startup cost.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::High | Self::Urgent)
    }
}

/// A unit of coding-agent work. Immutable once handed to the router or manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// What the agent should do.
    pub description: String,

    /// Files given as context.
    #[serde(default)]
    pub files: Vec<String>,

    /// Open metadata (complexity, priority, context_size, arbitrary keys).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Task {
    /// Create a new Task.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            files: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Builder method to add a context file.
    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Builder method to add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn complexity(&self) -> Option<Complexity> {
        self.metadata.get(META_COMPLEXITY).and_then(|v| Complexity::parse(v))
    }

    pub fn priority(&self) -> Option<Priority> {
        self.metadata.get(META_PRIORITY).and_then(|v| Priority::parse(v))
    }

    /// Explicit context size hint in tokens, if one was given and parses.
    pub fn context_size(&self) -> Option<u64> {
        self.metadata
            .get(META_CONTEXT_SIZE)
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn capability(&self) -> Option<&str> {
        self.metadata.get(META_CAPABILITY).map(String::as_str)
    }

    /// Token estimate: the explicit hint, else `files * 2000 + len(description) / 4`.
    pub fn estimated_tokens(&self) -> u64 {
        self.context_size().unwrap_or_else(|| {
            self.files.len() as u64 * 2000 + self.description.len() as u64 / 4
        })
    }

    /// Prompt text handed to a provider when the worker starts.
    pub fn to_prompt(&self) -> String {
        if self.files.is_empty() {
            return self.description.clone();
        }
        let mut prompt = self.description.clone();
        prompt.push_str("\n\nContext files:");
        for file in &self.files {
            prompt.push_str("\n- ");
            prompt.push_str(file);
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimated_tokens_from_files_and_description() {
        let task = Task::new("x".repeat(400))
            .with_file("src/lib.rs")
            .with_file("src/main.rs");
        assert_eq!(task.estimated_tokens(), 2 * 2000 + 100);
    }

    #[test]
    fn test_explicit_context_size_wins() {
        let task = Task::new("short")
            .with_file("a.rs")
            .with_metadata(META_CONTEXT_SIZE, "150000");
        assert_eq!(task.estimated_tokens(), 150_000);
    }

    #[test]
    fn test_unparseable_context_size_falls_back() {
        let task = Task::new("abcd").with_metadata(META_CONTEXT_SIZE, "lots");
        assert_eq!(task.context_size(), None);
        assert_eq!(task.estimated_tokens(), 1);
    }

    #[test]
    fn test_hints() {
        let task = Task::new("refactor")
            .with_metadata(META_COMPLEXITY, "High")
            .with_metadata(META_PRIORITY, "urgent");
        assert_eq!(task.complexity(), Some(Complexity::High));
        assert_eq!(task.priority(), Some(Priority::Urgent));
        assert!(task.priority().unwrap().is_elevated());
    }

    #[test]
    fn test_prompt_lists_files() {
        let task = Task::new("Fix the bug").with_file("src/a.rs");
        assert_eq!(task.to_prompt(), "Fix the bug\n\nContext files:\n- src/a.rs");
        assert_eq!(Task::new("Only text").to_prompt(), "Only text");
    }
}
