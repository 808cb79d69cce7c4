//! Command categories and canonical actions.
//!
//! The classifier speaks in strings; everything past the resolver speaks
//! in these closed enums so an unhandled category is a compile error.

use serde::{Deserialize, Serialize};

/// Top-level command category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    App,
    Music,
    Content,
    Conversation,
}

impl CommandType {
    pub const ALL: [CommandType; 4] = [
        CommandType::App,
        CommandType::Music,
        CommandType::Content,
        CommandType::Conversation,
    ];

    /// Parse a classifier category name
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "app" | "application" => Some(Self::App),
            "music" => Some(Self::Music),
            "content" => Some(Self::Content),
            "conversation" | "chat" => Some(Self::Conversation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Music => "music",
            Self::Content => "content",
            Self::Conversation => "conversation",
        }
    }

    /// Whether this category can be handed to an action adapter
    pub fn is_command(&self) -> bool {
        !matches!(self, Self::Conversation)
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical action names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    OpenApp,
    CloseApp,
    SearchMusic,
    ControlMusic,
    StartAutoDj,
    StopAutoDj,
    SearchContent,
    ControlMedia,
    RecommendContent,
    SuggestContent,
    Chat,
    RequestClarification,
    Unknown,
}

impl Action {
    /// Parse an action name, folding known synonyms into canonical names.
    /// Returns None for names outside the vocabulary.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open_app" => Some(Self::OpenApp),
            "close_app" => Some(Self::CloseApp),
            "search_music" | "play_music" | "play_track" | "play_random_music"
            | "start_music" => Some(Self::SearchMusic),
            "control_music" => Some(Self::ControlMusic),
            "start_auto_dj" => Some(Self::StartAutoDj),
            "stop_auto_dj" => Some(Self::StopAutoDj),
            "search_content" => Some(Self::SearchContent),
            "control_media" => Some(Self::ControlMedia),
            "recommend_content" => Some(Self::RecommendContent),
            "suggest_content" => Some(Self::SuggestContent),
            "chat" => Some(Self::Chat),
            "request_clarification" => Some(Self::RequestClarification),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// True when the raw name was a synonym rather than the canonical name
    pub fn is_synonym(s: &str) -> bool {
        matches!(
            s.trim().to_lowercase().as_str(),
            "play_music" | "play_track" | "play_random_music" | "start_music"
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenApp => "open_app",
            Self::CloseApp => "close_app",
            Self::SearchMusic => "search_music",
            Self::ControlMusic => "control_music",
            Self::StartAutoDj => "start_auto_dj",
            Self::StopAutoDj => "stop_auto_dj",
            Self::SearchContent => "search_content",
            Self::ControlMedia => "control_media",
            Self::RecommendContent => "recommend_content",
            Self::SuggestContent => "suggest_content",
            Self::Chat => "chat",
            Self::RequestClarification => "request_clarification",
            Self::Unknown => "unknown",
        }
    }

    /// Actions answered with text rather than an adapter call
    pub fn is_conversational(&self) -> bool {
        matches!(
            self,
            Self::Chat | Self::RecommendContent | Self::SuggestContent
        )
    }

    /// Actions that pull focus from whatever the user is doing
    pub fn is_intrusive(&self) -> bool {
        matches!(self, Self::OpenApp | Self::SearchContent)
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_type_parse() {
        assert_eq!(CommandType::from_str("app"), Some(CommandType::App));
        assert_eq!(CommandType::from_str(" Music "), Some(CommandType::Music));
        assert_eq!(CommandType::from_str("weather"), None);
    }

    #[test]
    fn test_only_conversation_is_not_a_command() {
        for ct in CommandType::ALL {
            assert_eq!(ct.is_command(), ct != CommandType::Conversation);
        }
    }

    #[test]
    fn test_action_synonyms_fold_to_search_music() {
        for name in ["play_music", "play_track", "play_random_music", "start_music"] {
            assert_eq!(Action::from_str(name), Some(Action::SearchMusic));
            assert!(Action::is_synonym(name));
        }
        assert!(!Action::is_synonym("search_music"));
    }

    #[test]
    fn test_action_roundtrip_names() {
        let a = Action::from_str("open_app").unwrap();
        assert_eq!(a.to_string(), "open_app");
        assert_eq!(Action::from_str("teleport"), None);
    }

    #[test]
    fn test_action_serde_snake_case() {
        let json = serde_json::to_string(&Action::StartAutoDj).unwrap();
        assert_eq!(json, "\"start_auto_dj\"");
    }
}
