//! Short-term context shared across pipeline stages.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::command::{Action, CommandType};
use crate::interpretation::Interpretation;

/// One previously interpreted utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentCommand {
    pub utterance: String,
    pub command_type: CommandType,
    pub action: Action,
    pub target: Option<String>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl RecentCommand {
    pub fn from_interpretation(
        utterance: &str,
        interpretation: &Interpretation,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            utterance: utterance.to_string(),
            command_type: interpretation.command_type,
            action: interpretation.action,
            target: interpretation.target.clone(),
            confidence: interpretation.confidence,
            timestamp,
        }
    }

    /// Same action on the same target (target compared case-insensitively)
    pub fn same_request(&self, interpretation: &Interpretation) -> bool {
        self.action == interpretation.action
            && self.target.as_ref().map(|t| t.to_lowercase()) == interpretation.target_lower()
    }
}

/// Preference and memory context from the long-term preference store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub favorite_artists: Vec<String>,
    pub favorite_genres: Vec<String>,
    pub frequently_used_apps: Vec<String>,
    pub favorite_shows: Vec<String>,
    pub favorite_content_genres: Vec<String>,
    /// Remembered facts relevant to the current conversation
    pub relevant_facts: Vec<String>,
}

impl UserPreferences {
    pub fn is_empty(&self) -> bool {
        self.favorite_artists.is_empty()
            && self.favorite_genres.is_empty()
            && self.frequently_used_apps.is_empty()
            && self.favorite_shows.is_empty()
            && self.favorite_content_genres.is_empty()
    }
}

/// Wall clock, injectable so time-of-day policy is testable
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

/// Real local time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl FixedClock {
    /// Local date and time; falls back to the current time for
    /// nonexistent local times (DST gaps)
    pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        let dt = Local
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .earliest()
            .unwrap_or_else(Local::now);
        Self(dt)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::at(2024, 3, 6, 15, 30);
        assert_eq!(clock.now().hour(), 15);
        assert_eq!(clock.now().day(), 6);
    }

    #[test]
    fn test_same_request() {
        let i = Interpretation::new(CommandType::App, Action::OpenApp, Some("Chrome".into()), 0.9);
        let r = RecentCommand::from_interpretation("abre chrome", &i, Utc::now());
        let j = Interpretation::new(CommandType::App, Action::OpenApp, Some("chrome".into()), 0.5);
        assert!(r.same_request(&j));
        let k = Interpretation::new(CommandType::App, Action::CloseApp, Some("chrome".into()), 0.5);
        assert!(!r.same_request(&k));
    }

    #[test]
    fn test_preferences_empty() {
        let mut p = UserPreferences::default();
        assert!(p.is_empty());
        p.favorite_artists.push("Bad Bunny".into());
        assert!(!p.is_empty());
    }
}
