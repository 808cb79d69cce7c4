//! Known application catalogue and fuzzy name matching.

use std::collections::BTreeSet;

/// Known apps grouped by what they are for
pub const KNOWN_APPS: &[(&str, &[&str])] = &[
    ("music", &["spotify", "youtube music", "vlc", "windows media player", "itunes"]),
    ("browsers", &["chrome", "firefox", "edge", "opera", "brave"]),
    ("media", &["netflix", "disney+", "prime video", "youtube", "twitch"]),
    ("games", &["steam", "epic games", "origin", "uplay", "battle.net"]),
    ("productivity", &["word", "excel", "powerpoint", "notepad", "calculator"]),
    ("communication", &["discord", "teams", "slack", "whatsapp", "telegram"]),
];

/// Generic words that could mean any of several apps
pub const AMBIGUOUS_TERMS: &[(&str, &[&str])] = &[
    ("música", &["spotify", "youtube music", "vlc", "windows media player"]),
    ("video", &["youtube", "netflix", "vlc", "windows media player"]),
    ("navegador", &["chrome", "firefox", "edge", "opera"]),
    ("chat", &["discord", "teams", "whatsapp", "telegram"]),
    ("juego", &["steam", "epic games", "origin", "battle.net"]),
    ("editor", &["notepad", "word", "notepad++", "visual studio code"]),
];

/// Similar-name matches returned at most
pub const MAX_SIMILAR: usize = 5;

/// Every known app, in catalogue order
pub fn all_apps() -> impl Iterator<Item = &'static str> {
    KNOWN_APPS.iter().flat_map(|(_, apps)| apps.iter().copied())
}

/// Known apps named literally in `text`, in catalogue order, no repeats.
///
/// Names that are part of a longer name also found ("youtube" inside
/// "youtube music") are dropped.
pub fn apps_mentioned(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    let mut found: Vec<&'static str> = Vec::new();
    for app in all_apps() {
        if contains_word(&lower, app) && !found.contains(&app) {
            found.push(app);
        }
    }
    let longer = found.clone();
    found.retain(|a| !longer.iter().any(|b| b != a && b.contains(a)));
    found
}

/// Word-bounded containment so "word" does not match inside "password"
fn contains_word(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let s = start + pos;
        let e = s + needle.len();
        let before_ok = haystack[..s]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[e..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = s + needle.len().max(1);
        if start >= haystack.len() {
            break;
        }
    }
    false
}

/// Character-set Jaccard similarity
pub fn char_jaccard(a: &str, b: &str) -> f64 {
    let sa: BTreeSet<char> = a.chars().collect();
    let sb: BTreeSet<char> = b.chars().collect();
    let union = sa.union(&sb).count();
    if union == 0 {
        return 0.0;
    }
    sa.intersection(&sb).count() as f64 / union as f64
}

/// Known apps similar to `target` (substring either way or Jaccard > 0.7)
pub fn similar_apps(target: &str) -> Vec<&'static str> {
    let t = target.trim().to_lowercase();
    if t.is_empty() {
        return Vec::new();
    }
    let mut out: Vec<&'static str> = Vec::new();
    for app in all_apps() {
        let similar = app.contains(t.as_str()) || t.contains(app) || char_jaccard(&t, app) > 0.7;
        if similar && !out.contains(&app) {
            out.push(app);
        }
        if out.len() == MAX_SIMILAR {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apps_mentioned_is_word_bounded() {
        assert_eq!(apps_mentioned("abre chrome y firefox"), vec!["chrome", "firefox"]);
        assert!(apps_mentioned("olvidé mi password").is_empty());
    }

    #[test]
    fn test_longer_name_wins() {
        assert_eq!(apps_mentioned("pon youtube music"), vec!["youtube music"]);
    }

    #[test]
    fn test_similar_apps() {
        let s = similar_apps("note");
        assert!(s.contains(&"notepad"));
        assert!(similar_apps("youtube").len() >= 2);
        assert!(similar_apps("").is_empty());
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(char_jaccard("abc", "abc"), 1.0);
        assert_eq!(char_jaccard("", ""), 0.0);
        assert!(char_jaccard("spotify", "spotfy") > 0.7);
    }
}
