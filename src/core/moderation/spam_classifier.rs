// Stateless text inspection: spam patterns and banned words.
//
// Every configured `SpamRule` is OR'd: the first rule that matches flags the
// text. Banned words are a separate scan so the engine can treat them as a
// non-escalating rejection.

use super::moderation_models::{ModerationConfig, SpamRule};

#[derive(Debug, Clone)]
pub struct SpamClassifier {
    rules: Vec<SpamRule>,
    /// Lowercased once at construction.
    banned_words: Vec<String>,
}

impl SpamClassifier {
    pub fn new(rules: Vec<SpamRule>, banned_words: &[String]) -> Self {
        let banned_words = banned_words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self {
            rules,
            banned_words,
        }
    }

    pub fn from_config(config: &ModerationConfig) -> Self {
        Self::new(config.spam_rules.clone(), &config.banned_words)
    }

    /// Returns the first spam rule the text matches.
    pub fn spam_match(&self, text: &str) -> Option<&SpamRule> {
        self.rules.iter().find(|rule| rule_matches(rule, text))
    }

    pub fn is_spam(&self, text: &str) -> bool {
        self.spam_match(text).is_some()
    }

    /// Returns the first banned word contained in the text, ignoring case.
    pub fn banned_word(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.banned_words
            .iter()
            .find(|word| lowered.contains(word.as_str()))
            .map(String::as_str)
    }
}

fn rule_matches(rule: &SpamRule, text: &str) -> bool {
    match rule {
        SpamRule::Url => contains_url(text),
        SpamRule::Email => contains_email(text),
        SpamRule::DigitRun { min_len } => longest_run(text, |c| c.is_ascii_digit()) >= *min_len,
        SpamRule::RepeatedChar { min_run } => longest_repeat(text) >= *min_run,
    }
}

fn is_scheme_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')
}

/// `scheme://x` where the scheme starts with a letter and at least one
/// non-whitespace character follows the separator.
fn contains_url(text: &str) -> bool {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find("://") {
        let sep = search_from + offset;
        let scheme: Vec<char> = text[..sep]
            .chars()
            .rev()
            .take_while(|c| is_scheme_char(*c))
            .collect();
        let scheme_ok = scheme.last().is_some_and(|c| c.is_ascii_alphabetic());
        let rest_ok = text[sep + 3..]
            .chars()
            .next()
            .is_some_and(|c| !c.is_whitespace());
        if scheme_ok && rest_ok {
            return true;
        }
        search_from = sep + 3;
    }
    false
}

fn is_local_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '+' | '-')
}

fn is_domain_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-')
}

/// `local@host.tld` with a top-level label of at least two letters.
fn contains_email(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    for (at, _) in chars.iter().enumerate().filter(|(_, c)| **c == '@') {
        let local_len = chars[..at]
            .iter()
            .rev()
            .take_while(|c| is_local_char(**c))
            .count();
        if local_len == 0 {
            continue;
        }
        let domain: Vec<char> = chars[at + 1..]
            .iter()
            .copied()
            .take_while(|c| is_domain_char(*c))
            .collect();
        if has_tld(&domain) {
            return true;
        }
    }
    false
}

fn has_tld(domain: &[char]) -> bool {
    domain.iter().enumerate().any(|(i, c)| {
        if *c != '.' || i == 0 {
            return false;
        }
        let label: Vec<char> = domain[i + 1..]
            .iter()
            .copied()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        label.len() >= 2 && label.iter().all(|c| c.is_ascii_alphabetic())
    })
}

fn longest_run(text: &str, pred: impl Fn(char) -> bool) -> usize {
    let mut best = 0;
    let mut current = 0;
    for c in text.chars() {
        if pred(c) {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

/// Longest run of one repeated character. Line breaks never count.
fn longest_repeat(text: &str) -> usize {
    let mut best = 0;
    let mut current = 0;
    let mut previous: Option<char> = None;
    for c in text.chars() {
        if c == '\n' {
            previous = None;
            current = 0;
            continue;
        }
        if previous == Some(c) {
            current += 1;
        } else {
            previous = Some(c);
            current = 1;
        }
        best = best.max(current);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> SpamClassifier {
        SpamClassifier::from_config(&ModerationConfig::default())
    }

    #[test]
    fn test_clean_text_passes() {
        let c = classifier();
        assert!(!c.is_spam("Привет, как дела?"));
        assert!(!c.is_spam("Meet at 10:30, room 4"));
        assert!(c.banned_word("Привет, как дела?").is_none());
    }

    #[test]
    fn test_url_detection() {
        let c = classifier();
        assert_eq!(c.spam_match("see https://example.com now"), Some(&SpamRule::Url));
        assert_eq!(c.spam_match("ftp://files"), Some(&SpamRule::Url));
        assert!(!c.is_spam("the ratio is 3:// no"));
        assert!(!c.is_spam("http:// "));
    }

    #[test]
    fn test_email_detection() {
        let c = classifier();
        assert_eq!(c.spam_match("write to john.doe@mail.ru"), Some(&SpamRule::Email));
        assert!(!c.is_spam("@channel please read"));
        assert!(!c.is_spam("me@localhost"));
        assert!(!c.is_spam("x@host.c"));
    }

    #[test]
    fn test_digit_run_detection() {
        let c = classifier();
        assert_eq!(
            c.spam_match("call 89991234567"),
            Some(&SpamRule::DigitRun { min_len: 10 })
        );
        assert!(!c.is_spam("call 999-123-45"));
        assert!(!c.is_spam("123456789"));
    }

    #[test]
    fn test_repeated_char_detection() {
        let c = classifier();
        assert_eq!(
            c.spam_match("!!!!! wow"),
            Some(&SpamRule::RepeatedChar { min_run: 5 })
        );
        assert!(c.is_spam("ааааа"));
        assert!(!c.is_spam("!!!! wow"));
        assert!(!c.is_spam("a\n\n\n\n\nb"));
    }

    #[test]
    fn test_banned_words_case_insensitive() {
        let c = classifier();
        assert_eq!(c.banned_word("Хочешь КУПИТЬ слона?"), Some("купить"));
        assert_eq!(c.banned_word("Лучшее Казино"), Some("казино"));
    }

    #[test]
    fn test_empty_rules_never_flag() {
        let c = SpamClassifier::new(Vec::new(), &[]);
        assert!(!c.is_spam("https://example.com!!!!!!"));
        assert!(c.banned_word("anything").is_none());
    }
}
