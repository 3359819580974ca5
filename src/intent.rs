//! Black-box intent predicates used by the standard components.
//!
//! An intent is anything that answers "does this utterance mean X". Closures
//! qualify; [`KeywordIntent`] covers the common keyword-list case.

use regex::Regex;

pub trait Intent: Send + Sync {
    fn matches(&self, text: &str) -> bool;
}

impl<F> Intent for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn matches(&self, text: &str) -> bool {
        self(text)
    }
}

/// Case-insensitive whole-word keyword matcher.
///
/// Holds any number of patterns; the intent matches when one of them does.
#[derive(Debug, Clone, Default)]
pub struct KeywordIntent {
    patterns: Vec<Regex>,
    match_all: bool,
}

impl KeywordIntent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches every utterance.
    pub fn any() -> Self {
        Self {
            patterns: Vec::new(),
            match_all: true,
        }
    }

    /// Match when any of `words` appears as a whole word anywhere.
    pub fn anywhere<S: AsRef<str>>(mut self, words: &[S]) -> Result<Self, regex::Error> {
        if let Some(alternation) = alternation(words) {
            self.patterns.push(Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))?);
        }
        Ok(self)
    }

    /// Match when the whole utterance is one of `words`.
    pub fn exactly<S: AsRef<str>>(mut self, words: &[S]) -> Result<Self, regex::Error> {
        if let Some(alternation) = alternation(words) {
            self.patterns
                .push(Regex::new(&format!(r"(?i)^\s*(?:{alternation})\s*$"))?);
        }
        Ok(self)
    }

    /// Shorthand for `KeywordIntent::new().anywhere(keywords)`, skipping
    /// blank entries.
    pub fn keywords<S: AsRef<str>>(keywords: &[S]) -> Result<Self, regex::Error> {
        Self::new().anywhere(clean_keywords(keywords).as_slice())
    }
}

impl Intent for KeywordIntent {
    fn matches(&self, text: &str) -> bool {
        self.match_all || self.patterns.iter().any(|p| p.is_match(text))
    }
}

/// Trim keywords and drop the empty ones.
pub fn clean_keywords<S: AsRef<str>>(keywords: &[S]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.as_ref().trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn alternation<S: AsRef<str>>(words: &[S]) -> Option<String> {
    let escaped: Vec<String> = words
        .iter()
        .map(|w| w.as_ref().trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if escaped.is_empty() {
        None
    } else {
        Some(escaped.join("|"))
    }
}

pub const BUILTIN_INTENTS: [&str; 5] = ["yes", "no", "continue", "stop", "wildcard"];

/// Look up one of the built-in intents by name.
pub fn builtin(name: &str) -> Option<KeywordIntent> {
    let intent = match name {
        "yes" => KeywordIntent::new()
            .anywhere(&[
                "yes", "yea", "yup", "sure", "ok", "of course", "yeah", "okay", "yep", "I do",
            ])
            .and_then(|i| i.exactly(&["y", "totally", "naturally", "k"])),
        "no" => KeywordIntent::new()
            .anywhere(&[
                "no", "nope", "never", "no way", "nah", "neh", "nay", "nop", "noo", "nooo",
            ])
            .and_then(|i| i.exactly(&["n"])),
        "continue" => KeywordIntent::new()
            .anywhere(&["yes", "yea", "yup", "sure", "ok"])
            .and_then(|i| i.exactly(&["and", "go on"])),
        "stop" => KeywordIntent::new().exactly(&["stop", "bye", "this is boring"]),
        "wildcard" => Ok(KeywordIntent::any()),
        _ => return None,
    };
    intent.ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_intents() {
        let mentions_pizza = |text: &str| text.contains("pizza");
        assert!(mentions_pizza.matches("a pizza please"));
        assert!(!mentions_pizza.matches("a drink please"));
    }

    #[test]
    fn keywords_match_whole_words_case_insensitively() {
        let intent = KeywordIntent::keywords(&["Vanilla", " ", "mint chip"]).unwrap();
        assert!(intent.matches("I want VANILLA please"));
        assert!(intent.matches("mint chip"));
        assert!(!intent.matches("vanillas"));
        assert!(!intent.matches("chocolate"));
    }

    #[test]
    fn blank_keyword_list_matches_nothing() {
        let intent = KeywordIntent::keywords(&["", "  "]).unwrap();
        assert!(!intent.matches(""));
        assert!(!intent.matches("anything"));
    }

    #[test]
    fn keywords_are_escaped() {
        let intent = KeywordIntent::keywords(&["c.o"]).unwrap();
        assert!(intent.matches("c.o"));
        assert!(!intent.matches("cxo"));
    }

    #[test]
    fn builtin_yes_and_no() {
        let yes = builtin("yes").unwrap();
        assert!(yes.matches("yeah sure"));
        assert!(yes.matches("Of course"));
        assert!(yes.matches("k"));
        assert!(!yes.matches("kite"));

        let no = builtin("no").unwrap();
        assert!(no.matches("no way"));
        assert!(no.matches("n"));
        assert!(!no.matches("know"));
    }

    #[test]
    fn builtin_stop_needs_whole_utterance() {
        let stop = builtin("stop").unwrap();
        assert!(stop.matches("bye"));
        assert!(stop.matches("  this is boring "));
        assert!(!stop.matches("don't stop now"));
    }

    #[test]
    fn wildcard_matches_anything() {
        let any = builtin("wildcard").unwrap();
        assert!(any.matches(""));
        assert!(any.matches("whatever you say"));
    }

    #[test]
    fn every_builtin_name_resolves() {
        for name in BUILTIN_INTENTS {
            assert!(builtin(name).is_some(), "{name}");
        }
        assert!(builtin("maybe").is_none());
    }
}
