//! Street-name canonicalization.
//!
//! Stages, in order:
//! 1. Mark unification: NFKC, quote and dash look-alikes collapsed to ASCII
//! 2. Marked abbreviation expansion (`שד'`, `רח.`), longest key first
//! 3. Punctuation stripping (quotes dropped, other separators become spaces)
//! 4. Case + diacritic folding (niqqud, accents)
//! 5. Whitespace collapse, after folding so dropped marks leave no gaps
//! 6. Word abbreviation expansion (`blvd`) on folded words
//!
//! The output of `normalize` is a fixed point: running it again changes nothing.

use serde::Deserialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::LinkError;

/// Built-in abbreviation table: Hebrew street types plus a few English ones.
const DEFAULT_ABBREVIATIONS: &[(&str, &str)] = &[
    ("שד'", "שדרות"),
    ("שד.", "שדרות"),
    ("רח'", "רחוב"),
    ("רח.", "רחוב"),
    ("כי'", "כיכר"),
    ("כי.", "כיכר"),
    ("blvd", "boulevard"),
    ("ave", "avenue"),
];

const MUNICIPALITY_PREFIX: &str = "עיריית";

/// One configurable abbreviation → expansion pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Abbreviation {
    pub abbreviation: String,
    pub expansion: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    key: String,
    expansion: String,
}

/// Abbreviation table, split by whether the abbreviation carries a trailing
/// mark (`'` or `.`). Both lists are sorted longest key first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationRules {
    marked: Vec<Rule>,
    words: Vec<Rule>,
}

impl Default for NormalizationRules {
    fn default() -> Self {
        Self::build(
            DEFAULT_ABBREVIATIONS
                .iter()
                .map(|(a, e)| Abbreviation {
                    abbreviation: (*a).to_string(),
                    expansion: (*e).to_string(),
                }),
        )
    }
}

impl NormalizationRules {
    /// An empty table: punctuation, whitespace and folding only.
    pub fn empty() -> Self {
        Self {
            marked: Vec::new(),
            words: Vec::new(),
        }
    }

    /// Build and validate a table.
    pub fn new(entries: impl IntoIterator<Item = Abbreviation>) -> Result<Self, LinkError> {
        let entries: Vec<Abbreviation> = entries.into_iter().collect();
        for entry in &entries {
            let key = unify_marks(entry.abbreviation.trim());
            if key.is_empty() {
                return Err(LinkError::ConfigValidation("empty abbreviation".into()));
            }
            if clean(&entry.expansion).is_empty() {
                return Err(LinkError::ConfigValidation(format!(
                    "abbreviation '{}' has an empty expansion",
                    entry.abbreviation
                )));
            }
            if !ends_with_mark(&key) && clean(&key).contains(' ') {
                return Err(LinkError::ConfigValidation(format!(
                    "unmarked abbreviation '{}' must be a single word",
                    entry.abbreviation
                )));
            }
        }

        let rules = Self::build(entries);
        rules.validate()?;
        Ok(rules)
    }

    /// Default table extended (or overridden, on equal keys) by `extra`.
    pub fn with_defaults(extra: impl IntoIterator<Item = Abbreviation>) -> Result<Self, LinkError> {
        let extra: Vec<Abbreviation> = extra.into_iter().collect();
        let defaults = DEFAULT_ABBREVIATIONS.iter().map(|(a, e)| Abbreviation {
            abbreviation: (*a).to_string(),
            expansion: (*e).to_string(),
        });
        Self::new(defaults.chain(extra))
    }

    fn build(entries: impl IntoIterator<Item = Abbreviation>) -> Self {
        let mut marked: Vec<Rule> = Vec::new();
        let mut words: Vec<Rule> = Vec::new();

        for entry in entries {
            let unified = unify_marks(entry.abbreviation.trim());
            let expansion = clean(&entry.expansion);
            let (list, key) = if ends_with_mark(&unified) {
                (&mut marked, fold_case(&unified))
            } else {
                (&mut words, clean(&unified))
            };
            if key.is_empty() || expansion.is_empty() {
                continue;
            }
            // Later entries override earlier ones with the same key.
            list.retain(|r| r.key != key);
            list.push(Rule { key, expansion });
        }

        let by_length = |a: &Rule, b: &Rule| {
            b.key
                .chars()
                .count()
                .cmp(&a.key.chars().count())
                .then_with(|| a.key.cmp(&b.key))
        };
        marked.sort_by(by_length);
        words.sort_by(by_length);

        Self { marked, words }
    }

    /// No expansion may contain a word abbreviation, otherwise a second pass
    /// would expand again.
    fn validate(&self) -> Result<(), LinkError> {
        for rule in self.marked.iter().chain(&self.words) {
            for word in rule.expansion.split(' ') {
                if let Some(hit) = self.words.iter().find(|w| w.key == word) {
                    return Err(LinkError::ConfigValidation(format!(
                        "expansion '{}' contains abbreviation '{}'",
                        rule.expansion, hit.key
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.marked.len() + self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonicalize a raw street name. Empty or whitespace-only input yields "".
pub fn normalize(raw: &str, rules: &NormalizationRules) -> String {
    let text = unify_marks(raw);
    let text = expand_marked(&text, rules);
    let text = strip_punctuation(&text);
    let text = fold_case(&text);
    let text = collapse_whitespace(&text);
    expand_words(&text, rules)
}

/// Canonicalize a locality label for grouping: dashes become spaces, the
/// municipality prefix is dropped, case folded, whitespace collapsed.
pub fn normalize_locality(raw: &str) -> String {
    let text = unify_marks(raw).replace(MUNICIPALITY_PREFIX, " ").replace('-', " ");
    collapse_whitespace(&fold_case(&text))
}

/// Normalization without abbreviation expansion.
fn clean(text: &str) -> String {
    collapse_whitespace(&fold_case(&strip_punctuation(&unify_marks(text))))
}

fn unify_marks(text: &str) -> String {
    text.nfkc()
        .map(|c| match c {
            '\u{05F3}' | '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{02BC}' | '\u{00B4}' | '`' => '\'',
            '\u{05F4}' | '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
            '\u{05BE}' | '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
            c => c,
        })
        .collect()
}

fn ends_with_mark(text: &str) -> bool {
    text.ends_with('\'') || text.ends_with('.')
}

/// Characters that end a token for marked expansion. Apostrophes, periods and
/// double quotes stay inside tokens: they are part of the abbreviation keys.
fn is_token_break(c: char) -> bool {
    c.is_whitespace()
        || (!c.is_alphanumeric() && !is_combining_mark(c) && !matches!(c, '\'' | '.' | '"'))
}

fn expand_marked(text: &str, rules: &NormalizationRules) -> String {
    if rules.marked.is_empty() {
        return text.to_string();
    }

    let mut out: Vec<String> = Vec::new();
    for token in text.split(is_token_break).filter(|t| !t.is_empty()) {
        let folded = fold_case(token);
        let mut rest = folded.trim_start_matches(['\'', '"']);
        while !rest.is_empty() {
            let hit = rules.marked.iter().find_map(|rule| {
                let head: String = rest.chars().take(rule.key.chars().count()).collect();
                (head == rule.key).then(|| (rule, head.len()))
            });
            match hit {
                Some((rule, consumed)) => {
                    out.push(rule.expansion.clone());
                    rest = &rest[consumed..];
                }
                None => {
                    out.push(rest.to_string());
                    break;
                }
            }
        }
    }
    out.join(" ")
}

fn strip_punctuation(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\'' | '"' => None,
            c if c.is_alphanumeric() || c.is_whitespace() || is_combining_mark(c) => Some(c),
            _ => Some(' '),
        })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, then drop combining marks (niqqud, accents).
fn fold_case(text: &str) -> String {
    text.to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect()
}

fn expand_words(text: &str, rules: &NormalizationRules) -> String {
    if rules.words.is_empty() || text.is_empty() {
        return text.to_string();
    }
    text.split(' ')
        .map(|word| {
            rules
                .words
                .iter()
                .find(|rule| rule.key == word)
                .map_or(word, |rule| rule.expansion.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}
