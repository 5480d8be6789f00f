//! Transcript / reference text normalization.
//!
//! Both the recognizer transcript and the reference sentence are passed
//! through [`normalize`] before they are compared, so casing, punctuation and
//! common English contractions never count against the learner.

use std::sync::OnceLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Contraction table
// ---------------------------------------------------------------------------

/// Contractions expanded by [`normalize`].  Keys are already lower-case.
const CONTRACTIONS: &[(&str, &str)] = &[
    ("don't", "do not"),
    ("doesn't", "does not"),
    ("didn't", "did not"),
    ("can't", "cannot"),
    ("won't", "will not"),
    ("isn't", "is not"),
    ("aren't", "are not"),
    ("wasn't", "was not"),
    ("weren't", "were not"),
    ("haven't", "have not"),
    ("hasn't", "has not"),
    ("hadn't", "had not"),
    ("wouldn't", "would not"),
    ("shouldn't", "should not"),
    ("couldn't", "could not"),
    ("i'm", "i am"),
    ("you're", "you are"),
    ("we're", "we are"),
    ("they're", "they are"),
    ("it's", "it is"),
    ("he's", "he is"),
    ("she's", "she is"),
    ("that's", "that is"),
    ("there's", "there is"),
    ("what's", "what is"),
    ("let's", "let us"),
    ("i've", "i have"),
    ("you've", "you have"),
    ("we've", "we have"),
    ("they've", "they have"),
    ("i'll", "i will"),
    ("you'll", "you will"),
    ("he'll", "he will"),
    ("she'll", "she will"),
    ("we'll", "we will"),
    ("they'll", "they will"),
    ("i'd", "i would"),
    ("you'd", "you would"),
    ("we'd", "we would"),
    ("they'd", "they would"),
];

fn expand_contraction(token: &str) -> Option<&'static str> {
    CONTRACTIONS
        .iter()
        .find(|(short, _)| *short == token)
        .map(|(_, long)| *long)
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// Anything that is not a word character, whitespace or an apostrophe.
fn symbols() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s']").expect("static regex"))
}

/// Typographic single quotes that recognizers and lesson files both emit.
fn curly_apostrophes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\u{2018}\u{2019}\u{02BC}]").expect("static regex"))
}

// ---------------------------------------------------------------------------
// normalize
// ---------------------------------------------------------------------------

/// Normalize free-form text into a comparable, space-separated token string.
///
/// Lower-cases, strips punctuation and symbols (apostrophes survive so that
/// contractions can be recognised), expands the contraction table, trims
/// stray quote marks from token edges and collapses whitespace.
///
/// Total and idempotent: `normalize(&normalize(x)) == normalize(x)`.
///
/// ```
/// use lesson_coach::scoring::normalize;
///
/// assert_eq!(normalize("Don't  STOP, it's fine!"), "do not stop it is fine");
/// assert_eq!(normalize("  ...  "), "");
/// ```
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let straightened = curly_apostrophes().replace_all(&lowered, "'");
    let stripped = symbols().replace_all(&straightened, "");

    let mut out: Vec<&str> = Vec::new();
    for raw in stripped.split_whitespace() {
        let token = raw.trim_matches('\'');
        if token.is_empty() {
            continue;
        }
        match expand_contraction(token) {
            Some(expanded) => out.extend(expanded.split(' ')),
            None => out.push(token),
        }
    }
    out.join(" ")
}

/// Split normalized text into tokens.  Empty input yields no tokens.
pub fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
