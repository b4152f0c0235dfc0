use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Semantic category a free-text label can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Bug,
    Feature,
    Test,
    Build,
    Doc,
    Coding,
    Enhance,
    Gfi,
    Medium,
    Major,
    Triaged,
    Untriaged,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Bug,
        Category::Feature,
        Category::Test,
        Category::Build,
        Category::Doc,
        Category::Coding,
        Category::Enhance,
        Category::Gfi,
        Category::Medium,
        Category::Major,
        Category::Triaged,
        Category::Untriaged,
    ];
}

/// Histogram of label categories on an issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCategory {
    pub bug: u32,
    pub feature: u32,
    pub test: u32,
    pub build: u32,
    pub doc: u32,
    pub coding: u32,
    pub enhance: u32,
    pub gfi: u32,
    pub medium: u32,
    pub major: u32,
    pub triaged: u32,
    pub untriaged: u32,
}

impl LabelCategory {
    pub fn get(&self, category: Category) -> u32 {
        match category {
            Category::Bug => self.bug,
            Category::Feature => self.feature,
            Category::Test => self.test,
            Category::Build => self.build,
            Category::Doc => self.doc,
            Category::Coding => self.coding,
            Category::Enhance => self.enhance,
            Category::Gfi => self.gfi,
            Category::Medium => self.medium,
            Category::Major => self.major,
            Category::Triaged => self.triaged,
            Category::Untriaged => self.untriaged,
        }
    }

    fn slot(&mut self, category: Category) -> &mut u32 {
        match category {
            Category::Bug => &mut self.bug,
            Category::Feature => &mut self.feature,
            Category::Test => &mut self.test,
            Category::Build => &mut self.build,
            Category::Doc => &mut self.doc,
            Category::Coding => &mut self.coding,
            Category::Enhance => &mut self.enhance,
            Category::Gfi => &mut self.gfi,
            Category::Medium => &mut self.medium,
            Category::Major => &mut self.major,
            Category::Triaged => &mut self.triaged,
            Category::Untriaged => &mut self.untriaged,
        }
    }

    pub fn increment(&mut self, category: Category) {
        *self.slot(category) += 1;
    }
}

struct Rule {
    category: Category,
    /// Lemmatized words. More than one word means all of them must be present.
    words: Vec<String>,
    /// Lemmatized tokens that veto the rule.
    exclude: Vec<String>,
}

/// Derived-form matching only applies to rule words at least this long.
const MIN_STEM_LEN: usize = 4;

/// Endings that turn a rule word into a derived form of it ("enhance" ->
/// "enhancement"). A bare `e` is left over by the lemmatizer on "-es" plurals.
const DERIVED_ENDINGS: &[&str] = &[
    "e", "es", "ment", "er", "or", "ing", "ed", "ation", "al", "able", "ability", "ity",
];

fn rule(category: Category, phrase: &str, exclude: &[&str]) -> Rule {
    Rule {
        category,
        words: tokenize(phrase),
        exclude: exclude.iter().flat_map(|w| tokenize(w)).collect(),
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use Category::*;

    let mut rules = Vec::new();
    let mut add = |category: Category, phrases: &[&str]| {
        rules.extend(phrases.iter().map(|p| rule(category, p, &[])));
    };

    add(Bug, &["bug", "defect", "crash", "regression", "broken"]);
    add(Feature, &["feature", "proposal"]);
    add(Test, &["test", "flaky", "coverage"]);
    add(
        Build,
        &["build", "ci", "dependency", "packaging", "release", "infrastructure"],
    );
    add(Doc, &["doc", "documentation", "readme", "typo"]);
    add(
        Coding,
        &["refactor", "code", "cleanup", "clean up", "lint", "style", "tech debt", "technical debt"],
    );
    add(Enhance, &["enhance", "improve", "optimization", "performance", "perf"]);
    add(
        Gfi,
        &[
            "good first",
            "first timer",
            "beginner",
            "newcomer",
            "newbie",
            "starter",
            "easy",
            "gfi",
            "low hanging fruit",
        ],
    );
    add(Medium, &["medium", "moderate", "intermediate"]);
    add(
        Major,
        &["major", "critical", "blocker", "urgent", "severe", "high priority", "p0", "p1"],
    );
    add(Untriaged, &["untriaged", "triage"]);

    let not_yet = &["untriaged", "triage", "needs", "pending", "awaiting", "unconfirmed"];
    rules.push(rule(Triaged, "triaged", not_yet));
    rules.push(rule(Triaged, "confirmed", not_yet));
    rules.push(rule(Triaged, "accepted", not_yet));

    rules
});

/// Reduce an English word to a rough lemma (plural and -ing/-ed stripping).
pub fn lemmatize(word: &str) -> String {
    let w = word.to_lowercase();
    let len = w.chars().count();
    if len <= 3 || !w.is_ascii() {
        return w;
    }
    if let Some(stem) = w.strip_suffix("ies") {
        return format!("{stem}y");
    }
    if let Some(stem) = w.strip_suffix("sses") {
        return format!("{stem}ss");
    }
    if w.ends_with("ss") || w.ends_with("us") || w.ends_with("is") {
        return w;
    }
    if let Some(stem) = w.strip_suffix('s') {
        return stem.to_string();
    }
    if let Some(stem) = w.strip_suffix("ing") {
        if stem.len() >= 4 {
            return stem.to_string();
        }
    }
    if let Some(stem) = w.strip_suffix("ed") {
        if stem.len() >= 4 {
            return stem.to_string();
        }
    }
    w
}

/// Split a label into lemmatized alphanumeric tokens.
pub fn tokenize(label: &str) -> Vec<String> {
    label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(lemmatize)
        .collect()
}

/// Whether `token` is `word` or a derived form of it. Other substrings
/// ("latest" for "test", "codecov" for "code") do not count.
fn matches_word(token: &str, word: &str) -> bool {
    token == word
        || (word.chars().count() >= MIN_STEM_LEN
            && token
                .strip_prefix(word)
                .is_some_and(|ending| DERIVED_ENDINGS.contains(&ending)))
}

fn rule_matches(rule: &Rule, tokens: &[String]) -> bool {
    if rule.exclude.iter().any(|x| tokens.contains(x)) {
        return false;
    }
    match rule.words.as_slice() {
        [] => false,
        [word] => tokens.iter().any(|t| matches_word(t, word)),
        words => words.iter().all(|w| tokens.contains(w)),
    }
}

/// Categories a single label falls into.
pub fn categories_of(label: &str) -> Vec<Category> {
    let tokens = tokenize(label);
    Category::ALL
        .into_iter()
        .filter(|cat| {
            RULES
                .iter()
                .filter(|r| r.category == *cat)
                .any(|r| rule_matches(r, &tokens))
        })
        .collect()
}

/// Count, per category, how many of `labels` fall into it.
pub fn categorize<S: AsRef<str>>(labels: &[S]) -> LabelCategory {
    let mut histogram = LabelCategory::default();
    for label in labels {
        for category in categories_of(label.as_ref()) {
            histogram.increment(category);
        }
    }
    histogram
}
