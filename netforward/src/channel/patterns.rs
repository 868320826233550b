//! Pattern sets for prompt, pagination and outcome detection.

use indexmap::IndexMap;
use regex::bytes::Regex;

/// Ordered collection of labelled outcome patterns plus an optional
/// pagination marker.
///
/// The receive loop always tests the pagination marker first, then the
/// outcomes in the order they were pushed. The first outcome to match wins,
/// so order is the tie-break when several patterns could match the same
/// line.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    pagination: Option<Regex>,
    outcomes: Vec<(String, Regex)>,
}

impl PatternSet {
    /// Create an empty pattern set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pagination marker.
    pub fn with_pagination(mut self, pattern: Regex) -> Self {
        self.pagination = Some(pattern);
        self
    }

    /// Append an outcome pattern at the lowest priority.
    pub fn with_outcome(mut self, label: impl Into<String>, pattern: Regex) -> Self {
        self.outcomes.push((label.into(), pattern));
        self
    }

    /// The pagination marker, if any.
    pub fn pagination(&self) -> Option<&Regex> {
        self.pagination.as_ref()
    }

    /// Outcome patterns in priority order.
    pub fn outcomes(&self) -> &[(String, Regex)] {
        &self.outcomes
    }

    /// Number of outcome patterns.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether there are no outcome patterns.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Caller-supplied mapping of outcome label to regex source.
///
/// Insertion order is preserved and defines match priority.
///
/// ```rust
/// use netforward::PromptMap;
///
/// let prompts = PromptMap::new()
///     .with("confirm", r"\[y/n\]")
///     .with("success", r"device#\s*$");
/// assert_eq!(prompts.labels().collect::<Vec<_>>(), ["confirm", "success"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptMap {
    entries: IndexMap<String, String>,
}

impl PromptMap {
    /// Create an empty prompt map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder style. Re-using a label replaces its pattern
    /// but keeps its original position.
    pub fn with(mut self, label: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.insert(label, pattern);
        self
    }

    /// Add an entry.
    pub fn insert(&mut self, label: impl Into<String>, pattern: impl Into<String>) {
        self.entries.insert(label.into(), pattern.into());
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels in priority order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(label, pattern)` pairs in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Compile every pattern, preserving order.
    pub fn compile(&self) -> Result<Vec<(String, Regex)>, regex::Error> {
        self.entries
            .iter()
            .map(|(label, pattern)| Ok((label.clone(), Regex::new(pattern)?)))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for PromptMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = PromptMap::new();
        for (label, pattern) in iter {
            map.insert(label, pattern);
        }
        map
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for PromptMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

/// Build a pattern that matches a discovered prompt literally at end of line.
///
/// Returns the escaped prompt text alongside the compiled regex.
pub fn literal_prompt_pattern(prompt: &str) -> Result<(String, Regex), regex::Error> {
    let escaped = regex::escape(prompt);
    let regex = Regex::new(&format!(r"{}\s*$", escaped))?;
    Ok((escaped, regex))
}
