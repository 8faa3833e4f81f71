//! `*`-only glob patterns used to filter change locations.

use regex::Regex;

/// A pattern where `*` matches any sequence of characters and everything else is literal.
#[derive(Debug, Clone)]
pub struct WildcardString {
    raw: String,
    exact: Option<Regex>,
    path: Option<Regex>,
}

impl WildcardString {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let body = raw
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        let exact = Regex::new(&format!("^{body}$")).ok();

        let folder = raw
            .strip_suffix("/*")
            .or_else(|| raw.strip_suffix('/'))
            .map(|prefix| {
                prefix
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(".*")
            });
        let path = match folder {
            Some(prefix) => Regex::new(&format!("^{prefix}(/.*)?$")),
            None => Regex::new(&format!("^{body}$")),
        }
        .ok();

        Self { raw, exact, path }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Full match against the whole input.
    pub fn matches(&self, value: &str) -> bool {
        self.exact.as_ref().is_some_and(|re| re.is_match(value))
    }

    /// Like [`matches`](Self::matches), but a pattern naming a folder (`dir/` or `dir/*`)
    /// also matches everything below it.
    pub fn matches_path(&self, path: &str) -> bool {
        self.path.as_ref().is_some_and(|re| re.is_match(path))
    }
}

impl From<&str> for WildcardString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<&String> for WildcardString {
    fn from(value: &String) -> Self {
        Self::new(value.as_str())
    }
}
