use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Closed set of result categories an engine can serve.
///
/// Declaration order is the canonical order used for cache keys and for
/// picking the dispatch category of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    General,
    Images,
    Videos,
    News,
    Science,
    Files,
    It,
    Social,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::General,
        Category::Images,
        Category::Videos,
        Category::News,
        Category::Science,
        Category::Files,
        Category::It,
        Category::Social,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Images => "images",
            Category::Videos => "videos",
            Category::News => "news",
            Category::Science => "science",
            Category::Files => "files",
            Category::It => "it",
            Category::Social => "social",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnknownCategory(s.trim().to_string()))
    }
}

/// Stable identifier of one configured upstream engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineId(String);

impl EngineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EngineId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EngineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Rendering requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Html,
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "html" => Ok(OutputFormat::Html),
            other => Err(ValidationError::UnknownFormat(other.to_string())),
        }
    }
}

/// Reasons a request is rejected before anything is dispatched.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("query text must not be empty")]
    EmptyQuery,

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("unknown engine: {0}")]
    UnknownEngine(String),

    #[error("page number must be a positive integer")]
    InvalidPage,

    #[error("unknown output format: {0}")]
    UnknownFormat(String),
}

/// Raw inbound search parameters, as handed over by the HTTP layer or CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub text: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub engines: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Validate the raw parameters into an immutable [`Query`].
    ///
    /// Engine names are only checked for shape here; whether they are
    /// registered is decided by the session, which owns the registry.
    ///
    /// ```
    /// use veil_common::{Category, SearchRequest, ValidationError};
    ///
    /// let err = SearchRequest {
    ///     text: "docker".into(),
    ///     categories: vec!["recipes".into()],
    ///     ..Default::default()
    /// }
    /// .into_query(&[Category::General])
    /// .unwrap_err();
    /// assert_eq!(err, ValidationError::UnknownCategory("recipes".into()));
    /// ```
    pub fn into_query(self, default_categories: &[Category]) -> Result<Query, ValidationError> {
        let text = collapse_whitespace(&self.text);
        if text.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }

        let mut categories = BTreeSet::new();
        for raw in self.categories.iter().flat_map(|c| c.split(',')) {
            if raw.trim().is_empty() {
                continue;
            }
            categories.insert(raw.parse::<Category>()?);
        }
        if categories.is_empty() {
            categories.extend(default_categories.iter().copied());
        }
        if categories.is_empty() {
            categories.insert(Category::General);
        }

        let engines: BTreeSet<EngineId> = self
            .engines
            .iter()
            .flat_map(|e| e.split(','))
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(EngineId::from)
            .collect();

        let language = self
            .language
            .map(|l| l.trim().to_ascii_lowercase())
            .filter(|l| !l.is_empty() && l != "all" && l != "auto");

        let page = match self.page {
            None => 1,
            Some(0) => return Err(ValidationError::InvalidPage),
            Some(p) => p,
        };

        Ok(Query {
            text,
            categories,
            engines: (!engines.is_empty()).then_some(engines),
            language,
            page,
        })
    }
}

/// A validated, immutable search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    categories: BTreeSet<Category>,
    engines: Option<BTreeSet<EngineId>>,
    language: Option<String>,
    page: u32,
}

impl Query {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn categories(&self) -> &BTreeSet<Category> {
        &self.categories
    }

    /// Engines named explicitly by the caller, if any.
    pub fn engines(&self) -> Option<&BTreeSet<EngineId>> {
        self.engines.as_ref()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Stable textual form of every field that influences the result set.
    ///
    /// Two requests that differ only in whitespace, category order or
    /// engine order produce the same canonical form.
    pub fn canonical_form(&self) -> String {
        let categories: Vec<&str> = self.categories.iter().map(|c| c.as_str()).collect();
        let engines: Vec<&str> = self
            .engines
            .iter()
            .flatten()
            .map(EngineId::as_str)
            .collect();
        format!(
            "q={}\u{1f}c={}\u{1f}e={}\u{1f}l={}\u{1f}p={}",
            self.text,
            categories.join(","),
            engines.join(","),
            self.language.as_deref().unwrap_or(""),
            self.page
        )
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
