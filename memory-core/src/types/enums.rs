use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Category of a symbolic memory fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactCategory {
    Preference,
    Constraint,
    Decision,
    Fact,
}

impl FactCategory {
    /// All categories in injection order.
    pub const ALL: [FactCategory; 4] = [
        FactCategory::Preference,
        FactCategory::Constraint,
        FactCategory::Decision,
        FactCategory::Fact,
    ];
}

impl fmt::Display for FactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FactCategory::Preference => "preference",
            FactCategory::Constraint => "constraint",
            FactCategory::Decision => "decision",
            FactCategory::Fact => "fact",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FactCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preference" => Ok(FactCategory::Preference),
            "constraint" => Ok(FactCategory::Constraint),
            "decision" => Ok(FactCategory::Decision),
            "fact" => Ok(FactCategory::Fact),
            other => Err(Error::InvalidArgument(format!(
                "Unknown fact category: {other}"
            ))),
        }
    }
}

/// Origin of a symbolic memory fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    User,
    Agent,
    AutoLearning,
    System,
}

impl fmt::Display for FactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FactSource::User => "user",
            FactSource::Agent => "agent",
            FactSource::AutoLearning => "auto_learning",
            FactSource::System => "system",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FactSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(FactSource::User),
            "agent" => Ok(FactSource::Agent),
            "auto_learning" => Ok(FactSource::AutoLearning),
            "system" => Ok(FactSource::System),
            other => Err(Error::InvalidArgument(format!(
                "Unknown fact source: {other}"
            ))),
        }
    }
}

/// Authority tier attached to every item the tool surface returns.
///
/// Symbolic facts are authoritative, episodes advisory, semantic chunks
/// non-authoritative. Callers must treat injected memory accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Authority {
    #[serde(rename = "authoritative")]
    Authoritative,
    #[serde(rename = "advisory")]
    Advisory,
    #[serde(rename = "non-authoritative")]
    NonAuthoritative,
    #[serde(rename = "system")]
    System,
}

impl Authority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Authority::Authoritative => "authoritative",
            Authority::Advisory => "advisory",
            Authority::NonAuthoritative => "non-authoritative",
            Authority::System => "system",
        }
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Document type of a semantic chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Doc,
    Code,
    Note,
    Article,
    Reference,
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocType::Doc => "doc",
            DocType::Code => "code",
            DocType::Note => "note",
            DocType::Article => "article",
            DocType::Reference => "reference",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DocType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doc" => Ok(DocType::Doc),
            "code" => Ok(DocType::Code),
            "note" => Ok(DocType::Note),
            "article" => Ok(DocType::Article),
            "reference" => Ok(DocType::Reference),
            other => Err(Error::InvalidArgument(format!(
                "Unknown document type: {other}"
            ))),
        }
    }
}

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Archived,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ProjectStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProjectStatus::Active),
            "archived" => Ok(ProjectStatus::Archived),
            other => Err(Error::InvalidArgument(format!(
                "Unknown project status: {other}"
            ))),
        }
    }
}

/// Outcome of a tracked tool operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpResult {
    Success,
    Error,
}

impl OpResult {
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, OpResult::Success)
    }
}
