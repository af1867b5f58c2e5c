//! Query mini-language
//!
//! Users search with a small KQL-like language:
//!
//! - whitespace separated terms, all of which must match
//! - `"quoted phrases"`
//! - `field:value` restrictions (`name`, `title`, `content`, `tag`, `mime`, `type`)
//! - negation with a leading `-` or a preceding `NOT`
//! - `*` and `?` wildcards on keyword fields
//!
//! A `scope:<resource-id>` token is not part of the language; it is pulled
//! out with [`parse_scope`] before parsing.

mod parser;
mod scope;

pub use parser::wildcard_to_regex;
pub use scope::parse_scope;

use crate::domain::{DomainResult, ResourceType};

/// Whether a clause must or must not match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    MustNot,
}

/// Field a clause is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryField {
    Name,
    Title,
    Content,
    Tags,
    MimeType,
    Type,
}

impl QueryField {
    /// Look up a field by its query-language name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "name" => Some(QueryField::Name),
            "title" => Some(QueryField::Title),
            "content" => Some(QueryField::Content),
            "tag" | "tags" => Some(QueryField::Tags),
            "mime" | "mimetype" | "mediatype" => Some(QueryField::MimeType),
            "type" => Some(QueryField::Type),
            _ => None,
        }
    }

    /// Keyword fields are matched case-insensitively as whole values
    pub fn is_keyword(&self) -> bool {
        matches!(self, QueryField::Name | QueryField::Tags | QueryField::MimeType)
    }
}

/// Value of a clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseValue {
    /// A single bare word
    Term(String),
    /// A quoted phrase
    Phrase(String),
    /// A pattern containing `*` or `?`
    Wildcard(String),
    /// A `type:` restriction
    Type(ResourceType),
}

/// One clause of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub occur: Occur,
    /// `None` for free terms matched against several fields
    pub field: Option<QueryField>,
    pub value: ClauseValue,
}

/// Parsed query: a conjunction of clauses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryAst {
    clauses: Vec<Clause>,
}

impl QueryAst {
    /// Parse query text, reporting syntax problems as [`crate::DomainError::InvalidQuery`]
    pub fn parse(input: &str) -> DomainResult<Self> {
        parser::parse(input).map(|clauses| Self { clauses })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// An empty query matches every document
    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }

    /// True when no clause is positive, so a match-all base is required
    pub fn is_purely_negative(&self) -> bool {
        !self.clauses.is_empty() && self.clauses.iter().all(|c| c.occur == Occur::MustNot)
    }
}

/// Translates a parsed query into a backend query
pub trait QueryCompiler {
    type Output;
    type Error;

    fn compile(&self, ast: &QueryAst) -> Result<Self::Output, Self::Error>;
}
