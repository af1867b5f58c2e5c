//! spacesearch core - pure domain logic for the space search index
//!
//! This crate holds everything the index backends and the ingestion
//! pipeline agree on without touching I/O:
//!
//! - [`domain`]: resource identity, the indexed resource model, path rules
//!   and the search request/response contract
//! - [`query`]: the user query mini-language and `scope:` extraction
//!
//! Backends translate a parsed [`query::QueryAst`] through their own
//! [`query::QueryCompiler`].

pub mod domain;
pub mod query;

pub use domain::*;
pub use query::{
    parse_scope, wildcard_to_regex, Clause, ClauseValue, Occur, QueryAst, QueryCompiler, QueryField,
};
