use spacesearch_core::{
    wildcard_to_regex, Clause, ClauseValue, Occur, QueryAst, QueryCompiler, QueryField,
};
use tantivy::query::{
    AllQuery, BooleanQuery, EmptyQuery, Occur as TantivyOccur, PhraseQuery, Query, RegexQuery,
    TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::tokenizer::TokenStream;
use tantivy::Term;

use crate::embedded::index::EmbeddedIndex;
use crate::error::IndexResult;

/// Compiles the query language into tantivy queries over the resource schema
pub struct TantivyQueryCompiler<'a> {
    index: &'a EmbeddedIndex,
}

impl<'a> TantivyQueryCompiler<'a> {
    pub fn new(index: &'a EmbeddedIndex) -> Self {
        Self { index }
    }

    fn clause(&self, clause: &Clause) -> IndexResult<Box<dyn Query>> {
        let schema = self.index.schema();
        let field = match clause.field {
            Some(field) => field,
            None => return self.free(&clause.value),
        };

        let target = match field {
            QueryField::Name => schema.name,
            QueryField::Tags => schema.tags,
            QueryField::MimeType => schema.mime_type,
            QueryField::Title => schema.title,
            QueryField::Content => schema.content,
            QueryField::Type => schema.resource_type,
        };
        match &clause.value {
            ClauseValue::Type(resource_type) => Ok(self.keyword(target, resource_type.as_str())),
            ClauseValue::Wildcard(pattern) => self.wildcard(target, pattern),
            ClauseValue::Term(text) | ClauseValue::Phrase(text) if field.is_keyword() => {
                Ok(self.keyword(target, text))
            }
            ClauseValue::Term(text) => self.analyzed(target, text, false),
            ClauseValue::Phrase(text) => self.analyzed(target, text, true),
        }
    }

    /// Free terms match the name substring, title, content or a tag
    fn free(&self, value: &ClauseValue) -> IndexResult<Box<dyn Query>> {
        let schema = self.index.schema();
        let queries = match value {
            ClauseValue::Term(text) => vec![
                self.keyword_regex(
                    schema.name,
                    &format!(".*{}.*", regex::escape(&text.to_lowercase())),
                )?,
                self.analyzed(schema.title, text, false)?,
                self.analyzed(schema.content, text, false)?,
                self.keyword(schema.tags, text),
            ],
            ClauseValue::Phrase(text) => vec![
                self.keyword(schema.name, text),
                self.analyzed(schema.title, text, true)?,
                self.analyzed(schema.content, text, true)?,
            ],
            ClauseValue::Wildcard(pattern) => vec![
                self.wildcard(schema.name, pattern)?,
                self.wildcard(schema.tags, pattern)?,
            ],
            ClauseValue::Type(resource_type) => {
                vec![self.keyword(schema.resource_type, resource_type.as_str())]
            }
        };
        Ok(Box::new(BooleanQuery::new(
            queries
                .into_iter()
                .map(|query| (TantivyOccur::Should, query))
                .collect(),
        )))
    }

    fn keyword(&self, field: Field, value: &str) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_text(field, &value.to_lowercase()),
            IndexRecordOption::Basic,
        ))
    }

    fn keyword_regex(&self, field: Field, pattern: &str) -> IndexResult<Box<dyn Query>> {
        Ok(Box::new(RegexQuery::from_pattern(pattern, field)?))
    }

    fn wildcard(&self, field: Field, pattern: &str) -> IndexResult<Box<dyn Query>> {
        self.keyword_regex(field, &wildcard_to_regex(&pattern.to_lowercase()))
    }

    /// Run `text` through the field's analyzer; several tokens become a phrase
    /// when `phrase` is set and a conjunction otherwise.
    fn analyzed(&self, field: Field, text: &str, phrase: bool) -> IndexResult<Box<dyn Query>> {
        let mut analyzer = self.index.index().tokenizer_for_field(field)?;
        let mut stream = analyzer.token_stream(text);
        let mut terms = Vec::new();
        stream.process(&mut |token| terms.push(Term::from_field_text(field, &token.text)));

        let query: Box<dyn Query> = match terms.len() {
            0 => Box::new(EmptyQuery),
            1 => Box::new(TermQuery::new(
                terms.remove(0),
                IndexRecordOption::WithFreqs,
            )),
            _ if phrase => Box::new(PhraseQuery::new(terms)),
            _ => Box::new(BooleanQuery::new(
                terms
                    .into_iter()
                    .map(|term| {
                        let query: Box<dyn Query> =
                            Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                        (TantivyOccur::Must, query)
                    })
                    .collect(),
            )),
        };
        Ok(query)
    }
}

impl QueryCompiler for TantivyQueryCompiler<'_> {
    type Output = Box<dyn Query>;
    type Error = crate::error::IndexError;

    fn compile(&self, ast: &QueryAst) -> IndexResult<Box<dyn Query>> {
        if ast.is_match_all() {
            return Ok(Box::new(AllQuery));
        }

        let mut clauses = Vec::with_capacity(ast.clauses().len() + 1);
        if ast.is_purely_negative() {
            clauses.push((TantivyOccur::Must, Box::new(AllQuery) as Box<dyn Query>));
        }
        for clause in ast.clauses() {
            let occur = match clause.occur {
                Occur::Must => TantivyOccur::Must,
                Occur::MustNot => TantivyOccur::MustNot,
            };
            clauses.push((occur, self.clause(clause)?));
        }
        Ok(Box::new(BooleanQuery::new(clauses)))
    }
}
