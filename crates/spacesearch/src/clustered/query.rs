use serde_json::{json, Value};
use spacesearch_core::{Clause, ClauseValue, Occur, QueryAst, QueryCompiler, QueryField};

use crate::error::IndexError;

/// Compiles the query language into an OpenSearch query DSL object
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenSearchQueryCompiler;

impl OpenSearchQueryCompiler {
    fn clause(&self, clause: &Clause) -> Value {
        let field = match clause.field {
            Some(field) => field,
            None => return free(&clause.value),
        };
        let name = match field {
            QueryField::Name => "name",
            QueryField::Tags => "tags",
            QueryField::MimeType => "mime_type",
            QueryField::Title => "title",
            QueryField::Content => "content",
            QueryField::Type => "resource_type",
        };

        match &clause.value {
            ClauseValue::Type(resource_type) => term(name, resource_type.as_str()),
            ClauseValue::Wildcard(pattern) => wildcard(name, pattern),
            ClauseValue::Term(text) | ClauseValue::Phrase(text) if field.is_keyword() => {
                term(name, &text.to_lowercase())
            }
            ClauseValue::Term(text) => json!({ "match": { name: { "query": text, "operator": "and" } } }),
            ClauseValue::Phrase(text) => json!({ "match_phrase": { name: text } }),
        }
    }
}

/// Free terms match the name substring, title, content or a tag
fn free(value: &ClauseValue) -> Value {
    let should = match value {
        ClauseValue::Term(text) => vec![
            wildcard("name", &format!("*{}*", escape_wildcard(text))),
            json!({ "match": { "title": { "query": text, "operator": "and" } } }),
            json!({ "match": { "content": { "query": text, "operator": "and" } } }),
            term("tags", &text.to_lowercase()),
        ],
        ClauseValue::Phrase(text) => vec![
            term("name", &text.to_lowercase()),
            json!({ "match_phrase": { "title": text } }),
            json!({ "match_phrase": { "content": text } }),
        ],
        ClauseValue::Wildcard(pattern) => vec![wildcard("name", pattern), wildcard("tags", pattern)],
        ClauseValue::Type(resource_type) => vec![term("resource_type", resource_type.as_str())],
    };
    json!({ "bool": { "should": should, "minimum_should_match": 1 } })
}

fn term(field: &str, value: &str) -> Value {
    json!({ "term": { field: value } })
}

fn wildcard(field: &str, pattern: &str) -> Value {
    json!({
        "wildcard": {
            field: { "value": pattern.to_lowercase(), "case_insensitive": true }
        }
    })
}

/// Escape wildcard metacharacters in literal text
fn escape_wildcard(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl QueryCompiler for OpenSearchQueryCompiler {
    type Output = Value;
    type Error = IndexError;

    fn compile(&self, ast: &QueryAst) -> Result<Value, IndexError> {
        if ast.is_match_all() {
            return Ok(json!({ "match_all": {} }));
        }

        let mut must = Vec::new();
        let mut must_not = Vec::new();
        for clause in ast.clauses() {
            match clause.occur {
                Occur::Must => must.push(self.clause(clause)),
                Occur::MustNot => must_not.push(self.clause(clause)),
            }
        }
        if must.is_empty() {
            must.push(json!({ "match_all": {} }));
        }
        Ok(json!({ "bool": { "must": must, "must_not": must_not } }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(query: &str) -> Value {
        let ast = QueryAst::parse(query).unwrap();
        OpenSearchQueryCompiler.compile(&ast).unwrap()
    }

    #[test]
    fn test_empty_query_matches_all() {
        assert_eq!(compile(""), json!({ "match_all": {} }));
    }

    #[test]
    fn test_fields_translate() {
        let query = compile(r#"tag:Finance -name:*.tmp content:"annual budget""#);
        let must = &query["bool"]["must"];
        assert_eq!(must[0], json!({ "term": { "tags": "finance" } }));
        assert_eq!(must[1], json!({ "match_phrase": { "content": "annual budget" } }));
        assert_eq!(
            query["bool"]["must_not"][0]["wildcard"]["name"]["value"],
            "*.tmp"
        );
    }

    #[test]
    fn test_free_term_searches_several_fields() {
        let query = compile("Report");
        let should = &query["bool"]["must"][0]["bool"]["should"];
        assert_eq!(should[0]["wildcard"]["name"]["value"], "*report*");
        assert_eq!(should[2]["match"]["content"]["query"], "Report");
        assert_eq!(should[3], json!({ "term": { "tags": "report" } }));
    }

    #[test]
    fn test_negative_only_query_keeps_match_all() {
        let query = compile("-type:folder");
        assert_eq!(query["bool"]["must"][0], json!({ "match_all": {} }));
        assert_eq!(
            query["bool"]["must_not"][0],
            json!({ "term": { "resource_type": "container" } })
        );
    }
}
