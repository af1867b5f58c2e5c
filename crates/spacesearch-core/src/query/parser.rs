use crate::domain::{DomainError, DomainResult, ResourceType};

use super::{Clause, ClauseValue, Occur, QueryField};

/// A whitespace delimited chunk of the query before interpretation
#[derive(Debug)]
struct RawToken {
    negated: bool,
    word: String,
    phrase: Option<String>,
}

pub(super) fn parse(input: &str) -> DomainResult<Vec<Clause>> {
    let mut clauses = Vec::new();
    let mut pending_not = false;

    for token in tokenize(input)? {
        if token.phrase.is_none() && !token.negated {
            match token.word.as_str() {
                "NOT" => {
                    pending_not = !pending_not;
                    continue;
                }
                "AND" => continue,
                "OR" => return Err(invalid("OR is not supported, terms are always combined")),
                _ => {}
            }
        }

        let occur = if token.negated != pending_not {
            Occur::MustNot
        } else {
            Occur::Must
        };
        pending_not = false;
        clauses.push(build_clause(token, occur)?);
    }

    if pending_not {
        return Err(invalid("NOT must be followed by a term"));
    }
    Ok(clauses)
}

fn tokenize(input: &str) -> DomainResult<Vec<RawToken>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }

        let negated = chars[i] == '-' && chars.get(i + 1).is_some_and(|c| !c.is_whitespace());
        if negated {
            i += 1;
        }

        let mut word = String::new();
        let mut phrase = None;
        while i < chars.len() && !chars[i].is_whitespace() {
            if chars[i] == '"' {
                i += 1;
                let mut quoted = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(invalid("unterminated quote")),
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            quoted.push(*c);
                            i += 1;
                        }
                    }
                }
                phrase = Some(quoted);
                break;
            }
            word.push(chars[i]);
            i += 1;
        }

        tokens.push(RawToken {
            negated,
            word,
            phrase,
        });
    }

    Ok(tokens)
}

fn build_clause(token: RawToken, occur: Occur) -> DomainResult<Clause> {
    let RawToken { word, phrase, .. } = token;

    match phrase {
        Some(phrase) => {
            let field = match word.strip_suffix(':') {
                Some(name) => Some(lookup_field(name)?),
                None if word.is_empty() => None,
                None => return Err(invalid(&format!("unexpected quote after '{}'", word))),
            };
            if phrase.trim().is_empty() {
                return Err(invalid("empty phrase"));
            }
            clause(occur, field, phrase, true)
        }
        None => match split_field(&word) {
            Some((name, value)) => {
                let field = lookup_field(name)?;
                if value.is_empty() {
                    return Err(invalid(&format!("missing value for field '{}'", name)));
                }
                clause(occur, Some(field), value.to_string(), false)
            }
            None => clause(occur, None, word, false),
        },
    }
}

fn clause(occur: Occur, field: Option<QueryField>, text: String, quoted: bool) -> DomainResult<Clause> {
    let value = match field {
        Some(QueryField::Type) => match ResourceType::from_query_value(text.trim()) {
            Some(resource_type) => ClauseValue::Type(resource_type),
            None => return Err(invalid(&format!("unknown type '{}'", text))),
        },
        _ if quoted => ClauseValue::Phrase(text),
        Some(QueryField::Title) | Some(QueryField::Content) => ClauseValue::Term(text),
        _ if text.contains(['*', '?']) => ClauseValue::Wildcard(text),
        _ => ClauseValue::Term(text),
    };

    Ok(Clause { occur, field, value })
}

/// `name:value` where the name is purely alphabetic; anything else is a plain word
fn split_field(word: &str) -> Option<(&str, &str)> {
    let (name, value) = word.split_once(':')?;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((name, value))
}

fn lookup_field(name: &str) -> DomainResult<QueryField> {
    QueryField::from_name(name).ok_or_else(|| invalid(&format!("unknown field '{}'", name)))
}

fn invalid(message: &str) -> DomainError {
    DomainError::InvalidQuery(message.to_string())
}

/// Translate a `*`/`?` wildcard pattern into an anchored-by-construction regex
pub fn wildcard_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex
}
