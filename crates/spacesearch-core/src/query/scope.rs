use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SCOPE_TOKEN: Regex = Regex::new(r"(?:^|\s)scope:(\S+)").unwrap();
}

/// Split a `scope:<value>` token out of `query`.
///
/// Returns the query without the token (trimmed) and the scope value. Only
/// the first token is honoured; any later ones are removed as well.
pub fn parse_scope(query: &str) -> (String, Option<String>) {
    let scope = SCOPE_TOKEN
        .captures(query)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    match scope {
        Some(scope) => {
            let cleaned = SCOPE_TOKEN.replace_all(query, "");
            (cleaned.trim().to_string(), Some(scope))
        }
        None => (query.trim().to_string(), None),
    }
}
