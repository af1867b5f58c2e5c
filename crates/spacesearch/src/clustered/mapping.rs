use serde_json::{json, Value};

/// Analyzer splitting `./a/b` into `.`, `./a`, `./a/b`
pub const PATH_TREE_ANALYZER: &str = "path_tree";

/// Settings and mappings used when the resource index is created
pub fn index_definition() -> Value {
    let keyword = json!({ "type": "keyword" });
    let lowercase_keyword = json!({ "type": "keyword", "normalizer": "lowercase_normalizer" });

    json!({
        "settings": {
            "analysis": {
                "normalizer": {
                    "lowercase_normalizer": { "type": "custom", "filter": ["lowercase"] }
                },
                "tokenizer": {
                    "path_tree": { "type": "path_hierarchy", "delimiter": "/" }
                },
                "analyzer": {
                    "path_tree": { "type": "custom", "tokenizer": "path_tree" }
                }
            }
        },
        "mappings": {
            "properties": {
                "id": keyword.clone(),
                "root_id": keyword.clone(),
                "parent_id": keyword.clone(),
                "resource_type": keyword.clone(),
                "path": {
                    "type": "keyword",
                    "fields": {
                        "tree": {
                            "type": "text",
                            "analyzer": PATH_TREE_ANALYZER,
                            "search_analyzer": "keyword"
                        }
                    }
                },
                "name": lowercase_keyword.clone(),
                "tags": lowercase_keyword.clone(),
                "mime_type": lowercase_keyword,
                "title": { "type": "text" },
                "content": { "type": "text", "analyzer": "english" },
                "deleted": { "type": "boolean" },
                "hidden": { "type": "boolean" },
                "size": { "type": "long" },
                "mtime": { "type": "date" }
            }
        }
    })
}
