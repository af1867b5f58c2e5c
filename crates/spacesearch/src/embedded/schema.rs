use spacesearch_core::Resource;
use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, Schema, SchemaBuilder, TantivyDocument,
    TextFieldIndexing, TextOptions, Value, STORED, STRING, TEXT,
};
use tantivy::tokenizer::{LowerCaser, RawTokenizer, TextAnalyzer};
use tantivy::{Index, Term};

use crate::error::{IndexError, IndexResult};

/// Whole-value, case-insensitive tokenizer for keyword fields
pub const LOWERCASE_KEYWORD: &str = "lowercase_keyword";

/// Stemmed English analyzer for extracted content
pub const FULLTEXT: &str = "en_stem";

/// Tantivy schema of an indexed [`Resource`].
///
/// Structural fields are raw strings for exact filtering. The complete
/// resource is kept as JSON in `_source` so subtree rewrites can re-index
/// documents without consulting storage.
#[derive(Clone)]
pub struct ResourceSchema {
    schema: Schema,
    pub id: Field,
    pub root_id: Field,
    pub parent_id: Field,
    pub path: Field,
    pub resource_type: Field,
    pub name: Field,
    pub title: Field,
    pub content: Field,
    pub tags: Field,
    pub mime_type: Field,
    pub deleted: Field,
    pub hidden: Field,
    pub size: Field,
    pub source: Field,
}

impl ResourceSchema {
    pub fn build() -> Self {
        let keyword = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(LOWERCASE_KEYWORD)
                .set_index_option(IndexRecordOption::Basic),
        );
        let fulltext = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(FULLTEXT)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();
        let flag = NumericOptions::default().set_indexed().set_fast();

        let mut builder = SchemaBuilder::default();
        let id = builder.add_text_field("id", STRING | STORED);
        let root_id = builder.add_text_field("root_id", STRING);
        let parent_id = builder.add_text_field("parent_id", STRING);
        let path = builder.add_text_field("path", STRING);
        let resource_type = builder.add_text_field("resource_type", STRING);
        let name = builder.add_text_field("name", keyword.clone());
        let title = builder.add_text_field("title", TEXT);
        let content = builder.add_text_field("content", fulltext);
        let tags = builder.add_text_field("tags", keyword.clone());
        let mime_type = builder.add_text_field("mime_type", keyword);
        let deleted = builder.add_bool_field("deleted", flag.clone());
        let hidden = builder.add_bool_field("hidden", flag.clone());
        let size = builder.add_u64_field("size", flag);
        let source = builder.add_text_field("_source", STORED);

        Self {
            schema: builder.build(),
            id,
            root_id,
            parent_id,
            path,
            resource_type,
            name,
            title,
            content,
            tags,
            mime_type,
            deleted,
            hidden,
            size,
            source,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Register the analyzers the schema refers to on a freshly opened index
    pub fn register_tokenizers(index: &Index) {
        index.tokenizers().register(
            LOWERCASE_KEYWORD,
            TextAnalyzer::builder(RawTokenizer::default())
                .filter(LowerCaser)
                .build(),
        );
    }

    pub fn id_term(&self, id: &str) -> Term {
        Term::from_field_text(self.id, id)
    }

    pub fn deleted_term(&self, deleted: bool) -> Term {
        Term::from_field_bool(self.deleted, deleted)
    }

    pub fn to_document(&self, resource: &Resource) -> IndexResult<TantivyDocument> {
        let document = &resource.document;
        let mut doc = TantivyDocument::default();
        doc.add_text(self.id, &resource.id);
        doc.add_text(self.root_id, &resource.root_id);
        doc.add_text(self.parent_id, &resource.parent_id);
        doc.add_text(self.path, &resource.path);
        doc.add_text(self.resource_type, resource.resource_type.as_str());
        doc.add_text(self.name, &document.name);
        doc.add_text(self.title, &document.title);
        doc.add_text(self.content, &document.content);
        for tag in &document.tags {
            doc.add_text(self.tags, tag);
        }
        doc.add_text(self.mime_type, &document.mime_type);
        doc.add_bool(self.deleted, resource.deleted);
        doc.add_bool(self.hidden, resource.hidden);
        doc.add_u64(self.size, document.size);
        doc.add_text(self.source, serde_json::to_string(resource)?);
        Ok(doc)
    }

    pub fn from_document(&self, doc: &TantivyDocument) -> IndexResult<Resource> {
        let source = doc
            .get_first(self.source)
            .and_then(|value| value.as_str())
            .ok_or_else(|| IndexError::Serde(serde::de::Error::missing_field("_source")))?;
        Ok(serde_json::from_str(source)?)
    }
}
