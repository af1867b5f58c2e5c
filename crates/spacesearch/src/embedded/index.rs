use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use spacesearch_core::{Resource, HIGHLIGHT_POST_TAG, HIGHLIGHT_PRE_TAG};
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, Query, RegexQuery, TermQuery};
use tantivy::schema::{IndexRecordOption, TantivyDocument};
use tantivy::snippet::{Snippet, SnippetGenerator};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, Term};
use tracing::{debug, warn};

use crate::embedded::schema::ResourceSchema;
use crate::error::{IndexError, IndexResult};

/// Directory below the data path holding the index files
pub const INDEX_DIR: &str = "tantivy";

/// A keyed write against the embedded index
#[derive(Debug)]
pub enum IndexWrite {
    /// Replace whatever is stored under `id`
    Put { id: String, document: TantivyDocument },
    Remove { id: String },
}

/// A scored hit with its decoded resource
#[derive(Debug)]
pub struct ScoredResource {
    pub score: f32,
    pub resource: Resource,
    pub highlights: String,
}

/// On-disk tantivy index of resources.
///
/// All writes go through one [`IndexWriter`] and are committed per call;
/// the reader is reloaded after each commit so reads observe them.
pub struct EmbeddedIndex {
    schema: ResourceSchema,
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    directory_path: PathBuf,
}

impl EmbeddedIndex {
    pub fn open_or_create<P: AsRef<Path>>(data_path: P, heap_bytes: usize) -> IndexResult<Self> {
        let directory_path = data_path.as_ref().join(INDEX_DIR);
        std::fs::create_dir_all(&directory_path)?;

        let schema = ResourceSchema::build();
        let directory = MmapDirectory::open(&directory_path)
            .map_err(|e| IndexError::Unhealthy(format!("cannot open index directory: {}", e)))?;
        let index = Index::open_or_create(directory, schema.schema().clone())?;
        ResourceSchema::register_tokenizers(&index);

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer(heap_bytes)?;
        debug!(path = %directory_path.display(), "opened embedded index");

        Ok(Self {
            schema,
            index,
            reader,
            writer: Mutex::new(writer),
            directory_path,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory_path
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    /// Apply writes in order and commit them as one unit
    pub fn apply(&self, writes: Vec<IndexWrite>) -> IndexResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let count = writes.len();
        let mut writer = self.writer.lock();

        let staged: IndexResult<()> = writes.into_iter().try_for_each(|write| {
            match write {
                IndexWrite::Put { id, document } => {
                    writer.delete_term(self.schema.id_term(&id));
                    writer.add_document(document)?;
                }
                IndexWrite::Remove { id } => {
                    writer.delete_term(self.schema.id_term(&id));
                }
            }
            Ok(())
        });

        let committed = staged.and_then(|_| writer.commit().map(|_| ()).map_err(IndexError::from));
        if let Err(err) = committed {
            warn!(error = %err, "rolling back embedded index writes");
            writer.rollback()?;
            return Err(err);
        }
        drop(writer);

        self.reader.reload()?;
        debug!(writes = count, "committed embedded index writes");
        Ok(())
    }

    /// Stored resource for `id`
    pub fn resource_by_id(&self, id: &str) -> IndexResult<Resource> {
        let searcher = self.searcher();
        let query = TermQuery::new(self.schema.id_term(id), IndexRecordOption::Basic);
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        let (_, address) = top
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::not_found(id))?;
        let doc: TantivyDocument = searcher.doc(address)?;
        self.schema.from_document(&doc)
    }

    /// Every resource of space `root_id` strictly below `path`
    pub fn descendants(&self, root_id: &str, path: &str) -> IndexResult<Vec<Resource>> {
        let pattern = format!("{}/.*", regex::escape(path));
        let query = BooleanQuery::new(vec![
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.schema.root_id, root_id),
                    IndexRecordOption::Basic,
                )) as Box<dyn Query>,
            ),
            (
                Occur::Must,
                Box::new(RegexQuery::from_pattern(&pattern, self.schema.path)?),
            ),
        ]);

        let searcher = self.searcher();
        let addresses = searcher.search(&query, &DocSetCollector)?;
        let mut resources = Vec::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            resources.push(self.schema.from_document(&doc)?);
        }
        Ok(resources)
    }

    /// Run `query` over live documents.
    ///
    /// `limit` of `None` returns every hit, and any limit is capped at the
    /// number of stored documents. Returns the hits plus the total
    /// number of matching documents.
    pub fn search(
        &self,
        query: Box<dyn Query>,
        root_id: Option<&str>,
        limit: Option<usize>,
    ) -> IndexResult<(Vec<ScoredResource>, usize)> {
        let searcher = self.searcher();

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![
            (Occur::Must, query.box_clone()),
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    self.schema.deleted_term(false),
                    IndexRecordOption::Basic,
                )),
            ),
        ];
        if let Some(root_id) = root_id {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.schema.root_id, root_id),
                    IndexRecordOption::Basic,
                )),
            ));
        }
        let filtered = BooleanQuery::new(clauses);

        // The collector preallocates `limit` slots; never ask for more than exist.
        let stored = (searcher.num_docs() as usize).max(1);
        let limit = limit.map_or(stored, |limit| limit.clamp(1, stored));
        let (top, total) = searcher.search(&filtered, &(TopDocs::with_limit(limit), Count))?;

        let snippets = SnippetGenerator::create(&searcher, &*query, self.schema.content)?;
        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher.doc(address)?;
            let highlights = render_snippet(&snippets.snippet_from_doc(&doc));
            hits.push(ScoredResource {
                score,
                resource: self.schema.from_document(&doc)?,
                highlights,
            });
        }
        Ok((hits, total))
    }

    /// Number of documents not soft-deleted
    pub fn live_count(&self) -> IndexResult<u64> {
        let query = TermQuery::new(self.schema.deleted_term(false), IndexRecordOption::Basic);
        Ok(self.searcher().search(&query, &Count)? as u64)
    }
}

/// Wrap the highlighted ranges of a snippet in mark tags
fn render_snippet(snippet: &Snippet) -> String {
    if snippet.highlighted().is_empty() {
        return String::new();
    }
    let fragment = snippet.fragment();
    let mut rendered = String::with_capacity(fragment.len());
    let mut cursor = 0;
    for range in snippet.highlighted() {
        if range.start < cursor || range.end > fragment.len() {
            continue;
        }
        rendered.push_str(&fragment[cursor..range.start]);
        rendered.push_str(HIGHLIGHT_PRE_TAG);
        rendered.push_str(&fragment[range.start..range.end]);
        rendered.push_str(HIGHLIGHT_POST_TAG);
        cursor = range.end;
    }
    rendered.push_str(&fragment[cursor..]);
    rendered
}
