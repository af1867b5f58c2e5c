//! spacesearch - search index for storage spaces
//!
//! Keeps a full-text index of the resources in storage spaces and answers
//! queries against it.
//!
//! ## Features
//!
//! - **Two backends**: an embedded tantivy index on local disk and an
//!   OpenSearch-compatible cluster, chosen once at startup
//! - **Ordered batches**: keyed writes and subtree operations applied in the
//!   order they were staged
//! - **Event ingestion**: change events drive index mutations, with per-space
//!   reindexing debounced across bursts
//! - **Read path**: `scope:` restricted, cached searches

pub mod backend;
pub mod batch;
pub mod clustered;
pub mod config;
pub mod debounce;
pub mod embedded;
pub mod engine;
pub mod error;
pub mod events;
pub mod indexer;
pub mod pipeline;
pub mod service;
pub mod telemetry;

pub use backend::IndexBackend;
pub use batch::{BatchExecutor, Cascade, CascadeAction, StagedBatch};
pub use clustered::ClusteredBackend;
pub use config::{
    ClusteredConfig, ConfigError, EmbeddedConfig, EngineConfig, EventsConfig, IndexingConfig,
    LogConfig, SpaceSearchConfig,
};
pub use debounce::{Acknowledgement, ReindexAction, SpaceDebouncer};
pub use embedded::EmbeddedBackend;
pub use engine::{BatchOperator, Engine, DEFAULT_BATCH_SIZE};
pub use error::{IndexError, IndexResult};
pub use events::{Acknowledge, ChangeEvent, ChannelStream, Delivery, EventStream, IncomingEvent};
pub use indexer::{IndexService, ResourceProvider, SpaceIndexer};
pub use pipeline::EventService;
pub use service::{ProviderResolver, ReferenceResolver, SearchService, ServiceError};
pub use telemetry::init_logging;

/// Re-export the domain crate
pub use spacesearch_core as core;
