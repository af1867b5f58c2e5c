//! Change events delivered by the event transport

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use spacesearch_core::{Reference, ResourceId, SpaceId};
use tokio::sync::mpsc;

use crate::error::{IndexError, IndexResult};

/// A change in storage that affects the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChangeEvent {
    ItemTrashed { id: ResourceId, reference: Reference },
    ItemPurged { reference: Reference },
    TrashbinPurged { reference: Reference },
    ItemMoved {
        old_reference: Reference,
        reference: Reference,
    },
    ItemRestored { reference: Reference },
    ContainerCreated { reference: Reference },
    FileTouched { reference: Reference },
    FileVersionRestored { reference: Reference },
    FileUploaded { reference: Reference },
    UploadReady { file_reference: Reference },
    TagsAdded { reference: Reference },
    TagsRemoved { reference: Reference },
    SpaceRenamed { space_id: SpaceId },
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::ItemTrashed { .. } => "item-trashed",
            ChangeEvent::ItemPurged { .. } => "item-purged",
            ChangeEvent::TrashbinPurged { .. } => "trashbin-purged",
            ChangeEvent::ItemMoved { .. } => "item-moved",
            ChangeEvent::ItemRestored { .. } => "item-restored",
            ChangeEvent::ContainerCreated { .. } => "container-created",
            ChangeEvent::FileTouched { .. } => "file-touched",
            ChangeEvent::FileVersionRestored { .. } => "file-version-restored",
            ChangeEvent::FileUploaded { .. } => "file-uploaded",
            ChangeEvent::UploadReady { .. } => "upload-ready",
            ChangeEvent::TagsAdded { .. } => "tags-added",
            ChangeEvent::TagsRemoved { .. } => "tags-removed",
            ChangeEvent::SpaceRenamed { .. } => "space-renamed",
        }
    }

    /// The space whose index the event touches
    pub fn space_id(&self) -> SpaceId {
        match self {
            ChangeEvent::SpaceRenamed { space_id } => space_id.clone(),
            ChangeEvent::UploadReady { file_reference } => file_reference.space(),
            ChangeEvent::ItemTrashed { reference, .. }
            | ChangeEvent::ItemPurged { reference }
            | ChangeEvent::TrashbinPurged { reference }
            | ChangeEvent::ItemMoved { reference, .. }
            | ChangeEvent::ItemRestored { reference }
            | ChangeEvent::ContainerCreated { reference }
            | ChangeEvent::FileTouched { reference }
            | ChangeEvent::FileVersionRestored { reference }
            | ChangeEvent::FileUploaded { reference }
            | ChangeEvent::TagsAdded { reference }
            | ChangeEvent::TagsRemoved { reference } => reference.space(),
        }
    }
}

/// Delivery handle of one event
pub trait Acknowledge: Send + Sync {
    /// Tell the transport the event is being worked on
    fn in_progress(&self);

    /// Confirm the event has been handled
    fn ack(&self);
}

/// An event together with its delivery handle
#[derive(Clone)]
pub struct IncomingEvent {
    pub event: ChangeEvent,
    pub ack: Arc<dyn Acknowledge>,
}

impl std::fmt::Debug for IncomingEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingEvent")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// A durable stream of change events
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Start consuming as member of the consumer `group`
    async fn consume(&self, group: &str) -> IndexResult<mpsc::Receiver<IncomingEvent>>;
}

/// Delivery state recorded by [`ChannelStream`]
#[derive(Debug, Default)]
pub struct Delivery {
    progress: AtomicUsize,
    acked: AtomicBool,
}

impl Delivery {
    pub fn is_acked(&self) -> bool {
        self.acked.load(Ordering::SeqCst)
    }

    /// How often the event was reported as in progress
    pub fn progress_reports(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }
}

impl Acknowledge for Delivery {
    fn in_progress(&self) {
        self.progress.fetch_add(1, Ordering::SeqCst);
    }

    fn ack(&self) {
        self.acked.store(true, Ordering::SeqCst);
    }
}

/// In-process event stream backed by a tokio channel
pub struct ChannelStream {
    sender: mpsc::Sender<IncomingEvent>,
    receiver: Mutex<Option<mpsc::Receiver<IncomingEvent>>>,
}

impl ChannelStream {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Queue an event and return its delivery state
    pub async fn publish(&self, event: ChangeEvent) -> IndexResult<Arc<Delivery>> {
        let delivery = Arc::new(Delivery::default());
        self.sender
            .send(IncomingEvent {
                event,
                ack: delivery.clone(),
            })
            .await
            .map_err(|_| IndexError::Channel("event consumer has gone away".to_string()))?;
        Ok(delivery)
    }

    /// A publishing handle; the stream ends once all handles and the stream itself are dropped
    pub fn sender(&self) -> mpsc::Sender<IncomingEvent> {
        self.sender.clone()
    }
}

#[async_trait]
impl EventStream for ChannelStream {
    async fn consume(&self, group: &str) -> IndexResult<mpsc::Receiver<IncomingEvent>> {
        self.receiver.lock().take().ok_or_else(|| {
            IndexError::Channel(format!("stream is already consumed by group '{}'", group))
        })
    }
}
