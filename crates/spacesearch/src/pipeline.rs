//! Event ingestion pipeline
//!
//! A fixed pool of workers pulls from one shared receiver. Purges run
//! immediately and are acknowledged right away. Every other event schedules
//! a debounced reindex of its space, and its acknowledgement waits for that
//! reindex to finish. Closing the service also drops reindexes still waiting
//! for their window; those events stay unacknowledged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use spacesearch_core::SpaceId;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::EventsConfig;
use crate::debounce::{ReindexAction, SpaceDebouncer};
use crate::error::IndexResult;
use crate::events::{Acknowledge, ChangeEvent, EventStream, IncomingEvent};
use crate::indexer::SpaceIndexer;

/// Consumes change events and keeps the index in step with storage
pub struct EventService {
    dispatcher: Arc<Dispatcher>,
    num_consumers: usize,
    consumer_group: String,
    cancel: CancellationToken,
    stopped: AtomicBool,
}

struct Dispatcher {
    indexer: Arc<dyn SpaceIndexer>,
    debouncer: SpaceDebouncer,
    async_uploads: bool,
}

impl EventService {
    pub fn new(indexer: Arc<dyn SpaceIndexer>, config: &EventsConfig) -> Self {
        let reindex = Arc::clone(&indexer);
        let action: ReindexAction = Arc::new(move |space: SpaceId| {
            let indexer = Arc::clone(&reindex);
            async move {
                if let Err(err) = indexer.index_space(&space).await {
                    error!(space_id = %space, error = %err, "error while indexing a space");
                }
            }
            .boxed()
        });

        let cancel = CancellationToken::new();
        Self {
            dispatcher: Arc::new(Dispatcher {
                indexer,
                debouncer: SpaceDebouncer::with_cancellation(
                    config.debounce_duration(),
                    config.debounce_max_wait(),
                    action,
                    cancel.child_token(),
                ),
                async_uploads: config.async_uploads,
            }),
            num_consumers: config.num_consumers.max(1),
            consumer_group: config.consumer_group.clone(),
            cancel,
            stopped: AtomicBool::new(false),
        }
    }

    /// Process events until [`close`](Self::close) is called or the stream ends.
    ///
    /// Returns once every worker has finished its current event and every
    /// armed reindex has fired or, after a close, been dropped.
    pub async fn run(&self, stream: &dyn EventStream) -> IndexResult<()> {
        let receiver = stream.consume(&self.consumer_group).await?;
        let receiver = Arc::new(Mutex::new(receiver));

        info!(
            workers = self.num_consumers,
            consumer_group = %self.consumer_group,
            "starting event processing workers"
        );

        let mut workers = JoinSet::new();
        for worker in 0..self.num_consumers {
            workers.spawn(work(
                worker,
                Arc::clone(&self.dispatcher),
                Arc::clone(&receiver),
                self.cancel.clone(),
            ));
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "event worker panicked");
            }
        }
        self.dispatcher.debouncer.wait().await;
        info!("event processing stopped");
        Ok(())
    }

    /// Stop pulling events. Calling it again has no effect.
    pub fn close(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!("stopping event processing");
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Spaces with a reindex waiting for its debounce window
    pub fn pending_reindexes(&self) -> usize {
        self.dispatcher.debouncer.pending()
    }
}

async fn work(
    worker: usize,
    dispatcher: Arc<Dispatcher>,
    receiver: Arc<Mutex<mpsc::Receiver<IncomingEvent>>>,
    cancel: CancellationToken,
) {
    loop {
        let incoming = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            incoming = async { receiver.lock().await.recv().await } => incoming,
        };
        match incoming {
            Some(incoming) => dispatcher.process(worker, incoming).await,
            None => break,
        }
    }
    debug!(worker, "event worker exited");
}

impl Dispatcher {
    async fn process(&self, worker: usize, incoming: IncomingEvent) {
        let IncomingEvent { event, ack } = incoming;
        ack.in_progress();

        if !self.subscribed(&event) {
            debug!(worker, event = event.kind(), "event kind not subscribed, skipping");
            ack.ack();
            return;
        }
        debug!(worker, event = event.kind(), space_id = %event.space_id(), "updating index");

        let indexer = &self.indexer;
        let result = match &event {
            ChangeEvent::ItemPurged { reference } => {
                let result = indexer.purge_item(reference).await;
                ack.ack();
                return report(worker, &event, result);
            }
            ChangeEvent::TrashbinPurged { reference } => {
                let result = indexer.purge_deleted(&reference.space()).await;
                ack.ack();
                return report(worker, &event, result);
            }
            ChangeEvent::ItemTrashed { id, .. } => indexer.trash_item(id).await,
            ChangeEvent::ItemMoved { reference, .. } => indexer.move_item(reference).await,
            ChangeEvent::ItemRestored { reference } => indexer.restore_item(reference).await,
            ChangeEvent::TagsAdded { reference } | ChangeEvent::TagsRemoved { reference } => {
                indexer.upsert_item(reference).await
            }
            ChangeEvent::ContainerCreated { .. }
            | ChangeEvent::FileTouched { .. }
            | ChangeEvent::FileVersionRestored { .. }
            | ChangeEvent::FileUploaded { .. }
            | ChangeEvent::UploadReady { .. }
            | ChangeEvent::SpaceRenamed { .. } => Ok(()),
        };
        report(worker, &event, result);
        self.defer(event.space_id(), ack);
    }

    /// Only one of the two upload notifications is consumed
    fn subscribed(&self, event: &ChangeEvent) -> bool {
        match event {
            ChangeEvent::UploadReady { .. } => self.async_uploads,
            ChangeEvent::FileUploaded { .. } => !self.async_uploads,
            _ => true,
        }
    }

    fn defer(&self, space: SpaceId, ack: Arc<dyn Acknowledge>) {
        self.debouncer.debounce(space, Box::new(move || ack.ack()));
    }
}

fn report(worker: usize, event: &ChangeEvent, result: IndexResult<()>) {
    if let Err(err) = result {
        error!(worker, event = ?event, error = %err, "failed to process event");
    }
}
