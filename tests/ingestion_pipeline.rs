//! Change events flowing through the pipeline into an embedded index

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{embedded, file, folder, id, MemoryProvider};
use spacesearch::{
    ChangeEvent, ChannelStream, Delivery, EmbeddedBackend, Engine, EventService, EventsConfig,
    IndexService,
};
use spacesearch_core::{Reference, ResourceId, SearchRequest, SpaceId};
use tokio::time::{sleep, timeout};

struct Harness {
    _dir: tempfile::TempDir,
    engine: Arc<EmbeddedBackend>,
    provider: Arc<MemoryProvider>,
    stream: Arc<ChannelStream>,
    service: Arc<EventService>,
    running: tokio::task::JoinHandle<spacesearch::IndexResult<()>>,
}

fn start() -> Harness {
    let (dir, engine) = embedded();
    let provider = Arc::new(MemoryProvider::default());
    provider.put(folder("sp", "/"));

    let indexer = Arc::new(IndexService::new(engine.clone(), provider.clone(), 10).unwrap());
    let config = EventsConfig {
        num_consumers: 3,
        debounce_duration_ms: 50,
        debounce_max_wait_ms: 500,
        ..Default::default()
    };
    let service = Arc::new(EventService::new(indexer, &config));
    let stream = Arc::new(ChannelStream::new(64));
    let running = {
        let service = Arc::clone(&service);
        let stream = Arc::clone(&stream);
        tokio::spawn(async move { service.run(stream.as_ref()).await })
    };

    Harness {
        _dir: dir,
        engine,
        provider,
        stream,
        service,
        running,
    }
}

fn reference(opaque: &str) -> Reference {
    Reference::new(ResourceId::new("st", "sp", opaque), ".")
}

async fn wait_for_acks(deliveries: &[Arc<Delivery>]) {
    timeout(Duration::from_secs(10), async {
        while !deliveries.iter().all(|delivery| delivery.is_acked()) {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("events were not acknowledged");
}

impl Harness {
    async fn publish(&self, event: ChangeEvent) -> Arc<Delivery> {
        self.stream.publish(event).await.unwrap()
    }

    async fn stop(self) {
        self.service.close();
        self.running.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_burst_of_uploads_indexes_space_once() {
    let harness = start();
    let mut deliveries = Vec::new();
    for n in 0..10 {
        let opaque = format!("f{}", n);
        harness
            .provider
            .put(file(&opaque, &format!("/upload-{}.bin", n)));
        deliveries.push(
            harness
                .publish(ChangeEvent::UploadReady {
                    file_reference: reference(&opaque),
                })
                .await,
        );
    }

    wait_for_acks(&deliveries).await;
    assert!(deliveries.iter().all(|d| d.progress_reports() == 1));
    assert_eq!(harness.engine.doc_count().await.unwrap(), 11);
    assert_eq!(harness.service.pending_reindexes(), 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_trash_then_purge_trashbin() {
    let harness = start();
    harness.provider.put(folder("docs", "/docs"));
    harness.provider.put(file("a", "/docs/a.txt"));
    let created = harness
        .publish(ChangeEvent::ContainerCreated {
            reference: reference("docs"),
        })
        .await;
    wait_for_acks(&[created]).await;
    assert_eq!(harness.engine.doc_count().await.unwrap(), 3);

    harness.provider.remove(&id("a"));
    let trashed = harness
        .publish(ChangeEvent::ItemTrashed {
            id: ResourceId::new("st", "sp", "a"),
            reference: reference("a"),
        })
        .await;
    wait_for_acks(&[trashed]).await;
    let response = harness
        .engine
        .search(&SearchRequest::new("a.txt"))
        .await
        .unwrap();
    assert!(response.matches.is_empty());

    let purged = harness
        .publish(ChangeEvent::TrashbinPurged {
            reference: reference("sp"),
        })
        .await;
    wait_for_acks(&[purged]).await;
    assert!(harness
        .engine
        .index()
        .resource_by_id(&id("a"))
        .unwrap_err()
        .is_not_found());
    harness.stop().await;
}

#[tokio::test]
async fn test_space_rename_reindexes_that_space() {
    let harness = start();
    harness.provider.put(file("notes", "/notes.md"));
    let renamed = harness
        .publish(ChangeEvent::SpaceRenamed {
            space_id: SpaceId::new("st", "sp"),
        })
        .await;
    wait_for_acks(&[renamed]).await;

    let response = harness
        .engine
        .search(&SearchRequest::new("notes"))
        .await
        .unwrap();
    assert_eq!(response.matches.len(), 1);
    harness.stop().await;
}
