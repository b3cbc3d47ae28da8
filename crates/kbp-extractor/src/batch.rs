//! Batch runner
//!
//! Fans entities out over a bounded pool of blocking tasks and concatenates
//! their instances and statistics. A failing entity is logged and skipped;
//! the batch goes on. Stopping only prevents new entities from being
//! submitted, entities already running finish normally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use kbp_core::{KbpEntity, KbpError, KnowledgeBase, Result, SentenceSource};
use serde::{Deserialize, Serialize};

use crate::metrics::LabelStats;
use crate::pipeline::{EntityOutput, EntityPipeline};
use crate::LabeledInstance;

/// An entity that could not be labeled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityFailure {
    pub entity: KbpEntity,
    pub error: String,
}

/// Aggregated result of a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub instances: Vec<LabeledInstance>,
    pub stats: LabelStats,
    pub processed: usize,
    pub skipped: usize,
    /// Entities never submitted because the batch was stopped
    pub not_submitted: usize,
    pub failures: Vec<EntityFailure>,
}

impl BatchReport {
    fn absorb(&mut self, entity: KbpEntity, result: Result<EntityOutput>) {
        match result {
            Ok(output) => {
                self.processed += 1;
                self.stats.merge(&output.stats);
                self.instances.extend(output.instances);
            }
            Err(e) => {
                tracing::warn!(entity = %entity, error = %e, "Skipping entity");
                self.skipped += 1;
                self.failures.push(EntityFailure {
                    entity,
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Runs an [`EntityPipeline`] over many entities concurrently
pub struct BatchRunner {
    pipeline: Arc<EntityPipeline>,
    source: Arc<dyn SentenceSource>,
    kb: Arc<dyn KnowledgeBase>,
    workers: usize,
    stop: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(
        pipeline: Arc<EntityPipeline>,
        source: Arc<dyn SentenceSource>,
        kb: Arc<dyn KnowledgeBase>,
    ) -> Self {
        let workers = pipeline.config().batch.workers.max(1);
        Self {
            pipeline,
            source,
            kb,
            workers,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Flag that stops further submissions once set
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Label every entity known to the knowledge base
    pub async fn run_all(&self) -> BatchReport {
        let entities = self.kb.entities();
        self.run(entities).await
    }

    pub async fn run(&self, entities: Vec<KbpEntity>) -> BatchReport {
        let total = entities.len();
        tracing::info!(entities = total, workers = self.workers, "Starting batch");

        let stop = Arc::clone(&self.stop);
        let results: Vec<(KbpEntity, Result<EntityOutput>)> = stream::iter(entities)
            .take_while(move |_| futures::future::ready(!stop.load(Ordering::SeqCst)))
            .map(|entity| {
                let pipeline = Arc::clone(&self.pipeline);
                let source = Arc::clone(&self.source);
                let kb = Arc::clone(&self.kb);
                async move {
                    let worker_entity = entity.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        pipeline.run(source.as_ref(), kb.as_ref(), &worker_entity)
                    })
                    .await
                    .map_err(|e| KbpError::Other(anyhow::anyhow!("Worker join error: {}", e)))
                    .and_then(|r| r);
                    (entity, result)
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut report = BatchReport {
            not_submitted: total - results.len(),
            ..Default::default()
        };
        for (entity, result) in results {
            report.absorb(entity, result);
        }

        if report.not_submitted > 0 {
            tracing::info!(not_submitted = report.not_submitted, "Batch stopped early");
        }
        tracing::info!(
            processed = report.processed,
            skipped = report.skipped,
            instances = report.instances.len(),
            "Batch finished"
        );
        report
    }
}
