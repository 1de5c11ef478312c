use crate::classification::{Classification, ClassificationQueue, Classifier};
use crate::engine::FusionEngine;
use crate::prelude::{unix_now, FusionError, FusionResult, Timestamp};
use crate::targets::TargetId;
use crate::telemetry::LogManager;
use std::sync::{Arc, Mutex, MutexGuard};

/// The single consumer of the classification queue.
///
/// The engine lock is held only to read features and to store the result;
/// the classifier itself runs outside it.
pub struct ClassificationWorker {
    classifier: Classifier,
    engine: Arc<Mutex<FusionEngine>>,
    queue: Arc<ClassificationQueue>,
    refit_count: usize,
    since_refit: usize,
    logger: LogManager,
}

fn lock(engine: &Mutex<FusionEngine>) -> FusionResult<MutexGuard<'_, FusionEngine>> {
    engine
        .lock()
        .map_err(|_| FusionError::Internal("engine lock poisoned".into()))
}

impl ClassificationWorker {
    /// Fits the classifier over the engine's current history.
    pub fn new(engine: Arc<Mutex<FusionEngine>>) -> FusionResult<Self> {
        let (classifier, queue, refit_count) = {
            let guard = lock(&engine)?;
            let config = guard.config();
            let classifier = Classifier::fit(
                config.classifier.clone(),
                &config.site_name,
                guard.history(),
            )?;
            (classifier, guard.queue(), config.classifier.refit_count)
        };
        Ok(Self {
            classifier,
            engine,
            queue,
            refit_count,
            since_refit: 0,
            logger: LogManager::new("classifier"),
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Classifies one target and flushes any resulting save command.
    /// Returns `None` when the target was no longer waiting or could not be
    /// classified.
    pub fn classify_target(&mut self, id: TargetId, now: Timestamp) -> FusionResult<Option<Classification>> {
        let features = match lock(&self.engine)?.begin_classification(id)? {
            Some(features) => features,
            None => return Ok(None),
        };

        let result = match self.classifier.classify(&features) {
            Ok(result) => result,
            Err(FusionError::Unclassifiable) => {
                lock(&self.engine)?.record_unclassifiable(id)?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        {
            let mut engine = lock(&self.engine)?;
            if engine.complete_classification(id, &result)?.is_none() {
                return Ok(None);
            }
            engine.flush(now)?;
        }

        self.since_refit += 1;
        if self.since_refit >= self.refit_count {
            self.refit()?;
        }
        Ok(Some(result))
    }

    /// Rebuilds the classifier from the engine's full history.
    pub fn refit(&mut self) -> FusionResult<()> {
        let history = lock(&self.engine)?.history().clone();
        self.classifier.refit(&history)?;
        self.since_refit = 0;
        self.logger
            .record(&format!("refit over {} historical targets", history.len()));
        Ok(())
    }

    /// Classifies everything queued right now, newest first.
    pub fn drain(&mut self, now: Timestamp) -> FusionResult<usize> {
        let mut classified = 0;
        while let Some(id) = self.queue.try_pop() {
            if self.classify_target(id, now)?.is_some() {
                classified += 1;
            }
        }
        Ok(classified)
    }

    /// Consumes the queue until it is closed. Fatal errors end the loop.
    pub async fn run(mut self) -> FusionResult<usize> {
        let mut classified = 0;
        while let Some(id) = self.queue.pop().await {
            match self.classify_target(id, unix_now()) {
                Ok(Some(_)) => classified += 1,
                Ok(None) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => self
                    .logger
                    .warn(&format!("classification of target {} failed: {}", id, err)),
            }
        }
        self.logger
            .record(&format!("queue closed after {} classifications", classified));
        Ok(classified)
    }
}
