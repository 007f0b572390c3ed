//! Operator runtime
//!
//! Owns the registered queue informers and drives them through
//! `Created -> Running -> Stopped`:
//!
//! 1. Probe cluster connectivity. Failure is fatal; a stop signal that fires
//!    while the probe is outstanding ends `run` cleanly.
//! 2. Start one task per informer and wait for the caches to sync.
//! 3. Start the workers (and resync timers).
//! 4. On stop, shut every queue down, let the workers drain and return.

use crate::error::RuntimeError;
use crate::probe::ClusterProbe;
use crate::queue_informer::{QueueInformer, Runnable};
use futures::future::join_all;
use kube::Resource;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Queue-driven operator.
pub struct Operator {
    name: String,
    probe: Box<dyn ClusterProbe>,
    queue_informers: Vec<Arc<dyn Runnable>>,
    names: HashSet<String>,
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("queue_informers", &self.names)
            .finish_non_exhaustive()
    }
}

impl Operator {
    /// Creates an operator that checks connectivity with `probe` before running.
    pub fn new(name: impl Into<String>, probe: impl ClusterProbe + 'static) -> Self {
        Self {
            name: name.into(),
            probe: Box::new(probe),
            queue_informers: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Registers a queue informer. Names must be unique.
    pub fn register_queue_informer<K>(&mut self, queue_informer: QueueInformer<K>) -> Result<(), RuntimeError>
    where
        K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
    {
        self.register_shared(Arc::new(queue_informer))
    }

    /// Registers a queue informer that is also used elsewhere, e.g. by a
    /// handler that enqueues into it.
    pub fn register_shared<K>(&mut self, queue_informer: Arc<QueueInformer<K>>) -> Result<(), RuntimeError>
    where
        K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
    {
        let name = queue_informer.name().to_string();
        if !self.names.insert(name.clone()) {
            return Err(RuntimeError::DuplicateQueueInformer(name));
        }
        debug!(operator = %self.name, queue = %name, "registered queue informer");
        self.queue_informers.push(queue_informer);
        Ok(())
    }

    /// Number of registered queue informers.
    pub fn len(&self) -> usize {
        self.queue_informers.len()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.queue_informers.is_empty()
    }

    /// Runs until `stop` is cancelled.
    ///
    /// Only the connectivity check can make this return an error.
    pub async fn run(self, stop: CancellationToken) -> Result<(), RuntimeError> {
        info!("Starting operator {}", self.name);

        tokio::select! {
            biased;
            () = stop.cancelled() => {
                info!("Stop requested during connectivity check; operator {} exiting", self.name);
                return Ok(());
            }
            result = self.probe.check() => result?,
        }

        // Informers stop on a child token so they outlive the workers' drain.
        let informer_stop = stop.child_token();
        let mut informer_tasks: Vec<JoinHandle<()>> = Vec::new();
        for qi in &self.queue_informers {
            let qi = Arc::clone(qi);
            let token = informer_stop.clone();
            informer_tasks.push(tokio::spawn(async move {
                if let Err(e) = qi.run_informer(token).await {
                    error!(queue = %qi.name(), "Informer failed: {}", e);
                }
            }));
        }

        let synced = join_all(self.queue_informers.iter().map(|qi| qi.wait_for_sync()));
        tokio::select! {
            () = stop.cancelled() => {
                info!("Stop requested before caches synced");
            }
            _ = synced => {
                info!("Caches synced for {} queue informer(s)", self.queue_informers.len());
            }
        }

        let mut worker_tasks: Vec<JoinHandle<()>> = Vec::new();
        if !stop.is_cancelled() {
            for qi in &self.queue_informers {
                for _ in 0..qi.workers() {
                    let qi = Arc::clone(qi);
                    worker_tasks.push(tokio::spawn(async move { qi.run_worker().await }));
                }
                let qi = Arc::clone(qi);
                let token = stop.clone();
                worker_tasks.push(tokio::spawn(async move { qi.run_resync(token).await }));
            }
            info!("Operator {} running", self.name);
            stop.cancelled().await;
        }

        info!("Stopping operator {}", self.name);
        for qi in &self.queue_informers {
            qi.shut_down();
        }
        for result in join_all(worker_tasks).await {
            if let Err(e) = result {
                warn!("Worker task ended abnormally: {}", e);
            }
        }
        informer_stop.cancel();
        for result in join_all(informer_tasks).await {
            if let Err(e) = result {
                warn!("Informer task ended abnormally: {}", e);
            }
        }
        info!("Operator {} stopped", self.name);
        Ok(())
    }
}
