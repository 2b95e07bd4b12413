//! Workers: one thread, one engine.

use std::sync::{mpsc, Arc, Mutex, PoisonError};

use tokio::sync::{oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error};

use crate::engine::{EngineError, EngineFactory};
use crate::proto::routing as pb;
use crate::service::{RouteError, RouteService, ServiceContext};

/// Pool bookkeeping shared with checked-out workers.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) size: usize,
    pub(crate) idle: Mutex<Vec<usize>>,
    pub(crate) retired: watch::Sender<usize>,
    pub(crate) permits: Arc<Semaphore>,
}

impl Shared {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            size,
            idle: Mutex::new(Vec::with_capacity(size)),
            retired: watch::Sender::new(0),
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    pub(crate) fn pop_idle(&self) -> Option<usize> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }

    fn push_idle(&self, id: usize) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
    }

    /// Count a panicked worker out of the pool. Once none are left the
    /// semaphore is closed so waiting callers fail instead of hanging.
    fn retire(&self, id: usize) {
        let mut remaining = self.size;
        self.retired.send_modify(|retired| {
            *retired += 1;
            remaining = self.size.saturating_sub(*retired);
        });
        error!(worker = id, remaining, "worker panicked, retiring it");
        if remaining == 0 {
            self.permits.close();
            error!("every worker has been retired, pool closed");
        }
    }
}

/// Exclusive claim on a worker for one request.
///
/// Dropping it puts the worker back on the idle stack and then releases
/// the permit, so a permit holder always finds an idle worker. A worker
/// that panicked keeps its permit forever and is never handed out again.
pub(crate) struct Checkout {
    id: usize,
    shared: Arc<Shared>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Checkout {
    pub(crate) fn new(id: usize, shared: Arc<Shared>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            id,
            shared,
            permit: Some(permit),
        }
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        if std::thread::panicking() {
            permit.forget();
            self.shared.retire(self.id);
            return;
        }
        self.shared.push_idle(self.id);
        drop(permit);
    }
}

/// A request handed to a worker thread.
///
/// Fields drop in declaration order: on a panic the worker is retired
/// before the caller sees its reply channel close.
pub(crate) struct Job {
    pub(crate) checkout: Checkout,
    pub(crate) request: pb::Request,
    pub(crate) reply: oneshot::Sender<Result<pb::Response, RouteError>>,
}

/// A worker that has not materialized its engine yet.
#[derive(Debug)]
pub struct Worker {
    id: usize,
}

impl Worker {
    pub fn new(id: usize) -> Self {
        Self { id }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Materialize this worker's scenario and engine. Consumes the cold
    /// worker, so warming happens at most once.
    pub fn warm(
        self,
        factory: &dyn EngineFactory,
        ctx: ServiceContext,
    ) -> Result<WarmWorker, EngineError> {
        let materialized = factory.materialize(self.id)?;
        Ok(WarmWorker {
            service: RouteService::new(self.id, materialized, ctx),
        })
    }
}

/// A worker ready to serve.
pub struct WarmWorker {
    service: RouteService,
}

impl WarmWorker {
    pub fn id(&self) -> usize {
        self.service.worker_id()
    }

    /// Serve a single request.
    pub fn handle(&mut self, request: &pb::Request) -> Result<pb::Response, RouteError> {
        self.service.handle(request)
    }

    /// Serve jobs until the pool drops its sender.
    pub(crate) fn run(mut self, jobs: mpsc::Receiver<Job>) {
        while let Ok(job) = jobs.recv() {
            let result = self.handle(&job.request);
            if job.reply.send(result).is_err() {
                debug!(worker = self.id(), "caller went away before the reply");
            }
            drop(job.checkout);
        }
        debug!(worker = self.id(), "worker stopped");
    }
}
