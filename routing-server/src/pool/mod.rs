//! Fixed-size pool of single-threaded routing workers.
//!
//! Every worker runs on its own OS thread named `router-<id>` and owns a
//! private scenario and engine, materialized on that thread by
//! [`WorkerPool::warm_all`]. Requests are dispatched through a semaphore
//! with one permit per worker: a caller holding a permit pops an idle
//! worker, sends it the job, and awaits the reply. When every worker is
//! busy, callers wait on the semaphore in arrival order.

mod error;
mod worker;

use std::sync::{mpsc, Arc};
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::engine::EngineFactory;
use crate::proto::routing as pb;
use crate::service::ServiceContext;

pub use error::PoolError;
pub use worker::{WarmWorker, Worker};

use worker::{Checkout, Job, Shared};

pub struct WorkerPool {
    size: usize,
    factory: Arc<dyn EngineFactory>,
    ctx: ServiceContext,
    cold: Vec<Worker>,
    jobs: Vec<mpsc::Sender<Job>>,
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create `size` cold workers. Nothing is materialized yet.
    pub fn new(
        size: usize,
        factory: Arc<dyn EngineFactory>,
        ctx: ServiceContext,
    ) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::NoWorkers);
        }
        Ok(Self {
            size,
            factory,
            ctx,
            cold: (0..size).map(Worker::new).collect(),
            jobs: Vec::new(),
            shared: Arc::new(Shared::new(size)),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_warm(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Start every worker thread and block until all of them have
    /// materialized their engine. The first failure is returned and the
    /// pool stays unusable.
    pub fn warm_all(&mut self) -> Result<(), PoolError> {
        if self.cold.is_empty() {
            return Err(PoolError::AlreadyWarm);
        }

        let started = Instant::now();
        let (ready_tx, ready_rx) = mpsc::channel();
        let mut jobs = Vec::with_capacity(self.size);

        for worker in std::mem::take(&mut self.cold) {
            let id = worker.id();
            let (job_tx, job_rx) = mpsc::channel::<Job>();
            let factory = Arc::clone(&self.factory);
            let ctx = self.ctx.clone();
            let ready = ready_tx.clone();

            std::thread::Builder::new()
                .name(format!("router-{id}"))
                .spawn(move || {
                    let warming = Instant::now();
                    match worker.warm(factory.as_ref(), ctx) {
                        Ok(warm) => {
                            let _ = ready.send((id, Ok(warming.elapsed())));
                            drop(ready);
                            warm.run(job_rx);
                        }
                        Err(e) => {
                            let _ = ready.send((id, Err(e)));
                        }
                    }
                })
                .map_err(|source| PoolError::Spawn { worker: id, source })?;

            jobs.push(job_tx);
        }
        drop(ready_tx);

        for _ in 0..self.size {
            match ready_rx.recv() {
                Ok((id, Ok(elapsed))) => {
                    info!(worker = id, elapsed_ms = elapsed.as_millis() as u64, "worker warm");
                }
                Ok((id, Err(source))) => {
                    return Err(PoolError::Warmup { worker: id, source });
                }
                Err(_) => return Err(PoolError::WarmupPanicked),
            }
        }

        self.jobs = jobs;
        self.shared
            .idle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend((0..self.size).rev());

        info!(
            workers = self.size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "worker pool warm"
        );
        Ok(())
    }

    /// Route a request on the next free worker, waiting for one if all
    /// are busy.
    pub async fn route(&self, request: pb::Request) -> Result<pb::Response, PoolError> {
        if !self.is_warm() {
            return Err(PoolError::NotWarm);
        }

        let permit = Arc::clone(&self.shared.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        let id = self.shared.pop_idle().ok_or(PoolError::NoIdleWorker)?;

        let (reply, response) = oneshot::channel();
        let job = Job {
            checkout: Checkout::new(id, Arc::clone(&self.shared), permit),
            request,
            reply,
        };
        self.jobs[id]
            .send(job)
            .map_err(|_| PoolError::WorkerLost(id))?;

        let result = response.await.map_err(|_| PoolError::WorkerLost(id))?;
        Ok(result?)
    }

    /// Wait until every live worker is idle, then stop admitting requests.
    ///
    /// Requests already waiting for a worker are served first. A worker
    /// that panics while drain waits is dropped from the count. Returns
    /// immediately if the pool is already closed.
    pub async fn drain(&self) {
        let permits = &self.shared.permits;
        let mut retired = self.shared.retired.subscribe();

        loop {
            let live = self.size.saturating_sub(*retired.borrow_and_update());
            if live == 0 {
                permits.close();
                info!("no live workers left to drain");
                return;
            }
            let Ok(wanted) = u32::try_from(live) else {
                warn!(live, "too many workers to drain, closing immediately");
                permits.close();
                return;
            };

            tokio::select! {
                acquired = permits.acquire_many(wanted) => {
                    match acquired {
                        Ok(held) => {
                            permits.close();
                            held.forget();
                            info!(workers = live, "worker pool drained");
                        }
                        Err(_) => info!("worker pool already closed"),
                    }
                    return;
                }
                changed = retired.changed() => {
                    if changed.is_err() {
                        permits.close();
                        return;
                    }
                    debug!(live, "worker retired while draining");
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.permits.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::domain::{GenericRoute, Leg, PlanElement, Route};
    use crate::engine::{
        EngineError, Materialized, RoutingEngine, RoutingRequest, Scenario, TimetableEngineFactory,
    };
    use crate::ids::IdRegistry;
    use crate::profiling::ProfilingRegistry;
    use crate::proto::routing::request::{FromLink, ToLink};

    const TINY: &str = r#"{
        "name": "tiny",
        "links": [
            {"id": "a", "from": {"x": 0, "y": 0}, "to": {"x": 0, "y": 100}},
            {"id": "b", "from": {"x": 0, "y": 100}, "to": {"x": 0, "y": 200}}
        ]
    }"#;

    /// Engine that sleeps and tracks how many calls overlap.
    struct SlowEngine {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl RoutingEngine for SlowEngine {
        fn calc_route(
            &mut self,
            _scenario: &Scenario,
            request: &RoutingRequest,
        ) -> Result<Vec<PlanElement>, EngineError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);

            if request.mode == "panic" {
                panic!("engine exploded");
            }
            Ok(vec![PlanElement::Leg(Leg {
                mode: "walk".into(),
                routing_mode: None,
                departure_time: Some(request.departure_time),
                travel_time: Some(60.0),
                attributes: Default::default(),
                route: Route::Generic(GenericRoute {
                    start_link: request.from.link_id.clone(),
                    end_link: request.to.link_id.clone(),
                    distance: 100.0,
                    travel_time: Some(60.0),
                }),
            })])
        }
    }

    struct SlowFactory {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        fail_worker: Option<usize>,
        delay: Duration,
    }

    impl Default for SlowFactory {
        fn default() -> Self {
            Self {
                active: Default::default(),
                peak: Default::default(),
                fail_worker: None,
                delay: Duration::from_millis(50),
            }
        }
    }

    impl EngineFactory for SlowFactory {
        fn materialize(&self, worker_id: usize) -> Result<Materialized, EngineError> {
            if self.fail_worker == Some(worker_id) {
                return Err(EngineError::InvalidScenario("broken copy".into()));
            }
            Ok(Materialized {
                scenario: Scenario::from_json(TINY)?,
                engine: Box::new(SlowEngine {
                    active: self.active.clone(),
                    peak: self.peak.clone(),
                    delay: self.delay,
                }),
            })
        }
    }

    fn ctx(workers: usize) -> ServiceContext {
        ServiceContext::new(
            Arc::new(IdRegistry::empty()),
            Arc::new(ProfilingRegistry::new(workers, true)),
        )
    }

    fn request(mode: &str) -> pb::Request {
        pb::Request {
            mode: mode.into(),
            from_link: Some(FromLink::FromLinkId("a".into())),
            to_link: Some(ToLink::ToLinkId("b".into())),
            ..Default::default()
        }
    }

    #[test]
    fn zero_workers_rejected() {
        let factory = Arc::new(SlowFactory::default());
        assert!(matches!(
            WorkerPool::new(0, factory, ctx(0)),
            Err(PoolError::NoWorkers)
        ));
    }

    #[test]
    fn warm_failure_is_fatal() {
        let factory = Arc::new(SlowFactory {
            fail_worker: Some(2),
            ..Default::default()
        });
        let mut pool = WorkerPool::new(3, factory, ctx(3)).unwrap();

        let err = pool.warm_all().unwrap_err();
        assert!(matches!(err, PoolError::Warmup { worker: 2, .. }));
        assert!(!pool.is_warm());
    }

    #[test]
    fn warm_only_once() {
        let mut pool = WorkerPool::new(2, Arc::new(SlowFactory::default()), ctx(2)).unwrap();
        pool.warm_all().unwrap();
        assert!(pool.is_warm());
        assert!(matches!(pool.warm_all(), Err(PoolError::AlreadyWarm)));
    }

    #[tokio::test]
    async fn cold_pool_refuses_requests() {
        let pool = WorkerPool::new(1, Arc::new(SlowFactory::default()), ctx(1)).unwrap();
        assert!(matches!(
            pool.route(request("walk")).await,
            Err(PoolError::NotWarm)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_bounded_by_pool_size() {
        let factory = Arc::new(SlowFactory::default());
        let peak = factory.peak.clone();
        let mut pool = WorkerPool::new(3, factory, ctx(3)).unwrap();
        pool.warm_all().unwrap();
        let pool = Arc::new(pool);

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.route(request("walk")).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn panicking_worker_is_retired() {
        let mut pool = WorkerPool::new(2, Arc::new(SlowFactory::default()), ctx(2)).unwrap();
        pool.warm_all().unwrap();

        assert!(matches!(
            pool.route(request("panic")).await,
            Err(PoolError::WorkerLost(_))
        ));

        // The surviving worker keeps serving and drain does not wait on
        // the retired one.
        pool.route(request("walk")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), pool.drain())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drain_finishes_when_busy_worker_panics() {
        let factory = Arc::new(SlowFactory {
            delay: Duration::from_millis(300),
            ..Default::default()
        });
        let mut pool = WorkerPool::new(2, factory, ctx(2)).unwrap();
        pool.warm_all().unwrap();
        let pool = Arc::new(pool);

        let in_flight = tokio::spawn({
            let pool = pool.clone();
            async move { pool.route(request("panic")).await }
        });

        // Drain starts while the worker is still busy and counts it as live.
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_secs(3), pool.drain())
            .await
            .expect("drain must not wait on a retired worker");

        assert!(pool.is_closed());
        assert!(matches!(
            in_flight.await.unwrap(),
            Err(PoolError::WorkerLost(_))
        ));
    }

    #[tokio::test]
    async fn pool_closes_once_every_worker_is_retired() {
        let mut pool = WorkerPool::new(1, Arc::new(SlowFactory::default()), ctx(1)).unwrap();
        pool.warm_all().unwrap();

        assert!(matches!(
            pool.route(request("panic")).await,
            Err(PoolError::WorkerLost(0))
        ));

        let next = tokio::time::timeout(Duration::from_secs(3), pool.route(request("walk")))
            .await
            .expect("request after the last worker died must not hang");
        assert!(matches!(next, Err(PoolError::Closed)));
        assert!(pool.is_closed());

        tokio::time::timeout(Duration::from_secs(3), pool.drain())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn drain_closes_pool() {
        let mut pool = WorkerPool::new(2, Arc::new(SlowFactory::default()), ctx(2)).unwrap();
        pool.warm_all().unwrap();

        pool.drain().await;
        assert!(pool.is_closed());
        assert!(matches!(
            pool.route(request("walk")).await,
            Err(PoolError::Closed)
        ));
        // Idempotent.
        pool.drain().await;
    }

    #[tokio::test]
    async fn route_errors_reach_caller() {
        let factory = Arc::new(TimetableEngineFactory::new("data/pt-tutorial.json"));
        let mut pool = WorkerPool::new(1, factory, ctx(1)).unwrap();
        pool.warm_all().unwrap();

        let mut bad = request("pt");
        bad.to_link = Some(ToLink::ToLinkId("nope".into()));
        assert!(matches!(
            pool.route(bad).await,
            Err(PoolError::Route(_))
        ));

        let mut good = request("pt");
        good.from_link = Some(FromLink::FromLinkId("1112".into()));
        good.to_link = Some(ToLink::ToLinkId("4142".into()));
        good.departure_time = 27126;
        assert_eq!(pool.route(good).await.unwrap().elements.len(), 5);
    }
}
