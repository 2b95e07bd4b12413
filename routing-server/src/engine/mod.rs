//! Routing engine abstraction.
//!
//! A routing engine keeps mutable search state between queries and is not
//! safe for concurrent use. The server never shares one: each worker asks
//! the [`EngineFactory`] to materialize its own scenario and engine, on its
//! own thread, and keeps both for the lifetime of the process. Engines are
//! therefore not required to be `Send`.

mod error;
mod scenario;
mod timetable;

use std::path::PathBuf;

pub use error::EngineError;
pub use scenario::{Headway, Link, RouteStop, Scenario, Stop, TransitLine, TransitRoute};
pub use timetable::{TimetableEngine, WalkParams};

use crate::domain::{Coord, PlanElement};

/// An origin or destination fed to the engine in place of a person.
#[derive(Debug, Clone, PartialEq)]
pub struct Facility {
    pub link_id: String,
    pub coord: Coord,
}

impl Facility {
    pub fn new(link_id: impl Into<String>, coord: Coord) -> Self {
        Self {
            link_id: link_id.into(),
            coord,
        }
    }
}

/// A context-free routing query: no person, no person attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingRequest {
    pub from: Facility,
    pub to: Facility,
    /// Departure time in seconds of day.
    pub departure_time: f64,
    /// Routing mode the resulting legs are tagged with.
    pub mode: String,
}

/// A routing engine bound to one worker.
pub trait RoutingEngine {
    /// Compute an itinerary from `request.from` to `request.to`.
    ///
    /// Takes `&mut self` because engines reuse internal search buffers.
    fn calc_route(
        &mut self,
        scenario: &Scenario,
        request: &RoutingRequest,
    ) -> Result<Vec<PlanElement>, EngineError>;
}

/// A worker's private scenario and engine.
pub struct Materialized {
    pub scenario: Scenario,
    pub engine: Box<dyn RoutingEngine>,
}

/// Builds independent scenario and engine copies for workers.
///
/// `materialize` is called once per worker, on that worker's thread.
pub trait EngineFactory: Send + Sync {
    fn materialize(&self, worker_id: usize) -> Result<Materialized, EngineError>;
}

/// Factory for [`TimetableEngine`]s over a scenario file.
///
/// Every worker reads and validates the file itself, so no scenario data
/// is shared between workers.
#[derive(Debug, Clone)]
pub struct TimetableEngineFactory {
    scenario_path: PathBuf,
    params: WalkParams,
}

impl TimetableEngineFactory {
    pub fn new(scenario_path: impl Into<PathBuf>) -> Self {
        Self {
            scenario_path: scenario_path.into(),
            params: WalkParams::default(),
        }
    }

    /// Override the walking parameters.
    pub fn with_params(mut self, params: WalkParams) -> Self {
        self.params = params;
        self
    }
}

impl EngineFactory for TimetableEngineFactory {
    fn materialize(&self, _worker_id: usize) -> Result<Materialized, EngineError> {
        let scenario = Scenario::load(&self.scenario_path)?;
        let engine = TimetableEngine::new(&scenario, self.params.clone());
        Ok(Materialized {
            scenario,
            engine: Box::new(engine),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_materializes_independent_copies() {
        let factory = TimetableEngineFactory::new("data/pt-tutorial.json");

        let a = factory.materialize(0).unwrap();
        let b = factory.materialize(1).unwrap();

        assert_eq!(a.scenario.name(), "pt-tutorial");
        assert!(!std::ptr::eq(&a.scenario, &b.scenario));
        assert_eq!(a.scenario.links().len(), b.scenario.links().len());
    }

    #[test]
    fn factory_fails_on_missing_scenario() {
        let factory = TimetableEngineFactory::new("data/does-not-exist.json");
        assert!(matches!(
            factory.materialize(0),
            Err(EngineError::Io { .. })
        ));
    }
}
