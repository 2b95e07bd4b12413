//! Per-worker request handling.
//!
//! A [`RouteService`] owns one worker's scenario and engine. It turns wire
//! requests into engine queries, converts the itinerary back, and records
//! a profiling entry for every answered request.

pub mod convert;
mod error;

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tracing::{debug, info};

use crate::domain::Coord;
use crate::engine::{Facility, Materialized, RoutingEngine, RoutingRequest, Scenario};
use crate::ids::{IdKind, IdRegistry};
use crate::profiling::{ProfilingEntry, ProfilingRegistry};
use crate::proto::routing as pb;
use crate::proto::routing::request::{FromLink, ToLink};

pub use error::RouteError;

/// Process-wide read-only state every worker sees.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub ids: Arc<IdRegistry>,
    pub profiling: Arc<ProfilingRegistry>,
}

impl ServiceContext {
    pub fn new(ids: Arc<IdRegistry>, profiling: Arc<ProfilingRegistry>) -> Self {
        Self { ids, profiling }
    }
}

/// A link reference as carried by a request.
#[derive(Debug, Clone, Copy)]
enum LinkRef<'a> {
    Id(&'a str),
    Code(u32),
}

impl<'a> From<&'a FromLink> for LinkRef<'a> {
    fn from(link: &'a FromLink) -> Self {
        match link {
            FromLink::FromLinkId(id) => LinkRef::Id(id),
            FromLink::FromLinkCode(code) => LinkRef::Code(*code),
        }
    }
}

impl<'a> From<&'a ToLink> for LinkRef<'a> {
    fn from(link: &'a ToLink) -> Self {
        match link {
            ToLink::ToLinkId(id) => LinkRef::Id(id),
            ToLink::ToLinkCode(code) => LinkRef::Code(*code),
        }
    }
}

pub struct RouteService {
    worker_id: usize,
    scenario: Scenario,
    engine: Box<dyn RoutingEngine>,
    ctx: ServiceContext,
    last_logged_hour: Option<u32>,
}

impl RouteService {
    pub fn new(worker_id: usize, materialized: Materialized, ctx: ServiceContext) -> Self {
        Self {
            worker_id,
            scenario: materialized.scenario,
            engine: materialized.engine,
            ctx,
            last_logged_hour: None,
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Answer one request.
    pub fn handle(&mut self, request: &pb::Request) -> Result<pb::Response, RouteError> {
        let started_at = SystemTime::now();
        let start = Instant::now();
        self.log_hour(request.now);

        let from = self.facility(
            request.from_link.as_ref().map(LinkRef::from),
            request.from_coord.as_ref(),
            "from",
        )?;
        let to = self.facility(
            request.to_link.as_ref().map(LinkRef::from),
            request.to_coord.as_ref(),
            "to",
        )?;

        let query = RoutingRequest {
            from,
            to,
            departure_time: f64::from(request.departure_time),
            mode: request.mode.clone(),
        };
        let plan = self.engine.calc_route(&self.scenario, &query)?;
        let elements = convert::plan_to_proto(&plan)?;
        let travel_time = convert::total_travel_time(&elements);
        let duration = start.elapsed();

        debug!(
            worker = self.worker_id,
            person = %request.person_id,
            from = %query.from.link_id,
            to = %query.to.link_id,
            elements = elements.len(),
            duration_us = duration.as_micros() as u64,
            "routed request"
        );

        self.ctx.profiling.record(ProfilingEntry {
            worker_id: self.worker_id,
            simulation_now: request.now,
            departure_time: request.departure_time,
            from: query.from.link_id,
            to: query.to.link_id,
            started_at,
            duration,
            travel_time,
            request_id: request.request_id.clone(),
        });

        Ok(pb::Response {
            request_id: request.request_id.clone(),
            elements,
        })
    }

    fn log_hour(&mut self, now: u32) {
        if self.worker_id != 0 {
            return;
        }
        let hour = now / 3600;
        if self.last_logged_hour.is_none_or(|last| hour > last) {
            self.last_logged_hour = Some(hour);
            info!("routing requests for simulation hour {hour:02}:00");
        }
    }

    /// Resolve a request endpoint. Request coordinates win over the link's.
    fn facility(
        &self,
        link: Option<LinkRef<'_>>,
        coord: Option<&pb::Coord>,
        which: &'static str,
    ) -> Result<Facility, RouteError> {
        let link_id = match link.ok_or(RouteError::MissingLink(which))? {
            LinkRef::Id(id) => id,
            LinkRef::Code(code) => self
                .ctx
                .ids
                .resolve(IdKind::Link, code)
                .ok_or(RouteError::UnknownLinkCode(code))?,
        };

        let link = self
            .scenario
            .link(link_id)
            .ok_or_else(|| RouteError::UnknownLink(link_id.to_string()))?;
        let coord = coord.map_or_else(|| link.coord(), |c| Coord::new(c.x, c.y));

        Ok(Facility::new(link_id, coord))
    }
}
