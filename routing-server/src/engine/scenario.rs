//! Scenario snapshot: network links and the transit schedule.
//!
//! Scenarios are read from JSON. Cross references (stop to link, route to
//! stop) are resolved and validated once at load time, so the engine can
//! index without further checks.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::domain::Coord;

use super::EngineError;

/// A directed network link.
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub id: String,
    pub from: Coord,
    pub to: Coord,
    /// Length in metres; the straight-line length when absent.
    #[serde(default)]
    pub length: Option<f64>,
}

impl Link {
    /// Representative point of the link (its midpoint).
    pub fn coord(&self) -> Coord {
        self.from.midpoint(&self.to)
    }

    pub fn length(&self) -> f64 {
        self.length.unwrap_or_else(|| self.from.distance(&self.to))
    }
}

/// A transit stop facility, attached to a network link.
#[derive(Debug, Clone, Deserialize)]
pub struct Stop {
    pub id: String,
    pub link: String,
    pub coord: Coord,
}

/// A stop on a transit route, with offsets from the vehicle's departure
/// at the first stop.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteStop {
    pub stop: String,
    pub arrival_offset: u32,
    pub departure_offset: u32,
}

/// Regular departures from `first` to `last` (inclusive) every `every`
/// seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct Headway {
    pub first: u32,
    pub last: u32,
    pub every: u32,
}

/// One stopping pattern of a line with its departures.
#[derive(Debug, Clone, Deserialize)]
pub struct TransitRoute {
    pub id: String,
    #[serde(default = "default_transit_mode")]
    pub mode: String,
    pub stops: Vec<RouteStop>,
    #[serde(default)]
    pub departures: Vec<u32>,
    #[serde(default)]
    pub headway: Option<Headway>,

    #[serde(skip)]
    stop_indices: Vec<usize>,
    #[serde(skip)]
    schedule: Vec<u32>,
}

fn default_transit_mode() -> String {
    "pt".to_string()
}

impl TransitRoute {
    /// Scenario stop index of each route stop.
    pub fn stop_indices(&self) -> &[usize] {
        &self.stop_indices
    }

    /// All departures from the first stop, sorted.
    pub fn schedule(&self) -> &[u32] {
        &self.schedule
    }

    /// Earliest departure from the first stop at or after `earliest`.
    pub fn next_departure(&self, earliest: f64) -> Option<u32> {
        let idx = self
            .schedule
            .partition_point(|&departure| f64::from(departure) < earliest);
        self.schedule.get(idx).copied()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitLine {
    pub id: String,
    pub routes: Vec<TransitRoute>,
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    name: String,
    links: Vec<Link>,
    #[serde(default)]
    stops: Vec<Stop>,
    #[serde(default)]
    lines: Vec<TransitLine>,
}

/// A validated scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    links: Vec<Link>,
    link_index: HashMap<String, usize>,
    stops: Vec<Stop>,
    lines: Vec<TransitLine>,
}

impl Scenario {
    /// Read and validate a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ScenarioFile =
            serde_json::from_str(&json).map_err(|source| EngineError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let scenario = Self::from_file(file)?;
        info!(
            path = %path.display(),
            links = scenario.links.len(),
            stops = scenario.stops.len(),
            lines = scenario.lines.len(),
            "loaded scenario"
        );
        Ok(scenario)
    }

    /// Parse and validate a scenario from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let file: ScenarioFile = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidScenario(e.to_string()))?;
        Self::from_file(file)
    }

    fn from_file(file: ScenarioFile) -> Result<Self, EngineError> {
        let mut link_index = HashMap::with_capacity(file.links.len());
        for (idx, link) in file.links.iter().enumerate() {
            if link_index.insert(link.id.clone(), idx).is_some() {
                return Err(EngineError::InvalidScenario(format!(
                    "duplicate link {}",
                    link.id
                )));
            }
        }

        let mut stop_index = HashMap::with_capacity(file.stops.len());
        for (idx, stop) in file.stops.iter().enumerate() {
            if !link_index.contains_key(&stop.link) {
                return Err(EngineError::InvalidScenario(format!(
                    "stop {} references unknown link {}",
                    stop.id, stop.link
                )));
            }
            if stop_index.insert(stop.id.clone(), idx).is_some() {
                return Err(EngineError::InvalidScenario(format!(
                    "duplicate stop {}",
                    stop.id
                )));
            }
        }

        let mut lines = file.lines;
        for line in &mut lines {
            for route in &mut line.routes {
                resolve_route(&line.id, route, &stop_index)?;
            }
        }

        Ok(Self {
            name: file.name,
            links: file.links,
            link_index,
            stops: file.stops,
            lines,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Look up a link by id.
    pub fn link(&self, id: &str) -> Option<&Link> {
        self.link_index.get(id).map(|&idx| &self.links[idx])
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn lines(&self) -> &[TransitLine] {
        &self.lines
    }

    /// Every route with its line, in file order.
    pub fn routes(&self) -> impl Iterator<Item = (&TransitLine, &TransitRoute)> {
        self.lines
            .iter()
            .flat_map(|line| line.routes.iter().map(move |route| (line, route)))
    }
}

/// Resolve a route's stops and expand its schedule.
fn resolve_route(
    line_id: &str,
    route: &mut TransitRoute,
    stop_index: &HashMap<String, usize>,
) -> Result<(), EngineError> {
    let invalid =
        |reason: String| EngineError::InvalidScenario(format!("route {line_id}/{}: {reason}", route.id));

    if route.stops.len() < 2 {
        return Err(invalid("needs at least two stops".into()));
    }

    let mut indices = Vec::with_capacity(route.stops.len());
    let mut previous_departure = 0;
    for route_stop in &route.stops {
        let idx = *stop_index
            .get(&route_stop.stop)
            .ok_or_else(|| invalid(format!("unknown stop {}", route_stop.stop)))?;
        if route_stop.arrival_offset > route_stop.departure_offset
            || route_stop.arrival_offset < previous_departure
        {
            return Err(invalid(format!(
                "offsets at stop {} go backwards",
                route_stop.stop
            )));
        }
        previous_departure = route_stop.departure_offset;
        indices.push(idx);
    }

    let mut schedule = route.departures.clone();
    if let Some(headway) = &route.headway {
        if headway.every == 0 || headway.first > headway.last {
            return Err(invalid("headway must be positive and ordered".into()));
        }
        schedule.extend((headway.first..=headway.last).step_by(headway.every as usize));
    }
    schedule.sort_unstable();
    schedule.dedup();

    route.stop_indices = indices;
    route.schedule = schedule;
    Ok(())
}
