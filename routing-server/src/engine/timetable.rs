//! Single-ride transit router over a frequency/timetable schedule.
//!
//! The engine walks from the origin to a nearby stop, rides one transit
//! route, and walks from the alighting stop to the destination. If no ride
//! beats walking the whole way, it returns a single walk leg.

use tracing::trace;

use crate::domain::{Activity, Attributes, Coord, GenericRoute, Leg, PlanElement, PtRoute, Route};

use super::{EngineError, RoutingEngine, RoutingRequest, Scenario};

/// Mode tag for access, egress and direct walking legs.
pub const WALK_MODE: &str = "walk";

/// Walking model used for access, egress and direct walks.
#[derive(Debug, Clone)]
pub struct WalkParams {
    /// Walking speed in metres per second.
    pub speed: f64,
    /// Multiplier from straight-line to walked distance.
    pub beeline_factor: f64,
    /// Stops within this straight-line distance (metres) are candidates.
    pub search_radius: f64,
}

impl Default for WalkParams {
    fn default() -> Self {
        Self {
            speed: 3.0 / 3.6,
            beeline_factor: 1.3,
            search_radius: 1000.0,
        }
    }
}

impl WalkParams {
    fn walk_distance(&self, beeline: f64) -> f64 {
        beeline * self.beeline_factor
    }

    fn walk_time(&self, beeline: f64) -> f64 {
        self.walk_distance(beeline) / self.speed
    }
}

/// Best ride found so far.
#[derive(Debug, Clone, Copy)]
struct Ride {
    line: usize,
    route: usize,
    board: usize,
    alight: usize,
    /// Departure of the vehicle from the first route stop.
    vehicle_departure: u32,
    arrival: f64,
    walked: f64,
}

impl Ride {
    fn better_than(&self, other: &Ride) -> bool {
        self.arrival < other.arrival || (self.arrival == other.arrival && self.walked < other.walked)
    }
}

/// Engine over one scenario's timetable.
///
/// The per-stop access and egress buffers are reused between queries.
#[derive(Debug)]
pub struct TimetableEngine {
    params: WalkParams,
    access: Vec<Option<f64>>,
    egress: Vec<Option<f64>>,
}

impl TimetableEngine {
    pub fn new(scenario: &Scenario, params: WalkParams) -> Self {
        let stops = scenario.stops().len();
        Self {
            params,
            access: vec![None; stops],
            egress: vec![None; stops],
        }
    }

    /// Fill `buffer` with walk times from `origin` to candidate stops.
    ///
    /// Candidates are the stops within the search radius, or the nearest
    /// stop if none is that close.
    fn collect_walks(params: &WalkParams, scenario: &Scenario, origin: Coord, buffer: &mut Vec<Option<f64>>) {
        buffer.clear();
        buffer.resize(scenario.stops().len(), None);

        let mut nearest: Option<(usize, f64)> = None;
        let mut found = false;
        for (idx, stop) in scenario.stops().iter().enumerate() {
            let beeline = origin.distance(&stop.coord);
            if beeline <= params.search_radius {
                buffer[idx] = Some(params.walk_time(beeline));
                found = true;
            }
            if nearest.is_none_or(|(_, best)| beeline < best) {
                nearest = Some((idx, beeline));
            }
        }

        if !found && let Some((idx, beeline)) = nearest {
            buffer[idx] = Some(params.walk_time(beeline));
        }
    }

    fn best_ride(&self, scenario: &Scenario, departure_time: f64) -> Option<Ride> {
        let mut best: Option<Ride> = None;

        for (line_idx, line) in scenario.lines().iter().enumerate() {
            for (route_idx, route) in line.routes.iter().enumerate() {
                let indices = route.stop_indices();
                for board in 0..indices.len() {
                    let Some(access) = self.access[indices[board]] else {
                        continue;
                    };
                    let ready = departure_time + access;
                    let offset = f64::from(route.stops[board].departure_offset);
                    let Some(vehicle_departure) = route.next_departure(ready - offset) else {
                        continue;
                    };

                    for alight in board + 1..indices.len() {
                        let Some(egress) = self.egress[indices[alight]] else {
                            continue;
                        };
                        let ride = Ride {
                            line: line_idx,
                            route: route_idx,
                            board,
                            alight,
                            vehicle_departure,
                            arrival: f64::from(vehicle_departure)
                                + f64::from(route.stops[alight].arrival_offset)
                                + egress,
                            walked: access + egress,
                        };
                        if best.as_ref().is_none_or(|b| ride.better_than(b)) {
                            best = Some(ride);
                        }
                    }
                }
            }
        }

        best
    }

    fn walk_leg(
        &self,
        start_link: &str,
        end_link: &str,
        beeline: f64,
        departure_time: f64,
        routing_mode: &str,
    ) -> Leg {
        let travel_time = self.params.walk_time(beeline);
        Leg {
            mode: WALK_MODE.to_string(),
            routing_mode: Some(routing_mode.to_string()),
            departure_time: Some(departure_time),
            travel_time: Some(travel_time),
            attributes: Attributes::new(),
            route: Route::Generic(GenericRoute {
                start_link: start_link.to_string(),
                end_link: end_link.to_string(),
                distance: self.params.walk_distance(beeline),
                travel_time: Some(travel_time),
            }),
        }
    }

    fn ride_itinerary(&self, scenario: &Scenario, request: &RoutingRequest, ride: Ride) -> Vec<PlanElement> {
        let line = &scenario.lines()[ride.line];
        let route = &line.routes[ride.route];
        let indices = route.stop_indices();
        let board_stop = &scenario.stops()[indices[ride.board]];
        let alight_stop = &scenario.stops()[indices[ride.alight]];

        let access = self.walk_leg(
            &request.from.link_id,
            &board_stop.link,
            request.from.coord.distance(&board_stop.coord),
            request.departure_time,
            &request.mode,
        );
        let at_stop = request.departure_time + access.travel_time.unwrap_or_default();

        let boarding_time =
            f64::from(ride.vehicle_departure) + f64::from(route.stops[ride.board].departure_offset);
        let alighting_time =
            f64::from(ride.vehicle_departure) + f64::from(route.stops[ride.alight].arrival_offset);
        let ride_time = alighting_time - at_stop;

        let distance: f64 = indices[ride.board..=ride.alight]
            .windows(2)
            .map(|pair| {
                scenario.stops()[pair[0]]
                    .coord
                    .distance(&scenario.stops()[pair[1]].coord)
            })
            .sum();

        let transit = Leg {
            mode: route.mode.clone(),
            routing_mode: Some(request.mode.clone()),
            departure_time: Some(at_stop),
            travel_time: Some(ride_time),
            attributes: Attributes::new(),
            route: Route::Pt(PtRoute {
                generic: GenericRoute {
                    start_link: board_stop.link.clone(),
                    end_link: alight_stop.link.clone(),
                    distance,
                    travel_time: Some(ride_time),
                },
                access_stop_id: board_stop.id.clone(),
                egress_stop_id: alight_stop.id.clone(),
                boarding_time: Some(boarding_time),
                line_id: line.id.clone(),
                route_id: route.id.clone(),
            }),
        };

        let egress = self.walk_leg(
            &alight_stop.link,
            &request.to.link_id,
            alight_stop.coord.distance(&request.to.coord),
            alighting_time,
            &request.mode,
        );

        vec![
            PlanElement::Leg(access),
            PlanElement::Activity(Activity::interaction(&board_stop.link, board_stop.coord)),
            PlanElement::Leg(transit),
            PlanElement::Activity(Activity::interaction(&alight_stop.link, alight_stop.coord)),
            PlanElement::Leg(egress),
        ]
    }
}

impl RoutingEngine for TimetableEngine {
    fn calc_route(
        &mut self,
        scenario: &Scenario,
        request: &RoutingRequest,
    ) -> Result<Vec<PlanElement>, EngineError> {
        let (from, to) = (request.from.coord, request.to.coord);
        if ![from.x, from.y, to.x, to.y, request.departure_time]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(EngineError::Routing(format!(
                "non-finite input: from {from} to {to} at {}",
                request.departure_time
            )));
        }

        Self::collect_walks(&self.params, scenario, from, &mut self.access);
        Self::collect_walks(&self.params, scenario, to, &mut self.egress);

        let direct_beeline = from.distance(&to);
        let direct_arrival = request.departure_time + self.params.walk_time(direct_beeline);

        match self.best_ride(scenario, request.departure_time) {
            Some(ride) if ride.arrival < direct_arrival => {
                trace!(
                    line = %scenario.lines()[ride.line].id,
                    arrival = ride.arrival,
                    "transit ride found"
                );
                Ok(self.ride_itinerary(scenario, request, ride))
            }
            _ => {
                trace!(arrival = direct_arrival, "walking directly");
                Ok(vec![PlanElement::Leg(self.walk_leg(
                    &request.from.link_id,
                    &request.to.link_id,
                    direct_beeline,
                    request.departure_time,
                    &request.mode,
                ))])
            }
        }
    }
}
