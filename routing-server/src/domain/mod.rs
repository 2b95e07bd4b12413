//! Domain types for the routing server.
//!
//! These are the engine-facing plan types: what a routing engine produces
//! for a query, before it is turned into the wire representation. Route
//! variants are a closed sum type, so every leg carries exactly one of them.

mod coord;
mod plan;

pub use coord::Coord;
pub use plan::{
    Activity, AttributeValue, Attributes, GenericRoute, Leg, NetworkRoute, PlanElement, PtRoute,
    Route, PT_INTERACTION,
};
