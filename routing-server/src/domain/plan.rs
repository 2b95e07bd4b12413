//! Plan elements produced by a routing engine.
//!
//! An itinerary is an ordered list of [`PlanElement`]s. Legs move the
//! traveller; activities sit between legs (for transit, the
//! `pt interaction` stops where the traveller boards or alights).

use std::collections::BTreeMap;

use super::Coord;

/// Activity type the engine uses for boarding and alighting points.
pub const PT_INTERACTION: &str = "pt interaction";

/// A dynamically typed leg attribute.
///
/// Only the string, double, int and bool variants can be represented on
/// the wire; the others exist because engines attach them.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Double(f64),
    Int(i32),
    Bool(bool),
    Long(i64),
    Coord(Coord),
}

impl AttributeValue {
    /// Name of the runtime type, for error reporting.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "string",
            AttributeValue::Double(_) => "double",
            AttributeValue::Int(_) => "int",
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Long(_) => "long",
            AttributeValue::Coord(_) => "coord",
        }
    }
}

/// Leg attributes, ordered by key.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Route data shared by every route variant.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericRoute {
    pub start_link: String,
    pub end_link: String,
    /// Distance in metres.
    pub distance: f64,
    /// Travel time in seconds, if the engine computed one.
    pub travel_time: Option<f64>,
}

/// A route along an explicit sequence of network links.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRoute {
    pub generic: GenericRoute,
    pub link_ids: Vec<String>,
}

/// A route on a scheduled transit service.
#[derive(Debug, Clone, PartialEq)]
pub struct PtRoute {
    pub generic: GenericRoute,
    pub access_stop_id: String,
    pub egress_stop_id: String,
    pub boarding_time: Option<f64>,
    pub line_id: String,
    pub route_id: String,
}

/// The route attached to a leg. Exactly one variant per leg.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Generic(GenericRoute),
    Network(NetworkRoute),
    Pt(PtRoute),
}

impl Route {
    /// The data common to all variants.
    pub fn generic(&self) -> &GenericRoute {
        match self {
            Route::Generic(route) => route,
            Route::Network(route) => &route.generic,
            Route::Pt(route) => &route.generic,
        }
    }
}

/// One movement of the traveller.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub mode: String,
    pub routing_mode: Option<String>,
    pub departure_time: Option<f64>,
    pub travel_time: Option<f64>,
    pub attributes: Attributes,
    pub route: Route,
}

/// A stay at a location.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub act_type: String,
    pub link_id: String,
    pub coord: Coord,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub max_duration: Option<f64>,
}

impl Activity {
    /// A zero-duration interaction activity, as placed between transit legs.
    pub fn interaction(link_id: impl Into<String>, coord: Coord) -> Self {
        Self {
            act_type: PT_INTERACTION.to_string(),
            link_id: link_id.into(),
            coord,
            start_time: None,
            end_time: None,
            max_duration: Some(0.0),
        }
    }
}

/// An element of an itinerary.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanElement {
    Activity(Activity),
    Leg(Leg),
}

impl PlanElement {
    /// Returns true if this is a leg.
    pub fn is_leg(&self) -> bool {
        matches!(self, PlanElement::Leg(_))
    }

    /// Returns the leg if this element is one.
    pub fn as_leg(&self) -> Option<&Leg> {
        match self {
            PlanElement::Leg(leg) => Some(leg),
            PlanElement::Activity(_) => None,
        }
    }

    /// Returns the activity if this element is one.
    pub fn as_activity(&self) -> Option<&Activity> {
        match self {
            PlanElement::Activity(activity) => Some(activity),
            PlanElement::Leg(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generic() -> GenericRoute {
        GenericRoute {
            start_link: "1".into(),
            end_link: "2".into(),
            distance: 100.0,
            travel_time: Some(60.0),
        }
    }

    #[test]
    fn route_generic_accessor() {
        let network = Route::Network(NetworkRoute {
            generic: generic(),
            link_ids: vec!["1".into(), "5".into(), "2".into()],
        });
        assert_eq!(network.generic().distance, 100.0);

        let pt = Route::Pt(PtRoute {
            generic: generic(),
            access_stop_id: "a".into(),
            egress_stop_id: "b".into(),
            boarding_time: None,
            line_id: "l".into(),
            route_id: "r".into(),
        });
        assert_eq!(pt.generic().end_link, "2");
    }

    #[test]
    fn interaction_activity() {
        let act = Activity::interaction("1112", Coord::new(1.0, 2.0));
        assert_eq!(act.act_type, PT_INTERACTION);
        assert_eq!(act.max_duration, Some(0.0));
        assert_eq!(act.start_time, None);
    }

    #[test]
    fn element_accessors() {
        let act = PlanElement::Activity(Activity::interaction("1", Coord::default()));
        assert!(!act.is_leg());
        assert!(act.as_activity().is_some());
        assert!(act.as_leg().is_none());
    }

    #[test]
    fn attribute_type_names() {
        assert_eq!(AttributeValue::String("x".into()).type_name(), "string");
        assert_eq!(AttributeValue::Long(1).type_name(), "long");
        assert_eq!(AttributeValue::Coord(Coord::default()).type_name(), "coord");
    }
}
