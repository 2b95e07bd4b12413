//! Conversion from engine itineraries to wire messages.

use std::collections::HashMap;

use crate::domain::{Activity, AttributeValue, Attributes, GenericRoute, Leg, PlanElement, Route};
use crate::proto::routing as pb;
use crate::proto::routing::{attribute_value, leg, plan_element};

use super::RouteError;

/// Whole seconds, truncated; negative and NaN times clamp to zero.
fn seconds(time: f64) -> u32 {
    time as u32
}

/// Convert a full itinerary. Any element that cannot be represented fails
/// the whole conversion.
pub fn plan_to_proto(plan: &[PlanElement]) -> Result<Vec<pb::PlanElement>, RouteError> {
    plan.iter()
        .map(|element| {
            let element = match element {
                PlanElement::Activity(activity) => {
                    plan_element::Element::Activity(activity_to_proto(activity))
                }
                PlanElement::Leg(leg) => plan_element::Element::Leg(leg_to_proto(leg)?),
            };
            Ok(pb::PlanElement {
                element: Some(element),
            })
        })
        .collect()
}

pub fn activity_to_proto(activity: &Activity) -> pb::Activity {
    pb::Activity {
        act_type: activity.act_type.clone(),
        link_id: activity.link_id.clone(),
        x: activity.coord.x,
        y: activity.coord.y,
        start_time: activity.start_time.map(seconds),
        end_time: activity.end_time.map(seconds),
        max_dur: activity.max_duration.map(seconds),
    }
}

pub fn leg_to_proto(leg: &Leg) -> Result<pb::Leg, RouteError> {
    let travel_time = leg.travel_time.ok_or_else(|| RouteError::MissingTravelTime {
        mode: leg.mode.clone(),
    })?;

    Ok(pb::Leg {
        mode: leg.mode.clone(),
        routing_mode: leg.routing_mode.clone(),
        trav_time: seconds(travel_time),
        dep_time: leg.departure_time.map(seconds),
        attributes: attributes_to_proto(&leg.attributes)?,
        route: Some(route_to_proto(&leg.route)?),
    })
}

fn generic_to_proto(route: &GenericRoute) -> pb::GenericRoute {
    pb::GenericRoute {
        start_link: route.start_link.clone(),
        end_link: route.end_link.clone(),
        distance: route.distance,
        trav_time: route.travel_time.map(seconds),
    }
}

fn route_to_proto(route: &Route) -> Result<leg::Route, RouteError> {
    Ok(match route {
        Route::Generic(generic) => leg::Route::GenericRoute(generic_to_proto(generic)),
        Route::Network(network) => leg::Route::NetworkRoute(pb::NetworkRoute {
            delegate: Some(generic_to_proto(&network.generic)),
            route: network.link_ids.clone(),
        }),
        Route::Pt(pt) => {
            let boarding_time =
                pt.boarding_time
                    .ok_or_else(|| RouteError::MissingBoardingTime {
                        access: pt.access_stop_id.clone(),
                        egress: pt.egress_stop_id.clone(),
                    })?;
            leg::Route::PtRoute(pb::PtRoute {
                delegate: Some(generic_to_proto(&pt.generic)),
                information: Some(pb::PtRouteDescription {
                    access_facility_id: pt.access_stop_id.clone(),
                    egress_facility_id: pt.egress_stop_id.clone(),
                    boarding_time: seconds(boarding_time),
                    transit_line_id: pt.line_id.clone(),
                    transit_route_id: pt.route_id.clone(),
                }),
            })
        }
    })
}

fn attributes_to_proto(
    attributes: &Attributes,
) -> Result<HashMap<String, pb::AttributeValue>, RouteError> {
    attributes
        .iter()
        .map(|(key, value)| {
            let value = match value {
                AttributeValue::String(s) => attribute_value::Value::StringValue(s.clone()),
                AttributeValue::Double(d) => attribute_value::Value::DoubleValue(*d),
                AttributeValue::Int(i) => attribute_value::Value::IntValue(*i),
                AttributeValue::Bool(b) => attribute_value::Value::BoolValue(*b),
                other => {
                    return Err(RouteError::UnsupportedAttribute {
                        key: key.clone(),
                        type_name: other.type_name(),
                    });
                }
            };
            Ok((key.clone(), pb::AttributeValue { value: Some(value) }))
        })
        .collect()
}

/// Sum of the wire legs' whole-second travel times, as recorded for
/// profiling.
pub fn total_travel_time(elements: &[pb::PlanElement]) -> u32 {
    elements
        .iter()
        .filter_map(|element| match &element.element {
            Some(plan_element::Element::Leg(leg)) => Some(leg.trav_time),
            _ => None,
        })
        .sum()
}
