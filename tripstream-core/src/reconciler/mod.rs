//! Merge rules for streamed events.
//!
//! [`apply_event`] is the single entry point for mutating accumulated city
//! data. It is pure: it takes the current data and one event and returns the
//! new data together with the side effect the caller should perform
//! (notify observers, complete the session, surface an error).
//!
//! Rules by event:
//!
//! | event          | effect on data                                         |
//! |----------------|--------------------------------------------------------|
//! | `city_data`    | replace `general_city_data`                            |
//! | `general_pois` | full envelope merge, see below                         |
//! | `chunk`        | full envelope merge for objects, progress otherwise    |
//! | `itinerary`    | field-by-field merge into `itinerary_response`         |
//! | `hotels`       | replace `accommodation_response`                       |
//! | `restaurants`  | replace `dining_response`                              |
//! | `start`        | adopt the server `session_id`                          |
//! | others         | none                                                   |
//!
//! An envelope is *incremental* when it carries `itinerary_response` without
//! `general_city_data`; incremental envelopes leave `points_of_interest` alone.

mod recorder;

pub use recorder::SessionRecorder;

use crate::error_classifier::{ParsedError, classify};
use crate::model::{AiCityResponse, ItineraryResponse};
use crate::streaming::{
    ChunkPayload, CompletePayload, PoiPayload, ProgressPayload, StartPayload, StreamEvent,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Where the caller may navigate once a session completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectIntent {
    pub domain: String,
    pub session_id: String,
    pub city: String,
}

impl RedirectIntent {
    fn from_complete(payload: &CompletePayload) -> Option<Self> {
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            domain: non_empty(&payload.domain)?,
            session_id: non_empty(&payload.session_id)?,
            city: non_empty(&payload.city)?,
        })
    }
}

/// Side effect requested by one reconciled event
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    Started { session_id: Option<String> },
    Progress(ProgressPayload),
    Activities(Value),
    Complete { redirect: Option<RedirectIntent> },
    Error(ParsedError),
}

/// Result of [`apply_event`]
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub data: AiCityResponse,
    pub effect: Effect,
    /// Whether `data` differs from the input
    pub changed: bool,
}

/// Apply one event to the accumulated data
pub fn apply_event(existing: Option<&AiCityResponse>, event: &StreamEvent) -> Reconciled {
    let original = existing.cloned().unwrap_or_default();
    let mut data = original.clone();

    let effect = match event {
        StreamEvent::Start(StartPayload { session_id, .. }) => {
            if let Some(id) = session_id.as_ref().filter(|id| !id.is_empty()) {
                data.session_id = Some(id.clone());
            }
            Effect::Started {
                session_id: session_id.clone(),
            }
        }
        StreamEvent::Progress(progress) => Effect::Progress(progress.clone()),
        StreamEvent::CityData(city) => {
            data.general_city_data = Some(city.clone());
            Effect::None
        }
        StreamEvent::GeneralPois(PoiPayload::List(pois)) => {
            data.points_of_interest = Some(pois.clone());
            Effect::None
        }
        StreamEvent::GeneralPois(PoiPayload::Envelope(envelope)) => {
            merge_envelope(&mut data, envelope);
            Effect::None
        }
        StreamEvent::Itinerary(update) => {
            merge_itinerary(&mut data, update);
            Effect::None
        }
        StreamEvent::Hotels(hotels) => {
            data.accommodation_response = Some(hotels.clone());
            Effect::None
        }
        StreamEvent::Restaurants(restaurants) => {
            data.dining_response = Some(restaurants.clone());
            Effect::None
        }
        StreamEvent::Activities(activities) => Effect::Activities(activities.clone()),
        StreamEvent::Complete(payload) => Effect::Complete {
            redirect: RedirectIntent::from_complete(payload),
        },
        StreamEvent::Error { message } => Effect::Error(classify(message)),
        StreamEvent::Chunk(ChunkPayload::Envelope(envelope)) => {
            merge_envelope(&mut data, envelope);
            Effect::None
        }
        StreamEvent::Chunk(ChunkPayload::Text(text)) => Effect::Progress(ProgressPayload {
            message: Some(text.clone()),
            ..ProgressPayload::default()
        }),
        StreamEvent::Chunk(ChunkPayload::Other(_)) => Effect::Progress(ProgressPayload::default()),
        StreamEvent::Unknown { kind, .. } => {
            debug!(event = %kind, "ignoring unknown event type");
            Effect::None
        }
    };

    let changed = data != original;
    Reconciled {
        data,
        effect,
        changed,
    }
}

/// True when an envelope only extends the itinerary and must not touch the flat POI list
pub fn is_incremental(envelope: &AiCityResponse) -> bool {
    envelope.itinerary_response.is_some() && envelope.general_city_data.is_none()
}

fn merge_envelope(data: &mut AiCityResponse, envelope: &AiCityResponse) {
    let incremental = is_incremental(envelope);

    if let Some(city) = &envelope.general_city_data {
        data.general_city_data = Some(city.clone());
    }
    if let Some(itinerary) = &envelope.itinerary_response {
        merge_itinerary(data, itinerary);
    }
    if !incremental {
        if let Some(pois) = &envelope.points_of_interest {
            data.points_of_interest = Some(pois.clone());
        }
    }
    if let Some(hotels) = &envelope.accommodation_response {
        data.accommodation_response = Some(hotels.clone());
    }
    if let Some(restaurants) = &envelope.dining_response {
        data.dining_response = Some(restaurants.clone());
    }
    if let Some(session_id) = &envelope.session_id {
        data.session_id = Some(session_id.clone());
    }
    for (key, value) in &envelope.extra {
        if !value.is_null() {
            data.extra.insert(key.clone(), value.clone());
        }
    }
}

fn merge_itinerary(data: &mut AiCityResponse, update: &ItineraryResponse) {
    match data.itinerary_response.as_mut() {
        Some(existing) => existing.merge_from(update),
        None => data.itinerary_response = Some(update.clone()),
    }
}
