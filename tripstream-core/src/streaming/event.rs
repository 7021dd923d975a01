//! Typed server events.
//!
//! Every line of the stream carries a JSON envelope `{ type, data?, error? }`.
//! The envelope is decoded loosely first and then narrowed into a
//! [`StreamEvent`] variant so that the reconciler can match exhaustively.

use crate::config::constants::events;
use crate::model::{AccommodationResponse, AiCityResponse, DiningResponse, GeneralCityData, ItineraryResponse, Poi};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error raised while turning one `data:` line into a [`StreamEvent`]
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event has no type")]
    MissingType,
    #[error("error event carries no message")]
    MissingErrorMessage,
    #[error("payload of `{kind}` event does not match its shape: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Wire envelope before narrowing
#[derive(Debug, Clone, Deserialize)]
struct RawEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// Fraction in `0.0..=1.0` or a percentage, depending on the backend version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of a `general_pois` event
#[derive(Debug, Clone, PartialEq)]
pub enum PoiPayload {
    /// Bare list of places
    List(Vec<Poi>),
    /// Response-shaped object, possibly carrying other sub-records too
    Envelope(Box<AiCityResponse>),
}

/// Payload of a `chunk` event
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkPayload {
    Envelope(Box<AiCityResponse>),
    Text(String),
    Other(Value),
}

/// A decoded server event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Start(StartPayload),
    Progress(ProgressPayload),
    CityData(GeneralCityData),
    GeneralPois(PoiPayload),
    Itinerary(ItineraryResponse),
    Hotels(AccommodationResponse),
    Restaurants(DiningResponse),
    Activities(Value),
    Complete(CompletePayload),
    Error { message: String },
    Chunk(ChunkPayload),
    /// A type this client does not know; kept so it can be logged
    Unknown { kind: String, data: Option<Value> },
}

impl StreamEvent {
    /// Decode one JSON envelope
    pub fn from_json(text: &str) -> Result<Self, EventDecodeError> {
        let raw: RawEvent = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    /// Decode an envelope that is already a JSON value
    pub fn from_value(value: Value) -> Result<Self, EventDecodeError> {
        let raw: RawEvent = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEvent) -> Result<Self, EventDecodeError> {
        let kind = raw.kind.trim().to_string();
        if kind.is_empty() {
            return Err(EventDecodeError::MissingType);
        }

        let data = raw.data.filter(|value| !value.is_null());
        let event = match kind.as_str() {
            events::START => Self::Start(payload(&kind, data)?),
            events::PROGRESS => Self::Progress(payload(&kind, data)?),
            events::CITY_DATA => {
                Self::CityData(payload(&kind, unwrap_envelope(data, "general_city_data"))?)
            }
            events::GENERAL_POIS => Self::GeneralPois(poi_payload(&kind, data)?),
            events::ITINERARY => {
                Self::Itinerary(payload(&kind, unwrap_envelope(data, "itinerary_response"))?)
            }
            events::HOTELS => {
                let data = unwrap_envelope(data, "accommodation_response");
                Self::Hotels(payload(&kind, wrap_list(data, "hotels"))?)
            }
            events::RESTAURANTS => {
                let data = unwrap_envelope(data, "dining_response");
                Self::Restaurants(payload(&kind, wrap_list(data, "restaurants"))?)
            }
            events::ACTIVITIES => Self::Activities(data.unwrap_or(Value::Null)),
            events::COMPLETE => Self::Complete(payload(&kind, data)?),
            events::ERROR => Self::Error {
                message: error_message(raw.error, data.as_ref())
                    .ok_or(EventDecodeError::MissingErrorMessage)?,
            },
            events::CHUNK => Self::Chunk(chunk_payload(&kind, data)?),
            _ => Self::Unknown { kind, data },
        };

        Ok(event)
    }

    /// Wire name of the event type
    pub fn kind(&self) -> &str {
        match self {
            Self::Start(_) => events::START,
            Self::Progress(_) => events::PROGRESS,
            Self::CityData(_) => events::CITY_DATA,
            Self::GeneralPois(_) => events::GENERAL_POIS,
            Self::Itinerary(_) => events::ITINERARY,
            Self::Hotels(_) => events::HOTELS,
            Self::Restaurants(_) => events::RESTAURANTS,
            Self::Activities(_) => events::ACTIVITIES,
            Self::Complete(_) => events::COMPLETE,
            Self::Error { .. } => events::ERROR,
            Self::Chunk(_) => events::CHUNK,
            Self::Unknown { kind, .. } => kind,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

fn payload<T>(kind: &str, data: Option<Value>) -> Result<T, EventDecodeError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match data {
        None => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|source| {
            EventDecodeError::InvalidPayload {
                kind: kind.to_string(),
                source,
            }
        }),
    }
}

/// Accept both `{ "<key>": {...}, ... }` and the bare inner object.
/// Siblings of a wrapped record describe the envelope, not the record, so they are dropped.
fn unwrap_envelope(data: Option<Value>, key: &str) -> Option<Value> {
    match data {
        Some(Value::Object(mut map)) if map.get(key).is_some_and(Value::is_object) => {
            map.remove(key)
        }
        other => other,
    }
}

/// Accept a bare array where an object with a list field is expected
fn wrap_list(data: Option<Value>, key: &str) -> Option<Value> {
    match data {
        Some(Value::Array(items)) => {
            let mut map = Map::new();
            map.insert(key.to_string(), Value::Array(items));
            Some(Value::Object(map))
        }
        other => other,
    }
}

fn poi_payload(kind: &str, data: Option<Value>) -> Result<PoiPayload, EventDecodeError> {
    match data {
        Some(Value::Array(items)) => Ok(PoiPayload::List(payload(kind, Some(Value::Array(items)))?)),
        other => Ok(PoiPayload::Envelope(Box::new(payload(kind, other)?))),
    }
}

fn chunk_payload(kind: &str, data: Option<Value>) -> Result<ChunkPayload, EventDecodeError> {
    match data {
        Some(Value::Object(map)) => Ok(ChunkPayload::Envelope(Box::new(payload(
            kind,
            Some(Value::Object(map)),
        )?))),
        Some(Value::String(text)) => Ok(ChunkPayload::Text(text)),
        Some(other) => Ok(ChunkPayload::Other(other)),
        None => Ok(ChunkPayload::Other(Value::Null)),
    }
}

fn error_message(error: Option<Value>, data: Option<&Value>) -> Option<String> {
    let from_error = match error {
        Some(Value::String(text)) => Some(text),
        Some(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };

    from_error
        .or_else(|| {
            data.and_then(|value| {
                value
                    .get("message")
                    .or_else(|| value.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
        })
        .filter(|message| !message.trim().is_empty())
}
