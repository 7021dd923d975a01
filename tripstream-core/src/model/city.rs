//! Accumulated travel data produced by a streaming session.
//!
//! The backend is loose about payload shapes, so every record keeps the fields
//! the reconciler reasons about as typed members and collects everything else
//! in an `extra` map that survives a save/load round trip untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single place: attraction, hotel or restaurant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub latitude: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub rating: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Poi {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Descriptive facts about the destination city
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralCityData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_province: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub center_latitude: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub center_longitude: Option<f64>,
    /// Servers send this both as a number and as a formatted string
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub population: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Personalised itinerary; merged field by field as updates arrive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItineraryResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itinerary_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_of_interest: Option<Vec<Poi>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItineraryResponse {
    /// Shallow merge: fields present in `update` overwrite, absent fields survive.
    pub fn merge_from(&mut self, update: &ItineraryResponse) {
        if let Some(name) = &update.itinerary_name {
            self.itinerary_name = Some(name.clone());
        }
        if let Some(description) = &update.overall_description {
            self.overall_description = Some(description.clone());
        }
        if let Some(pois) = &update.points_of_interest {
            self.points_of_interest = Some(pois.clone());
        }
        for (key, value) in &update.extra {
            if !value.is_null() {
                self.extra.insert(key.clone(), value.clone());
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccommodationResponse {
    #[serde(default)]
    pub hotels: Vec<Poi>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiningResponse {
    #[serde(default)]
    pub restaurants: Vec<Poi>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Everything a session has accumulated so far
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiCityResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_city_data: Option<GeneralCityData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itinerary_response: Option<ItineraryResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_of_interest: Option<Vec<Poi>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accommodation_response: Option<AccommodationResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dining_response: Option<DiningResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AiCityResponse {
    /// True when nothing has been reconciled yet
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn city_name(&self) -> Option<&str> {
        self.general_city_data
            .as_ref()
            .and_then(|data| data.city.as_deref())
    }
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
            _ => None,
        })
    }

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(text)) => Some(text),
            Some(Value::Number(number)) => Some(number.to_string()),
            Some(Value::Bool(flag)) => Some(flag.to_string()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_fields_survive_round_trip() -> Result<(), serde_json::Error> {
        let raw = json!({
            "general_city_data": {
                "city": "Lisbon",
                "country": "Portugal",
                "population": 545000,
                "center_latitude": "38.72",
                "weather": "mild"
            },
            "points_of_interest": [{ "name": "Belém Tower", "opening_hours": "10-18" }],
            "relevance": 0.9
        });

        let parsed: AiCityResponse = serde_json::from_value(raw)?;
        let city = parsed.general_city_data.clone().unwrap_or_default();
        assert_eq!(city.population.as_deref(), Some("545000"));
        assert_eq!(city.center_latitude, Some(38.72));
        assert_eq!(city.extra.get("weather"), Some(&json!("mild")));
        assert_eq!(parsed.extra.get("relevance"), Some(&json!(0.9)));

        let reparsed: AiCityResponse = serde_json::from_value(serde_json::to_value(&parsed)?)?;
        assert_eq!(reparsed, parsed);
        Ok(())
    }

    #[test]
    fn itinerary_merge_keeps_untouched_fields() {
        let mut existing = ItineraryResponse {
            itinerary_name: Some("Weekend".into()),
            overall_description: Some("Two days of food".into()),
            points_of_interest: Some(vec![Poi::named("Time Out Market")]),
            extra: Map::new(),
        };
        let mut update = ItineraryResponse {
            itinerary_name: Some("Long weekend".into()),
            ..ItineraryResponse::default()
        };
        update.extra.insert("budget".into(), json!("medium"));

        existing.merge_from(&update);

        assert_eq!(existing.itinerary_name.as_deref(), Some("Long weekend"));
        assert_eq!(existing.overall_description.as_deref(), Some("Two days of food"));
        assert_eq!(existing.points_of_interest.map(|p| p.len()), Some(1));
        assert_eq!(existing.extra.get("budget"), Some(&json!("medium")));
    }
}
