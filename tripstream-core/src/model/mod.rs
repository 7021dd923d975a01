pub mod city;

pub use city::{
    AccommodationResponse, AiCityResponse, DiningResponse, GeneralCityData, ItineraryResponse, Poi,
};
