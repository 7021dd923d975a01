use console::style;
use serde_json::Value;
use tripstream_core::{
    AiCityResponse, ParsedError, RedirectIntent, StreamObserver, StreamProgress, StreamingSession,
};

/// Prints stream callbacks to the terminal
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    pub verbose: bool,
}

impl StreamObserver for ConsoleObserver {
    fn on_progress(&self, progress: &StreamProgress) {
        let event = progress.last_event.as_deref().unwrap_or("-");
        let mut line = format!(
            "{} {:>3} {}",
            style("tripstream:").yellow().bold(),
            progress.events_received,
            style(event).cyan()
        );
        if let Some(fraction) = progress.fraction {
            line.push_str(&format!(" {:>3.0}%", fraction * 100.0));
        }
        if let Some(message) = &progress.message {
            line.push_str(&format!(" {}", style(message).dim()));
        }
        if self.verbose || progress.message.is_some() || progress.fraction.is_some() {
            eprintln!("{line}");
        }
    }

    fn on_activities(&self, activities: &Value) {
        let count = activities.as_array().map(Vec::len).unwrap_or(1);
        eprintln!(
            "{} {count} activities received",
            style("tripstream:").yellow().bold()
        );
    }

    fn on_complete(&self, data: &AiCityResponse) {
        eprintln!(
            "{} {}",
            style("✓").green().bold(),
            style("stream complete").green()
        );
        print_summary(data);
    }

    fn on_error(&self, error: &ParsedError) {
        eprintln!(
            "{} {} {}",
            style("✗").red().bold(),
            style(&error.user_message).red(),
            style(format!("({})", error.kind)).dim()
        );
        if let Some(wait) = error.retry_after {
            eprintln!("  retry in {wait}s");
        }
        if self.verbose {
            eprintln!("  {}", style(&error.technical_message).dim());
        }
    }

    fn on_redirect(&self, intent: &RedirectIntent) {
        eprintln!(
            "{} /{}/{}?sessionId={}",
            style("→").cyan().bold(),
            intent.domain,
            intent.city,
            intent.session_id
        );
    }
}

pub fn print_summary(data: &AiCityResponse) {
    if let Some(city) = data.general_city_data.as_ref() {
        let name = city.city.as_deref().unwrap_or("unknown city");
        match city.country.as_deref() {
            Some(country) => eprintln!("  {} {name}, {country}", style("city").bold()),
            None => eprintln!("  {} {name}", style("city").bold()),
        }
    }
    if let Some(itinerary) = data.itinerary_response.as_ref() {
        let name = itinerary.itinerary_name.as_deref().unwrap_or("untitled");
        let stops = itinerary.points_of_interest.as_ref().map(Vec::len).unwrap_or(0);
        eprintln!("  {} {name} ({stops} stops)", style("itinerary").bold());
    }
    if let Some(pois) = data.points_of_interest.as_ref() {
        eprintln!("  {} {}", style("places").bold(), pois.len());
    }
    if let Some(hotels) = data.accommodation_response.as_ref() {
        eprintln!("  {} {}", style("hotels").bold(), hotels.hotels.len());
    }
    if let Some(dining) = data.dining_response.as_ref() {
        eprintln!("  {} {}", style("restaurants").bold(), dining.restaurants.len());
    }
}

pub fn print_session_header(session: &StreamingSession) {
    let state = if session.is_complete {
        style("complete").green()
    } else {
        style("in progress").yellow()
    };
    eprintln!(
        "{} {} [{}] {} started {}",
        style("session").bold(),
        session.session_id,
        session.domain,
        state,
        session.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}
