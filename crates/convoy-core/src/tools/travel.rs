//! Travel-planning demo tools with canned answers.
//!
//! `getWeather`, `searchFlight` and `bookHotel` back the single-session chat
//! demo; `get_weather` is the city lookup the MCP weather demo exposes.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::errors::AgentError;
use crate::tools::{Tool, ToolHandler, ToolSpec};

fn required_str<'a>(tool_name: &str, arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str, AgentError> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::ToolError {
            tool_name: tool_name.to_string(),
            message: format!("Missing or invalid '{}' parameter", key),
        })
}

pub struct GetWeatherTool;

impl GetWeatherTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GetWeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for GetWeatherTool {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        let location = required_str("getWeather", &arguments, "location")?;
        let unit = arguments.get("unit").and_then(|v| v.as_str()).unwrap_or("celsius");
        log::info!("Getting weather for {} in {}", location, unit);
        Ok(json!({
            "location": location,
            "temperature": "25",
            "unit": unit
        }))
    }
}

impl Tool for GetWeatherTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "getWeather",
            "Get the current weather for a given location.",
            json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string", "description": "City name, e.g. 'London'"},
                    "unit": {"type": "string", "enum": ["celsius", "fahrenheit"], "default": "celsius"}
                },
                "required": ["location"]
            }),
        )
    }
}

pub struct SearchFlightTool;

impl SearchFlightTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SearchFlightTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for SearchFlightTool {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        let from = required_str("searchFlight", &arguments, "from_")?;
        let to = required_str("searchFlight", &arguments, "to")?;
        let date = required_str("searchFlight", &arguments, "date")?;
        log::info!("Searching flights from {} to {} on {}", from, to, date);
        Ok(json!({
            "flights": ["Flight123", "Flight456"],
            "date": date
        }))
    }
}

impl Tool for SearchFlightTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "searchFlight",
            "Search for available flights between two cities.",
            json!({
                "type": "object",
                "properties": {
                    "from_": {"type": "string", "description": "Departure city"},
                    "to": {"type": "string", "description": "Arrival city"},
                    "date": {"type": "string", "description": "Date of travel in YYYY-MM-DD"}
                },
                "required": ["from_", "to", "date"]
            }),
        )
    }
}

pub struct BookHotelTool;

impl BookHotelTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BookHotelTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for BookHotelTool {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        let city = required_str("bookHotel", &arguments, "city")?;
        let check_in = required_str("bookHotel", &arguments, "check_in")?;
        let check_out = required_str("bookHotel", &arguments, "check_out")?;
        log::info!("Booking hotel in {} from {} to {}", city, check_in, check_out);
        Ok(json!({
            "confirmation": "HOTEL123",
            "city": city
        }))
    }
}

impl Tool for BookHotelTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "bookHotel",
            "Book a hotel in a given city on specific dates.",
            json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string"},
                    "check_in": {"type": "string"},
                    "check_out": {"type": "string"}
                },
                "required": ["city", "check_in", "check_out"]
            }),
        )
    }
}

pub const WEATHER_UNAVAILABLE: &str = "Weather data not available for this city.";

/// Simulated per-city weather lookup.
pub struct CityWeatherTool;

impl CityWeatherTool {
    pub fn new() -> Self {
        Self
    }

    pub fn lookup(city: &str) -> &'static str {
        match city {
            "New York" => "Sunny, 25°C",
            "Los Angeles" => "Cloudy, 22°C",
            "Chicago" => "Rainy, 18°C",
            _ => WEATHER_UNAVAILABLE,
        }
    }
}

impl Default for CityWeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for CityWeatherTool {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        let city = required_str("get_weather", &arguments, "city")?;
        Ok(Value::String(Self::lookup(city).to_string()))
    }
}

impl Tool for CityWeatherTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "get_weather",
            "Get the current weather for a specified city.",
            json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string", "description": "The name of the city to get the weather for."}
                },
                "required": ["city"]
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_get_weather_uses_given_unit() {
        let result = GetWeatherTool::new()
            .invoke(args(json!({"location": "London", "unit": "fahrenheit"})))
            .await
            .unwrap();
        assert_eq!(result, json!({"location": "London", "temperature": "25", "unit": "fahrenheit"}));
    }

    #[tokio::test]
    async fn test_search_flight() {
        let result = SearchFlightTool::new()
            .invoke(args(json!({"from_": "Paris", "to": "Rome", "date": "2025-06-20"})))
            .await
            .unwrap();
        assert_eq!(result["flights"], json!(["Flight123", "Flight456"]));
        assert_eq!(result["date"], "2025-06-20");
    }

    #[tokio::test]
    async fn test_book_hotel_missing_dates() {
        let err = BookHotelTool::new()
            .invoke(args(json!({"city": "Rome"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("check_in"));
    }

    #[tokio::test]
    async fn test_city_weather_lookup() {
        let tool = CityWeatherTool::new();
        assert_eq!(tool.invoke(args(json!({"city": "Chicago"}))).await.unwrap(), json!("Rainy, 18°C"));
        assert_eq!(
            tool.invoke(args(json!({"city": "Paris"}))).await.unwrap(),
            json!(WEATHER_UNAVAILABLE)
        );
    }
}
