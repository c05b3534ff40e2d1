use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Engine details decoded from a VIN
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSpecs {
    pub cylinders: String,
    pub displacement_l: String,
    pub configuration: String,
    pub fuel_type: String,
    pub horsepower: String,
}

/// The normalized vehicle record handed to the model after a VIN lookup.
///
/// Field order is the serialization order, so the model always sees the same layout.
/// Text fields default to the empty string and `year` is `None` whenever the upstream
/// decoder leaves them blank or unparsable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleSpecs {
    pub vin: String,
    pub year: Option<i32>,
    pub make: String,
    pub model: String,
    pub trim: String,
    pub series: String,
    pub body_class: String,
    pub vehicle_type: String,
    pub drive_type: String,
    pub transmission: String,
    pub engine: EngineSpecs,
    pub manufacturer: String,
    pub plant_country: String,
}

impl VehicleSpecs {
    /// Map one flat `DecodeVinValues` result entry onto the specs shape
    pub fn from_decode_result(vin: &str, raw: &Map<String, Value>) -> Self {
        let field = |key: &str| coerce_string(raw.get(key));

        Self {
            vin: vin.to_string(),
            year: parse_year(raw.get("ModelYear")),
            make: field("Make"),
            model: field("Model"),
            trim: field("Trim"),
            series: field("Series"),
            body_class: field("BodyClass"),
            vehicle_type: field("VehicleType"),
            drive_type: field("DriveType"),
            transmission: field("TransmissionStyle"),
            engine: EngineSpecs {
                cylinders: field("EngineCylinders"),
                displacement_l: field("DisplacementL"),
                configuration: field("EngineConfiguration"),
                fuel_type: field("FuelTypePrimary"),
                horsepower: field("EngineHP"),
            },
            manufacturer: field("Manufacturer"),
            plant_country: field("PlantCountry"),
        }
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Any JSON value as display text; null and missing become empty
pub(crate) fn coerce_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

fn parse_year(value: Option<&Value>) -> Option<i32> {
    match value? {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
