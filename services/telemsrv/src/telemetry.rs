//! Telemetry payload construction
//!
//! The collector expects one flat JSON object per cycle: device identity,
//! capture timestamp, then every catalog register by name, in catalog
//! order, with `null` standing in for failed reads.

use serde_json::{Map, Number, Value};

use crate::acquisition::SampleSet;

/// Serialize a sample set into the collector's wire payload
pub fn build_payload(set: &SampleSet) -> Value {
    let mut payload = Map::with_capacity(set.samples.len() + 2);
    payload.insert("device_id".to_string(), Value::String(set.device_id.clone()));
    payload.insert(
        "timestamp".to_string(),
        Value::String(set.captured_at.clone()),
    );

    for sample in &set.samples {
        // Non-finite decodes have no JSON representation; ship them as null
        let value = sample
            .value
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number);
        payload.insert(sample.descriptor.name.to_string(), value);
    }

    Value::Object(payload)
}
