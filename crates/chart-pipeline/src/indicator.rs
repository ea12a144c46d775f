use std::collections::BTreeMap;

use serde_json::Value;

/// Incoming indicator specs arrive in three shapes: a bare array of names
/// (`["rsi", "macd"]`), an array of `{type, params}` objects, or a map of
/// type to params directly. All three normalise to the same canonical map.
pub fn normalize_indicators(raw: &Value) -> BTreeMap<String, Value> {
    let mut canonical = BTreeMap::new();

    match raw {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(name) => {
                        canonical.insert(name.to_ascii_lowercase(), Value::Object(Default::default()));
                    }
                    Value::Object(obj) => {
                        if let Some(Value::String(ty)) = obj.get("type") {
                            let params = obj.get("params").cloned().unwrap_or(Value::Object(Default::default()));
                            canonical.insert(ty.to_ascii_lowercase(), reconcile_synonyms(params));
                        }
                    }
                    _ => {}
                }
            }
        }
        Value::Object(obj) => {
            for (ty, params) in obj {
                canonical.insert(ty.to_ascii_lowercase(), reconcile_synonyms(params.clone()));
            }
        }
        _ => {}
    }

    split_macd(canonical)
}

fn reconcile_synonyms(params: Value) -> Value {
    let Value::Object(mut obj) = params else {
        return params;
    };
    if let Some(v) = obj.remove("window") {
        obj.entry("period".to_string()).or_insert(v);
    }
    if let Some(v) = obj.remove("fastPeriod") {
        obj.entry("fast".to_string()).or_insert(v);
    }
    if let Some(v) = obj.remove("slowPeriod") {
        obj.entry("slow".to_string()).or_insert(v);
    }
    if let Some(v) = obj.remove("signalPeriod") {
        obj.entry("signal".to_string()).or_insert(v);
    }
    Value::Object(obj)
}

/// MACD is always rendered as three series; a bare "macd" entry expands into
/// the three canonical keys the renderer expects.
fn split_macd(mut canonical: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    if let Some(params) = canonical.remove("macd") {
        canonical.insert("macd_line".to_string(), params.clone());
        canonical.insert("macd_signal".to_string(), params.clone());
        canonical.insert("macd_histogram".to_string(), params);
    }
    canonical
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_name_array_normalises_to_empty_params() {
        let raw = json!(["rsi", "RSI"]);
        let out = normalize_indicators(&raw);
        assert_eq!(out.len(), 1);
        assert!(out.contains_key("rsi"));
    }

    #[test]
    fn macd_splits_into_three_series() {
        let raw = json!([{"type": "macd", "params": {"fastPeriod": 12}}]);
        let out = normalize_indicators(&raw);
        assert!(out.contains_key("macd_line"));
        assert!(out.contains_key("macd_signal"));
        assert!(out.contains_key("macd_histogram"));
        assert_eq!(out["macd_line"]["fast"], json!(12));
    }

    #[test]
    fn window_synonym_reconciles_to_period() {
        let raw = json!({"sma": {"window": 20}});
        let out = normalize_indicators(&raw);
        assert_eq!(out["sma"]["period"], json!(20));
    }
}
