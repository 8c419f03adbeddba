//! JSON canónico: claves de objeto ordenadas y sin espacios.
//!
//! Es la forma sobre la que se calcula el fingerprint de una comparación; dos
//! resultados estructuralmente iguales producen el mismo texto aunque el
//! orden de inserción de sus mapas difiera.

use serde_json::Value;

pub fn to_canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => out.push_str(&value.to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(out, &map[key]);
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::to_canonical_json;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_output() {
        let a = json!({ "similarity": 0.5, "common": [{ "key": "b", "verdict": "Match" }] });
        let b = json!({ "common": [{ "verdict": "Match", "key": "b" }], "similarity": 0.5 });
        assert_eq!(to_canonical_json(&a), to_canonical_json(&b));
        assert_eq!(to_canonical_json(&a), r#"{"common":[{"key":"b","verdict":"Match"}],"similarity":0.5}"#);
    }

    #[test]
    fn strings_are_escaped_and_arrays_keep_order() {
        assert_eq!(to_canonical_json(&json!(["z\"q", null, 3, "ñ"])), r#"["z\"q",null,3,"ñ"]"#);
    }
}
