//! Valor tipado de un resultado de prueba.
//!
//! Un `ResultValue` es la unión cerrada de los tipos que un SDK cliente puede
//! enviar. Conserva el ancho y el signo declarados (`Int` vs `UInt`, `Float`
//! vs `Double`) para que el motor de comparación pueda distinguir un cambio de
//! tipo de un cambio de valor.
//!
//! Igualdad estructural (`PartialEq`):
//! - Objetos: mapas con claves únicas; el orden de inserción NO participa en
//!   la igualdad, pero se conserva para mostrar.
//! - Arreglos: el orden es significativo.
//! - Flotantes: igualdad numérica exacta (sin epsilon) o bits idénticos, de
//!   modo que un NaN decodificado es igual al NaN que lo originó.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Árbol recursivo de valores de resultado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResultValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    String(String),
    Object(IndexMap<String, ResultValue>),
    Array(Vec<ResultValue>),
    Blob(Vec<u8>),
}

/// `0.0 == -0.0`; dos NaN son iguales sólo si sus bits coinciden.
pub(crate) fn f64_identical(a: f64, b: f64) -> bool {
    a == b || a.to_bits() == b.to_bits()
}

fn f32_identical(a: f32, b: f32) -> bool {
    a == b || a.to_bits() == b.to_bits()
}

impl PartialEq for ResultValue {
    fn eq(&self, other: &Self) -> bool {
        use ResultValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            (Float(a), Float(b)) => f32_identical(*a, *b),
            (Double(a), Double(b)) => f64_identical(*a, *b),
            (String(a), String(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Blob(a), Blob(b)) => a == b,
            _ => false,
        }
    }
}

/// Discriminante del tipo declarado de un valor (sin contenido).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    UInt,
    Float,
    Double,
    String,
    Object,
    Array,
    Blob,
}

impl ResultValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ResultValue::Bool(_) => ValueKind::Bool,
            ResultValue::Int(_) => ValueKind::Int,
            ResultValue::UInt(_) => ValueKind::UInt,
            ResultValue::Float(_) => ValueKind::Float,
            ResultValue::Double(_) => ValueKind::Double,
            ResultValue::String(_) => ValueKind::String,
            ResultValue::Object(_) => ValueKind::Object,
            ResultValue::Array(_) => ValueKind::Array,
            ResultValue::Blob(_) => ValueKind::Blob,
        }
    }

    /// Construye un objeto a partir de pares clave/valor (útil en tests y fixtures).
    pub fn object<I, K>(entries: I) -> Self
        where I: IntoIterator<Item = (K, ResultValue)>,
              K: Into<String>
    {
        ResultValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Representación compacta para logs y salidas humanas.
    pub fn render(&self) -> String {
        match self {
            ResultValue::Bool(b) => b.to_string(),
            ResultValue::Int(i) => i.to_string(),
            ResultValue::UInt(u) => u.to_string(),
            ResultValue::Float(f) => f.to_string(),
            ResultValue::Double(d) => d.to_string(),
            ResultValue::String(s) => s.clone(),
            ResultValue::Object(map) => {
                let items: Vec<String> = map.iter().map(|(k, v)| format!("{k}: {}", v.render())).collect();
                format!("{{{}}}", items.join(", "))
            }
            ResultValue::Array(items) => {
                let items: Vec<String> = items.iter().map(ResultValue::render).collect();
                format!("[{}]", items.join(", "))
            }
            ResultValue::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
        }
    }
}

impl ValueKind {
    /// Etiqueta del formato binario (1..=9, ver `codec`).
    pub fn tag(self) -> u8 {
        match self {
            ValueKind::Bool => 1,
            ValueKind::Int => 2,
            ValueKind::UInt => 3,
            ValueKind::Float => 4,
            ValueKind::Double => 5,
            ValueKind::String => 6,
            ValueKind::Object => 7,
            ValueKind::Array => 8,
            ValueKind::Blob => 9,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => ValueKind::Bool,
            2 => ValueKind::Int,
            3 => ValueKind::UInt,
            4 => ValueKind::Float,
            5 => ValueKind::Double,
            6 => ValueKind::String,
            7 => ValueKind::Object,
            8 => ValueKind::Array,
            9 => ValueKind::Blob,
            _ => return None,
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::UInt => "uint",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Object => "object",
            ValueKind::Array => "array",
            ValueKind::Blob => "blob",
        };
        f.write_str(name)
    }
}

impl From<bool> for ResultValue {
    fn from(v: bool) -> Self { ResultValue::Bool(v) }
}
impl From<i64> for ResultValue {
    fn from(v: i64) -> Self { ResultValue::Int(v) }
}
impl From<u64> for ResultValue {
    fn from(v: u64) -> Self { ResultValue::UInt(v) }
}
impl From<f64> for ResultValue {
    fn from(v: f64) -> Self { ResultValue::Double(v) }
}
impl From<&str> for ResultValue {
    fn from(v: &str) -> Self { ResultValue::String(v.to_string()) }
}
impl From<String> for ResultValue {
    fn from(v: String) -> Self { ResultValue::String(v) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_equality_ignores_insertion_order() {
        let a = ResultValue::object([("x", ResultValue::Int(1)), ("y", ResultValue::Int(2))]);
        let b = ResultValue::object([("y", ResultValue::Int(2)), ("x", ResultValue::Int(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn array_equality_respects_order() {
        let a = ResultValue::Array(vec![1i64.into(), 2i64.into()]);
        let b = ResultValue::Array(vec![2i64.into(), 1i64.into()]);
        assert_ne!(a, b);
    }

    #[test]
    fn signed_and_unsigned_zero_are_distinct_values() {
        assert_ne!(ResultValue::Int(0), ResultValue::UInt(0));
        assert_eq!(ResultValue::Int(0).kind(), ValueKind::Int);
    }

    #[test]
    fn identical_nan_bits_are_equal() {
        assert_eq!(ResultValue::Double(f64::NAN), ResultValue::Double(f64::NAN));
        assert_eq!(ResultValue::Float(f32::NAN), ResultValue::Float(f32::NAN));
        assert_eq!(ResultValue::Double(0.0), ResultValue::Double(-0.0));
        assert_ne!(ResultValue::Double(f64::NAN), ResultValue::Double(-f64::NAN));
        assert_ne!(ResultValue::Double(1.0), ResultValue::Float(1.0));
    }

    #[test]
    fn tags_round_trip_and_reject_unknown() {
        for tag in 1..=9u8 {
            let kind = ValueKind::from_tag(tag).expect("known tag");
            assert_eq!(kind.tag(), tag);
        }
        assert!(ValueKind::from_tag(0).is_none());
        assert!(ValueKind::from_tag(10).is_none());
    }
}
