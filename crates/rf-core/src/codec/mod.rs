//! Codec binario de mensajes de resultados.
//!
//! Formato (little-endian, longitudes con prefijo `u32`):
//!
//! ```text
//! magic "RFMS" | version u8
//! metadata : team | suite | batch | element | built_at (str) | submitted_at i64 (ms)
//! results  : u32 n, (key str, value)*
//! metrics  : u32 n, (name str, i64)*
//! artifacts: u32 n, (key str, bytes)*
//! value    : tag u8 + payload (1 Bool .. 9 Blob, ver `ValueKind::tag`)
//! ```
//!
//! `decode` es total: cualquier buffer mal formado produce un `DecodeError`
//! tipado y nunca un valor parcial. `encode` existe para fixtures y para la
//! CLI; el camino productivo sólo decodifica.

mod error;
mod reader;
mod writer;

pub use error::{DecodeError, EncodeError};

use chrono::{TimeZone, Utc};
use indexmap::IndexMap;

use crate::constants::{MAX_NESTING_DEPTH, WIRE_MAGIC, WIRE_VERSION};
use crate::message::{DecodedMessage, EmbeddedArtifact, MessageMetadata};
use crate::value::{ResultValue, ValueKind};
use reader::Reader;
use writer::Writer;

pub fn decode(bytes: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let mut r = Reader::new(bytes);
    if r.remaining() < WIRE_MAGIC.len() || r.take(WIRE_MAGIC.len())? != &WIRE_MAGIC[..] {
        return Err(DecodeError::BadMagic);
    }
    let version = r.u8()?;
    if version != WIRE_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let metadata = decode_metadata(&mut r)?;

    let (n, cap) = r.count()?;
    let mut results = IndexMap::with_capacity(cap);
    for _ in 0..n {
        let key = r.string()?;
        let value = decode_value(&mut r, 1)?;
        insert_unique(&mut results, key, value)?;
    }

    let (n, cap) = r.count()?;
    let mut metrics = IndexMap::with_capacity(cap);
    for _ in 0..n {
        let name = r.string()?;
        let duration = r.i64()?;
        insert_unique(&mut metrics, name, duration)?;
    }

    let (n, cap) = r.count()?;
    let mut artifacts: Vec<EmbeddedArtifact> = Vec::with_capacity(cap);
    for _ in 0..n {
        let key = r.string()?;
        let content = r.bytes()?.to_vec();
        if artifacts.iter().any(|a| a.key == key) {
            return Err(DecodeError::DuplicateKey(key));
        }
        artifacts.push(EmbeddedArtifact { key, content });
    }

    if r.remaining() != 0 {
        return Err(DecodeError::TrailingBytes(r.remaining()));
    }

    Ok(DecodedMessage { metadata,
                        results,
                        metrics,
                        artifacts })
}

fn decode_metadata(r: &mut Reader<'_>) -> Result<MessageMetadata, DecodeError> {
    let team = r.string()?;
    let suite = r.string()?;
    let batch = r.string()?;
    let element = r.string()?;
    let built_at = r.string()?;
    let millis = r.i64()?;
    let submitted_at = Utc.timestamp_millis_opt(millis)
                          .single()
                          .ok_or(DecodeError::InvalidTimestamp(millis))?;
    Ok(MessageMetadata { team,
                         suite,
                         batch,
                         element,
                         built_at,
                         submitted_at })
}

fn insert_unique<V>(map: &mut IndexMap<String, V>, key: String, value: V) -> Result<(), DecodeError> {
    if map.contains_key(&key) {
        return Err(DecodeError::DuplicateKey(key));
    }
    map.insert(key, value);
    Ok(())
}

fn decode_value(r: &mut Reader<'_>, depth: usize) -> Result<ResultValue, DecodeError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(DecodeError::TooDeep(MAX_NESTING_DEPTH));
    }
    let offset = r.offset();
    let tag = r.u8()?;
    let kind = ValueKind::from_tag(tag).ok_or(DecodeError::UnknownTypeTag { tag, offset })?;
    let value = match kind {
        ValueKind::Bool => match r.u8()? {
            0 => ResultValue::Bool(false),
            1 => ResultValue::Bool(true),
            other => return Err(DecodeError::InvalidBool(other)),
        },
        ValueKind::Int => ResultValue::Int(r.i64()?),
        ValueKind::UInt => ResultValue::UInt(r.u64()?),
        ValueKind::Float => ResultValue::Float(r.f32()?),
        ValueKind::Double => ResultValue::Double(r.f64()?),
        ValueKind::String => ResultValue::String(r.string()?),
        ValueKind::Object => {
            let (n, cap) = r.count()?;
            let mut map = IndexMap::with_capacity(cap);
            for _ in 0..n {
                let key = r.string()?;
                let child = decode_value(r, depth + 1)?;
                insert_unique(&mut map, key, child)?;
            }
            ResultValue::Object(map)
        }
        ValueKind::Array => {
            let (n, cap) = r.count()?;
            let mut items = Vec::with_capacity(cap);
            for _ in 0..n {
                items.push(decode_value(r, depth + 1)?);
            }
            ResultValue::Array(items)
        }
        ValueKind::Blob => ResultValue::Blob(r.bytes()?.to_vec()),
    };
    Ok(value)
}

pub fn encode(message: &DecodedMessage) -> Result<Vec<u8>, EncodeError> {
    let mut w = Writer::default();
    w.raw(&WIRE_MAGIC);
    w.u8(WIRE_VERSION);

    let m = &message.metadata;
    w.string("team", &m.team)?;
    w.string("suite", &m.suite)?;
    w.string("batch", &m.batch)?;
    w.string("element", &m.element)?;
    w.string("built_at", &m.built_at)?;
    w.i64(m.submitted_at.timestamp_millis());

    w.count("results", message.results.len())?;
    for (key, value) in &message.results {
        w.string("result key", key)?;
        encode_value(&mut w, value)?;
    }

    w.count("metrics", message.metrics.len())?;
    for (name, duration) in &message.metrics {
        w.string("metric name", name)?;
        w.i64(*duration);
    }

    w.count("artifacts", message.artifacts.len())?;
    for artifact in &message.artifacts {
        w.string("artifact key", &artifact.key)?;
        w.bytes("artifact content", &artifact.content)?;
    }
    Ok(w.into_inner())
}

fn encode_value(w: &mut Writer, value: &ResultValue) -> Result<(), EncodeError> {
    w.u8(value.kind().tag());
    match value {
        ResultValue::Bool(b) => w.u8(u8::from(*b)),
        ResultValue::Int(i) => w.i64(*i),
        ResultValue::UInt(u) => w.u64(*u),
        ResultValue::Float(f) => w.f32(*f),
        ResultValue::Double(d) => w.f64(*d),
        ResultValue::String(s) => w.string("string value", s)?,
        ResultValue::Object(map) => {
            w.count("object", map.len())?;
            for (key, child) in map {
                w.string("object key", key)?;
                encode_value(w, child)?;
            }
        }
        ResultValue::Array(items) => {
            w.count("array", items.len())?;
            for child in items {
                encode_value(w, child)?;
            }
        }
        ResultValue::Blob(bytes) => w.bytes("blob value", bytes)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DecodedMessage {
        let meta = MessageMetadata { team: "acme".into(),
                                     suite: "students".into(),
                                     batch: "v2.0".into(),
                                     element: "alice".into(),
                                     built_at: "v2.0".into(),
                                     submitted_at: Utc.timestamp_millis_opt(1_700_000_123_456).unwrap() };
        DecodedMessage::new(meta).with_result("flag", true)
                                 .with_result("count", ResultValue::UInt(7))
                                 .with_result("ratio", ResultValue::Float(0.5))
                                 .with_result("nested",
                                              ResultValue::object([("xs", ResultValue::Array(vec![1i64.into(), (-2i64).into()])),
                                                                   ("raw", ResultValue::Blob(vec![0, 255]))]))
                                 .with_metric("run", 120)
                                 .with_artifact("out.png", vec![1, 2, 3])
    }

    #[test]
    fn encode_then_decode_returns_same_message() {
        let m = sample();
        let bytes = encode(&m).unwrap();
        assert_eq!(decode(&bytes).unwrap(), m);
    }

    #[test]
    fn nan_values_survive_encode_then_decode() {
        let m = DecodedMessage::new(sample().metadata).with_result("d", ResultValue::Double(f64::NAN))
                                                      .with_result("f", ResultValue::Float(f32::NAN))
                                                      .with_result("o", ResultValue::object([("n", ResultValue::Double(f64::NAN))]));
        let decoded = decode(&encode(&m).unwrap()).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn rejects_wrong_magic_and_version() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[0] = b'X';
        assert_eq!(decode(&bytes), Err(DecodeError::BadMagic));

        let mut bytes = encode(&sample()).unwrap();
        bytes[4] = 9;
        assert_eq!(decode(&bytes), Err(DecodeError::UnsupportedVersion(9)));
        assert_eq!(decode(b"RF"), Err(DecodeError::BadMagic));
    }

    #[test]
    fn rejects_every_truncation() {
        let bytes = encode(&sample()).unwrap();
        for cut in 5..bytes.len() {
            let err = decode(&bytes[..cut]).expect_err("truncated buffer must fail");
            assert!(matches!(err, DecodeError::Truncated { .. }), "cut={cut} err={err:?}");
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode(&sample()).unwrap();
        bytes.push(0);
        assert_eq!(decode(&bytes), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn rejects_unknown_tag() {
        let meta = sample().metadata;
        let m = DecodedMessage::new(meta).with_result("k", true);
        let mut bytes = encode(&m).unwrap();
        // cola: tag | bool | contador metrics | contador artifacts
        let tag_pos = bytes.len() - 8 - 2;
        assert_eq!(bytes[tag_pos], ValueKind::Bool.tag());
        bytes[tag_pos] = 42;
        assert!(matches!(decode(&bytes), Err(DecodeError::UnknownTypeTag { tag: 42, .. })));
        bytes[tag_pos] = 0;
        assert!(matches!(decode(&bytes), Err(DecodeError::UnknownTypeTag { tag: 0, .. })));
    }

    #[test]
    fn rejects_excessive_nesting() {
        let mut v = ResultValue::Int(1);
        for _ in 0..(MAX_NESTING_DEPTH + 1) {
            v = ResultValue::Array(vec![v]);
        }
        let m = DecodedMessage::new(sample().metadata).with_result("deep", v);
        let bytes = encode(&m).unwrap();
        assert_eq!(decode(&bytes), Err(DecodeError::TooDeep(MAX_NESTING_DEPTH)));
    }
}
