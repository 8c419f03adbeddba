//! Constantes del núcleo.
//!
//! Los valores del formato binario (`WIRE_*`) son parte del contrato con los
//! SDKs cliente. `ENGINE_VERSION` participa del resultado serializado de una
//! comparación: cambiarlo invalida los fingerprints calculados previamente.

/// Prefijo de todo mensaje binario.
pub const WIRE_MAGIC: [u8; 4] = *b"RFMS";

/// Versión del formato binario soportada por `codec::decode`.
pub const WIRE_VERSION: u8 = 1;

/// Profundidad máxima de objetos/arreglos anidados aceptada al decodificar.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Versión lógica del motor de comparación.
pub const ENGINE_VERSION: &str = "C1.0";
