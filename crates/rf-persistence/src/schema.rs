//! Esquema Diesel (escrito a mano). Reemplazable con `diesel print-schema`.

diesel::table! {
    artifact_blobs (key) {
        key -> Text,
        content -> Bytea,
        length -> BigInt,
        created_at -> Timestamptz,
    }
}
