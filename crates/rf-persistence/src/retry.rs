//! Reintento acotado para unidades de trabajo bloqueantes (queries Diesel,
//! IO de filesystem).

use log::warn;
use std::time::Duration;

use crate::error::PersistenceError;

pub const MAX_RETRIES: u32 = 3;

/// Repite `f` ante errores reintentables, hasta `MAX_RETRIES` veces.
///
/// Backoff lineal corto (15ms, 30ms, 45ms) con `warn!` por intento. Se usa
/// dentro de `spawn_blocking`, nunca en un hilo del runtime async.
pub fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if e.is_retryable() && attempts < MAX_RETRIES => {
                let delay_ms = 15 * u64::from(attempts + 1);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms",
                      attempts + 1,
                      e,
                      delay_ms);
                std::thread::sleep(Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_transient_then_succeeds() {
        let mut calls = 0;
        let r = with_retry(|| {
            calls += 1;
            if calls < 3 {
                Err(PersistenceError::Unavailable("flaky".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(r.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_ceiling_and_skips_permanent() {
        let mut calls = 0;
        let r: Result<(), _> = with_retry(|| {
            calls += 1;
            Err(PersistenceError::Unavailable("down".into()))
        });
        assert!(r.is_err());
        assert_eq!(calls, MAX_RETRIES + 1);

        let mut calls = 0;
        let r: Result<(), _> = with_retry(|| {
            calls += 1;
            Err(PersistenceError::Missing("k".into()))
        });
        assert!(r.is_err());
        assert_eq!(calls, 1);
    }
}
