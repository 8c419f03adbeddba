//! Backoff exponencial acotado para operaciones async contra los stores.

use log::{error, warn};
use std::future::Future;
use std::time::Duration;

use crate::error::{classify, ErrorClass, PipelineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Intentos totales (incluye el primero); mínimo 1.
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1),
               base,
               max: max.max(base) }
    }

    /// Espera antes del intento `attempt + 1` (attempt empieza en 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(200), Duration::from_secs(10))
    }
}

/// Ejecuta `op` reintentando mientras el error sea `Retryable` y quede
/// presupuesto. Devuelve el último error si se agota.
pub async fn retry_with_backoff<F, Fut, T>(policy: RetryPolicy, op_name: &str, mut op: F) -> Result<T, PipelineError>
    where F: FnMut() -> Fut,
          Fut: Future<Output = Result<T, PipelineError>>
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if classify(&e) == ErrorClass::Retryable && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!("{op_name} failed (attempt {attempt}/{}): {e}. Retrying in {delay:?}",
                      policy.max_attempts);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if classify(&e) == ErrorClass::Retryable {
                    error!("{op_name} failed after {attempt} attempts: {e}");
                }
                return Err(e);
            }
        }
    }
}
