//! Operation timing

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Operations slower than this are reported at `warn`
pub const SLOW_OPERATION: Duration = Duration::from_secs(1);

/// Await `operation`, returning its output and how long it took
pub async fn measure<F, T>(name: &str, operation: F) -> (T, Duration)
where
    F: Future<Output = T>,
{
    let start = tokio::time::Instant::now();
    let output = operation.await;
    let elapsed = start.elapsed();

    if elapsed > SLOW_OPERATION {
        warn!("Slow operation: {} ({:.2}ms)", name, elapsed.as_secs_f64() * 1000.0);
    } else {
        debug!("{}: {:.2}ms", name, elapsed.as_secs_f64() * 1000.0);
    }

    (output, elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_measure_reports_duration() {
        let (value, elapsed) = measure("render product grid", async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            7
        })
        .await;

        assert_eq!(value, 7);
        assert!(elapsed >= Duration::from_millis(1500));
    }
}
