//! Scrub sweep statistics.

use std::time::Duration;

use contracts::CacheStats;
use observability::ScrubMetricsAggregator;

/// Statistics from a scrub sweep
#[derive(Debug, Clone, Default)]
pub struct ScrubStats {
    /// Reference frames visited
    pub seeks: u64,

    /// Frames that became ready for display
    pub frames_ready: u64,

    /// Frames whose decode failed or was superseded
    pub frames_failed: u64,

    /// Wall time of the sweep
    pub duration: Duration,

    /// Resolution / wait aggregator
    pub metrics: ScrubMetricsAggregator,

    /// Cache counters at the end of the sweep
    pub cache: CacheStats,
}

impl ScrubStats {
    /// Seeks per second
    pub fn seek_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.seeks as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                      Scrub Statistics                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Seeks: {} ({:.1}/s)", self.seeks, self.seek_rate());
        println!("   ├─ Frames ready: {}", self.frames_ready);
        println!("   └─ Frames failed: {}", self.frames_failed);

        print!("\n{}", self.metrics.summary(self.cache));
        println!();
    }
}
