//! Paced consumer that drains the ring buffer like a device callback

use crate::audio::{AudioFormat, Consumer};
use crate::error::{AvSyncError, Result};
use crate::sync::RealDuration;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

/// Destination of drained audio periods
pub trait AudioSink: Send + 'static {
    /// Accept one period of interleaved samples
    ///
    /// An error stops the output; the renderer sees it as a disconnect.
    fn write(&mut self, data: &[u8]) -> Result<()>;
}

impl<F> AudioSink for F
where
    F: FnMut(&[u8]) -> Result<()> + Send + 'static,
{
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self(data)
    }
}

/// Counters shared with the output thread
#[derive(Debug, Default)]
struct OutputStats {
    bytes_played: AtomicU64,
    underruns: AtomicU64,
}

/// Output thread pulling one period at a time from a ring buffer
///
/// Missing data is replaced by silence. A partially filled period counts as
/// an underrun; an empty one means the output is idle and is not counted.
pub struct AudioOutput {
    format: AudioFormat,
    period: Duration,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<OutputStats>,
    handle: Option<JoinHandle<()>>,
}

impl AudioOutput {
    /// Start draining `consumer` into `sink` every `period`
    pub fn start<S: AudioSink>(
        format: AudioFormat,
        consumer: Consumer<u8>,
        sink: S,
        period: Duration,
    ) -> Result<Self> {
        if !format.is_valid() || period.is_zero() {
            return Err(AvSyncError::InvalidConfig(format!(
                "cannot start output with format {} and period {:?}",
                format, period
            )));
        }

        let period_bytes = format.buffer_size_for_ms(period.as_millis().max(1) as u32);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(OutputStats::default());

        let thread_stop = Arc::clone(&stop_flag);
        let thread_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("avsync-audio-output".to_string())
            .spawn(move || {
                output_thread(
                    format,
                    consumer,
                    sink,
                    period,
                    period_bytes,
                    thread_stop,
                    thread_stats,
                );
            })?;

        info!(
            "Audio output started: {}, {} bytes every {:?}",
            format, period_bytes, period
        );

        Ok(Self {
            format,
            period,
            stop_flag,
            stats,
            handle: Some(handle),
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Delay between writing a byte and hearing it when the buffer is primed
    pub fn latency(&self) -> RealDuration {
        RealDuration::from_std(self.period)
    }

    pub fn bytes_played(&self) -> u64 {
        self.stats.bytes_played.load(Ordering::Relaxed)
    }

    pub fn underruns(&self) -> u64 {
        self.stats.underruns.load(Ordering::Relaxed)
    }

    /// Whether the output thread is still draining
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the output thread and release the consumer
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            info!(
                "Audio output stopped after {} bytes ({} underruns)",
                self.bytes_played(),
                self.underruns()
            );
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn output_thread<S: AudioSink>(
    format: AudioFormat,
    mut consumer: Consumer<u8>,
    mut sink: S,
    period: Duration,
    period_bytes: usize,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<OutputStats>,
) {
    debug!("Output thread started");

    let silence = format.sample_format.silence_byte();
    let mut block = vec![silence; period_bytes];
    let mut next_deadline = Instant::now();

    while !stop_flag.load(Ordering::Relaxed) {
        let mut filled = 0;
        while filled < period_bytes {
            let region = consumer.acquire_read_region(period_bytes - filled);
            if region.is_empty() {
                break;
            }
            let n = region.len();
            block[filled..filled + n].copy_from_slice(region);
            consumer.release_read_region(n);
            filled += n;
        }

        if filled < period_bytes {
            block[filled..].fill(silence);
            if filled > 0 {
                stats.underruns.fetch_add(1, Ordering::Relaxed);
                trace!("Output underrun: {} of {} bytes", filled, period_bytes);
            }
        }

        if let Err(e) = sink.write(&block) {
            error!("Audio sink failed: {}", e);
            break;
        }
        stats
            .bytes_played
            .fetch_add(filled as u64, Ordering::Relaxed);

        next_deadline += period;
        let now = Instant::now();
        if next_deadline > now {
            thread::sleep(next_deadline - now);
        } else {
            // fell behind; do not try to catch up with a burst
            next_deadline = now;
        }
    }

    debug!("Output thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{RingBuffer, SampleFormat};
    use parking_lot::Mutex;

    fn format() -> AudioFormat {
        AudioFormat::new(8_000, 1, SampleFormat::UInt8)
    }

    #[test]
    fn test_output_drains_buffer_into_sink() {
        let (mut tx, rx) = RingBuffer::<u8>::new(1_024).split();
        tx.write(&[1u8; 200]);

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink_received = Arc::clone(&received);
        let mut output = AudioOutput::start(
            format(),
            rx,
            move |data: &[u8]| -> Result<()> {
                sink_received.lock().extend_from_slice(data);
                Ok(())
            },
            Duration::from_millis(5),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        output.stop();

        assert_eq!(output.bytes_played(), 200);
        assert_eq!(output.underruns(), 0);
        assert_eq!(tx.used(), 0);

        let received = received.lock();
        assert!(received.len() > 200);
        assert!(received[..200].iter().all(|b| *b == 1));
        assert!(received[200..].iter().all(|b| *b == 0x80));
    }

    #[test]
    fn test_partial_period_counts_one_underrun() {
        // 40 bytes per 5 ms period: one full period, one partial, then idle
        let (mut tx, rx) = RingBuffer::<u8>::new(1_024).split();
        tx.write(&[1u8; 50]);

        let sink = |_: &[u8]| -> Result<()> { Ok(()) };
        let mut output =
            AudioOutput::start(format(), rx, sink, Duration::from_millis(5)).unwrap();

        thread::sleep(Duration::from_millis(60));
        output.stop();

        assert_eq!(output.bytes_played(), 50);
        assert_eq!(output.underruns(), 1);
    }

    #[test]
    fn test_sink_error_releases_consumer() {
        let (tx, rx) = RingBuffer::<u8>::new(64).split();
        let mut output = AudioOutput::start(
            format(),
            rx,
            |_: &[u8]| -> Result<()> { Err(AvSyncError::device_error("test", "unplugged")) },
            Duration::from_millis(1),
        )
        .unwrap();

        for _ in 0..100 {
            if !output.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        assert!(!output.is_running());
        output.stop();
        assert!(tx.is_abandoned());
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let (_tx, rx) = RingBuffer::<u8>::new(8).split();
        let sink = |_: &[u8]| -> Result<()> { Ok(()) };
        let result = AudioOutput::start(format(), rx, sink, Duration::ZERO);
        assert!(matches!(result, Err(AvSyncError::InvalidConfig(_))));
    }
}
