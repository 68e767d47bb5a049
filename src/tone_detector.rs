use crate::types::{TonePair, TonePeak};
use log::trace;

/// Extracts the two dominant, sufficiently separated tones from one spectrum.
///
/// # How it works
///
/// A single ascending scan over bins 1..N/2 (DC excluded) keeps a best and
/// second-best candidate by magnitude:
///
///   - A bin below `min_threshold_db` is never a candidate.
///   - A candidate louder than the current best demotes it to second place
///     unconditionally — the separation policy applies only when filling
///     the second slot directly.
///   - A candidate for the second slot must sit at least
///     `min_separation_hz` away from the current best, measured as
///     `Δbins * sample_rate / fft_size`.
///
/// A result is produced only when both slots filled. One strong tone with
/// no valid partner yields nothing — a deliberate product decision, not a
/// missing fallback.
///
/// # Last-known-good cache
///
/// Opt-in via [`with_cache`](Self::with_cache): on a miss, the previous
/// pair is returned for up to `max_age_ticks` consecutive misses, then
/// expires. Off by default so a silent room reads as silent.
pub struct DualToneDetector {
    sample_rate: f32,
    fft_size: usize,
    min_threshold_db: f32,
    min_separation_hz: f32,
    cache_max_age: Option<u32>,
    cache: Option<CachedPair>,
}

struct CachedPair {
    pair: TonePair,
    /// Consecutive misses served from this entry.
    age: u32,
}

impl DualToneDetector {
    pub fn new(
        sample_rate: u32,
        fft_size: usize,
        min_threshold_db: f32,
        min_separation_hz: f32,
    ) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            fft_size,
            min_threshold_db,
            min_separation_hz,
            cache_max_age: None,
            cache: None,
        }
    }

    /// Enable the last-known-good cache with the given staleness bound.
    pub fn with_cache(mut self, max_age_ticks: u32) -> Self {
        self.cache_max_age = Some(max_age_ticks);
        self
    }

    /// Scan one spectrum. Called once per tick.
    pub fn detect(&mut self, spectrum: &[f32]) -> Option<TonePair> {
        let hz_per_bin = self.sample_rate / self.fft_size as f32;

        let mut peak1: Option<TonePeak> = None;
        let mut peak2: Option<TonePeak> = None;

        for (bin, &magnitude_db) in spectrum.iter().enumerate().skip(1) {
            if magnitude_db < self.min_threshold_db {
                continue;
            }
            let candidate = TonePeak {
                bin,
                magnitude_db,
                frequency_hz: bin as f32 * hz_per_bin,
            };

            match peak1 {
                None => peak1 = Some(candidate),
                Some(best) => {
                    if candidate.magnitude_db > best.magnitude_db {
                        // New loudest bin: the old best drops to second place
                        // regardless of how close the two sit.
                        peak2 = peak1;
                        peak1 = Some(candidate);
                    } else {
                        let separation =
                            (candidate.bin as f32 - best.bin as f32).abs() * hz_per_bin;
                        let beats_second = match peak2 {
                            Some(second) => candidate.magnitude_db > second.magnitude_db,
                            None => true,
                        };
                        if beats_second && separation >= self.min_separation_hz {
                            peak2 = Some(candidate);
                        }
                    }
                }
            }
        }

        if let (Some(p1), Some(p2)) = (peak1, peak2) {
            let pair = TonePair {
                freq1_hz: p1.frequency_hz,
                freq2_hz: p2.frequency_hz,
            };
            trace!(
                "tones: {:.1} Hz ({:.1} dB) / {:.1} Hz ({:.1} dB)",
                p1.frequency_hz,
                p1.magnitude_db,
                p2.frequency_hz,
                p2.magnitude_db
            );
            if self.cache_max_age.is_some() {
                self.cache = Some(CachedPair { pair, age: 0 });
            }
            return Some(pair);
        }

        // Miss: serve the cached pair while it is still fresh.
        if let Some(max_age) = self.cache_max_age {
            if let Some(cached) = self.cache.as_mut() {
                cached.age += 1;
                if cached.age <= max_age {
                    return Some(cached.pair);
                }
                self.cache = None;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;
    const N: usize = 1024;
    const HZ_PER_BIN: f32 = SR as f32 / N as f32; // ≈ 43.07

    /// Spectrum at the noise floor with specific bins raised.
    fn spectrum_with(peaks: &[(usize, f32)]) -> Vec<f32> {
        let mut s = vec![-120.0f32; N / 2];
        for &(bin, db) in peaks {
            s[bin] = db;
        }
        s
    }

    fn detector() -> DualToneDetector {
        DualToneDetector::new(SR, N, 20.0, 50.0)
    }

    #[test]
    fn test_all_below_threshold_yields_nothing() {
        let mut det = detector();
        assert_eq!(det.detect(&spectrum_with(&[])), None);
    }

    #[test]
    fn test_single_peak_yields_nothing() {
        // One strong tone but no valid partner: explicitly no result.
        let mut det = detector();
        assert_eq!(det.detect(&spectrum_with(&[(100, 45.0)])), None);
    }

    #[test]
    fn test_two_separated_peaks_detected_strongest_first() {
        let mut det = detector();
        let pair = det
            .detect(&spectrum_with(&[(23, 40.0), (46, 48.0)]))
            .expect("two separated peaks");
        assert!((pair.freq1_hz - 46.0 * HZ_PER_BIN).abs() < 0.01);
        assert!((pair.freq2_hz - 23.0 * HZ_PER_BIN).abs() < 0.01);
    }

    #[test]
    fn test_weaker_neighbor_within_separation_rejected() {
        // Second-loudest bin is adjacent (≈43 Hz < 50 Hz): rejected, and a
        // weaker but separated third bin takes the second slot instead.
        let mut det = detector();
        let pair = det
            .detect(&spectrum_with(&[(100, 50.0), (101, 45.0), (200, 30.0)]))
            .expect("separated runner-up should fill the pair");
        assert!((pair.freq1_hz - 100.0 * HZ_PER_BIN).abs() < 0.01);
        assert!((pair.freq2_hz - 200.0 * HZ_PER_BIN).abs() < 0.01);
    }

    #[test]
    fn test_only_close_neighbor_yields_nothing() {
        // Two loud bins one bin apart and nothing else: no valid second peak.
        let mut det = detector();
        assert_eq!(
            det.detect(&spectrum_with(&[(100, 50.0), (101, 45.0)])),
            None
        );
    }

    #[test]
    fn test_demotion_is_unconditional() {
        // Ascending scan meets the weaker bin first; the louder neighbor
        // then demotes it into the second slot without a separation check.
        let mut det = detector();
        let pair = det
            .detect(&spectrum_with(&[(100, 45.0), (101, 50.0)]))
            .expect("demotion fills the second slot");
        assert!((pair.freq1_hz - 101.0 * HZ_PER_BIN).abs() < 0.01);
        assert!((pair.freq2_hz - 100.0 * HZ_PER_BIN).abs() < 0.01);
    }

    #[test]
    fn test_separation_boundary_exact() {
        // 50 Hz/bin grid so one bin is exactly the minimum separation.
        let mut det = DualToneDetector::new(51200, 1024, 20.0, 50.0);
        let pair = det
            .detect(&spectrum_with(&[(100, 50.0), (101, 40.0)]))
            .expect("exactly min separation is accepted");
        assert!((pair.freq2_hz - 101.0 * 50.0).abs() < 0.01);

        // Nudge the policy above one bin width: the same spectrum fails.
        let mut det = DualToneDetector::new(51200, 1024, 20.0, 50.0 + 0.01);
        assert_eq!(det.detect(&spectrum_with(&[(100, 50.0), (101, 40.0)])), None);
    }

    #[test]
    fn test_dc_bin_excluded() {
        let mut det = detector();
        // Bin 0 loud, one other valid bin: DC must not count as a tone.
        assert_eq!(det.detect(&spectrum_with(&[(0, 60.0), (100, 50.0)])), None);
    }

    #[test]
    fn test_bin_frequency_roundtrip() {
        for bin in 1..N / 2 {
            let freq = bin as f32 * HZ_PER_BIN;
            let recovered = (freq / HZ_PER_BIN).round() as usize;
            assert_eq!(recovered, bin);
        }
    }

    #[test]
    fn test_cache_serves_then_expires() {
        let mut det = detector().with_cache(2);
        let hit = det
            .detect(&spectrum_with(&[(50, 40.0), (150, 45.0)]))
            .unwrap();

        let empty = spectrum_with(&[]);
        assert_eq!(det.detect(&empty), Some(hit), "first miss served");
        assert_eq!(det.detect(&empty), Some(hit), "second miss served");
        assert_eq!(det.detect(&empty), None, "cache expired");
        assert_eq!(det.detect(&empty), None, "stays expired");
    }

    #[test]
    fn test_cache_disabled_by_default() {
        let mut det = detector();
        det.detect(&spectrum_with(&[(50, 40.0), (150, 45.0)]))
            .unwrap();
        assert_eq!(det.detect(&spectrum_with(&[])), None);
    }

    #[test]
    fn test_cache_age_resets_on_fresh_detection() {
        let mut det = detector().with_cache(1);
        let first = det
            .detect(&spectrum_with(&[(50, 40.0), (150, 45.0)]))
            .unwrap();
        let empty = spectrum_with(&[]);
        assert_eq!(det.detect(&empty), Some(first));

        // A new detection rearms the cache.
        let second = det
            .detect(&spectrum_with(&[(60, 42.0), (170, 47.0)]))
            .unwrap();
        assert_eq!(det.detect(&empty), Some(second));
        assert_eq!(det.detect(&empty), None);
    }
}
