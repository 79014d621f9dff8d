//! Cryptographically backed uniform integer sampling.
//!
//! Every random decision in the pipeline goes through [`SecureRandom`]. Secure
//! draws are comparatively expensive and one captcha needs hundreds of them, so
//! each draw pulls a whole block of bytes and the unused values are pooled per
//! byte-width tier:
//!
//! ```text
//! range < 2^8   -> 1-byte values, 1 KiB blocks
//! range < 2^16  -> 2-byte values, 4 KiB blocks
//! range < 2^32  -> 4-byte values, 8 KiB blocks
//! ```
//!
//! Values are consumed strictly in order and out-of-range values are thrown
//! away (rejection sampling), so every accepted value is a fresh uniform draw.
//! After [`MAX_SECURE_DRAWS`] blocks without a usable value the sampler falls
//! back to a non-cryptographic generator and raises the `degraded` flag.

use rand::rngs::{OsRng, SmallRng, StdRng};
use rand::{Rng, RngCore, SeedableRng, TryRngCore};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use svgcaptcha_common::CaptchaError;
use svgcaptcha_common::constants::MAX_SECURE_DRAWS;

/// A source of random bytes
pub trait ByteSource: Send {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), CaptchaError>;
}

/// The operating system CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSource;

impl ByteSource for OsSource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), CaptchaError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| CaptchaError::EntropySource(e.to_string()))
    }
}

/// Adapter for any `rand` generator (seeded sources in tests, custom CSPRNGs)
pub struct RngSource<R>(pub R);

impl<R: RngCore + Send> ByteSource for RngSource<R> {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), CaptchaError> {
        self.0.fill_bytes(buf);
        Ok(())
    }
}

/// Byte-width tiers used to interpret drawn blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Byte,
    Short,
    Word,
}

impl Tier {
    fn for_range(range: u64) -> Option<Self> {
        match range {
            0..=0xFF => Some(Self::Byte),
            0x100..=0xFFFF => Some(Self::Short),
            0x1_0000..=0xFFFF_FFFF => Some(Self::Word),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Byte => 0,
            Self::Short => 1,
            Self::Word => 2,
        }
    }

    fn width(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Short => 2,
            Self::Word => 4,
        }
    }

    fn block_len(self) -> usize {
        match self {
            Self::Byte => 1024,
            Self::Short => 4096,
            Self::Word => 8192,
        }
    }
}

/// Uniform sampler over a secure byte source.
///
/// One instance is one RNG context: the pools are private state, so
/// concurrent generations each own their own sampler.
pub struct SecureRandom {
    source: Box<dyn ByteSource>,
    pools: [VecDeque<u32>; 3],
    fallback: Option<SmallRng>,
    degraded: bool,
    secure_draws: u64,
    source_failures: u64,
    consecutive_failures: u32,
}

impl SecureRandom {
    /// Sampler backed by the operating system CSPRNG
    pub fn new() -> Self {
        Self::with_source(OsSource)
    }

    /// Sampler backed by an arbitrary byte source
    pub fn with_source(source: impl ByteSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            pools: Default::default(),
            fallback: None,
            degraded: false,
            secure_draws: 0,
            source_failures: 0,
            consecutive_failures: 0,
        }
    }

    /// Deterministic sampler for reproducible output
    pub fn seeded(seed: u64) -> Self {
        Self::with_source(RngSource(StdRng::seed_from_u64(seed)))
    }

    /// True once any value came from the non-cryptographic fallback
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Number of blocks pulled from the byte source so far
    pub fn secure_draws(&self) -> u64 {
        self.secure_draws
    }

    /// Number of times the byte source returned an error
    pub fn source_failures(&self) -> u64 {
        self.source_failures
    }

    /// Uniform integer in `[lo, hi]`, both inclusive.
    ///
    /// Fails with `InvalidRange` when `hi < lo`, when either bound is
    /// negative, or when the span does not fit in 32 bits.
    pub fn uniform(&mut self, lo: i64, hi: i64) -> Result<i64, CaptchaError> {
        if lo < 0 || hi < 0 || hi < lo {
            return Err(CaptchaError::InvalidRange { lo, hi });
        }
        let range = (hi - lo) as u64;
        let tier = Tier::for_range(range).ok_or(CaptchaError::InvalidRange { lo, hi })?;

        if let Some(v) = self.take_pooled(tier, range) {
            return Ok(lo + v as i64);
        }

        // A source that failed a full retry budget in a row is not asked again
        let draws = if self.consecutive_failures >= MAX_SECURE_DRAWS {
            0
        } else {
            MAX_SECURE_DRAWS
        };
        for _ in 0..draws {
            self.refill(tier);
            if let Some(v) = self.take_pooled(tier, range) {
                return Ok(lo + v as i64);
            }
        }

        if !self.degraded {
            tracing::warn!(
                lo,
                hi,
                draws = MAX_SECURE_DRAWS,
                source_failures = self.source_failures,
                "Secure draws exhausted, falling back to non-cryptographic randomness"
            );
        }
        self.degraded = true;
        Ok(self.fallback_rng().random_range(lo..=hi))
    }

    /// Fair coin flip
    pub fn coin(&mut self) -> Result<bool, CaptchaError> {
        Ok(self.uniform(0, 1)? == 1)
    }

    /// Returns true with probability `1/p`
    pub fn one_in(&mut self, p: u32) -> Result<bool, CaptchaError> {
        if p == 0 {
            return Err(CaptchaError::InvalidArgument(
                "trial probability 1/p needs p >= 1".to_string(),
            ));
        }
        Ok(self.uniform(1, i64::from(p))? == i64::from(p))
    }

    /// Uniform integer between two non-negative bounds given in either order.
    /// Fractional bounds are truncated.
    pub fn between(&mut self, a: f64, b: f64) -> Result<f64, CaptchaError> {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Ok(self.uniform(lo as i64, hi as i64)? as f64)
    }

    /// Pick `n` keys from `keys`.
    ///
    /// Without duplicates, chosen keys are removed from the candidate pool one
    /// at a time, so the result is a uniform selection without replacement in
    /// selection order.
    pub fn choose_keys<K: Clone>(
        &mut self,
        keys: &[K],
        n: usize,
        allow_duplicates: bool,
    ) -> Result<Vec<K>, CaptchaError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if keys.is_empty() || (!allow_duplicates && n > keys.len()) {
            return Err(CaptchaError::InvalidArgument(format!(
                "cannot choose {n} keys from {} candidates",
                keys.len()
            )));
        }

        let mut chosen = Vec::with_capacity(n);
        if allow_duplicates {
            let last = (keys.len() - 1) as i64;
            for _ in 0..n {
                let i = self.uniform(0, last)? as usize;
                chosen.push(keys[i].clone());
            }
        } else {
            let mut remaining: Vec<K> = keys.to_vec();
            for _ in 0..n {
                let i = self.uniform(0, (remaining.len() - 1) as i64)? as usize;
                chosen.push(remaining.remove(i));
            }
        }
        Ok(chosen)
    }

    /// A fast, non-cryptographic generator seeded from this sampler.
    ///
    /// Only for decisions that are visual noise rather than secrets
    /// (shape ordering). Seeding from the secure stream keeps seeded
    /// samplers fully reproducible.
    pub fn fast_rng(&mut self) -> Result<SmallRng, CaptchaError> {
        let hi = self.uniform(0, i64::from(u32::MAX))? as u64;
        let lo = self.uniform(0, i64::from(u32::MAX))? as u64;
        Ok(SmallRng::seed_from_u64((hi << 32) | lo))
    }

    fn take_pooled(&mut self, tier: Tier, range: u64) -> Option<u64> {
        // Masking to the next power of two keeps values uniform and
        // raises the acceptance rate for small ranges.
        let mask = if range == 0 {
            0
        } else {
            u64::MAX >> range.leading_zeros()
        };
        let pool = &mut self.pools[tier.index()];
        while let Some(raw) = pool.pop_front() {
            let v = u64::from(raw) & mask;
            if v <= range {
                return Some(v);
            }
        }
        None
    }

    fn refill(&mut self, tier: Tier) {
        let mut block = vec![0u8; tier.block_len()];
        self.secure_draws += 1;
        if let Err(e) = self.source.fill(&mut block) {
            self.source_failures += 1;
            self.consecutive_failures += 1;
            if self.source_failures == 1 {
                tracing::warn!(error = %e, "Secure byte source failed");
            }
            return;
        }
        self.consecutive_failures = 0;

        let pool = &mut self.pools[tier.index()];
        pool.extend(block.chunks_exact(tier.width()).map(|chunk| match tier {
            Tier::Byte => u32::from(chunk[0]),
            Tier::Short => u32::from(u16::from_le_bytes([chunk[0], chunk[1]])),
            Tier::Word => u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        }));
    }

    fn fallback_rng(&mut self) -> &mut SmallRng {
        self.fallback.get_or_insert_with(|| {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default();
            SmallRng::seed_from_u64(nanos)
        })
    }
}

impl Default for SecureRandom {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Emits only 0xFF, so any range narrower than a full tier never matches
    struct Saturated;

    impl ByteSource for Saturated {
        fn fill(&mut self, buf: &mut [u8]) -> Result<(), CaptchaError> {
            buf.fill(0xFF);
            Ok(())
        }
    }

    struct Broken;

    impl ByteSource for Broken {
        fn fill(&mut self, _buf: &mut [u8]) -> Result<(), CaptchaError> {
            Err(CaptchaError::EntropySource("device unplugged".to_string()))
        }
    }

    #[test]
    fn test_uniform_chi_square() {
        let mut rng = SecureRandom::new();
        let mut counts = [0u64; 10];
        let samples = 100_000;

        for _ in 0..samples {
            let v = rng.uniform(0, 9).unwrap();
            assert!((0..=9).contains(&v));
            counts[v as usize] += 1;
        }

        let expected = samples as f64 / 10.0;
        let chi_square: f64 = counts
            .iter()
            .map(|&c| {
                let d = c as f64 - expected;
                d * d / expected
            })
            .sum();

        // 9 degrees of freedom, p = 0.001
        assert!(chi_square < 27.88, "chi-square {chi_square} counts {counts:?}");
        assert!(!rng.is_degraded());
    }

    #[test]
    fn test_uniform_rejects_bad_ranges() {
        let mut rng = SecureRandom::seeded(1);
        assert!(matches!(
            rng.uniform(5, 3),
            Err(CaptchaError::InvalidRange { lo: 5, hi: 3 })
        ));
        assert!(rng.uniform(-1, 3).is_err());
        assert!(rng.uniform(0, 1 << 33).is_err());
    }

    #[test]
    fn test_uniform_degenerate_range() {
        let mut rng = SecureRandom::seeded(2);
        for _ in 0..100 {
            assert_eq!(rng.uniform(7, 7).unwrap(), 7);
        }
    }

    #[test]
    fn test_wide_tiers_stay_in_range() {
        let mut rng = SecureRandom::seeded(3);
        for _ in 0..1_000 {
            let v = rng.uniform(1_000, 60_000).unwrap();
            assert!((1_000..=60_000).contains(&v));
            let w = rng.uniform(0, 3_000_000_000).unwrap();
            assert!((0..=3_000_000_000).contains(&w));
        }
    }

    #[test]
    fn test_pool_amortizes_draws() {
        let mut rng = SecureRandom::seeded(4);
        for _ in 0..1_000 {
            rng.uniform(0, 200).unwrap();
        }
        // 1 KiB blocks yield roughly 800 accepted values each
        assert!(rng.secure_draws() <= 4, "draws: {}", rng.secure_draws());
    }

    #[test]
    fn test_fallback_sets_degraded_flag() {
        let mut rng = SecureRandom::with_source(Saturated);
        let v = rng.uniform(0, 9).unwrap();
        assert!((0..=9).contains(&v));
        assert!(rng.is_degraded());
        assert_eq!(rng.secure_draws(), u64::from(MAX_SECURE_DRAWS));
    }

    #[test]
    fn test_broken_source_degrades_instead_of_failing() {
        let mut rng = SecureRandom::with_source(Broken);
        let v = rng.uniform(10, 20).unwrap();
        assert!((10..=20).contains(&v));
        assert!(rng.is_degraded());
    }

    #[test]
    fn test_broken_source_is_not_retried_forever() {
        let mut rng = SecureRandom::with_source(Broken);
        for _ in 0..1_000 {
            let v = rng.uniform(0, 9).unwrap();
            assert!((0..=9).contains(&v));
        }
        // one retry budget, then straight to the fallback
        assert_eq!(rng.source_failures(), u64::from(MAX_SECURE_DRAWS));
        assert_eq!(rng.secure_draws(), u64::from(MAX_SECURE_DRAWS));
        assert!(rng.is_degraded());
    }

    #[test]
    fn test_source_recovery_resets_failure_streak() {
        /// Fails a fixed number of times, then behaves
        struct Flaky(u32);

        impl ByteSource for Flaky {
            fn fill(&mut self, buf: &mut [u8]) -> Result<(), CaptchaError> {
                if self.0 > 0 {
                    self.0 -= 1;
                    return Err(CaptchaError::EntropySource("busy".to_string()));
                }
                buf.fill(0x03);
                Ok(())
            }
        }

        let mut rng = SecureRandom::with_source(Flaky(3));
        assert_eq!(rng.uniform(0, 9).unwrap(), 3);
        assert_eq!(rng.source_failures(), 3);
        assert_eq!(rng.secure_draws(), 4);
        assert!(!rng.is_degraded());
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = SecureRandom::seeded(42);
        let mut b = SecureRandom::seeded(42);
        let xs: Vec<i64> = (0..50).map(|_| a.uniform(0, 1000).unwrap()).collect();
        let ys: Vec<i64> = (0..50).map(|_| b.uniform(0, 1000).unwrap()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_choose_keys_without_duplicates() {
        let mut rng = SecureRandom::seeded(5);
        let keys: Vec<char> = "abcdefgh".chars().collect();

        for _ in 0..100 {
            let chosen = rng.choose_keys(&keys, 5, false).unwrap();
            assert_eq!(chosen.len(), 5);
            let mut dedup = chosen.clone();
            dedup.sort_unstable();
            dedup.dedup();
            assert_eq!(dedup.len(), 5);
            assert!(chosen.iter().all(|c| keys.contains(c)));
        }

        let all = rng.choose_keys(&keys, keys.len(), false).unwrap();
        assert_eq!(all.len(), keys.len());
    }

    #[test]
    fn test_choose_keys_limits() {
        let mut rng = SecureRandom::seeded(6);
        let keys = [1, 2, 3];
        assert!(matches!(
            rng.choose_keys(&keys, 4, false),
            Err(CaptchaError::InvalidArgument(_))
        ));
        assert_eq!(rng.choose_keys(&keys, 10, true).unwrap().len(), 10);
        assert!(rng.choose_keys::<u8>(&[], 1, true).is_err());
        assert!(rng.choose_keys(&keys, 0, false).unwrap().is_empty());
    }

    #[test]
    fn test_one_in() {
        let mut rng = SecureRandom::seeded(7);
        assert!(rng.one_in(1).unwrap());
        assert!(rng.one_in(0).is_err());

        let hits = (0..10_000).filter(|_| rng.one_in(4).unwrap()).count();
        assert!((2_000..3_000).contains(&hits), "hits: {hits}");
    }

    #[test]
    fn test_between_accepts_either_order() {
        let mut rng = SecureRandom::seeded(8);
        for _ in 0..100 {
            let v = rng.between(30.7, 10.2).unwrap();
            assert!((10.0..=30.0).contains(&v));
        }
    }
}
