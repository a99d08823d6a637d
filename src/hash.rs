//! Average-hash fingerprints.
//!
//! Both the reference photos and every candidate listing image go through
//! [`Hasher::fingerprint`], so the two sides are always comparable.

use std::{fmt, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use image::{imageops, DynamicImage};

use crate::{fetch::ImageFetch, images};

const GRID: u32 = 8;
pub const BITS: u32 = GRID * GRID;

/// 64-bit perceptual hash, sample 0 in the most significant bit.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Number of differing bits, 0..=64.
    pub fn hamming(self, other: Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Build from 64 grayscale samples: a bit is set when its sample is at or
    /// above the mean.
    pub fn from_samples(samples: &[u8]) -> Result<Self> {
        if samples.len() != BITS as usize {
            bail!("expected {BITS} samples, got {}", samples.len());
        }

        let sum: u32 = samples.iter().map(|&v| v as u32).sum();
        let mean = sum as f64 / BITS as f64;

        let mut bits = 0u64;
        for (i, &v) in samples.iter().enumerate() {
            if v as f64 >= mean {
                bits |= 1u64 << (BITS as usize - 1 - i);
            }
        }

        Ok(Self(bits))
    }

    /// Decode, flatten onto white, box-downsample to 8x8, grayscale, threshold.
    /// Blocking; call it off the async runtime.
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self> {
        let rgb = images::decode_flattened(bytes)?;
        let small = imageops::thumbnail(&rgb, GRID, GRID);
        let gray = DynamicImage::ImageRgb8(small).to_luma8();
        Self::from_samples(gray.as_raw())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:016x})", self.0)
    }
}

/// `1 - distance/64`, floored at 0.
pub fn similarity(distance: u32) -> f64 {
    (1.0 - distance as f64 / BITS as f64).max(0.0)
}

/// Smallest distance from `fp` to any fingerprint of the reference set.
pub fn min_distance(fp: Fingerprint, references: &[Fingerprint]) -> Option<u32> {
    references.iter().map(|r| fp.hamming(*r)).min()
}

/// Fetches image bytes and hashes them.
#[derive(Clone)]
pub struct Hasher {
    fetcher: Arc<dyn ImageFetch>,
    timeout: Duration,
}

impl Hasher {
    pub fn new(fetcher: Arc<dyn ImageFetch>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// `None` when the image can't be fetched within the timeout or can't be
    /// decoded. Never fails the caller.
    pub async fn fingerprint(&self, url: &str) -> Option<Fingerprint> {
        let bytes = self.fetcher.fetch(url, self.timeout).await?;

        let result = tokio::task::spawn_blocking(move || Fingerprint::from_image_bytes(&bytes)).await;

        match result {
            Ok(Ok(fp)) => Some(fp),
            Ok(Err(err)) => {
                log::debug!("{url}: {err:#}");
                None
            }
            Err(err) => {
                log::warn!("{url}: hashing task failed: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Left half black, right half white, at any size.
    pub fn split_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    /// Top half black, bottom half white.
    pub fn stacked_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |_, y| {
            if y < height / 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_hamming_properties() {
        let samples = [
            0u64,
            u64::MAX,
            0xF0F0_F0F0_F0F0_F0F0,
            0x0123_4567_89AB_CDEF,
            0x8000_0000_0000_0001,
        ];

        for &a in &samples {
            let a = Fingerprint(a);
            assert_eq!(a.hamming(a), 0);
            for &b in &samples {
                let b = Fingerprint(b);
                assert_eq!(a.hamming(b), b.hamming(a));
                assert!(a.hamming(b) <= 64);
            }
        }

        assert_eq!(Fingerprint(0).hamming(Fingerprint(u64::MAX)), 64);
        assert_eq!(similarity(Fingerprint(0).hamming(Fingerprint(u64::MAX))), 0.0);
        assert_eq!(similarity(Fingerprint(7).hamming(Fingerprint(7))), 1.0);
    }

    #[test]
    fn test_bits_packed_msb_first() {
        let mut samples = [0u8; 64];
        samples[0] = 255;

        // mean is ~4, only sample 0 clears it
        let fp = Fingerprint::from_samples(&samples).unwrap();
        assert_eq!(fp.0, 1u64 << 63);
    }

    #[test]
    fn test_flat_image_sets_every_bit() {
        // every sample equals the mean, and `>=` keeps them all
        let fp = Fingerprint::from_samples(&[90u8; 64]).unwrap();
        assert_eq!(fp.0, u64::MAX);
    }

    #[test]
    fn test_wrong_sample_count() {
        assert!(Fingerprint::from_samples(&[0u8; 63]).is_err());
    }

    #[test]
    fn test_split_image_hash() {
        let fp = Fingerprint::from_image_bytes(&split_png(64, 64)).unwrap();

        // each row reads 0000_1111
        assert_eq!(fp.0, 0x0F0F_0F0F_0F0F_0F0F);
    }

    #[test]
    fn test_hash_is_scale_invariant() {
        let small = Fingerprint::from_image_bytes(&split_png(32, 32)).unwrap();
        let large = Fingerprint::from_image_bytes(&split_png(400, 240)).unwrap();
        assert_eq!(small.hamming(large), 0);

        let stacked = Fingerprint::from_image_bytes(&stacked_png(64, 64)).unwrap();
        assert_eq!(stacked.0, 0x0000_0000_FFFF_FFFF);
        assert_eq!(small.hamming(stacked), 32);
    }

    #[test]
    fn test_min_distance() {
        let refs = [Fingerprint(0), Fingerprint(0b111)];
        assert_eq!(min_distance(Fingerprint(0b11), &refs), Some(1));
        assert_eq!(min_distance(Fingerprint(0b11), &[]), None);
    }

    #[test]
    fn test_undecodable_bytes() {
        assert!(Fingerprint::from_image_bytes(b"<html>nope</html>").is_err());
    }
}
