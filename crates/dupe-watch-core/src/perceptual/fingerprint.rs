use crate::error::Error;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageError};
use serde::Deserialize;
use std::f64::consts::PI;
use std::fmt;
use std::path::Path;

/// Side of the low-frequency block kept from the DCT (8x8 = 64 bits).
pub const HASH_SIZE: usize = 8;
/// Side of the grayscale thumbnail the DCT runs on.
const SAMPLE_SIZE: usize = HASH_SIZE * 4;

/// How a 64-bit image fingerprint is derived. Fingerprints from different
/// algorithms are not comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerceptualAlgorithm {
    /// DCT of a 32x32 thumbnail, low 8x8 block against its median.
    #[default]
    Phash,
    /// Horizontal gradient: each pixel of a 9x8 thumbnail against its
    /// right-hand neighbor.
    Dhash,
    /// 8x8 thumbnail against its mean brightness.
    Average,
}

impl PerceptualAlgorithm {
    pub fn fingerprint(self, img: &DynamicImage) -> Fingerprint {
        match self {
            PerceptualAlgorithm::Phash => fingerprint_image(img),
            PerceptualAlgorithm::Dhash => difference_hash(img),
            PerceptualAlgorithm::Average => average_hash(img),
        }
    }
}

impl fmt::Display for PerceptualAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PerceptualAlgorithm::Phash => "phash",
            PerceptualAlgorithm::Dhash => "dhash",
            PerceptualAlgorithm::Average => "average",
        };
        f.write_str(name)
    }
}

/// 64-bit image fingerprint compared by Hamming distance. For the default
/// DCT hash, bit `i` is set when low-frequency coefficient `i` (row-major
/// in the 8x8 block) is above the block median.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub const fn from_bits(bits: u64) -> Self {
        Fingerprint(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Hamming distance, 0..=64.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

fn open_image(path: &Path) -> Result<DynamicImage, Error> {
    image::open(path).map_err(|e| match e {
        ImageError::IoError(io) => Error::io(path, io),
        other => Error::ImageDecode {
            path: path.to_path_buf(),
            source: other,
        },
    })
}

pub fn fingerprint_file(path: &Path, algorithm: PerceptualAlgorithm) -> Result<Fingerprint, Error> {
    Ok(algorithm.fingerprint(&open_image(path)?))
}

/// Hamming distance between the fingerprints of two image files.
pub fn compare_images(
    a: &Path,
    b: &Path,
    algorithm: PerceptualAlgorithm,
) -> Result<u32, Error> {
    let first = fingerprint_file(a, algorithm)?;
    let second = fingerprint_file(b, algorithm)?;
    Ok(first.distance(&second))
}

fn thumbnail(img: &DynamicImage, width: usize, height: usize) -> GrayImage {
    img.grayscale()
        .resize_exact(width as u32, height as u32, FilterType::Lanczos3)
        .to_luma8()
}

fn difference_hash(img: &DynamicImage) -> Fingerprint {
    let sample = thumbnail(img, HASH_SIZE + 1, HASH_SIZE);
    let mut bits = 0u64;
    for y in 0..HASH_SIZE as u32 {
        for x in 0..HASH_SIZE as u32 {
            if sample.get_pixel(x, y)[0] < sample.get_pixel(x + 1, y)[0] {
                bits |= 1u64 << (y as usize * HASH_SIZE + x as usize);
            }
        }
    }
    Fingerprint(bits)
}

fn average_hash(img: &DynamicImage) -> Fingerprint {
    let sample = thumbnail(img, HASH_SIZE, HASH_SIZE);
    let values: Vec<f64> = sample.pixels().map(|p| f64::from(p[0])).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let bits = values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v > mean)
        .fold(0u64, |acc, (i, _)| acc | (1u64 << i));
    Fingerprint(bits)
}

pub fn fingerprint_image(img: &DynamicImage) -> Fingerprint {
    let sample = thumbnail(img, SAMPLE_SIZE, SAMPLE_SIZE);

    let pixels: Vec<f64> = sample.pixels().map(|p| f64::from(p[0])).collect();
    let coefficients = dct_2d(&pixels, SAMPLE_SIZE);

    let mut low = Vec::with_capacity(HASH_SIZE * HASH_SIZE);
    for y in 0..HASH_SIZE {
        for x in 0..HASH_SIZE {
            low.push(coefficients[y * SAMPLE_SIZE + x]);
        }
    }

    let median = median(&low);
    let bits = low
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > median)
        .fold(0u64, |acc, (i, _)| acc | (1u64 << i));

    Fingerprint(bits)
}

/// Separable 2-D DCT-II over an `n x n` row-major matrix.
fn dct_2d(input: &[f64], n: usize) -> Vec<f64> {
    let table: Vec<f64> = (0..n * n)
        .map(|i| {
            let (k, x) = (i / n, i % n);
            (PI / n as f64 * (x as f64 + 0.5) * k as f64).cos()
        })
        .collect();

    let mut rows = vec![0.0; n * n];
    for r in 0..n {
        for k in 0..n {
            rows[r * n + k] = (0..n).map(|x| input[r * n + x] * table[k * n + x]).sum();
        }
    }

    let mut out = vec![0.0; n * n];
    for c in 0..n {
        for k in 0..n {
            out[k * n + c] = (0..n).map(|y| rows[y * n + c] * table[k * n + y]).sum();
        }
    }
    out
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
