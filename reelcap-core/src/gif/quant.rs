//! Palette learning
//!
//! Kohonen neural-net quantizer: 256 neurons are pulled toward sampled
//! pixels with a decaying learning rate and neighbourhood radius, then
//! sorted on green so lookups can search outward from a green index.
//! Images with at most 256 distinct colors skip learning and keep those
//! colors exactly.

use std::collections::HashSet;
use tracing::debug;

/// Neurons in the network, and entries in a full palette
pub const NET_SIZE: usize = 256;

// Primes near 500 used to stride through the sample
const PRIME1: usize = 499;
const PRIME2: usize = 491;
const PRIME3: usize = 487;
const PRIME4: usize = 503;

/// Below this many bytes every pixel is sampled
const MIN_PICTURE_BYTES: usize = 3 * PRIME4;

const NET_BIAS_SHIFT: i32 = 4;
const N_CYCLES: usize = 100;

const INT_BIAS_SHIFT: i32 = 16;
const INT_BIAS: i32 = 1 << INT_BIAS_SHIFT;
const GAMMA_SHIFT: i32 = 10;
const BETA_SHIFT: i32 = 10;
const BETA: i32 = INT_BIAS >> BETA_SHIFT;
const BETA_GAMMA: i32 = INT_BIAS << (GAMMA_SHIFT - BETA_SHIFT);

const INIT_RAD: usize = NET_SIZE >> 3;
const RADIUS_BIAS_SHIFT: i32 = 6;
const RADIUS_BIAS: i32 = 1 << RADIUS_BIAS_SHIFT;
const INIT_RADIUS: i32 = INIT_RAD as i32 * RADIUS_BIAS;
const RADIUS_DEC: i32 = 30;

const ALPHA_BIAS_SHIFT: i32 = 10;
const INIT_ALPHA: i32 = 1 << ALPHA_BIAS_SHIFT;

const RAD_BIAS_SHIFT: i32 = 8;
const RAD_BIAS: i32 = 1 << RAD_BIAS_SHIFT;
const ALPHA_RAD_BIAS_SHIFT: i32 = ALPHA_BIAS_SHIFT + RAD_BIAS_SHIFT;
const ALPHA_RAD_BIAS: i32 = 1 << ALPHA_RAD_BIAS_SHIFT;

/// Learned color table with its lookup index.
///
/// Colors are BGR, sorted by green. Nothing mutates a palette after
/// construction; every frame of an animation maps against the same one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
    /// First position to search for a given green value
    green_index: [usize; 256],
}

impl Palette {
    /// Learn a palette from BGR pixel bytes.
    ///
    /// `sample_factor` is 1 (every pixel) to 30 (every 30th); higher is
    /// faster and coarser.
    pub fn learn(pixels: &[u8], sample_factor: u32) -> Self {
        if let Some(exact) = Self::exact(pixels) {
            debug!("Exact palette with {} colors", exact.len());
            return exact;
        }

        let mut net = NeuQuant::new(sample_factor.clamp(1, 30) as usize);
        net.learn(pixels);
        let colors = net.into_colors();
        debug!("Learned {}-color palette (sample factor {})", colors.len(), sample_factor);
        Self::from_sorted(colors)
    }

    /// Palette of exactly the distinct colors in `pixels`, if there are
    /// few enough of them
    pub fn exact(pixels: &[u8]) -> Option<Self> {
        let mut distinct = HashSet::new();
        for px in pixels.chunks_exact(3) {
            distinct.insert([px[0], px[1], px[2]]);
            if distinct.len() > NET_SIZE {
                return None;
            }
        }
        if distinct.is_empty() {
            return None;
        }

        let mut colors: Vec<[u8; 3]> = distinct.into_iter().collect();
        colors.sort_by_key(|c| (c[1], c[0], c[2]));
        Some(Self::from_sorted(colors))
    }

    /// Build the green index over colors already sorted by green
    fn from_sorted(colors: Vec<[u8; 3]>) -> Self {
        let mut green_index = [0usize; 256];
        let last = colors.len().saturating_sub(1);
        let mut previous = 0usize;
        let mut start = 0usize;

        for (i, color) in colors.iter().enumerate() {
            let green = color[1] as usize;
            if green != previous {
                green_index[previous] = (start + i) >> 1;
                for slot in &mut green_index[previous + 1..green] {
                    *slot = i;
                }
                previous = green;
                start = i;
            }
        }
        green_index[previous] = (start + last) >> 1;
        for slot in &mut green_index[previous + 1..] {
            *slot = last;
        }

        Self { colors, green_index }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// BGR color at `index`
    pub fn color(&self, index: u8) -> Option<[u8; 3]> {
        self.colors.get(index as usize).copied()
    }

    /// Nearest entry to a BGR color, by summed channel distance
    pub fn index_of(&self, b: u8, g: u8, r: u8) -> u8 {
        let (b, g, r) = (b as i32, g as i32, r as i32);
        let size = self.colors.len();
        let mut best_dist = i32::MAX;
        let mut best = 0usize;

        let mut up = self.green_index[g as usize].min(size.saturating_sub(1));
        let mut down = up as isize - 1;

        while up < size || down >= 0 {
            if up < size {
                let c = self.colors[up];
                let green_dist = c[1] as i32 - g;
                if green_dist >= best_dist {
                    up = size;
                } else {
                    let dist = green_dist.abs() + (c[0] as i32 - b).abs() + (c[2] as i32 - r).abs();
                    if dist < best_dist {
                        best_dist = dist;
                        best = up;
                    }
                    up += 1;
                }
            }
            if down >= 0 {
                let c = self.colors[down as usize];
                let green_dist = g - c[1] as i32;
                if green_dist >= best_dist {
                    down = -1;
                } else {
                    let dist = green_dist.abs() + (c[0] as i32 - b).abs() + (c[2] as i32 - r).abs();
                    if dist < best_dist {
                        best_dist = dist;
                        best = down as usize;
                    }
                    down -= 1;
                }
            }
        }

        best as u8
    }

    /// Color table as RGB triples, in index order
    pub fn rgb_table(&self) -> Vec<u8> {
        self.colors.iter().flat_map(|c| [c[2], c[1], c[0]]).collect()
    }
}

/// The self-organizing map itself. Neuron channels are held scaled up by
/// `NET_BIAS_SHIFT` during learning.
struct NeuQuant {
    network: Vec<[i32; 3]>,
    bias: Vec<i32>,
    freq: Vec<i32>,
    rad_power: [i32; INIT_RAD],
    sample_factor: usize,
}

impl NeuQuant {
    fn new(sample_factor: usize) -> Self {
        let network = (0..NET_SIZE)
            .map(|i| {
                let v = ((i as i32) << (NET_BIAS_SHIFT + 8)) / NET_SIZE as i32;
                [v, v, v]
            })
            .collect();
        Self {
            network,
            bias: vec![0; NET_SIZE],
            freq: vec![INT_BIAS / NET_SIZE as i32; NET_SIZE],
            rad_power: [0; INIT_RAD],
            sample_factor,
        }
    }

    fn learn(&mut self, pixels: &[u8]) {
        let len = pixels.len() - pixels.len() % 3;
        if len == 0 {
            return;
        }

        let sample_factor = if len < MIN_PICTURE_BYTES { 1 } else { self.sample_factor };
        let alpha_dec = 30 + (sample_factor as i32 - 1) / 3;
        let sample_pixels = len / (3 * sample_factor);
        let delta = (sample_pixels / N_CYCLES).max(1);

        let mut alpha = INIT_ALPHA;
        let mut radius = INIT_RADIUS;
        let mut rad = radius_of(radius);
        self.update_rad_power(rad, alpha);

        let step = if len < MIN_PICTURE_BYTES {
            3
        } else if len % PRIME1 != 0 {
            3 * PRIME1
        } else if len % PRIME2 != 0 {
            3 * PRIME2
        } else if len % PRIME3 != 0 {
            3 * PRIME3
        } else {
            3 * PRIME4
        };

        let mut pos = 0usize;
        for i in 1..=sample_pixels {
            let b = (pixels[pos] as i32) << NET_BIAS_SHIFT;
            let g = (pixels[pos + 1] as i32) << NET_BIAS_SHIFT;
            let r = (pixels[pos + 2] as i32) << NET_BIAS_SHIFT;

            let winner = self.contest(b, g, r);
            self.alter_single(alpha, winner, b, g, r);
            if rad != 0 {
                self.alter_neighbours(rad, winner, b, g, r);
            }

            pos += step;
            while pos >= len {
                pos -= len;
            }

            if i % delta == 0 {
                alpha -= alpha / alpha_dec;
                radius -= radius / RADIUS_DEC;
                rad = radius_of(radius);
                self.update_rad_power(rad, alpha);
            }
        }
    }

    fn update_rad_power(&mut self, rad: usize, alpha: i32) {
        let rad_sq = (rad * rad) as i32;
        for (i, power) in self.rad_power.iter_mut().take(rad).enumerate() {
            let i = i as i32;
            *power = alpha * (((rad_sq - i * i) * RAD_BIAS) / rad_sq);
        }
    }

    /// Winning neuron for a color, biased against neurons that win often
    fn contest(&mut self, b: i32, g: i32, r: i32) -> usize {
        let mut best_dist = i32::MAX;
        let mut best_bias_dist = i32::MAX;
        let mut best = 0;
        let mut best_bias = 0;

        for i in 0..NET_SIZE {
            let n = self.network[i];
            let dist = (n[0] - b).abs() + (n[1] - g).abs() + (n[2] - r).abs();
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
            let bias_dist = dist - (self.bias[i] >> (INT_BIAS_SHIFT - NET_BIAS_SHIFT));
            if bias_dist < best_bias_dist {
                best_bias_dist = bias_dist;
                best_bias = i;
            }
            let beta_freq = self.freq[i] >> BETA_SHIFT;
            self.freq[i] -= beta_freq;
            self.bias[i] += beta_freq << GAMMA_SHIFT;
        }

        self.freq[best] += BETA;
        self.bias[best] -= BETA_GAMMA;
        best_bias
    }

    fn alter_single(&mut self, alpha: i32, i: usize, b: i32, g: i32, r: i32) {
        let n = &mut self.network[i];
        n[0] -= (alpha * (n[0] - b)) / INIT_ALPHA;
        n[1] -= (alpha * (n[1] - g)) / INIT_ALPHA;
        n[2] -= (alpha * (n[2] - r)) / INIT_ALPHA;
    }

    fn alter_neighbours(&mut self, rad: usize, i: usize, b: i32, g: i32, r: i32) {
        let lo = i as isize - rad as isize;
        let lo = lo.max(-1);
        let hi = (i + rad).min(NET_SIZE);

        let mut up = i + 1;
        let mut down = i as isize - 1;
        let mut m = 1;

        while up < hi || down > lo {
            let a = self.rad_power[m];
            m += 1;
            if up < hi {
                let n = &mut self.network[up];
                n[0] -= (a * (n[0] - b)) / ALPHA_RAD_BIAS;
                n[1] -= (a * (n[1] - g)) / ALPHA_RAD_BIAS;
                n[2] -= (a * (n[2] - r)) / ALPHA_RAD_BIAS;
                up += 1;
            }
            if down > lo {
                let n = &mut self.network[down as usize];
                n[0] -= (a * (n[0] - b)) / ALPHA_RAD_BIAS;
                n[1] -= (a * (n[1] - g)) / ALPHA_RAD_BIAS;
                n[2] -= (a * (n[2] - r)) / ALPHA_RAD_BIAS;
                down -= 1;
            }
        }
    }

    /// Unbias to 8-bit BGR and sort by green
    fn into_colors(self) -> Vec<[u8; 3]> {
        let mut colors: Vec<[u8; 3]> = self
            .network
            .iter()
            .map(|n| {
                [
                    (n[0] >> NET_BIAS_SHIFT).clamp(0, 255) as u8,
                    (n[1] >> NET_BIAS_SHIFT).clamp(0, 255) as u8,
                    (n[2] >> NET_BIAS_SHIFT).clamp(0, 255) as u8,
                ]
            })
            .collect();
        colors.sort_by_key(|c| c[1]);
        colors
    }
}

fn radius_of(radius: i32) -> usize {
    let rad = radius >> RADIUS_BIAS_SHIFT;
    if rad <= 1 { 0 } else { rad as usize }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 255 / width) as u8, (y * 255 / height) as u8, ((x + y) % 256) as u8]);
            }
        }
        data
    }

    #[test]
    fn test_exact_palette_for_few_colors() {
        let mut pixels = Vec::new();
        for color in [[10u8, 20, 30], [200, 100, 50], [0, 0, 0]] {
            for _ in 0..100 {
                pixels.extend_from_slice(&color);
            }
        }

        let palette = Palette::learn(&pixels, 10);
        assert_eq!(palette.len(), 3);
        for color in [[10u8, 20, 30], [200, 100, 50], [0, 0, 0]] {
            let index = palette.index_of(color[0], color[1], color[2]);
            assert_eq!(palette.color(index), Some(color));
        }
    }

    #[test]
    fn test_learned_palette_is_full_and_sorted() {
        let pixels = gradient(128, 96);
        assert!(Palette::exact(&pixels).is_none());

        let palette = Palette::learn(&pixels, 10);
        assert_eq!(palette.len(), NET_SIZE);
        let greens: Vec<u8> = palette.colors.iter().map(|c| c[1]).collect();
        assert!(greens.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(palette.rgb_table().len(), NET_SIZE * 3);
    }

    #[test]
    fn test_lookup_is_nearest() {
        let pixels = gradient(128, 96);
        let palette = Palette::learn(&pixels, 5);

        for px in pixels.chunks_exact(3).step_by(97) {
            let found = palette.index_of(px[0], px[1], px[2]);
            let dist = |c: [u8; 3]| {
                (c[0] as i32 - px[0] as i32).abs()
                    + (c[1] as i32 - px[1] as i32).abs()
                    + (c[2] as i32 - px[2] as i32).abs()
            };
            let best = palette.colors.iter().map(|&c| dist(c)).min().unwrap();
            assert_eq!(dist(palette.colors[found as usize]), best);
        }
    }

    #[test]
    fn test_learned_palette_tracks_dominant_color() {
        let mut pixels = gradient(64, 64);
        for _ in 0..20_000 {
            pixels.extend_from_slice(&[0, 128, 255]);
        }
        let palette = Palette::learn(&pixels, 1);
        let index = palette.index_of(0, 128, 255);
        let c = palette.color(index).unwrap();
        let dist = c[0] as i32 + (c[1] as i32 - 128).abs() + (255 - c[2] as i32);
        assert!(dist <= 24, "nearest to dominant color was {:?}", c);
    }
}
