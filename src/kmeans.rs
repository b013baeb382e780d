//! Provides the implementation for batched k-means over a pixel population

use crate::color::{from_vector, squared_distance_vec, to_vector};
use crate::error::ReduceError;
use crate::PixelBuffer;
use log::debug;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Iteration stops once the centroid movement norm falls below this
const MOVEMENT_EPSILON: f32 = 1e-5;

/// How the initial centroid set is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitStrategy {
	/// Mean-seeded farthest-point spread: deterministic, insensitive to bad
	/// random seeds, slower for large cluster counts
	#[default]
	FarthestPoint,
	/// K distinct random pixels: faster, lower quality for large cluster counts
	UniformRandom,
}

/// Parameters for the k-means reduction.
///
/// See the crate documentation for an explanation of each field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KmeansParams {
	/// Target cluster count, `1..=pixel count`
	pub k: u32,
	/// Upper bound on refinement iterations
	pub max_iter: u32,
	/// Number of pixels assigned per batch, bounding peak working memory
	pub batch_size: usize,
	/// Initial centroid selection strategy
	pub init: InitStrategy,
	/// Seed for the random source used by initialization and reseeding
	pub seed: u64,
}

impl Default for KmeansParams {
	fn default() -> Self {
		Self {
			k: 256,
			max_iter: 10,
			batch_size: 100_000,
			init: InitStrategy::FarthestPoint,
			seed: 0,
		}
	}
}

/// Result from running k-means
#[derive(Debug, Clone)]
pub struct KmeansResult {
	/// Final centroid colors as 0..=255-scale RGBA vectors
	pub centroids: Vec<[f32; 4]>,
	/// Cluster index for each pixel, in pixel order
	pub assignments: Vec<u32>,
	/// Number of elapsed iterations
	pub iterations: u32,
}

impl KmeansResult {
	/// The centroid colors rounded to packed integer colors.
	#[must_use]
	pub fn palette(&self) -> Vec<u32> {
		self.centroids.iter().map(|&c| from_vector(c)).collect()
	}

	/// Renders the output buffer: pixel `i` becomes the rounded centroid
	/// color of `assignments[i]`.
	fn render(&self, width: u32, height: u32) -> PixelBuffer {
		let palette = self.palette();
		let pixels = self
			.assignments
			.iter()
			.map(|&center| palette[center as usize])
			.collect();
		PixelBuffer::from_raw(width, height, pixels)
	}
}

/// Runs k-means on a buffer and renders the reduced buffer.
pub(crate) fn reduce(buffer: &PixelBuffer, params: &KmeansParams) -> Result<PixelBuffer, ReduceError> {
	let result = run(buffer, params)?;
	Ok(result.render(buffer.width(), buffer.height()))
}

/// Runs k-means on a buffer, returning the centroid set and assignment vector.
///
/// Transparent pixels are canonicalized before clustering. All randomness
/// comes from a generator seeded with `params.seed`, so results are
/// reproducible.
pub fn run(buffer: &PixelBuffer, params: &KmeansParams) -> Result<KmeansResult, ReduceError> {
	validate(buffer, params)?;

	let colors = buffer
		.normalized_pixels()
		.map(to_vector)
		.collect::<Vec<_>>();
	let k = params.k as usize;
	let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(params.seed);

	let mut centroids = match params.init {
		InitStrategy::FarthestPoint => init_farthest_point(&colors, k, &mut rng),
		InitStrategy::UniformRandom => init_uniform_random(&colors, k, &mut rng),
	};
	let mut assignments = vec![0_u32; colors.len()];

	let mut iterations = 0;
	while iterations < params.max_iter {
		assign_batches(&colors, &centroids, &mut assignments, params.batch_size);
		let (next, movement_sq) = update_centroids(&colors, &assignments, &centroids, &mut rng);
		// The new centroid set replaces the old wholesale; no partial state
		// survives if a caller stops between iterations
		centroids = next;
		iterations += 1;

		let movement = movement_sq.sqrt();
		let distinct = distinct_rounded(&centroids);
		debug!("kmeans iteration {iterations}: movement {movement:.6}, {distinct} distinct centroid colors");

		if movement < MOVEMENT_EPSILON {
			debug!("kmeans converged on centroid movement after {iterations} iterations");
			break;
		}
		if distinct < k {
			debug!("kmeans centroids collapsed to {distinct} colors after {iterations} iterations");
			break;
		}
	}

	Ok(KmeansResult { centroids, assignments, iterations })
}

/// Rejects invalid parameters before any pixel processing.
fn validate(buffer: &PixelBuffer, params: &KmeansParams) -> Result<(), ReduceError> {
	let pixels = buffer.pixels().len();
	if params.k == 0 || params.k as usize > pixels {
		return Err(ReduceError::InvalidClusterCount { k: params.k, pixels });
	}
	if params.max_iter == 0 {
		return Err(ReduceError::InvalidIterationLimit(params.max_iter));
	}
	if params.batch_size == 0 {
		return Err(ReduceError::InvalidBatchSize(params.batch_size));
	}
	Ok(())
}

/// Mean color of a non-empty set of color vectors, accumulated in f64.
fn mean_color(colors: &[[f32; 4]]) -> [f32; 4] {
	let mut sum = [0.0_f64; 4];
	for color in colors {
		for (s, &c) in sum.iter_mut().zip(color) {
			*s += f64::from(c);
		}
	}
	#[allow(clippy::cast_precision_loss)]
	let n = colors.len() as f64;
	#[allow(clippy::cast_possible_truncation)]
	{
		sum.map(|s| (s / n) as f32)
	}
}

/// Chooses initial centroids by farthest-point spreading.
///
/// The first centroid is the population mean; each next centroid is the
/// population color farthest from the mean of the centroids chosen so far,
/// skipping colors that already became centroids. If the population has
/// fewer distinct colors than requested, the remainder is padded with random
/// pixels; the resulting duplicate clusters empty out and get reseeded
/// during iteration.
fn init_farthest_point(colors: &[[f32; 4]], k: usize, rng: &mut impl Rng) -> Vec<[f32; 4]> {
	let mut centroids = Vec::with_capacity(k);
	let mut selected = HashSet::new();

	let mean = mean_color(colors);
	selected.insert(from_vector(mean));
	centroids.push(mean);

	while centroids.len() < k {
		let reference = mean_color(&centroids);

		let mut farthest = None;
		let mut farthest_dist = -1.0_f32;
		for &color in colors {
			if selected.contains(&from_vector(color)) {
				continue;
			}
			let dist = squared_distance_vec(color, reference);
			if dist > farthest_dist {
				farthest_dist = dist;
				farthest = Some(color);
			}
		}

		match farthest {
			Some(color) => {
				selected.insert(from_vector(color));
				centroids.push(color);
			},
			None => centroids.push(colors[rng.gen_range(0..colors.len())]),
		}
	}

	centroids
}

/// Chooses k distinct random pixels as the initial centroids.
fn init_uniform_random(colors: &[[f32; 4]], k: usize, rng: &mut impl Rng) -> Vec<[f32; 4]> {
	rand::seq::index::sample(rng, colors.len(), k)
		.iter()
		.map(|i| colors[i])
		.collect()
}

/// Assigns every pixel to its nearest centroid, one batch at a time.
///
/// Batches are processed in index order; each writes a disjoint slice of the
/// assignment vector.
#[cfg(not(feature = "threads"))]
fn assign_batches(colors: &[[f32; 4]], centroids: &[[f32; 4]], assignments: &mut [u32], batch_size: usize) {
	for (batch, slots) in colors.chunks(batch_size).zip(assignments.chunks_mut(batch_size)) {
		assign_batch(batch, centroids, slots);
	}
}

/// Assigns every pixel to its nearest centroid, batches in parallel.
///
/// Each batch only reads the centroid set and writes its own disjoint slice
/// of the assignment vector, so batches are free to run on the rayon pool.
#[cfg(feature = "threads")]
fn assign_batches(colors: &[[f32; 4]], centroids: &[[f32; 4]], assignments: &mut [u32], batch_size: usize) {
	use rayon::prelude::*;

	colors
		.par_chunks(batch_size)
		.zip(assignments.par_chunks_mut(batch_size))
		.for_each(|(batch, slots)| assign_batch(batch, centroids, slots));
}

/// Assigns one batch of pixels to their nearest centroids.
fn assign_batch(batch: &[[f32; 4]], centroids: &[[f32; 4]], slots: &mut [u32]) {
	for (slot, &color) in slots.iter_mut().zip(batch) {
		let mut min_dist = f32::INFINITY;
		let mut min_center = 0_u32;
		// Strict comparison keeps the lowest centroid index on ties
		#[allow(clippy::cast_possible_truncation)]
		for (i, &centroid) in centroids.iter().enumerate() {
			let dist = squared_distance_vec(color, centroid);
			if dist < min_dist {
				min_dist = dist;
				min_center = i as u32;
			}
		}
		*slot = min_center;
	}
}

/// Computes the next centroid set and the squared movement from the previous.
///
/// A cluster with no assigned pixels is reseeded from a uniformly random
/// population pixel rather than keeping its stale centroid, so clusters can
/// never stay permanently dead.
fn update_centroids(
	colors: &[[f32; 4]],
	assignments: &[u32],
	previous: &[[f32; 4]],
	rng: &mut impl Rng,
) -> (Vec<[f32; 4]>, f32) {
	let k = previous.len();
	let mut sums = vec![[0.0_f64; 4]; k];
	let mut counts = vec![0_u32; k];

	for (color, &center) in colors.iter().zip(assignments) {
		let sum = &mut sums[center as usize];
		for (s, &c) in sum.iter_mut().zip(color) {
			*s += f64::from(c);
		}
		counts[center as usize] += 1;
	}

	let mut movement_sq = 0.0;
	let next = previous
		.iter()
		.enumerate()
		.map(|(i, &old)| {
			let new = if counts[i] == 0 {
				debug!("kmeans cluster {i} is empty, reseeding from a random pixel");
				colors[rng.gen_range(0..colors.len())]
			} else {
				let n = f64::from(counts[i]);
				#[allow(clippy::cast_possible_truncation)]
				{
					sums[i].map(|s| (s / n) as f32)
				}
			};
			movement_sq += squared_distance_vec(old, new);
			new
		})
		.collect();

	(next, movement_sq)
}

/// Number of distinct colors the centroids round to.
fn distinct_rounded(centroids: &[[f32; 4]]) -> usize {
	centroids
		.iter()
		.map(|&c| from_vector(c))
		.collect::<HashSet<_>>()
		.len()
}
