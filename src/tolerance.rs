//! Greedy tolerance merging of near-duplicate colors
//!
//! Unlike the other reductions, this strategy has no target color count: it
//! folds colors into previously accepted representatives whenever every
//! channel is within tolerance, which is far cheaper than re-running full
//! k-means when only near-duplicate merging is wanted.

use crate::color::{decompose, squared_distance};
use crate::error::ReduceError;
use crate::frequency::FrequencyTable;
use crate::PixelBuffer;
use log::debug;
use std::collections::{HashMap, HashSet};

/// Parameters for the tolerance merge reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToleranceParams {
	/// Maximum allowed per-channel deviation for a merge; the alpha channel
	/// is allowed twice this
	pub tolerance: u32,
}

/// Per-invocation merge state: representatives grouped into coarse buckets.
///
/// Buckets limit how many representatives a candidate color is compared
/// against. The context is owned by a single reduction call, so repeated or
/// concurrent invocations never observe each other's representatives.
struct MergeContext {
	/// Per-channel right shift deriving the bucket key
	shift: u32,
	/// Maximum per-channel deviation
	tolerance: u32,
	/// Bucket key -> representatives accepted in that bucket
	buckets: HashMap<u32, Vec<u32>>,
}

impl MergeContext {
	/// Creates a context for the given tolerance.
	fn new(tolerance: u32) -> Self {
		// ceil(log2(tolerance)): channel values within tolerance of each
		// other mostly land in the same bucket; matches across a bucket
		// boundary are forgone for the smaller search space
		let shift = tolerance.next_power_of_two().trailing_zeros();
		Self { shift, tolerance, buckets: HashMap::new() }
	}

	/// Coarse key: every channel right-shifted by the bucket shift.
	fn bucket_key(&self, color: u32) -> u32 {
		let (r, g, b, a) = decompose(color);
		(u32::from(r) >> self.shift) << 24
			| (u32::from(g) >> self.shift) << 16
			| (u32::from(b) >> self.shift) << 8
			| (u32::from(a) >> self.shift)
	}

	/// Resolves a color to its representative.
	///
	/// The qualifying representative in the color's bucket with the lowest
	/// squared distance wins; without one, the color itself becomes a new
	/// representative for the bucket.
	fn resolve(&mut self, color: u32) -> u32 {
		let key = self.bucket_key(color);
		let tolerance = self.tolerance;
		let representatives = self.buckets.entry(key).or_default();

		let mut closest = None;
		let mut closest_dist = u32::MAX;
		for &representative in representatives.iter() {
			if !within_tolerance(representative, color, tolerance) {
				continue;
			}
			let dist = squared_distance(representative, color);
			if dist < closest_dist {
				closest_dist = dist;
				closest = Some(representative);
			}
		}

		match closest {
			Some(representative) => representative,
			None => {
				representatives.push(color);
				color
			},
		}
	}
}

/// Whether every channel of `x` is within tolerance of `y`.
fn within_tolerance(x: u32, y: u32, tolerance: u32) -> bool {
	let (xr, xg, xb, xa) = decompose(x);
	let (yr, yg, yb, ya) = decompose(y);
	let diff = |p: u8, q: u8| u32::from(p.abs_diff(q));
	diff(xr, yr) <= tolerance
		&& diff(xg, yg) <= tolerance
		&& diff(xb, yb) <= tolerance
		// Deviations in transparency are less visible than in color
		&& diff(xa, ya) <= tolerance * 2
}

/// Merges near-duplicate colors into representatives.
///
/// Distinct colors are processed in frequency-descending order, so the most
/// common color of any group of near-duplicates becomes the representative
/// the rest reduce to. Greedy and order-dependent by design.
pub(crate) fn reduce(buffer: &PixelBuffer, params: &ToleranceParams) -> Result<PixelBuffer, ReduceError> {
	if params.tolerance == 0 || params.tolerance > 255 {
		return Err(ReduceError::InvalidTolerance(params.tolerance));
	}

	let population = buffer.normalized_pixels().collect::<Vec<_>>();
	let entries = FrequencyTable::build(&population).ranked();

	let mut context = MergeContext::new(params.tolerance);
	let replacements = entries
		.iter()
		.map(|entry| (entry.color, context.resolve(entry.color)))
		.collect::<HashMap<_, _>>();

	let survivors = replacements.values().collect::<HashSet<_>>().len();
	debug!(
		"tolerance merge: {} distinct colors reduced to {survivors} representatives",
		entries.len()
	);

	let pixels = population
		.iter()
		.map(|color| replacements[color])
		.collect();

	Ok(PixelBuffer::from_raw(buffer.width(), buffer.height(), pixels))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::color::compose;

	fn buffer_from(pixels: &[u32], width: u32, height: u32) -> PixelBuffer {
		let bytes = pixels.iter().flat_map(|p| p.to_be_bytes()).collect::<Vec<_>>();
		PixelBuffer::from_rgba_bytes(width, height, &bytes).unwrap()
	}

	#[test]
	fn rejects_out_of_range_tolerances() {
		let buffer = buffer_from(&[0xff00_00ff; 4], 2, 2);

		assert!(matches!(
			reduce(&buffer, &ToleranceParams { tolerance: 0 }),
			Err(ReduceError::InvalidTolerance(0))
		));
		assert!(matches!(
			reduce(&buffer, &ToleranceParams { tolerance: 256 }),
			Err(ReduceError::InvalidTolerance(256))
		));
	}

	#[test]
	fn tolerance_one_keeps_colors_two_apart() {
		// Four distinct colors differing by at least 2 in every channel
		let pixels = [
			compose(10, 10, 10, 255),
			compose(20, 20, 20, 255),
			compose(30, 30, 30, 255),
			compose(40, 40, 40, 255),
		];
		let buffer = buffer_from(&pixels, 2, 2);

		let reduced = reduce(&buffer, &ToleranceParams { tolerance: 1 }).unwrap();
		let distinct = reduced.pixels().iter().collect::<HashSet<_>>();
		assert_eq!(distinct.len(), 4);
	}

	#[test]
	fn near_duplicates_collapse_onto_the_most_frequent() {
		// Tolerance 4 shifts channels by 2; these three share every bucket
		// coordinate while the outlier does not
		let common = compose(100, 100, 100, 255);
		let close = compose(102, 101, 101, 255);
		let far = compose(200, 200, 200, 255);
		let buffer = buffer_from(&[common, common, common, close, far, far], 3, 2);

		let reduced = reduce(&buffer, &ToleranceParams { tolerance: 4 }).unwrap();
		// close reduces to common; far stays its own representative
		assert_eq!(reduced.pixels()[3], common);
		assert_eq!(reduced.pixels()[4], far);
	}

	#[test]
	fn alpha_is_allowed_twice_the_tolerance() {
		// Alpha deviation 7 exceeds tolerance 5 but stays within 2 * 5
		let solid = compose(100, 100, 100, 200);
		let faded = compose(100, 100, 100, 207);
		let buffer = buffer_from(&[solid, solid, faded, faded], 2, 2);

		let reduced = reduce(&buffer, &ToleranceParams { tolerance: 5 }).unwrap();
		let distinct = reduced.pixels().iter().collect::<HashSet<_>>();
		assert_eq!(distinct.len(), 1);
	}

	#[test]
	fn rgb_deviation_beyond_tolerance_never_merges() {
		// Same bucket (tolerance 5 shifts by 3), but the blue channels are
		// 7 apart
		let x = compose(100, 100, 96, 255);
		let y = compose(100, 100, 103, 255);
		let buffer = buffer_from(&[x, x, y, y], 2, 2);

		let reduced = reduce(&buffer, &ToleranceParams { tolerance: 5 }).unwrap();
		let distinct = reduced.pixels().iter().collect::<HashSet<_>>();
		assert_eq!(distinct.len(), 2);
	}

	#[test]
	fn closest_qualifying_representative_wins() {
		// first and second are 7 apart so they stay separate at tolerance 5,
		// and between qualifies against both but sits closer to second
		let first = compose(96, 96, 96, 255);
		let second = compose(103, 103, 103, 255);
		let between = compose(100, 100, 100, 255);
		let buffer = buffer_from(&[first, first, first, second, second, between], 3, 2);

		let reduced = reduce(&buffer, &ToleranceParams { tolerance: 5 }).unwrap();
		assert_eq!(reduced.pixels()[5], second);
	}

	#[test]
	fn output_shape_matches_input() {
		let buffer = buffer_from(&[compose(1, 2, 3, 255); 6], 3, 2);
		let reduced = reduce(&buffer, &ToleranceParams { tolerance: 16 }).unwrap();

		assert_eq!(reduced.width(), 3);
		assert_eq!(reduced.height(), 2);
	}
}
