//! Frequency-ranked palette reduction with nearest-color reassignment

use crate::color::{compose, decompose, squared_distance};
use crate::error::ReduceError;
use crate::frequency::{FrequencyTable, PaletteEntry};
use crate::PixelBuffer;
use log::{debug, warn};
use std::collections::HashMap;

/// Parameters for the palette-distance reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteParams {
	/// Number of most-frequent colors to keep
	pub size: u32,
	/// Blend merged colors into their kept entry, weighted by occurrence
	pub blend: bool,
}

/// Reduces a buffer to its `size` most frequent colors.
///
/// Every other color is remapped to the nearest kept color by squared
/// channel distance. With blending enabled, each kept color drifts toward
/// the occurrence-weighted centroid of everything merged into it.
pub(crate) fn reduce(buffer: &PixelBuffer, params: &PaletteParams) -> Result<PixelBuffer, ReduceError> {
	if params.size == 0 {
		return Err(ReduceError::InvalidPaletteSize(params.size));
	}

	let population = buffer.normalized_pixels().collect::<Vec<_>>();
	let entries = FrequencyTable::build(&population).ranked();

	// A palette larger than the distinct color count keeps everything
	let size = (params.size as usize).min(entries.len());
	let (kept, merged) = entries.split_at(size);
	debug!("palette reduction: keeping {size} of {} distinct colors", entries.len());

	let targets = merged
		.iter()
		.map(|entry| nearest_kept(entry.color, kept))
		.collect::<Vec<_>>();

	let replacements = build_replacement_map(kept, merged, &targets, params.blend);

	let mut unmapped = 0_usize;
	let pixels = population
		.iter()
		.map(|color| match replacements.get(color) {
			Some(&replacement) => replacement,
			None => {
				// Every distinct color was entered into the map, so a miss
				// means palette construction itself has a gap
				unmapped += 1;
				*color
			},
		})
		.collect();

	if unmapped > 0 {
		warn!("palette reduction left {unmapped} pixels unmapped; their colors pass through unchanged");
	}

	Ok(PixelBuffer::from_raw(buffer.width(), buffer.height(), pixels))
}

/// Index of the kept entry nearest to `color`, lowest rank winning ties.
fn nearest_kept(color: u32, kept: &[PaletteEntry]) -> usize {
	let mut nearest = 0;
	let mut nearest_dist = u32::MAX;
	for (i, entry) in kept.iter().enumerate() {
		let dist = squared_distance(color, entry.color);
		if dist < nearest_dist {
			nearest_dist = dist;
			nearest = i;
		}
	}
	nearest
}

/// Builds the color replacement map from kept entries and merge targets.
///
/// Without blending, merged colors map straight onto their kept color. With
/// blending, kept colors accumulate an occurrence-weighted running average
/// of their merged colors, and both the merged colors and the kept original
/// redirect to the blended result.
fn build_replacement_map(
	kept: &[PaletteEntry],
	merged: &[PaletteEntry],
	targets: &[usize],
	blend: bool,
) -> HashMap<u32, u32> {
	let final_colors = if blend {
		blended_palette(kept, merged, targets)
	} else {
		kept.iter().map(|entry| entry.color).collect()
	};

	let mut replacements = HashMap::with_capacity(kept.len() + merged.len());
	for (entry, &color) in kept.iter().zip(&final_colors) {
		replacements.insert(entry.color, color);
	}
	for (entry, &target) in merged.iter().zip(targets) {
		replacements.insert(entry.color, final_colors[target]);
	}

	replacements
}

/// Folds every merged color into its kept entry as a running weighted average.
///
/// Each merge step rounds per channel and truncates on write, so repeated
/// merging matches 8-bit channel semantics rather than drifting through a
/// higher-precision accumulator.
fn blended_palette(kept: &[PaletteEntry], merged: &[PaletteEntry], targets: &[usize]) -> Vec<u32> {
	let mut colors = kept.iter().map(|entry| entry.color).collect::<Vec<_>>();
	let mut counts = kept.iter().map(|entry| entry.count).collect::<Vec<_>>();

	for (entry, &target) in merged.iter().zip(targets) {
		let (br, bg, bb, ba) = decompose(colors[target]);
		let (mr, mg, mb, ma) = decompose(entry.color);
		let base_count = counts[target];
		let total = base_count + entry.count;

		let mix = |base: u8, merge: u8| -> u32 {
			let weighted =
				f64::from(base) * f64::from(base_count) + f64::from(merge) * f64::from(entry.count);
			#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
			{
				(weighted / f64::from(total)).round() as u32
			}
		};

		colors[target] = compose(mix(br, mr), mix(bg, mg), mix(bb, mb), mix(ba, ma));
		counts[target] = total;
	}

	colors
}
