use criterion::{black_box, criterion_group, criterion_main, measurement::WallTime, BenchmarkGroup, Criterion, SamplingMode};
use pixquant::{KmeansParams, PaletteParams, PixelBuffer, Reduction, ToleranceParams};
use std::time::Duration;

/// Synthetic gradient with noise so every strategy has real work to do.
fn gradient_buffer(width: u32, height: u32) -> PixelBuffer {
	let mut bytes = Vec::with_capacity((width * height * 4) as usize);
	for y in 0..height {
		for x in 0..width {
			let r = (x * 255 / width) as u8;
			let g = (y * 255 / height) as u8;
			let b = ((x ^ y) & 0xff) as u8;
			let a = if (x + y) % 11 == 0 { 0 } else { 255 };
			bytes.extend_from_slice(&[r, g, b, a]);
		}
	}
	PixelBuffer::from_rgba_bytes(width, height, &bytes).expect("buffer dimensions match")
}

fn create_group<'a>(c: &'a mut Criterion, name: &'a str) -> BenchmarkGroup<'a, WallTime> {
	let mut group = c.benchmark_group(name);
	group
		.sample_size(30)
		.noise_threshold(0.05)
		.sampling_mode(SamplingMode::Flat)
		.warm_up_time(Duration::from_millis(500));
	group
}

fn kmeans(c: &mut Criterion) {
	let mut group = create_group(c, "kmeans");
	let buffer = gradient_buffer(512, 512);

	for k in [8, 64] {
		let params = KmeansParams { k, max_iter: 10, ..KmeansParams::default() };
		group.bench_function(format!("512x512 k={k}"), |b| {
			b.iter(|| pixquant::reduce(black_box(&buffer), &Reduction::Kmeans(params)));
		});
	}
}

fn palette_distance(c: &mut Criterion) {
	let mut group = create_group(c, "palette_distance");
	let buffer = gradient_buffer(512, 512);

	for size in [16, 256] {
		let params = PaletteParams { size, blend: true };
		group.bench_function(format!("512x512 size={size}"), |b| {
			b.iter(|| pixquant::reduce(black_box(&buffer), &Reduction::PaletteDistance(params)));
		});
	}
}

fn tolerance_merge(c: &mut Criterion) {
	let mut group = create_group(c, "tolerance_merge");
	let buffer = gradient_buffer(512, 512);

	for tolerance in [2, 16] {
		let params = ToleranceParams { tolerance };
		group.bench_function(format!("512x512 tolerance={tolerance}"), |b| {
			b.iter(|| pixquant::reduce(black_box(&buffer), &Reduction::ToleranceMerge(params)));
		});
	}
}

criterion_group!(benches, kmeans, palette_distance, tolerance_merge);
criterion_main!(benches);
