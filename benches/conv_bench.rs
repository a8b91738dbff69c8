use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use topomodel::nn::base::{Conv, ConvOptions};
use topomodel::topology::{Complex, SimplicialComplex};

/// Triangulated `n × n` grid: `2n²` triangles.
fn grid(n: usize) -> SimplicialComplex {
    let v = |i: usize, j: usize| i * (n + 1) + j;
    let mut simplices = Vec::with_capacity(2 * n * n);
    for i in 0..n {
        for j in 0..n {
            simplices.push(vec![v(i, j), v(i + 1, j), v(i + 1, j + 1)]);
            simplices.push(vec![v(i, j), v(i, j + 1), v(i + 1, j + 1)]);
        }
    }
    SimplicialComplex::from_simplices(simplices).expect("valid grid")
}

fn bench_conv(c: &mut Criterion) {
    let mut group = c.benchmark_group("conv");

    for &n in &[8usize, 16] {
        let sc = grid(n);
        let lap = sc.hodge_laplacian(1).expect("edge laplacian");
        let x = Array2::from_elem((lap.ncols(), 16), 0.5f32);
        let grad = Array2::from_elem((lap.nrows(), 16), 1.0f32);

        for attention in [false, true] {
            let opts = ConvOptions {
                attention,
                ..ConvOptions::default()
            };
            let mut rng = SmallRng::seed_from_u64(0);
            let mut conv = Conv::new("bench", 16, 16, opts, &mut rng).expect("conv");
            let label = if attention { "attention" } else { "plain" };

            group.bench_with_input(
                BenchmarkId::new(format!("forward_{label}"), n),
                &n,
                |b, _| {
                    b.iter(|| {
                        let y = conv.forward(&x, &lap, None).expect("forward");
                        black_box(y);
                    });
                },
            );

            group.bench_with_input(
                BenchmarkId::new(format!("backward_{label}"), n),
                &n,
                |b, _| {
                    b.iter(|| {
                        let g = conv.backward(&x, &lap, None, &grad).expect("backward");
                        black_box(g);
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_conv);
criterion_main!(benches);
