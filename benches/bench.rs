use std::fmt::Write;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use svg2tvg::{convert, parse_svg, path};

/// Icon-sized document with `count` rounded rectangles and curved paths
fn sample_svg(count: usize) -> String {
    let mut svg = String::from(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="48" height="48" viewBox="0 0 48 48">"#,
    );

    for i in 0..count {
        let offset = (i % 40) as f64;
        write!(
            svg,
            r##"<g fill="#{:02x}8040"><rect x="{o}" y="{o}" width="8" height="6" rx="1.5"/><path d="M{o} 2 c 1.5 2 3 2 4.5 0 s 3 -2 4.5 0 q 2 3 4 0 t 4 0 a 2 2 0 0 1 4 0 z"/></g>"##,
            (i * 7) % 256,
            o = offset,
        )
        .unwrap();
    }

    svg.push_str("</svg>");
    svg
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut g = c.benchmark_group("svg2tvg");

    let data = "M 10 10 C 20 20 30 20 40 10 S 60 0 70 10 Q 80 20 90 10 T 110 10 \
                A 5 5 0 0 1 120 10 L 120 40 H 10 V 10 Z m 5 5 l 10 0 0 10 -10 0 z";
    g.bench_function(BenchmarkId::new("parse", "path"), |b| {
        b.iter(|| black_box(path::parse(black_box(data)).unwrap()))
    });

    for count in [10, 100] {
        let svg = sample_svg(count);

        g.bench_function(BenchmarkId::new("bind", count), |b| {
            b.iter(|| black_box(parse_svg(&svg).unwrap()))
        });

        let bound = parse_svg(&svg).unwrap();
        g.bench_function(BenchmarkId::new("convert", count), |b| {
            b.iter(|| black_box(convert(&bound.document).unwrap()))
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
