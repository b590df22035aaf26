use criterion::{Criterion, criterion_group, criterion_main};
use tessera_engine::{Document, html, inline, normalize};

fn sample_fragment(blocks: usize) -> String {
    let mut out = String::new();
    for i in 0..blocks {
        match i % 4 {
            0 => out.push_str(&format!("<p>Paragraph {i} with <strong>bold</strong> text</p>")),
            1 => out.push_str(&format!("<h2>Heading {i}</h2>")),
            2 => out.push_str(&format!("<ul><li>item {i}a</li><li>item {i}b</li></ul>")),
            _ => out.push_str("<blockquote>quoted</blockquote>"),
        }
    }
    out
}

fn bench_editing(c: &mut Criterion) {
    let mut group = c.benchmark_group("editing");
    group.sample_size(20);

    let fragment = sample_fragment(100);

    group.bench_function("normalize_fragment", |b| {
        b.iter(|| {
            let result = normalize::normalize_html(std::hint::black_box(&fragment));
            std::hint::black_box(result);
        });
    });

    let doc = Document::from_blocks(normalize::normalize_html(&fragment).blocks);

    group.bench_function("serialize_value", |b| {
        b.iter(|| {
            let value = html::serialize(std::hint::black_box(&doc));
            std::hint::black_box(value);
        });
    });

    let spans = inline::parse_markup("aa<strong>bb<em>cc</em></strong>dd<u>ee</u>ff");

    group.bench_function("split_concat_spans", |b| {
        b.iter(|| {
            let (left, right) = inline::split_at(std::hint::black_box(&spans), 7);
            let joined = inline::concat(left, right);
            std::hint::black_box(joined);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_editing);
criterion_main!(benches);
