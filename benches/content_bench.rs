use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mdsnap::content::{self, NormalizeOptions};
use mdsnap::template::TemplateRegistry;
use mdsnap::InputFormat;

fn sample_markdown() -> String {
    let mut md = String::from("[[toc]]\n\n# Release notes\n\n");
    for i in 0..50 {
        md.push_str(&format!(
            "## Section {i}\n\nSome *emphasis*, a [link](https://example.com/{i}) and a footnote.[^{i}]\n\n\
             | a | b |\n|---|---|\n| {i} | {i} |\n\n<script>track({i})</script>\n\n[^{i}]: Note {i}.\n\n"
        ));
    }
    md
}

fn bench_normalize(c: &mut Criterion) {
    let md = sample_markdown();
    let opts = NormalizeOptions { toc: true, ..Default::default() };

    c.bench_function("normalize_markdown", |b| {
        b.iter(|| content::normalize(black_box(&md), InputFormat::Markdown, &opts))
    });

    let text = md.replace('#', "");
    c.bench_function("normalize_text", |b| {
        b.iter(|| content::normalize(black_box(&text), InputFormat::Text, &opts))
    });
}

fn bench_template(c: &mut Criterion) {
    let body = content::normalize(&sample_markdown(), InputFormat::Markdown, &NormalizeOptions::default());
    let registry = TemplateRegistry::default();

    c.bench_function("render_github_template", |b| {
        b.iter(|| registry.render("github", "Release notes", black_box(&body), Some("h1 { color: red; }")).unwrap())
    });

    c.bench_function("render_card_template_css_injection", |b| {
        b.iter(|| registry.render("card", "Release notes", black_box(&body), Some(".card { padding: 0; }")).unwrap())
    });
}

criterion_group!(benches, bench_normalize, bench_template);
criterion_main!(benches);
