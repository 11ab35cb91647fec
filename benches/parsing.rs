use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use mailharvest::search::criteria::{build_criteria, DateRange};

fn bench_parse_message(c: &mut Criterion) {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("mailbox")
        .join("inbox")
        .join("2.eml");
    let raw = std::fs::read(fixture_path).unwrap();

    c.bench_function("parse_report_message", |b| {
        b.iter(|| {
            let headers = mailharvest::parser::header::parse_headers(&raw);
            let content = mailharvest::parser::mime::parse_message(&raw);
            (headers, content.attachments.len())
        })
    });
}

fn bench_parse_csv(c: &mut Criterion) {
    let mut csv = String::from("date,currency,rate\n");
    for day in 0..2000 {
        csv.push_str(&format!("2024-05-{:02},\"USD, spot\",1.{day:04}\n", day % 28 + 1));
    }

    c.bench_function("parse_csv_2000_rows", |b| {
        b.iter(|| mailharvest::parser::tabular::parse_csv(csv.as_bytes()).len())
    });
}

fn bench_build_criteria(c: &mut Criterion) {
    let keywords: Vec<String> = (0..16).map(|i| format!("keyword {i}")).collect();
    let senders = vec!["rates@bank.example".to_string(), "desk@bank.example".to_string()];
    let range = DateRange::new(
        chrono::NaiveDate::from_ymd_opt(2024, 5, 1),
        chrono::NaiveDate::from_ymd_opt(2024, 6, 1),
    );

    c.bench_function("build_and_render_criteria", |b| {
        b.iter(|| {
            build_criteria(&keywords, true, true, &range, &senders)
                .unwrap()
                .to_string()
        })
    });
}

criterion_group!(benches, bench_parse_message, bench_parse_csv, bench_build_criteria);
criterion_main!(benches);
