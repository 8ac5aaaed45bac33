//! Performance benchmarks for the masking hot path.
//!
//! Run with: `cargo bench --bench reconcile`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Reconcile 1k spans | <1ms | Sort plus single sweep |
//! | Placeholder scan | Linear in text | Single pass, no backtracking |
//! | Pattern detection | <5ms per 10KB | All built-in patterns |
//! | Seal and open | <10µs | ChaCha20-Poly1305, small entries |

use criterion::{
    black_box, criterion_group, criterion_main,
    BenchmarkId, Criterion, Throughput,
};

use pii_vault::{
    reconcile, scan_placeholders, ChaChaCipher, DetectedSpan, DetectionSource,
    EntityType, PatternDetector, Token, VaultCipher,
};

const TYPES: &[&str] = &["PERSON", "LOCATION", "EMAIL_ADDRESS", "CREDIT_CARD"];

/// Overlapping spans with a spread of types and scores.
fn make_spans(n: usize) -> Vec<DetectedSpan> {
    (0..n)
        .map(|i| {
            let start = (i * 7) % (n * 3);
            let len = 3 + (i % 11);
            let score = ((i * 37) % 100) as f32 / 100.0;
            let source = if i % 3 == 0 { DetectionSource::Rule } else { DetectionSource::Statistical };
            DetectedSpan::new(TYPES[i % TYPES.len()], start, start + len, score, source)
        })
        .collect()
}

/// Masked text with `n` placeholders and some decoys.
fn make_masked_text(n: usize) -> String {
    let mut text = String::new();
    for i in 0..n {
        let token = Token::mint("session_bench", &EntityType::new(TYPES[i % TYPES.len()]), &i.to_string());
        text.push_str("Customer said ");
        text.push_str(&token.placeholder());
        text.push_str(" and [NOT_a_token] then ");
    }
    text
}

fn make_plain_text(repeats: usize) -> String {
    "Reach Ada at ada@example.com or +44 20 7946 0958, card 4111 1111 1111 1111, from 10.0.0.12. "
        .repeat(repeats)
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");

    for n in [10, 100, 1000] {
        let spans = make_spans(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &spans, |b, spans| {
            b.iter(|| reconcile(black_box(spans.clone())))
        });
    }

    group.finish();
}

fn bench_scan_placeholders(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_placeholders");

    for n in [10, 100, 1000] {
        let text = make_masked_text(n);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &text, |b, text| {
            b.iter(|| scan_placeholders(black_box(text)))
        });
    }

    group.finish();
}

fn bench_pattern_detection(c: &mut Criterion) {
    let detector = match PatternDetector::standard() {
        Ok(d) => d,
        Err(e) => panic!("built-in patterns must compile: {e}"),
    };
    let mut group = c.benchmark_group("pattern_detection");

    for repeats in [1, 10, 100] {
        let text = make_plain_text(repeats);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(repeats), &text, |b, text| {
            b.iter(|| detector.find(black_box(text)))
        });
    }

    group.finish();
}

fn bench_cipher(c: &mut Criterion) {
    let cipher = ChaChaCipher::new(&[7u8; 32]);
    let payload = br#"{"session_id":"s1","original_value":"ada@example.com","entity_type":"EMAIL_ADDRESS"}"#;

    c.bench_function("cipher_seal_open", |b| {
        b.iter(|| {
            let sealed = cipher.encrypt(black_box(payload)).ok();
            sealed.and_then(|s| cipher.decrypt(&s).ok())
        })
    });
}

criterion_group!(
    benches,
    bench_reconcile,
    bench_scan_placeholders,
    bench_pattern_detection,
    bench_cipher,
);
criterion_main!(benches);
