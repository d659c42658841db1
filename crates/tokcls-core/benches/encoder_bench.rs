use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokcls_core::{EncoderConfig, FeatureEncoder, HfSubwordTokenizer};

const TOKENIZER_JSON: &str = r###"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [],
    "normalizer": { "type": "Lowercase" },
    "pre_tokenizer": { "type": "Whitespace" },
    "post_processor": null,
    "decoder": null,
    "model": {
        "type": "WordPiece",
        "unk_token": "[UNK]",
        "continuing_subword_prefix": "##",
        "max_input_chars_per_word": 100,
        "vocab": {
            "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3,
            "john": 4, "lives": 5, "in": 6, "par": 7, "##is": 8,
            "mary": 9, "works": 10, "at": 11, "goo": 12, "##gle": 13
        }
    }
}"###;

fn bench_encode(c: &mut Criterion) {
    let tokenizer = HfSubwordTokenizer::from_json(TOKENIZER_JSON).unwrap();
    let encoder = FeatureEncoder::new(EncoderConfig::new(32)).unwrap();

    let sentences: Vec<String> = (0..256)
        .map(|i| match i % 3 {
            0 => "John lives in Paris".to_string(),
            1 => "Mary works at Google in Paris".to_string(),
            _ => "John works at Google".to_string(),
        })
        .collect();
    let labels: Vec<Vec<u32>> = sentences
        .iter()
        .map(|s| vec![1; s.split_whitespace().count()])
        .collect();

    c.bench_function("encode_single", |b| {
        b.iter(|| {
            encoder
                .encode(&tokenizer, black_box(&sentences[..1]), None)
                .unwrap()
        });
    });

    c.bench_function("encode_batch_256_labeled", |b| {
        b.iter(|| {
            encoder
                .encode(&tokenizer, black_box(&sentences[..]), Some(labels.as_slice()))
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_encode);
criterion_main!(benches);
