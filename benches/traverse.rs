use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use object_dump::dump::{DumpRequest, ObjectDump};
use object_dump::model::TypeName;
use object_dump::registry::TypeConfigRegistry;
use object_dump::serializer::{Encoder, JsonEncoder, ObjectSerializer};
use object_dump::store::Store;
use serde_json::json;

// `authors` authors with ten articles each, every article in two of twenty categories.
fn synthetic_store(authors: i64) -> Store {
    let mut records = Vec::new();
    for c in 1..=20 {
        records.push(json!({"model": "bench.category", "pk": c, "fields": {"name": format!("c{c}")}}));
    }
    let mut article = 1;
    for a in 1..=authors {
        records.push(json!({"model": "bench.author", "pk": a, "fields": {"name": format!("a{a}")}}));
        for _ in 0..10 {
            let cats = [article % 20 + 1, (article * 7) % 20 + 1];
            records.push(json!({
                "model": "bench.article",
                "pk": article,
                "fields": {"author": a, "title": format!("t{article}"), "categories": cats}
            }));
            article += 1;
        }
    }
    let doc = json!({
        "types": [
            {"name": "bench.author", "fields": [{"name": "name", "kind": "scalar"}]},
            {"name": "bench.category", "fields": [{"name": "name", "kind": "scalar"}]},
            {"name": "bench.article", "fields": [
                {"name": "author", "kind": "reference", "target": "bench.author"},
                {"name": "title", "kind": "scalar"},
                {"name": "categories", "kind": "many", "target": "bench.category"}
            ]}
        ],
        "records": records
    });
    Store::from_json(&doc.to_string()).expect("synthetic store")
}

fn bench_dump(c: &mut Criterion) {
    let mut group = c.benchmark_group("dump");
    let registry = TypeConfigRegistry::new();

    for authors in [10_i64, 100, 1000] {
        let store = synthetic_store(authors);
        let request = DumpRequest::new(TypeName::parse("bench.author").expect("type name"));
        group.bench_with_input(BenchmarkId::new("traverse_and_sort", authors), &store, |b, store| {
            b.iter(|| {
                let result = ObjectDump::new(store, &registry).run(black_box(&request)).expect("dump");
                black_box(result.sorted.len())
            })
        });
        group.bench_with_input(BenchmarkId::new("serialize_json", authors), &store, |b, store| {
            let result = ObjectDump::new(store, &registry).run(&request).expect("dump");
            b.iter(|| {
                let mut serializer = ObjectSerializer::new(store, registry.field_rules(), false);
                let records = serializer.serialize(result.sorted.iter().map(|e| &**e));
                let mut buf = Vec::new();
                JsonEncoder::default().encode(&records, &mut buf).expect("encode");
                black_box(buf.len())
            })
        });
    }

    group.finish();
}

criterion_group!(name = benches; config = Criterion::default(); targets = bench_dump);
criterion_main!(benches);
