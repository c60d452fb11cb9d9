use object_dump::dump::{DumpRequest, DumpResult, ObjectDump};
use object_dump::model::{EntityId, EntityKey, TypeName};
use object_dump::registry::TypeConfigRegistry;
use object_dump::serializer::{Encoder, JsonEncoder, ObjectSerializer};
use object_dump::store::Store;
use object_dump::utils::config::{load_config_at, Config};
use serde_json::{json, Value};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn store() -> Store {
    Store::load(&fixture("simpleapp.json")).expect("fixture store loads")
}

fn tn(s: &str) -> TypeName {
    TypeName::parse(s).unwrap()
}

fn key(t: &str, id: i64) -> EntityKey {
    EntityKey::new(tn(t), id)
}

fn order(result: &DumpResult) -> Vec<String> {
    result.sorted.iter().map(|e| e.key().unwrap().to_string()).collect()
}

fn request(t: &str, ids: &[i64]) -> DumpRequest {
    let mut req = DumpRequest::new(tn(t));
    req.ids = Some(ids.iter().map(|i| EntityId::Int(*i)).collect());
    req
}

fn tagged_registry(store: &Store) -> TypeConfigRegistry {
    let cfg = load_config_at(&fixture("tagged.toml")).expect("config parsed");
    TypeConfigRegistry::from_settings(&cfg.types, store).expect("registry builds")
}

fn records_json(store: &Store, registry: &TypeConfigRegistry, result: &DumpResult, generic: bool) -> Value {
    let mut serializer = ObjectSerializer::new(store, registry.field_rules(), generic);
    let records = serializer.serialize(result.sorted.iter().map(|e| &**e));
    let mut buf = Vec::new();
    JsonEncoder::default().encode(&records, &mut buf).unwrap();
    serde_json::from_slice(&buf).unwrap()
}

#[test]
fn article_pulls_in_author_categories_and_profile() {
    let store = store();
    let registry = TypeConfigRegistry::new();
    let mut req = request("simpleapp.article", &[1]);
    req.exclude = vec!["simpleapp.taggedarticle".into()];

    let result = ObjectDump::new(&store, &registry).run(&req).unwrap();
    assert_eq!(
        order(&result),
        vec![
            "simpleapp.author.1",
            "simpleapp.category.1",
            "simpleapp.article.1",
            "simpleapp.authorprofile.1",
        ]
    );

    // the excluded tagged article was still reached through the author
    let author_rel = &result.relations[&key("simpleapp.author", 1)];
    assert!(author_rel["taggedarticle_set"].contains(&key("simpleapp.taggedarticle", 1)));
    assert!(author_rel["authorprofile"].contains(&key("simpleapp.authorprofile", 1)));
}

#[test]
fn depth_zero_follows_only_forward_references() {
    let store = store();
    let registry = TypeConfigRegistry::new();
    let mut req = request("simpleapp.article", &[1]);
    req.max_depth = Some(0);

    let result = ObjectDump::new(&store, &registry).run(&req).unwrap();
    assert_eq!(order(&result), vec!["simpleapp.author.1", "simpleapp.article.1"]);
}

#[test]
fn additional_relation_orders_tagged_items_after_their_article() {
    let store = store();
    let registry = tagged_registry(&store);
    let result = ObjectDump::new(&store, &registry)
        .run(&request("simpleapp.taggedarticle", &[1]))
        .unwrap();

    assert_eq!(
        order(&result),
        vec![
            "simpleapp.author.1",
            "simpleapp.category.1",
            "simpleapp.tag.1",
            "simpleapp.tag.2",
            "simpleapp.authorprofile.1",
            "simpleapp.taggedarticle.1",
            "simpleapp.taggeditem.1",
            "simpleapp.taggeditem.2",
        ]
    );

    let items = &result.relations[&key("simpleapp.taggedarticle", 1)]["tagged_items"];
    assert_eq!(items.len(), 2);
    assert!(result.depends_on[&key("simpleapp.taggeditem", 1)].contains(&key("simpleapp.taggedarticle", 1)));

    let out = records_json(&store, &registry, &result, false);
    let item = &out.as_array().unwrap()[6];
    assert_eq!(
        item,
        &json!({
            "pk": 1,
            "model": "simpleapp.taggeditem",
            "fields": {"content_type": "simpleapp.taggedarticle", "object_id": 1, "tag": 1}
        })
    );
}

#[test]
fn excluded_field_and_disabled_forward_relation() {
    let store = store();
    let mut cfg: Config = toml::from_str(include_str!("fixtures/tagged.toml")).unwrap();
    let item = cfg.types.get_mut("simpleapp.taggeditem").unwrap();
    item.forward = object_dump::registry::Toggle::None;
    item.exclude = Some(vec!["tag".into()]);
    let registry = TypeConfigRegistry::from_settings(&cfg.types, &store).unwrap();

    let result = ObjectDump::new(&store, &registry)
        .run(&request("simpleapp.taggedarticle", &[1]))
        .unwrap();
    assert_eq!(
        order(&result),
        vec![
            "simpleapp.author.1",
            "simpleapp.category.1",
            "simpleapp.authorprofile.1",
            "simpleapp.taggedarticle.1",
            "simpleapp.taggeditem.1",
            "simpleapp.taggeditem.2",
        ]
    );

    let out = records_json(&store, &registry, &result, false);
    let fields = &out.as_array().unwrap()[4]["fields"];
    assert_eq!(fields, &json!({"content_type": "simpleapp.taggedarticle", "object_id": 1}));
}

#[test]
fn generic_fields_replace_their_backing_fields() {
    let store = store();
    let registry = tagged_registry(&store);
    let result = ObjectDump::new(&store, &registry)
        .run(&request("simpleapp.taggedarticle", &[1]))
        .unwrap();

    let out = records_json(&store, &registry, &result, true);
    let fields = &out.as_array().unwrap()[6]["fields"];
    assert_eq!(fields, &json!({"tag": 1, "content_object": ["simpleapp.taggedarticle", 1]}));
}

#[test]
fn string_identifiers() {
    let store = store();
    let registry = TypeConfigRegistry::new();
    let mut req = DumpRequest::new(tn("simpleapp.actor"));
    req.ids = Some(vec![EntityId::from("Han")]);

    let result = ObjectDump::new(&store, &registry).run(&req).unwrap();
    assert_eq!(order(&result), vec!["simpleapp.actor.Han"]);
    let out = records_json(&store, &registry, &result, false);
    assert_eq!(out, json!([{"pk": "Han", "model": "simpleapp.actor", "fields": {"name": "Han"}}]));
}

#[test]
fn include_list_keeps_only_named_groups_and_root() {
    let store = store();
    let registry = TypeConfigRegistry::new();
    let mut req = request("simpleapp.article", &[1]);
    req.include = vec!["simpleapp.category".into()];

    // the author is required but filtered out, so it is left out of the order
    let result = ObjectDump::new(&store, &registry).run(&req).unwrap();
    assert_eq!(order(&result), vec!["simpleapp.category.1", "simpleapp.article.1"]);
}

#[test]
fn unknown_filter_name_is_a_configuration_error() {
    let store = store();
    let registry = TypeConfigRegistry::new();
    let mut req = request("simpleapp.article", &[1]);
    req.exclude = vec!["nosuchapp".into()];
    assert!(ObjectDump::new(&store, &registry).run(&req).is_err());
}
