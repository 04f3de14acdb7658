mod common;

use std::collections::HashSet;

use access_ingest::{
    config::MappingSettings,
    fields::{CanonicalField, ConfidenceBucket},
    mapping::SchemaMapper,
};
use common::{VENDOR_LOG_CSV, owned};
use proptest::prelude::*;

fn vendor_headers() -> Vec<String> {
    VENDOR_LOG_CSV
        .lines()
        .next()
        .unwrap()
        .split(',')
        .map(str::to_string)
        .collect()
}

#[test]
fn vendor_headers_map_to_all_four_fields() {
    let mapper = SchemaMapper::default();
    let suggested = mapper.suggest(&vendor_headers());
    assert_eq!(suggested.header_for(CanonicalField::Timestamp), Some("Event Time"));
    assert_eq!(suggested.header_for(CanonicalField::UserId), Some("Badge Number"));
    assert_eq!(suggested.header_for(CanonicalField::DoorId), Some("Reader Name"));
    assert_eq!(suggested.header_for(CanonicalField::EventType), Some("Access Outcome"));
}

#[test]
fn exact_key_and_display_names_win_with_full_score() {
    let mapper = SchemaMapper::default();
    let headers = owned(&[
        "event_time",
        "Timestamp",
        "UserID (Person Identifier)",
        "door",
        "DoorID",
        "EventType",
    ]);
    let suggested = mapper.suggest(&headers);
    for (header, field) in [
        ("Timestamp", CanonicalField::Timestamp),
        ("UserID (Person Identifier)", CanonicalField::UserId),
        ("DoorID", CanonicalField::DoorId),
        ("EventType", CanonicalField::EventType),
    ] {
        let suggestion = suggested.get(header).expect("exact header mapped");
        assert_eq!(suggestion.field, field);
        assert_eq!(suggestion.confidence_score, 1.0);
        assert_eq!(suggestion.confidence_bucket, ConfidenceBucket::High);
    }
    assert!(suggested.get("event_time").is_none());
    assert!(suggested.get("door").is_none());
}

#[test]
fn low_scores_are_never_assigned() {
    let mapper = SchemaMapper::default();
    let suggested = mapper.suggest(&owned(&["alpha", "beta", "gamma"]));
    assert!(suggested.is_empty());
}

#[test]
fn raising_min_score_drops_weak_matches() {
    let strict = SchemaMapper::new(MappingSettings {
        min_score: 0.99,
        ..MappingSettings::default()
    });
    // `xauthx` only matches the `auth` pattern for EventType.
    let suggested = strict.suggest(&owned(&["xauthx"]));
    assert!(suggested.is_empty());
    let lenient = SchemaMapper::default();
    let suggested = lenient.suggest(&owned(&["xauthx"]));
    assert_eq!(suggested.get("xauthx").unwrap().field, CanonicalField::EventType);
    assert_eq!(
        suggested.get("xauthx").unwrap().confidence_bucket,
        ConfidenceBucket::Medium
    );
}

#[test]
fn confidence_annotates_any_pair() {
    let mapper = SchemaMapper::default();
    assert_eq!(
        mapper.confidence("badge", CanonicalField::UserId).confidence_bucket,
        ConfidenceBucket::High
    );
    assert_eq!(
        mapper.confidence("qqq", CanonicalField::UserId).confidence_bucket,
        ConfidenceBucket::None
    );
}

#[test]
fn separate_mappers_do_not_share_cache_state() {
    let first = SchemaMapper::default();
    let second = SchemaMapper::default();
    first.suggest(&vendor_headers());
    assert!(first.cache_stats().misses > 0);
    assert_eq!(second.cache_stats().misses, 0);
    assert_eq!(second.cache_stats().len, 0);
}

#[test]
fn cache_respects_configured_capacity() {
    let mapper = SchemaMapper::new(MappingSettings {
        cache_capacity: 3,
        ..MappingSettings::default()
    });
    mapper.suggest(&vendor_headers());
    let stats = mapper.cache_stats();
    assert_eq!(stats.capacity, 3);
    assert!(stats.len <= 3);
}

fn header_strategy() -> impl Strategy<Value = Vec<String>> {
    let known = proptest::sample::select(vec![
        "timestamp",
        "Event Time",
        "user",
        "Badge ID",
        "door_name",
        "reader",
        "status",
        "Access Result",
        "notes",
    ])
    .prop_map(str::to_string);
    let pool = prop_oneof![known, "[a-z_ ]{1,12}"];
    proptest::collection::vec(pool, 0..8).prop_map(|headers| {
        let mut seen = HashSet::new();
        headers
            .into_iter()
            .filter(|h| seen.insert(h.clone()))
            .collect()
    })
}

proptest! {
    #[test]
    fn suggest_is_idempotent(headers in header_strategy()) {
        let mapper = SchemaMapper::default();
        let first = mapper.suggest(&headers);
        let second = mapper.suggest(&headers);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn suggest_never_reuses_headers_or_fields(headers in header_strategy()) {
        let mapper = SchemaMapper::default();
        let suggested = mapper.suggest(&headers);
        let mut fields = HashSet::new();
        let mut seen_headers = HashSet::new();
        for (header, suggestion) in suggested.iter() {
            prop_assert!(seen_headers.insert(header.to_string()));
            prop_assert!(fields.insert(suggestion.field));
            prop_assert!(headers.iter().any(|h| h == header));
            prop_assert!(suggestion.confidence_score > 0.3);
            prop_assert!(suggestion.confidence_score <= 1.0);
        }
    }

    #[test]
    fn exact_display_name_always_maps(
        mut headers in header_strategy(),
        field_idx in 0usize..4,
        position in 0usize..8,
    ) {
        let field = CanonicalField::ALL[field_idx];
        let name = field.display_name().to_string();
        headers.retain(|h| h != &name);
        let at = position.min(headers.len());
        headers.insert(at, name.clone());
        let suggested = SchemaMapper::default().suggest(&headers);
        let suggestion = suggested.get(&name).expect("display name mapped");
        prop_assert_eq!(suggestion.field, field);
        prop_assert_eq!(suggestion.confidence_score, 1.0);
    }
}
