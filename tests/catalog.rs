mod common;

use std::sync::atomic::Ordering;

use common::{FakeGeodata, FlakyStore, Harness, field, node, player, t0};
use pitchside_back::{
    config::AppConfig,
    dao::{
        field_store::{FieldStore, Versioned, memory::MemoryFieldStore},
        models::{
            FieldId, FieldPlayerEntity, FieldSize, PlayerId, ReviewEntity, SurfaceType, to_millis,
        },
        storage::StorageError,
    },
    error::ServiceError,
    services::{
        catalog_service::{self, FieldSubmission, PERSISTENCE_NOTICE},
        chunked_lookup::fields_by_ids,
        presence_service,
    },
    state::{catalog::FieldFilter, geo::Position},
};

const POOL: &str = "https://cdn.example.com/stadium.jpg";

fn center() -> Position {
    Position::new(55.75, 37.61)
}

fn elements() -> Vec<pitchside_back::dao::geodata::RawElement> {
    vec![
        node(1, 55.751, 37.611, &[("name", "Luzhniki Annex"), ("surface", "grass"), ("lit", "yes")]),
        node(2, 55.752, 37.612, &[("surface", "asphalt")]),
        node(3, 55.753, 37.613, &[("leisure", "pitch")]),
    ]
}

#[tokio::test]
async fn first_pass_creates_fields_with_mapped_attributes() {
    let harness = Harness::with_geodata(FakeGeodata::with(elements()), vec![POOL.into()]).await;

    let outcome = catalog_service::fetch_fields(&harness.state, center(), 5_000.0)
        .await
        .unwrap();
    assert!(outcome.notice.is_none());
    let ids: Vec<_> = outcome.fields.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![FieldId(1), FieldId(2), FieldId(3)]);

    let first = harness.stored_field(1).await.unwrap();
    assert_eq!(first.name, "Luzhniki Annex");
    assert_eq!(first.surface, SurfaceType::Grass);
    assert!(first.lighting);
    assert_eq!(first.photo, POOL);
    assert_eq!(first.size, FieldSize::from_id(FieldId(1)));

    let second = harness.stored_field(2).await.unwrap();
    assert_eq!(second.name, "Football Venue");
    assert_eq!(second.surface, SurfaceType::Asphalt);
    assert_eq!(harness.memory.field_count().await, 3);
    assert_eq!(harness.state.catalog().read().await.len(), 3);
}

#[tokio::test]
async fn provider_outage_leaves_catalog_unchanged() {
    let geodata = FakeGeodata::with(elements());
    let harness = Harness::with_geodata(geodata.clone(), Vec::new()).await;
    catalog_service::fetch_fields(&harness.state, center(), 5_000.0)
        .await
        .unwrap();
    let before: Vec<_> = harness.state.catalog().read().await.iter().cloned().collect();

    geodata.set(None);
    let err = catalog_service::fetch_fields(&harness.state, center(), 5_000.0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ProviderUnavailable(_)));

    let after: Vec<_> = harness.state.catalog().read().await.iter().cloned().collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn repeated_pass_schedules_no_writes() {
    let flaky = FlakyStore::new(MemoryFieldStore::new());
    let harness = Harness::build(
        AppConfig::default(),
        FakeGeodata::with(elements()),
        vec![POOL.into()],
        Some(flaky.clone()),
    )
    .await;

    catalog_service::fetch_fields(&harness.state, center(), 5_000.0)
        .await
        .unwrap();
    assert_eq!(flaky.batches_seen.load(Ordering::SeqCst), 1);
    let stored: Vec<_> = [1, 2, 3].iter().map(|id| FieldId(*id)).collect();
    let before = FieldStore::find_fields_by_ids(&flaky, stored.clone()).await.unwrap();

    catalog_service::fetch_fields(&harness.state, center(), 5_000.0)
        .await
        .unwrap();
    assert_eq!(flaky.batches_seen.load(Ordering::SeqCst), 1);
    let after = FieldStore::find_fields_by_ids(&flaky, stored).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn refresh_preserves_community_state() {
    let harness = Harness::with_geodata(
        FakeGeodata::with(vec![node(42, 55.76, 37.62, &[("name", "Stadium (north)")])]),
        vec![POOL.into()],
    )
    .await;

    let mut persisted = field(42);
    persisted.name = "Real Name".into();
    persisted.photo = "https://photos.example.com/real.jpg".into();
    persisted.reviews = [5, 5, 4, 4, 4, 4, 4]
        .iter()
        .enumerate()
        .map(|(n, rating)| ReviewEntity {
            id: format!("r{n}"),
            author_id: PlayerId::new(format!("a{n}")),
            author_name: String::new(),
            author_avatar: String::new(),
            rating: *rating,
            comment: String::new(),
            created_at: t0(),
        })
        .collect();
    persisted.rating = 4.3;
    persisted.players = vec![FieldPlayerEntity {
        player_id: PlayerId::from("x"),
        name: "X".into(),
        avatar: String::new(),
        check_in_time: Some(t0()),
    }];
    harness.memory.seed_field(&persisted).await.unwrap();

    let outcome = catalog_service::fetch_fields(&harness.state, center(), 5_000.0)
        .await
        .unwrap();
    let merged = &outcome.fields[0];
    assert_eq!(merged.rating, 4.3);
    assert_eq!(merged.reviews, persisted.reviews);
    assert_eq!(merged.players, persisted.players);
    assert_eq!(merged.name, "Real Name");
    assert_eq!(merged.photo, persisted.photo);
    assert_eq!(merged.position, Position::new(55.76, 37.62));

    // Only the view moves; the stored record is untouched.
    assert_eq!(harness.stored_field(42).await.unwrap(), persisted);
}

#[tokio::test]
async fn placeholder_photo_is_backfilled_and_persisted() {
    let harness = Harness::with_geodata(
        FakeGeodata::with(vec![node(7, 55.75, 37.61, &[("name", "Dynamo")])]),
        vec![POOL.into()],
    )
    .await;
    let mut persisted = field(7);
    persisted.name = "Football Venue".into();
    persisted.photo = "https://source.unsplash.com/800x600/?soccer&sig=7".into();
    harness.memory.seed_field(&persisted).await.unwrap();

    let outcome = catalog_service::fetch_fields(&harness.state, center(), 5_000.0)
        .await
        .unwrap();
    assert_eq!(outcome.fields[0].name, "Dynamo");

    let stored = harness.stored_field(7).await.unwrap();
    assert_eq!(stored.photo, POOL);
    assert_eq!(stored.name, "Football Venue");
}

#[tokio::test]
async fn failed_batch_keeps_committed_fields_and_reports_notice() {
    let flaky = FlakyStore::new(MemoryFieldStore::new());
    flaky.healthy_batches.store(1, Ordering::SeqCst);
    let mut config = AppConfig::default();
    config.batch_limit = 2;
    let many: Vec<_> = (1..=5)
        .map(|id| node(id, 55.75, 37.61, &[]))
        .collect();
    let harness = Harness::build(config, FakeGeodata::with(many), Vec::new(), Some(flaky.clone())).await;

    let mut favorite = field(900);
    favorite.position = Position::new(-33.9, 18.4);
    harness
        .state
        .catalog()
        .write()
        .await
        .merge_confirmed([Versioned {
            value: favorite,
            version: 1,
        }]);

    let outcome = catalog_service::fetch_fields(&harness.state, center(), 5_000.0)
        .await
        .unwrap();
    assert_eq!(outcome.notice.as_deref(), Some(PERSISTENCE_NOTICE));
    let ids: Vec<_> = outcome.fields.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![FieldId(1), FieldId(2)]);
    assert_eq!(flaky.batches_seen.load(Ordering::SeqCst), 2);
    assert_eq!(harness.memory.field_count().await, 2);

    let catalog = harness.state.catalog().read().await;
    assert_eq!(catalog.len(), 3);
    assert!(catalog.get(FieldId(900)).is_some());
    assert!(catalog.get(FieldId(3)).is_none());
}

#[tokio::test]
async fn lookups_above_the_query_cap_are_chunked() {
    let harness = Harness::new().await;
    for id in 0..40 {
        harness.memory.seed_field(&field(id)).await.unwrap();
    }
    let store = harness.state.field_store().await.unwrap();
    let ids: Vec<FieldId> = (0..65).map(FieldId).collect();

    let direct = store.find_fields_by_ids(ids.clone()).await.unwrap_err();
    assert!(matches!(direct, StorageError::LimitExceeded { limit: 30, requested: 65, .. }));

    let found = fields_by_ids(store.as_ref(), ids, 30).await.unwrap();
    assert_eq!(found.len(), 40);
}

#[tokio::test]
async fn submitted_field_gets_minted_id_and_placeholder_photo() {
    let harness = Harness::new().await;
    let mut events = harness.state.public_sse().subscribe();

    let submission = FieldSubmission {
        name: "  Backyard Cage ".into(),
        position: Position::new(55.7, 37.6),
        surface: SurfaceType::Rubber,
        lighting: true,
        size: FieldSize::Small,
        photo: None,
    };
    let field = catalog_service::submit_field(&harness.state, submission)
        .await
        .unwrap();

    assert_eq!(field.id, FieldId(to_millis(t0())));
    assert_eq!(field.name, "Backyard Cage");
    assert!(field.photo.contains("unsplash"));
    assert!(field.photo.ends_with(&format!("sig={}", field.id)));
    assert!(harness.state.catalog().read().await.get(field.id).is_some());

    let event = events.recv().await.unwrap();
    assert_eq!(event.event.as_deref(), Some("field.updated"));
}

fn submission(name: &str) -> FieldSubmission {
    FieldSubmission {
        name: name.into(),
        position: Position::new(55.7, 37.6),
        surface: SurfaceType::Grass,
        lighting: false,
        size: FieldSize::Medium,
        photo: Some("https://photos.example.com/own.jpg".into()),
    }
}

#[tokio::test]
async fn submissions_in_the_same_millisecond_get_distinct_ids() {
    let harness = Harness::new().await;

    let (first, second) = tokio::join!(
        catalog_service::submit_field(&harness.state, submission("North Cage")),
        catalog_service::submit_field(&harness.state, submission("South Cage")),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_ne!(first.id, second.id);
    assert_eq!(harness.memory.field_count().await, 2);
    let mut names = vec![
        harness.stored_field(first.id.0).await.unwrap().name,
        harness.stored_field(second.id.0).await.unwrap().name,
    ];
    names.sort();
    assert_eq!(names, vec!["North Cage", "South Cage"]);

    let third = catalog_service::submit_field(&harness.state, submission("East Cage"))
        .await
        .unwrap();
    assert_eq!(third.id, FieldId(to_millis(t0()) + 2));
}

#[tokio::test]
async fn submission_never_overwrites_an_existing_field() {
    let harness = Harness::new().await;
    let mut taken = field(to_millis(t0()));
    taken.name = "Already Here".into();
    harness.memory.seed_field(&taken).await.unwrap();

    let submitted = catalog_service::submit_field(&harness.state, submission("Newcomer"))
        .await
        .unwrap();

    assert_eq!(submitted.id, FieldId(to_millis(t0()) + 1));
    assert_eq!(harness.stored_field(taken.id.0).await.unwrap().name, "Already Here");
    assert_eq!(harness.stored_field(submitted.id.0).await.unwrap().name, "Newcomer");
}

#[tokio::test]
async fn late_search_does_not_roll_back_a_check_in() {
    let flaky = FlakyStore::new(MemoryFieldStore::new());
    let harness = Harness::build(
        AppConfig::default(),
        FakeGeodata::with(vec![node(42, 55.76, 37.62, &[("name", "Arena")])]),
        Vec::new(),
        Some(flaky.clone()),
    )
    .await;
    let mut stored = field(42);
    stored.photo = "https://photos.example.com/arena.jpg".into();
    harness.memory.seed_field(&stored).await.unwrap();
    harness.memory.seed_player(&player("p1")).await.unwrap();

    let gate = flaky.arm_lookup_gate();
    let search = tokio::spawn({
        let state = harness.state.clone();
        async move { catalog_service::fetch_fields(&state, center(), 5_000.0).await }
    });

    // The search has read field 42 but not merged it yet.
    gate.reached.notified().await;
    presence_service::check_in(&harness.state, PlayerId::from("p1"), FieldId(42))
        .await
        .unwrap();
    gate.release.notify_one();
    let outcome = search.await.unwrap().unwrap();

    let catalog = harness.state.catalog().read().await;
    let cached = catalog.get(FieldId(42)).unwrap();
    assert_eq!(cached.players.len(), 1);
    assert_eq!(cached.players[0].player_id, PlayerId::from("p1"));
    assert_eq!(catalog.version(FieldId(42)), Some(2));
    assert_eq!(outcome.fields[0].players.len(), 1);
}

#[tokio::test]
async fn nearby_filters_the_cached_catalog() {
    let harness = Harness::with_geodata(FakeGeodata::with(elements()), Vec::new()).await;
    let mut fan = player("fan");
    fan.favorite_fields = vec![FieldId(2)];
    harness.memory.seed_player(&fan).await.unwrap();
    catalog_service::fetch_fields(&harness.state, center(), 5_000.0)
        .await
        .unwrap();

    let lit = FieldFilter {
        lit_only: true,
        ..FieldFilter::default()
    };
    let found = catalog_service::nearby(&harness.state, center(), 5_000.0, lit, None)
        .await
        .unwrap();
    assert_eq!(found.iter().map(|f| f.id).collect::<Vec<_>>(), vec![FieldId(1)]);

    let favorites = catalog_service::nearby(
        &harness.state,
        center(),
        5_000.0,
        FieldFilter::default(),
        Some(PlayerId::from("fan")),
    )
    .await
    .unwrap();
    assert_eq!(favorites.iter().map(|f| f.id).collect::<Vec<_>>(), vec![FieldId(2)]);
}

#[tokio::test]
async fn degraded_mode_rejects_searches() {
    let harness = Harness::with_geodata(FakeGeodata::with(elements()), Vec::new()).await;
    harness.state.clear_field_store().await;

    let err = catalog_service::fetch_fields(&harness.state, center(), 5_000.0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Degraded));
    assert_eq!(harness.geodata.calls.load(Ordering::SeqCst), 0);
}
