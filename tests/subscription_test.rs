use ride_relay::auth::Role;
use ride_relay::core::subscription::SubscriptionIndex;

/// Forward/reverse index symmetry: s ∈ subjects_of(w) iff w ∈ watchers_of(s)
async fn assert_symmetric(index: &SubscriptionIndex, watchers: &[&str], subjects: &[&str]) {
    for watcher in watchers {
        for subject in index.subjects_of(watcher).await {
            assert!(
                index.watchers_of(&subject).await.contains(*watcher),
                "forward index missing edge {} -> {}",
                watcher,
                subject
            );
        }
    }
    for subject in subjects {
        for watcher in index.watchers_of(subject).await {
            assert!(
                index.subjects_of(&watcher).await.contains(*subject),
                "reverse index missing edge {} -> {}",
                watcher,
                subject
            );
        }
    }
}

#[tokio::test]
async fn test_symmetry_holds_across_operation_sequences() {
    let index = SubscriptionIndex::new(Role::Police);
    let watchers = ["p1", "p2", "p3"];
    let subjects = ["r1", "r2", "r3"];

    index.subscribe("p1", Role::Police, "r1").await.unwrap();
    assert_symmetric(&index, &watchers, &subjects).await;

    index.subscribe("p1", Role::Police, "r2").await.unwrap();
    index.subscribe("p2", Role::Admin, "r1").await.unwrap();
    index.subscribe("p3", Role::SuperAdmin, "r3").await.unwrap();
    assert_symmetric(&index, &watchers, &subjects).await;

    index.unsubscribe("p1", "r1").await;
    assert_symmetric(&index, &watchers, &subjects).await;

    index.clear_all_for_watcher("p2").await;
    assert_symmetric(&index, &watchers, &subjects).await;

    index.clear_all_for_subject("r3").await;
    assert_symmetric(&index, &watchers, &subjects).await;

    // p1 still watches r2, everything else is gone
    assert_eq!(index.subjects_of("p1").await.len(), 1);
    assert_eq!(index.stats().await.subscription_links, 1);
}

#[tokio::test]
async fn test_double_subscribe_equals_single_subscribe() {
    let reference = SubscriptionIndex::new(Role::Police);
    reference.subscribe("p1", Role::Police, "r1").await.unwrap();

    let index = SubscriptionIndex::new(Role::Police);
    index.subscribe("p1", Role::Police, "r1").await.unwrap();
    index.subscribe("p1", Role::Police, "r1").await.unwrap();

    assert_eq!(
        index.watchers_of("r1").await,
        reference.watchers_of("r1").await
    );
    assert_eq!(
        index.subjects_of("p1").await,
        reference.subjects_of("p1").await
    );
    assert_eq!(index.stats().await, reference.stats().await);
}

#[tokio::test]
async fn test_denied_subscribe_changes_nothing() {
    let index = SubscriptionIndex::new(Role::Police);
    index.subscribe("p1", Role::Police, "r1").await.unwrap();
    let before = index.stats().await;

    assert!(index.subscribe("v1", Role::Volunteer, "r1").await.is_err());
    assert!(index.subscribe("v1", Role::Rider, "r2").await.is_err());

    assert_eq!(index.stats().await, before);
    assert!(index.subjects_of("v1").await.is_empty());
    assert_symmetric(&index, &["p1", "v1"], &["r1", "r2"]).await;
}

#[tokio::test]
async fn test_cleanup_totality_for_dual_role_user() {
    // "a1" is simultaneously a watcher of others and a subject watched by
    // others; both directions must unwind
    let index = SubscriptionIndex::new(Role::Police);
    index.subscribe("a1", Role::Admin, "r1").await.unwrap();
    index.subscribe("a1", Role::Admin, "r2").await.unwrap();
    index.subscribe("p1", Role::Police, "a1").await.unwrap();
    index.subscribe("p2", Role::Police, "a1").await.unwrap();

    index.clear_all_for_watcher("a1").await;
    index.clear_all_for_subject("a1").await;

    assert!(index.subjects_of("a1").await.is_empty());
    assert!(index.watchers_of("a1").await.is_empty());
    assert!(index.watchers_of("r1").await.is_empty());
    assert!(index.watchers_of("r2").await.is_empty());
    assert_eq!(index.subjects_of("p1").await.len(), 0);
    assert_symmetric(&index, &["a1", "p1", "p2"], &["a1", "r1", "r2"]).await;
}

#[tokio::test]
async fn test_watcher_count_tracks_edges() {
    let index = SubscriptionIndex::new(Role::Police);
    assert_eq!(index.watcher_count("r1").await, 0);

    index.subscribe("p1", Role::Police, "r1").await.unwrap();
    index.subscribe("p2", Role::Police, "r1").await.unwrap();
    assert_eq!(index.watcher_count("r1").await, 2);

    index.unsubscribe("p1", "r1").await;
    assert_eq!(index.watcher_count("r1").await, 1);

    index.unsubscribe("p2", "r1").await;
    assert_eq!(index.watcher_count("r1").await, 0);
}
