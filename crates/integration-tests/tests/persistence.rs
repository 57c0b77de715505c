//! File-backed state surviving an engine restart.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use vitrine_core::{Price, ProductId, ProductType, SizeId};
use vitrine_integration_tests::{FakeBackend, identity, test_config};
use vitrine_sync::preferences::SizeStandard;
use vitrine_sync::storage::{FileStore, KeyValueStore};
use vitrine_sync::{AddToCart, AddToWishlist, GuestPolicy, SyncEngine};

fn open(dir: &std::path::Path, backend: &FakeBackend) -> SyncEngine<FakeBackend> {
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(dir).unwrap());
    SyncEngine::new(&test_config(GuestPolicy::Allow), store, Some(backend.clone()))
}

#[tokio::test]
async fn test_anonymous_cart_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new();

    let first = open(dir.path(), &backend);
    first.init();
    first
        .cart()
        .add(
            AddToCart::new(ProductId::new(5), ProductType::Shoes, 2)
                .with_size(SizeId::new(40))
                .with_title("Runner")
                .with_price(Price::from_cents(19_990)),
        )
        .unwrap()
        .await
        .unwrap();
    first.teardown().await;

    let second = open(dir.path(), &backend);
    second.init();
    let items = second.cart().items();
    let line = items.first().unwrap();
    assert_eq!(line.quantity, 2);
    assert_eq!(line.title.as_deref(), Some("Runner"));
    assert_eq!(second.cart().subtotal(), Price::from_cents(39_980));
}

#[tokio::test]
async fn test_account_snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new();

    let first = open(dir.path(), &backend);
    first.init();
    first.login(identity("ana@example.com")).unwrap();
    first
        .wishlist()
        .add(AddToWishlist::new(ProductId::new(3), ProductType::Bags).with_title("Tote"))
        .unwrap()
        .await
        .unwrap();
    first.logout().unwrap();

    let second = open(dir.path(), &backend);
    second.init();
    assert!(second.wishlist().is_empty());

    second.login(identity("ana@example.com")).unwrap();
    let items = second.wishlist().items();
    assert_eq!(items.first().unwrap().title.as_deref(), Some("Tote"));
    assert_eq!(
        second.snapshots().accounts().unwrap(),
        vec!["ana@example.com".to_string()]
    );
}

#[tokio::test]
async fn test_size_standard_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new();

    let first = open(dir.path(), &backend);
    first
        .preferences()
        .set(ProductId::new(9), SizeStandard::Eu)
        .unwrap();

    let second = open(dir.path(), &backend);
    assert_eq!(
        second.preferences().get(ProductId::new(9)),
        Some(SizeStandard::Eu)
    );
    assert_eq!(second.preferences().get(ProductId::new(10)), None);
}
