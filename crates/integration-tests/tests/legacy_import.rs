//! Importing the legacy flat cart at startup.

#![allow(clippy::unwrap_used)]

use vitrine_core::{CompositeKey, ProductId, ProductType};
use vitrine_integration_tests::{FakeBackend, count, engine, identity};
use vitrine_sync::GuestPolicy;
use vitrine_sync::storage::keys;

#[tokio::test]
async fn test_legacy_cart_is_pushed_for_signed_in_account() {
    let backend = FakeBackend::new();
    let (engine, store) = engine(GuestPolicy::RequireLogin, &backend);
    store
        .set(
            keys::LEGACY_CART,
            r#"[{"id":5,"qty":2},{"id":7,"qty":1,"productType":"bolsas"},{"id":8,"qty":0}]"#,
        )
        .unwrap();

    engine.login(identity("ana@example.com")).unwrap();
    let migration = engine.init();
    assert_eq!(migration.entries, 3);
    migration.reconciliation.await.unwrap();

    assert!(store.get(keys::LEGACY_CART).unwrap().is_none());
    assert_eq!(count(&backend.calls().add_cart_item), 2);
    assert_eq!(backend.cart_lines().len(), 2);

    let clothing = engine
        .cart()
        .get(&CompositeKey::for_line(
            ProductType::LEGACY_DEFAULT,
            ProductId::new(5),
            None,
        ))
        .unwrap();
    assert_eq!(clothing.quantity, 2);
    assert!(clothing.remote_id.is_some());

    let snapshot = engine.snapshots().load("ana@example.com").unwrap();
    assert_eq!(snapshot.cart.items.len(), 2);
}

#[tokio::test]
async fn test_legacy_cart_stays_local_for_guests() {
    let backend = FakeBackend::new();
    let (engine, store) = engine(GuestPolicy::RequireLogin, &backend);
    store
        .set(keys::LEGACY_CART, r#"[{"id":5,"qty":2},{"id":5,"qty":3}]"#)
        .unwrap();

    let migration = engine.init();
    assert!(migration.reconciliation.is_settled());

    assert_eq!(engine.cart().len(), 1);
    assert_eq!(engine.cart().item_count(), 5);
    assert_eq!(count(&backend.calls().add_cart_item), 0);
    assert!(store.get(keys::ANONYMOUS_CART).unwrap().is_some());
}

#[tokio::test]
async fn test_malformed_legacy_cart_is_removed() {
    let backend = FakeBackend::new();
    let (engine, store) = engine(GuestPolicy::RequireLogin, &backend);
    store.set(keys::LEGACY_CART, "{not json").unwrap();

    let migration = engine.init();
    assert_eq!(migration.entries, 0);
    assert!(engine.cart().is_empty());
    assert!(store.get(keys::LEGACY_CART).unwrap().is_none());
}

#[tokio::test]
async fn test_init_imports_only_once() {
    let backend = FakeBackend::new();
    let (engine, store) = engine(GuestPolicy::RequireLogin, &backend);
    store
        .set(keys::LEGACY_CART, r#"[{"id":1,"qty":1}]"#)
        .unwrap();

    assert_eq!(engine.init().entries, 1);
    store
        .set(keys::LEGACY_CART, r#"[{"id":1,"qty":1}]"#)
        .unwrap();
    assert_eq!(engine.init().entries, 0);
    assert_eq!(engine.cart().item_count(), 1);
}
