//! Removed lines stay removed until the backend confirms the delete.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use vitrine_core::{ProductId, ProductType};
use vitrine_integration_tests::{FakeBackend, count, engine, identity};
use vitrine_sync::{AddToCart, AddToWishlist, GuestPolicy, LineRef, WishlistRef};

#[tokio::test]
async fn test_refresh_does_not_restore_line_whose_delete_failed() {
    let backend = FakeBackend::new();
    let (engine, _store) = engine(GuestPolicy::RequireLogin, &backend);
    engine.login(identity("buyer@example.com")).unwrap();
    engine.init();

    let line = LineRef::new(ProductId::new(1), ProductType::Bags);
    engine
        .cart()
        .add(AddToCart::new(ProductId::new(1), ProductType::Bags, 1))
        .unwrap()
        .await
        .unwrap();

    backend.set_failing(true);
    engine.cart().remove(&line).await.unwrap_err();
    assert_eq!(backend.cart_lines().len(), 1);

    backend.set_failing(false);
    engine.cart().refresh().await.unwrap();

    assert!(engine.cart().is_empty());
    assert_eq!(count(&backend.calls().remove_cart_item), 2);
    assert!(backend.cart_lines().is_empty());

    // Settled; nothing left to retry
    engine.cart().refresh().await.unwrap();
    assert!(engine.cart().is_empty());
    assert_eq!(count(&backend.calls().remove_cart_item), 2);
}

#[tokio::test]
async fn test_remove_during_add_deletes_the_backend_line() {
    let backend = FakeBackend::new().with_latency(Duration::from_millis(30));
    let (engine, _store) = engine(GuestPolicy::RequireLogin, &backend);
    engine.login(identity("buyer@example.com")).unwrap();
    engine.init();

    let adding = engine
        .cart()
        .add(AddToCart::new(ProductId::new(3), ProductType::Shoes, 2))
        .unwrap();
    let removing = engine
        .cart()
        .remove(&LineRef::new(ProductId::new(3), ProductType::Shoes));
    assert!(removing.is_settled());

    adding.await.unwrap();

    assert!(engine.cart().is_empty());
    assert!(backend.cart_lines().is_empty());
    assert_eq!(count(&backend.calls().remove_cart_item), 1);

    engine.cart().refresh().await.unwrap();
    assert!(engine.cart().is_empty());
}

#[tokio::test]
async fn test_adding_again_lifts_the_tombstone() {
    let backend = FakeBackend::new();
    let (engine, _store) = engine(GuestPolicy::RequireLogin, &backend);
    engine.login(identity("buyer@example.com")).unwrap();
    engine.init();

    let request = AddToCart::new(ProductId::new(2), ProductType::Clothing, 1);
    engine.cart().add(request.clone()).unwrap().await.unwrap();

    backend.set_failing(true);
    engine
        .cart()
        .remove(&LineRef::new(ProductId::new(2), ProductType::Clothing))
        .await
        .unwrap_err();

    backend.set_failing(false);
    engine.cart().add(request.clone()).unwrap().await.unwrap();
    engine.cart().refresh().await.unwrap();

    assert_eq!(engine.cart().len(), 1);
    assert!(engine.cart().get(&request.key()).is_some());
    assert_eq!(count(&backend.calls().remove_cart_item), 1);
}

#[tokio::test]
async fn test_failed_clear_is_retried_line_by_line_on_refresh() {
    let backend = FakeBackend::new();
    let (engine, _store) = engine(GuestPolicy::RequireLogin, &backend);
    engine.login(identity("buyer@example.com")).unwrap();
    engine.init();

    for id in [1, 2] {
        engine
            .cart()
            .add(AddToCart::new(ProductId::new(id), ProductType::Bags, 1))
            .unwrap()
            .await
            .unwrap();
    }

    backend.set_failing(true);
    engine.cart().clear().await.unwrap_err();

    backend.set_failing(false);
    engine.cart().refresh().await.unwrap();

    assert!(engine.cart().is_empty());
    assert!(backend.cart_lines().is_empty());
    assert_eq!(count(&backend.calls().remove_cart_item), 2);
}

#[tokio::test]
async fn test_wishlist_refresh_does_not_restore_removed_entry() {
    let backend = FakeBackend::new();
    let (engine, _store) = engine(GuestPolicy::RequireLogin, &backend);
    engine.login(identity("buyer@example.com")).unwrap();
    engine.init();

    let product = ProductId::new(8);
    engine
        .wishlist()
        .add(AddToWishlist::new(product, ProductType::Shoes))
        .unwrap()
        .await
        .unwrap();

    backend.set_failing(true);
    engine
        .wishlist()
        .remove(&WishlistRef::new(product, ProductType::Shoes))
        .await
        .unwrap_err();

    backend.set_failing(false);
    engine.wishlist().refresh().await.unwrap();

    assert!(!engine.wishlist().contains(ProductType::Shoes, product));
    assert!(backend.wishlist_lines().is_empty());
    assert_eq!(count(&backend.calls().remove_wishlist_item), 2);
}

#[tokio::test]
async fn test_tombstones_follow_the_account_snapshot() {
    let backend = FakeBackend::new();
    let (engine, _store) = engine(GuestPolicy::RequireLogin, &backend);
    engine.login(identity("ana@example.com")).unwrap();
    engine.init();

    let line = LineRef::new(ProductId::new(4), ProductType::Bags);
    engine
        .cart()
        .add(AddToCart::new(ProductId::new(4), ProductType::Bags, 1))
        .unwrap()
        .await
        .unwrap();

    backend.set_failing(true);
    engine.cart().remove(&line).await.unwrap_err();
    engine.logout().unwrap();

    let snapshot = engine.snapshots().load("ana@example.com").unwrap();
    assert!(snapshot.cart.items.is_empty());
    assert!(snapshot.cart.removed.contains_key(&line.key()));

    backend.set_failing(false);
    engine.login(identity("ana@example.com")).unwrap();
    engine.cart().refresh().await.unwrap();

    assert!(engine.cart().is_empty());
    assert!(backend.cart_lines().is_empty());
    engine.logout().unwrap();
    let snapshot = engine.snapshots().load("ana@example.com").unwrap();
    assert!(snapshot.cart.removed.is_empty());
}
