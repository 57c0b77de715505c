//! Login, logout and switching between accounts.

#![allow(clippy::unwrap_used)]

use vitrine_core::{ProductId, ProductType};
use vitrine_integration_tests::{FakeBackend, engine, identity};
use vitrine_sync::storage::{keys, read_json};
use vitrine_sync::{AddToCart, AddToWishlist, CartItem, GuestPolicy, SyncError};
use vitrine_sync::snapshot::SavedCollection;

#[tokio::test]
async fn test_switching_accounts_swaps_collections() {
    let backend = FakeBackend::new();
    let (engine, _store) = engine(GuestPolicy::RequireLogin, &backend);
    engine.init();

    engine.login(identity("ana@example.com")).unwrap();
    engine
        .cart()
        .add(AddToCart::new(ProductId::new(1), ProductType::Bags, 2))
        .unwrap()
        .await
        .unwrap();
    engine
        .wishlist()
        .add(AddToWishlist::new(ProductId::new(2), ProductType::Shoes))
        .unwrap()
        .await
        .unwrap();

    engine.login(identity("bea@example.com")).unwrap();
    assert!(engine.cart().is_empty());
    assert!(engine.wishlist().is_empty());

    engine
        .cart()
        .add(AddToCart::new(ProductId::new(3), ProductType::Clothing, 1))
        .unwrap()
        .await
        .unwrap();

    engine.login(identity("ana@example.com")).unwrap();
    assert_eq!(engine.cart().len(), 1);
    assert_eq!(engine.cart().item_count(), 2);
    assert!(engine.wishlist().contains(ProductType::Shoes, ProductId::new(2)));

    let bea = engine.snapshots().load("bea@example.com").unwrap();
    assert_eq!(bea.cart.items.len(), 1);
    assert!(bea.wishlist.items.is_empty());
}

#[tokio::test]
async fn test_logout_saves_snapshot_and_resets() {
    let backend = FakeBackend::new();
    let (engine, store) = engine(GuestPolicy::RequireLogin, &backend);
    engine.init();

    engine.login(identity("Ana@Example.com")).unwrap();
    engine
        .cart()
        .add(AddToCart::new(ProductId::new(1), ProductType::Bags, 1))
        .unwrap()
        .await
        .unwrap();

    engine.logout().unwrap();
    assert!(!engine.session().is_authenticated());
    assert!(engine.cart().is_empty());

    let anonymous: Option<SavedCollection<CartItem>> =
        read_json(store.as_ref(), keys::ANONYMOUS_CART);
    assert!(anonymous.is_none_or(|saved| saved.items.is_empty()));

    let snapshot = engine.snapshots().load("ana@example.com").unwrap();
    assert_eq!(snapshot.cart.items.len(), 1);
    assert!(snapshot.saved_at.is_some());

    // Guests may not add under the default policy
    let err = engine
        .cart()
        .add(AddToCart::new(ProductId::new(2), ProductType::Bags, 1))
        .unwrap_err();
    assert!(matches!(err, SyncError::AuthenticationRequired));
}

#[tokio::test]
async fn test_anonymous_items_are_dropped_on_login() {
    let backend = FakeBackend::new();
    let (engine, store) = engine(GuestPolicy::Allow, &backend);
    engine.init();

    engine
        .cart()
        .add(AddToCart::new(ProductId::new(1), ProductType::Bags, 1))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(engine.cart().len(), 1);

    engine.login(identity("ana@example.com")).unwrap();
    assert!(engine.cart().is_empty());
    assert!(store.get(keys::ANONYMOUS_CART).unwrap().is_none());
}

#[tokio::test]
async fn test_relogin_as_same_account_keeps_collections() {
    let backend = FakeBackend::new();
    let (engine, _store) = engine(GuestPolicy::RequireLogin, &backend);
    engine.init();

    engine.login(identity("ana@example.com")).unwrap();
    engine
        .cart()
        .add(AddToCart::new(ProductId::new(1), ProductType::Bags, 1))
        .unwrap()
        .await
        .unwrap();

    engine.login(identity(" ANA@example.com")).unwrap();
    assert_eq!(engine.cart().len(), 1);
}

#[tokio::test]
async fn test_clear_account_data_empties_active_account() {
    let backend = FakeBackend::new();
    let (engine, _store) = engine(GuestPolicy::RequireLogin, &backend);
    engine.init();

    engine.login(identity("ana@example.com")).unwrap();
    engine
        .wishlist()
        .add(AddToWishlist::new(ProductId::new(2), ProductType::Shoes))
        .unwrap()
        .await
        .unwrap();

    engine.clear_account_data("ana@example.com").unwrap();
    assert!(engine.wishlist().is_empty());
    assert!(engine.snapshots().load("ana@example.com").is_none());
}
