//! Wishlist commands.

use vitrine_core::{ProductId, ProductType};
use vitrine_sync::{AddToWishlist, WishlistRef};

use super::{CliError, Session, settle};

#[allow(clippy::print_stdout)]
pub fn list(session: &Session) {
    let wishlist = session.engine.wishlist();
    if wishlist.is_empty() {
        println!("Wishlist is empty");
        return;
    }

    for item in wishlist.items() {
        println!("{:<16} {}", item.key, item.title.as_deref().unwrap_or(""));
    }
}

pub async fn add(
    session: &Session,
    product: i32,
    product_type: ProductType,
    title: Option<String>,
) -> Result<(), CliError> {
    let mut request = AddToWishlist::new(ProductId::new(product), product_type);
    if let Some(title) = title {
        request = request.with_title(title);
    }

    settle(session.engine.wishlist().add(request)?).await;
    Ok(())
}

pub async fn remove(session: &Session, product: i32, product_type: ProductType) {
    let entry = WishlistRef::new(ProductId::new(product), product_type);
    settle(session.engine.wishlist().remove(&entry)).await;
}

pub async fn clear(session: &Session) {
    settle(session.engine.wishlist().clear()).await;
}
