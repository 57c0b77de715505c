//! Cart commands.

use rust_decimal::Decimal;
use vitrine_core::{Price, ProductId, ProductType, SizeId};
use vitrine_sync::{AddToCart, LineRef};

use super::{CliError, Session, settle};

/// Cart line as given on the command line.
pub struct Line {
    pub product: i32,
    pub product_type: ProductType,
    pub size: Option<i32>,
}

impl Line {
    fn to_ref(&self) -> LineRef {
        let line = LineRef::new(ProductId::new(self.product), self.product_type);
        match self.size {
            Some(size) => line.with_size(SizeId::new(size)),
            None => line,
        }
    }
}

#[allow(clippy::print_stdout)]
pub fn list(session: &Session) {
    let cart = session.engine.cart();
    if cart.is_empty() {
        println!("Cart is empty");
        return;
    }

    for item in cart.items() {
        let price = item
            .line_total()
            .map_or_else(|| "-".to_string(), |total| total.to_string());
        println!(
            "{:<16} x{:<3} {:>10}  {}",
            item.key,
            item.quantity,
            price,
            item.title.as_deref().unwrap_or("")
        );
    }
    println!("{} items, subtotal {}", cart.item_count(), cart.subtotal());
}

pub async fn add(
    session: &Session,
    line: &Line,
    quantity: u32,
    title: Option<String>,
    price: Option<Decimal>,
) -> Result<(), CliError> {
    let mut request = AddToCart::new(ProductId::new(line.product), line.product_type, quantity);
    if let Some(size) = line.size {
        request = request.with_size(SizeId::new(size));
    }
    if let Some(title) = title {
        request = request.with_title(title);
    }
    if let Some(price) = price {
        request = request.with_price(Price::new(price));
    }

    let key = request.key();
    settle(session.engine.cart().add(request)?).await;
    tracing::info!(key = %key, "Added to cart");
    Ok(())
}

pub async fn increment(session: &Session, line: &Line) -> Result<(), CliError> {
    settle(session.engine.cart().increment(&line.to_ref())?).await;
    Ok(())
}

pub async fn decrement(session: &Session, line: &Line) -> Result<(), CliError> {
    settle(session.engine.cart().decrement(&line.to_ref())?).await;
    Ok(())
}

pub async fn remove(session: &Session, line: &Line) {
    settle(session.engine.cart().remove(&line.to_ref())).await;
}

pub async fn clear(session: &Session) {
    settle(session.engine.cart().clear()).await;
    tracing::info!("Cart cleared");
}
