//! Size-standard preference commands.

use vitrine_core::ProductId;
use vitrine_sync::preferences::SizeStandard;

use super::{CliError, Session};

#[allow(clippy::print_stdout)]
pub fn get(session: &Session, product: i32) {
    match session.engine.preferences().get(ProductId::new(product)) {
        Some(standard) => println!("{standard}"),
        None => println!("{} (default)", SizeStandard::default()),
    }
}

pub fn set(session: &Session, product: i32, standard: SizeStandard) -> Result<(), CliError> {
    session
        .engine
        .preferences()
        .set(ProductId::new(product), standard)?;
    Ok(())
}
