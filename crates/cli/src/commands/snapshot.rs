//! Account snapshot commands.
//!
//! # Usage
//!
//! ```bash
//! vitrine snapshot list
//! vitrine snapshot show --email someone@example.com
//! vitrine snapshot clear --email someone@example.com
//! ```

use super::{CliError, Session};

#[allow(clippy::print_stdout)]
pub fn list(session: &Session) -> Result<(), CliError> {
    for account in session.engine.snapshots().accounts()? {
        println!("{account}");
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
pub fn show(session: &Session, email: &str) -> Result<(), CliError> {
    match session.engine.snapshots().load(email) {
        Some(snapshot) => {
            let rendered = serde_json::to_string_pretty(&snapshot)
                .map_err(vitrine_sync::storage::StorageError::from)?;
            println!("{rendered}");
        }
        None => println!("No snapshot for {}", email.trim()),
    }
    Ok(())
}

pub fn clear(session: &Session, email: &str) -> Result<(), CliError> {
    session.engine.clear_account_data(email)?;
    tracing::info!(email = email.trim(), "Account data cleared");
    Ok(())
}
