//! Legacy cart import.
//!
//! The import runs on every start; this command only reports what it found.
//!
//! # Usage
//!
//! ```bash
//! vitrine migrate
//! ```

use super::Session;

#[allow(clippy::print_stdout)]
pub fn report(session: &Session) {
    if session.legacy_entries == 0 {
        println!("No legacy cart to import");
    } else {
        println!(
            "Imported {} legacy cart entries ({} lines now in cart)",
            session.legacy_entries,
            session.engine.cart().len()
        );
    }
}
