//! `novaforge poll`

use super::{load_dispatcher, print_json};
use anyhow::Result;
use nova_forge::PollOutcome;
use std::path::Path;

pub fn run(config: Option<&Path>) -> Result<()> {
    let dispatcher = load_dispatcher(config)?;
    match dispatcher.claim_next()? {
        PollOutcome::Claimed(work) => print_json(&work),
        PollOutcome::NoWork => {
            eprintln!("No queued jobs.");
            Ok(())
        }
    }
}
