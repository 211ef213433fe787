//! What the process can be asked to do.
//!
//! This module owns the top-level `Operation` the command line selects,
//! and `main.rs` is left as the thin entry point that builds one and
//! runs it. Binding a socket and running an RTR accept loop isn't done
//! here; `Operation::Server` drives the validation loop that feeds
//! [`rtr::server::Handler`] sessions, which is the part actually owned
//! by this crate.

use std::thread;
use log::info;
use crate::collector::Collector;
use crate::config::Config;
use crate::dispatcher;
use crate::engine::Engine;
use crate::error::ExitError;
use crate::payload::SharedHistory;


//------------ Operation -------------------------------------------------------

/// What to do once configuration and logging are set up.
pub enum Operation {
    /// Run a single validation pass and exit.
    Validate,

    /// Validate repeatedly, publishing into a history an RTR front end can
    /// be driven from.
    Server,
}

impl Operation {
    pub fn run(self, config: Config) -> Result<(), ExitError> {
        let collector = Collector::new(&config)?;
        let engine = Engine::new(config.strict, config.stale, config.max_cert_depth);

        match self {
            Operation::Validate => {
                let table = dispatcher::validate(&config, &collector, &engine)?;
                info!("Validation complete: {} VRPs.", table.len());
                Ok(())
            }
            Operation::Server => {
                let history = SharedHistory::new(config.history_size);
                loop {
                    match dispatcher::validate_and_publish(
                        &config, &collector, &engine, &history,
                    ) {
                        Ok(()) => info!(
                            "Validation complete, serial now {}.",
                            history.current_serial()
                        ),
                        Err(_) => info!(
                            "Validation pass failed, keeping previous payload set."
                        ),
                    }
                    thread::sleep(config.refresh);
                }
            }
        }
    }
}
