//! Entry point: parse configuration, set up logging, run one operation.

use log::error;
use rtr_relay::config::Config;
use rtr_relay::log::Logger;
use rtr_relay::operation::Operation;

fn main() {
    if Logger::init().is_err() {
        std::process::exit(1);
    }

    let config = Config::create();

    if let Err(err) = Logger::switch_logging(&config) {
        let _ = err;
        std::process::exit(1);
    }

    let operation = if config.once {
        Operation::Validate
    } else {
        Operation::Server
    };

    if let Err(err) = operation.run(config) {
        error!("Fatal error, exiting.");
        std::process::exit(err.exit_code());
    }
}
