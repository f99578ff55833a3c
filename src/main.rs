//! wirechat: a broadcast chat server and client
//!
//! Both sides run on the same single-threaded non-blocking reactor:
//! - `wirechat serve` multiplexes every client on one thread and fans
//!   each decoded message out to all of them
//! - `wirechat connect` drives one socket from the reactor while a
//!   console thread feeds typed lines in through a channel and waker
//!
//! Messages travel as two length-prefixed UTF-8 frames (login, text),
//! decoded incrementally so frames may split across any number of
//! socket reads.

mod buffer;
mod codec;
mod config;
mod reactor;

use config::{Config, Mode};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match config.mode.clone() {
        Mode::Serve { listen } => {
            info!(%listen, "Starting wirechat server");
            reactor::server::run(&config, &listen)?;
        }
        Mode::Connect { login, addr } => {
            info!(%addr, %login, "Starting wirechat client");
            reactor::client::run(&config, &login, &addr)?;
        }
    }

    Ok(())
}
