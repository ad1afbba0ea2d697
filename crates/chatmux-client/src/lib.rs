pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod multiplexer;

use tracing_subscriber::{fmt, EnvFilter};

pub use api::{ChatApi, FileUpload, HttpApi};
pub use config::ClientConfig;
pub use error::ClientError;
pub use events::ClientEvent;
pub use multiplexer::Multiplexer;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Call once, at startup.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("chatmux_client_lib=debug,chatmux_net=debug,chatmux_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
