pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod providers;
pub mod proxy;
pub mod server;
pub mod tokens;
pub mod translate;
pub mod upstream;

pub use config::Config;
pub use error::{ProxyError, Result};
pub use logging::SharedLedger;
pub use server::{build_router, AppState};
