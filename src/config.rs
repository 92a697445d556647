use tracing_subscriber::EnvFilter;

/// Library-level constants
pub const APP_NAME: &str = "ledger-ocr";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "ledger_ocr=info"
}

/// Install a `fmt` subscriber for binaries and tests that embed this crate.
///
/// Library code never calls this. Safe to call more than once: a subscriber
/// that is already installed wins and the call is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter())),
        )
        .try_init();

    tracing::debug!("{} v{} tracing initialized", APP_NAME, APP_VERSION);
}
