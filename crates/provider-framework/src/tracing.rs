//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter filtered by
//! `RUST_LOG`. Module paths are hidden (`with_target(false)`); every engine event carries
//! a `resource_type` or `subject` field instead.
//!
//! ## What gets traced
//!
//! - **Lifecycle calls**: one span per create/read/update/delete with `resource_type` and `id`.
//! - **Polling**: `Waiting`, `Pending` (debug), `Reached`, `Gone`, `Timed out`, with
//!   `status`, `attempts` and `elapsed_ms`.
//! - **Merges**: fields where remote drift was surfaced.
//!
//! ```bash
//! RUST_LOG=info cargo run -p provider-sample     # one line per milestone
//! RUST_LOG=debug cargo run -p provider-sample    # every poll attempt
//! RUST_LOG=provider_framework::poller=debug,info cargo run -p provider-sample
//! ```
//!
//! With `RUST_LOG=info` a create through an operation reads:
//!
//! ```text
//! INFO create: Operation accepted operation=Create/op-1 resource_type="kms"
//! INFO create: Reached subject="kms" status="done" attempts=3 elapsed_ms=2000
//! INFO create: Reached subject="kms" status="READY" attempts=1 elapsed_ms=0
//! INFO create: Created id=kms-1
//! ```

/// Initializes the global subscriber. Panics if one is already installed.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

/// Like [`setup_tracing`], but a no-op when a subscriber is already installed (tests).
pub fn try_setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init();
}
