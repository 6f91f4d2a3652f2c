//! Test support for callflow
//!
//! - [`InMemoryStore`] implements every repository trait over one shared
//!   state, with the same conditional-update semantics as the PostgreSQL
//!   repositories
//! - [`FakeProvider`] records placed calls and can be scripted to fail
//! - [`FixedClock`], [`RecordingEventSink`] and [`RecordingNotifier`] make
//!   time, events and end-call webhooks observable

pub mod clock;
pub mod events;
pub mod fixtures;
pub mod provider;
pub mod store;

pub use clock::FixedClock;
pub use events::{RecordingEventSink, RecordingNotifier};
pub use provider::FakeProvider;
pub use store::InMemoryStore;

/// Install a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
