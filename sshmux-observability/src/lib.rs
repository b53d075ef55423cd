pub mod tracing;

pub use self::tracing::{default_filter, init_tracing, TracingConfig};
