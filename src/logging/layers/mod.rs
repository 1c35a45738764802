pub mod console;
pub mod file;

use tracing_subscriber::registry::Registry;
use tracing_subscriber::Layer;

/// Every sink is boxed against the bare registry so sinks can be toggled at runtime.
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;
