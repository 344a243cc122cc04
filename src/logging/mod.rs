use slog::{o, Drain, Logger};
use slog_async::Async;
use slog_term::{FullFormat, PlainDecorator, TermDecorator};

/// Configuration for setting up the logger
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub async_buffer_size: usize,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            async_buffer_size: 1024,
            use_color: true,
        }
    }
}

/// Sets up the root audit logger
pub fn setup_logger(config: LoggerConfig) -> Logger {
    let decorator = {
        let builder = TermDecorator::new();
        let builder = if config.use_color {
            builder.force_color()
        } else {
            builder
        };
        builder.build()
    };

    let drain = FullFormat::new(decorator).build().fuse();

    let drain = Async::new(drain)
        .chan_size(config.async_buffer_size)
        .build()
        .fuse();

    Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}

/// Logger that writes plain lines to stderr synchronously. Used by tests.
pub fn plain_logger() -> Logger {
    let decorator = PlainDecorator::new(std::io::stderr());
    let drain = FullFormat::new(decorator).build();
    let drain = std::sync::Mutex::new(drain).fuse();
    Logger::root(drain, o!())
}

/// Child logger tagged with a component name
pub fn component_logger(root: &Logger, component: &'static str) -> Logger {
    root.new(o!("component" => component))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_logger_accepts_records() {
        let root = plain_logger();
        let logger = component_logger(&root, "procurement_service");
        slog::info!(logger, "order transitioned"; "order_id" => "po-1", "to" => "sent");
    }
}
