use lingua_relay::config::ServerConfig;
use lingua_relay::logger::init_logger;
use lingua_relay::server::run_server;

/// Entry point:
/// 1. Read the config file named on the command line, or fall back to defaults.
/// 2. Set up logging.
/// 3. Build a Tokio runtime and run the relay until shutdown.
fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => match ServerConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };

    let logger = init_logger("lingua_relay", &config.logger);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("relay-server-worker")
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            logger.error(&format!("Failed to build Tokio runtime: {}", e));
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run_server(config, logger.clone())) {
        logger.error(&format!("Relay server error: {}", e));
        std::process::exit(1);
    }
}
