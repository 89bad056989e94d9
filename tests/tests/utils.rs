use mqbench::prelude::*;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        // Several test binaries may race for the global subscriber.
        let _ = FmtSubscriber::builder()
            .with_env_filter("mqbench=debug,mock_broker=debug")
            .try_init();
    });
}

#[allow(unused)]
pub fn config(mode: Mode, clients: usize, count: u64) -> RunConfig {
    let mut config = RunConfig::new(mode);
    config.run_id = "integration".to_string();
    config.clients = clients;
    config.count = count;
    config.duration = Duration::from_secs(60);
    config
}

#[allow(unused)]
pub fn metadata(config: &RunConfig) -> RunMetadata {
    RunMetadata::new(config, "test-instance")
}
