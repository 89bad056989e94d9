//! Runs against a real MQTT broker, `MQBENCH_BROKER` or `tcp://localhost:1883`.
#![cfg(feature = "integration")]

mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;

    use mqbench::prelude::*;
    use mqbench::types::StopReason;
    use mqbench_runtime::mqtt::MqttConnector;
    use std::time::Duration;

    fn broker_config(name: &str, mode: Mode, clients: usize, count: u64) -> RunConfig {
        let mut config = config(mode, clients, count);
        config.broker_url =
            std::env::var("MQBENCH_BROKER").unwrap_or_else(|_| "tcp://localhost:1883".to_string());
        config.client_id_prefix = format!("mqbench-it-{name}-{}", std::process::id());
        config.connect_timeout = Duration::from_secs(5);
        config
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn publish_qos1() -> anyhow::Result<()> {
        init();

        let mut config = broker_config("publish", Mode::Publish, 2, 50);
        config.topic_prefix = "/mqbench-it/pub/".to_string();
        let meta = metadata(&config);

        let totals = ClientPool::new(config, MqttConnector::new())
            .run()
            .await?
            .aggregate(&meta)?;

        assert_eq!(totals.successes, 100);
        assert_eq!(totals.ratio, 1.);
        assert!(totals.msg_time_mean > 0.);
        Ok(())
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn subscribers_receive_published_messages() -> anyhow::Result<()> {
        init();

        let mut sub_config = broker_config("roundtrip", Mode::Subscribe, 2, 20);
        sub_config.topic_prefix = "/mqbench-it/roundtrip/".to_string();
        sub_config.topics = 2;
        sub_config.idle_timeout = Duration::from_secs(5);

        let mut pub_config = sub_config.clone();
        pub_config.mode = Mode::Publish;
        pub_config.count = 20;

        let subscribers = tokio::spawn(ClientPool::new(sub_config, MqttConnector::new()).run());
        // Subscriptions are acknowledged well within this.
        tokio::time::sleep(Duration::from_secs(1)).await;

        ClientPool::new(pub_config, MqttConnector::new())
            .run()
            .await?;
        let run = subscribers.await??;

        for result in &run.results {
            assert_eq!(result.successes, 20);
            assert_eq!(result.stop_reason, StopReason::Completed);
        }
        Ok(())
    }
}
