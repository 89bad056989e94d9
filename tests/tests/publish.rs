mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;

    use mock_broker::{Behavior, MockBroker};
    use mqbench::prelude::*;
    use mqbench::types::StopReason;
    use std::num::NonZeroU32;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(10_000)]
    async fn fixed_latency_fleet() -> anyhow::Result<()> {
        init();

        let latency = Duration::from_millis(20);
        let broker = MockBroker::new();
        let connector = broker.connector(Behavior {
            publish_latency: latency,
            ..Default::default()
        });

        let mut config = config(Mode::Publish, 5, 100);
        config.payload_size = 64;
        let meta = metadata(&config);

        let run = ClientPool::new(config, connector).run().await?;
        let totals = run.aggregate(&meta)?;

        assert_eq!(totals.successes, 500);
        assert_eq!(totals.failures, 0);
        assert_eq!(totals.ratio, 1.);
        assert_eq!(totals.msg_per_client_mean, 100.);
        assert_eq!(broker.total_published(), 500);

        for result in &run.results {
            assert_eq!(result.successes, 100);
            assert_eq!(result.stop_reason, StopReason::Completed);
            assert!((result.msg_time_mean - 20.).abs() < 1., "{}", result.msg_time_mean);
            assert!(result.msg_time_std < 1.);
        }

        // 100 sequential publishes of 20ms each.
        assert!(totals.total_run_time >= 2. && totals.total_run_time < 2.2);
        assert!((totals.total_msgs_per_sec - 250.).abs() < 25.);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn single_message_has_no_spread() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let connector = broker.connector(Behavior {
            publish_latency: Duration::from_millis(7),
            ..Default::default()
        });

        let run = ClientPool::new(config(Mode::Publish, 1, 1), connector)
            .run()
            .await?;
        let result = &run.results[0];

        assert_eq!(result.successes, 1);
        assert_eq!(result.msg_time_min, result.msg_time_max);
        assert_eq!(result.msg_time_std, 0.);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_spread_over_topics() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let mut config = config(Mode::Publish, 6, 10);
        config.topics = 3;
        config.topic_prefix = "/bench/".to_string();

        ClientPool::new(config, broker.connector(Behavior::default()))
            .run()
            .await?;

        for topic in ["/bench/0", "/bench/1", "/bench/2"] {
            assert_eq!(broker.published(topic), 20, "{topic}");
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_fleet_runs_for_duration() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let connector = broker.connector(Behavior {
            publish_latency: Duration::from_millis(50),
            ..Default::default()
        });

        let mut config = config(Mode::Publish, 3, 0);
        config.duration = Duration::from_secs(5);
        let meta = metadata(&config);

        let run = ClientPool::new(config, connector).run().await?;
        let totals = run.aggregate(&meta)?;

        assert!(run
            .results
            .iter()
            .all(|r| r.stop_reason == StopReason::Duration));
        assert!(totals.successes >= 290 && totals.successes <= 300);
        assert!(totals.client_run_time_min >= 5.);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn credentials_and_client_ids_reach_the_broker() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let mut config = config(Mode::Publish, 2, 1);
        config.username = Some("bench".to_string());
        config.password = Some("secret".to_string());
        config.client_id_prefix = "mqtt-benchmark-abc".to_string();

        ClientPool::new(config, broker.connector(Behavior::default()))
            .run()
            .await?;

        let mut ids: Vec<String> = broker
            .connections()
            .into_iter()
            .map(|opts| {
                assert_eq!(
                    opts.credentials,
                    Some(("bench".to_string(), "secret".to_string()))
                );
                opts.client_id
            })
            .collect();
        ids.sort();
        assert_eq!(ids, ["mqtt-benchmark-abc-pub-0", "mqtt-benchmark-abc-pub-1"]);
        Ok(())
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn rate_limited_publisher() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let mut config = config(Mode::Publish, 1, 40);
        config.rate = NonZeroU32::new(20);

        let run = ClientPool::new(config, broker.connector(Behavior::default()))
            .run()
            .await?;
        let result = &run.results[0];

        assert_eq!(result.successes, 40);
        // The first second's worth goes out as a burst, the rest is paced.
        assert!(result.run_time >= 0.9, "{}", result.run_time);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn broker_failures_lower_the_ratio() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let connector = broker.connector(Behavior {
            fail_publish_every: Some(10),
            ..Default::default()
        });

        let config = config(Mode::Publish, 2, 50);
        let meta = metadata(&config);
        let totals = ClientPool::new(config, connector)
            .run()
            .await?
            .aggregate(&meta)?;

        assert_eq!(totals.successes, 90);
        assert_eq!(totals.failures, 10);
        assert!((totals.ratio - 0.9).abs() < 1e-9);
        Ok(())
    }
}
