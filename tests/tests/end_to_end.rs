mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;

    use mock_broker::{Behavior, MockBroker};
    use mqbench::prelude::*;
    use mqbench::types::StopReason;
    use mqbench_runtime::telemetry::{TelemetryConfig, TelemetryMode};
    use mqbench_runtime::BenchRuntime;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(10_000)]
    async fn publishers_feed_subscribers() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();

        let mut sub_config = config(Mode::Subscribe, 2, 50);
        sub_config.topics = 2;
        sub_config.idle_timeout = Duration::from_secs(5);
        let sub_meta = metadata(&sub_config);
        let subscribers = tokio::spawn(
            ClientPool::new(sub_config, broker.connector(Behavior::default())).run(),
        );
        broker.wait_for_subscribers("/test0", 1).await;
        broker.wait_for_subscribers("/test1", 1).await;

        let mut pub_config = config(Mode::Publish, 4, 25);
        pub_config.topics = 2;
        let pub_meta = metadata(&pub_config);
        let publishers = ClientPool::new(
            pub_config,
            broker.connector(Behavior {
                publish_latency: Duration::from_millis(2),
                ..Default::default()
            }),
        )
        .run()
        .await?;

        let subscribers = subscribers.await??;

        let pub_totals = publishers.aggregate(&pub_meta)?;
        let sub_totals = subscribers.aggregate(&sub_meta)?;

        assert_eq!(pub_totals.successes, 100);
        assert_eq!(sub_totals.successes, 100);
        assert_eq!(sub_totals.ratio, 1.);
        assert!(subscribers
            .results
            .iter()
            .all(|r| r.stop_reason == StopReason::Completed && r.successes == 50));

        // Subscribers never see latency.
        assert_eq!(sub_totals.msg_time_mean, 0.);
        assert!(pub_totals.msg_time_mean > 0.);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn runtime_report_document() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let mut config = config(Mode::Publish, 3, 10);
        config.run_id = "e2e-run".to_string();
        config.payload_size = 32;
        config.parallelism = 2;

        let report = BenchRuntime::new()
            .config(config)
            .instance("bench-host")
            .telemetry(TelemetryConfig {
                mode: TelemetryMode::Disabled,
                ..Default::default()
            })
            .run_with(broker.connector(Behavior {
                publish_latency: Duration::from_millis(4),
                ..Default::default()
            }))
            .await?;

        let json: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
        let runs = json["runs"].as_array().expect("runs array");
        assert_eq!(runs.len(), 3);
        for run in runs {
            assert!(run["id"].as_str().unwrap().starts_with("pub-"));
            assert_eq!(run["successes"], 10);
            assert_eq!(run["stop_reason"], "completed");
        }

        let totals = &json["totals"];
        assert_eq!(totals["run_id"], "e2e-run");
        assert_eq!(totals["run_instance"], "bench-host");
        assert_eq!(totals["run_type"], "pub");
        assert_eq!(totals["num_clients"], 3);
        assert_eq!(totals["dop"], 2);
        assert_eq!(totals["successes"], 30);
        assert_eq!(totals["ratio"], 1.);
        assert!((totals["msg_time_mean_mean"].as_f64().unwrap() - 4.).abs() < 0.5);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn refused_clients_still_report_under_reconnect() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let config = config(Mode::Publish, 2, 5);
        let meta = metadata(&config);

        let run = ClientPool::new(
            config,
            broker.connector(Behavior {
                refuse_connect: true,
                ..Default::default()
            }),
        )
        .run()
        .await?;

        assert!(run
            .results
            .iter()
            .all(|r| r.stop_reason == StopReason::Failed && r.total() == 0));
        let totals = run.aggregate(&meta)?;
        assert_eq!(totals.ratio, 0.);
        assert_eq!(totals.successes, 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn abort_policy_fails_the_run() {
        init();

        let broker = MockBroker::new();
        let mut config = config(Mode::Publish, 2, 5);
        config.error_policy = ErrorPolicy::Abort;

        let res = ClientPool::new(
            config,
            broker.connector(Behavior {
                fail_publish_every: Some(3),
                ..Default::default()
            }),
        )
        .run()
        .await;

        assert!(res.is_err());
    }
}
