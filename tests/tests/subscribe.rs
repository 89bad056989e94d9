mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;

    use mock_broker::{Behavior, MockBroker};
    use mqbench::prelude::*;
    use mqbench::types::StopReason;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::Instant;

    fn subscriber_config(clients: usize, count: u64) -> RunConfig {
        let mut config = config(Mode::Subscribe, clients, count);
        config.duration = Duration::from_secs(2);
        config.idle_timeout = Duration::from_millis(500);
        config
    }

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(10_000)]
    async fn silent_broker_drains_then_stops() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let config = subscriber_config(3, 0);
        let meta = metadata(&config);

        let start = Instant::now();
        let run = ClientPool::new(config, broker.connector(Behavior::default()))
            .run()
            .await?;
        let wall = start.elapsed();

        // Duration, then one idle period of draining.
        assert!(wall >= Duration::from_millis(2_500), "{wall:?}");
        assert!(wall < Duration::from_millis(2_600), "{wall:?}");

        assert_eq!(run.results.len(), 3);
        for result in &run.results {
            assert_eq!(result.successes, 0);
            assert_eq!(result.stop_reason, StopReason::Idle);
            assert!((result.run_time - 2.).abs() < 0.05, "{}", result.run_time);
        }

        let totals = run.aggregate(&meta)?;
        assert_eq!(totals.ratio, 0.);
        assert!((totals.total_run_time - 2.).abs() < 0.05);
        assert_eq!(totals.total_msgs_per_sec, 0.);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(10_000)]
    async fn stops_one_idle_period_after_last_arrival() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let mut config = subscriber_config(2, 0);
        config.duration = Duration::from_secs(60);

        let pool = ClientPool::new(config, broker.connector(Behavior::default()));
        let handle = tokio::spawn(pool.run());
        broker.wait_for_subscribers("/test0", 2).await;

        for _ in 0..10 {
            broker.deliver("/test0", Qos::AtLeastOnce, b"payload");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let last = Instant::now() - Duration::from_millis(100);

        let run = handle.await??;
        let stopped = Instant::now();
        assert!(stopped - last >= Duration::from_millis(500));
        assert!(stopped - last < Duration::from_millis(600));

        for result in &run.results {
            assert_eq!(result.successes, 10);
            assert_eq!(result.stop_reason, StopReason::Idle);
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn count_completion_preempts_timers() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let mut config = subscriber_config(2, 5);
        config.topics = 2;

        let pool = ClientPool::new(config, broker.connector(Behavior::default()));
        let handle = tokio::spawn(pool.run());
        broker.wait_for_subscribers("/test0", 1).await;
        broker.wait_for_subscribers("/test1", 1).await;

        let start = Instant::now();
        for _ in 0..5 {
            broker.deliver("/test0", Qos::AtLeastOnce, b"x");
            broker.deliver("/test1", Qos::AtLeastOnce, b"x");
        }

        let run = handle.await??;
        assert!(start.elapsed() < Duration::from_millis(100));
        for result in &run.results {
            assert_eq!(result.successes, 5);
            assert_eq!(result.stop_reason, StopReason::Completed);
        }

        // Completed subscribers leave no subscriptions behind.
        assert_eq!(broker.subscribers("/test0"), 0);
        assert_eq!(broker.subscribers("/test1"), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn fewer_subscribers_than_topics_cover_every_topic() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let mut config = subscriber_config(3, 0);
        config.topics = 8;
        let (tx, rx) = oneshot::channel();

        let pool = ClientPool::new(config, broker.connector(Behavior::default())).on_started(tx);
        let handle = tokio::spawn(pool.run());
        rx.await?;

        for topic in 0..8 {
            let topic = format!("/test{topic}");
            broker.wait_for_subscribers(&topic, 1).await;
            assert_eq!(broker.subscribers(&topic), 1, "{topic}");
            broker.deliver(&topic, Qos::AtMostOnce, b"x");
        }

        let run = handle.await??;
        let received: u64 = run.results.iter().map(|r| r.successes).sum();
        assert_eq!(received, 8);

        let mut per_client: Vec<u64> = run.results.iter().map(|r| r.successes).collect();
        per_client.sort_unstable();
        // Remainder topics go to the first subscribers.
        assert_eq!(per_client, [2, 3, 3]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_errors_lower_the_ratio() -> anyhow::Result<()> {
        init();

        let broker = MockBroker::new();
        let config = subscriber_config(1, 0);
        let meta = metadata(&config);

        let pool = ClientPool::new(config, broker.connector(Behavior::default()));
        let handle = tokio::spawn(pool.run());
        broker.wait_for_subscribers("/test0", 1).await;

        for _ in 0..3 {
            broker.deliver("/test0", Qos::AtLeastOnce, b"x");
        }
        broker.deliver_error("/test0", "malformed packet");

        let totals = handle.await??.aggregate(&meta)?;
        assert_eq!(totals.successes, 3);
        assert_eq!(totals.failures, 1);
        assert!((totals.ratio - 0.75).abs() < 1e-9);
        Ok(())
    }
}
