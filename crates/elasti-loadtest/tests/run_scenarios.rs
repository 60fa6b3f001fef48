//! End-to-end runs of small ramp plans against a local responder

mod common;

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use common::TestServer;
use elasti_loadtest::{LoadTestConfig, LoadTestRunner, StageConfig, TargetConfig};

fn stages(plan: &[(u64, i64)]) -> Vec<StageConfig> {
    plan.iter()
        .map(|&(ms, target)| StageConfig {
            duration: Duration::from_millis(ms),
            target,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_ok_responses_give_zero_failure_rates() {
    let server = TestServer::start(|_| 200).await;

    // Same shape as the stock scenario, scaled down
    let config = LoadTestConfig {
        tick: Duration::from_millis(50),
        sleep: Duration::from_millis(10),
        stages: stages(&[(250, 20), (250, 20), (250, 8), (250, 4), (250, 2), (250, 0)]),
        targets: (0..3).map(|_| TargetConfig::new(server.url("/headers"))).collect(),
        ..Default::default()
    };

    let mut runner = LoadTestRunner::from_config(&config).unwrap();
    let stats = runner.pool_stats();
    let summary = runner.run().await;

    assert!(!summary.interrupted);
    assert!(summary.peak_vus > 1 && summary.peak_vus <= 20);
    assert!(summary.iterations > 0);
    assert_eq!(stats.active(), 0);

    assert_eq!(summary.rates.len(), 3);
    for rate in &summary.rates {
        assert_eq!(rate.rate, 0.0, "{} had failures", rate.name);
        assert!(rate.total > 0);
    }

    // Iterations always finish, so every target saw the same number of requests
    let totals: Vec<u64> = summary.rates.iter().map(|r| r.total).collect();
    assert!(totals.iter().all(|&t| t == totals[0]));
    assert_eq!(totals[0], summary.iterations);
    assert_eq!(server.seen.count.load(std::sync::atomic::Ordering::SeqCst), totals[0] * 3);

    assert!(summary.check_thresholds(&config.thresholds).passes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unreachable_endpoint_fails_checks_without_stopping_run() {
    // Bind then drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = LoadTestConfig {
        tick: Duration::from_millis(50),
        sleep: Duration::from_millis(20),
        stages: stages(&[(200, 5), (200, 0)]),
        targets: vec![TargetConfig::new(format!("http://127.0.0.1:{}/", port))],
        thresholds: HashMap::from([("failed_requests_1".to_string(), 0.01)]),
        ..Default::default()
    };

    let mut runner = LoadTestRunner::from_config(&config).unwrap();
    let summary = runner.run().await;

    assert!(summary.iterations > 0);
    assert_eq!(summary.rate("failed_requests_1"), Some(1.0));
    assert!(summary.error_counts.contains_key("connect"));

    let report = summary.check_thresholds(&config.thresholds);
    assert!(!report.passes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_from_config_file() {
    let server = TestServer::start(|n| if n % 2 == 0 { 200 } else { 503 }).await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        tick = "50ms"
        sleep = "10ms"
        request_timeout = "2s"

        [[stages]]
        duration = "300ms"
        target = 4

        [[stages]]
        duration = "100ms"
        target = 0

        [[targets]]
        url = "{}"

        [thresholds]
        failed_requests_1 = 1.0
        "#,
        server.url("/headers")
    )
    .unwrap();

    let config = LoadTestConfig::load(file.path()).unwrap();
    let mut runner = LoadTestRunner::from_config(&config).unwrap();
    let summary = runner.run().await;

    let rate = summary.rate("failed_requests_1").unwrap();
    assert!(rate > 0.0 && rate < 1.0);
    assert!(summary.check_thresholds(&config.thresholds).passes);
}

#[test]
fn test_invalid_config_rejected_before_any_user_starts() {
    let config = LoadTestConfig {
        stages: stages(&[(1_000, 10), (1_000, -3)]),
        ..Default::default()
    };

    let err = match LoadTestRunner::from_config(&config) {
        Ok(_) => panic!("negative target accepted"),
        Err(e) => e,
    };
    assert_eq!(err.to_string(), "Stage 1 has negative target -3");
}
