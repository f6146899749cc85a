use std::io;
use std::path::PathBuf;

use message_window::WindowConfig;
use window_sim::scenario::{run, write_report};
use window_sim::{Runner, Scenario, ScenarioError, Step, StepReport};

fn bundled(name: &str) -> Scenario {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name);
    Scenario::from_path(&path).expect("bundled scenario parses")
}

fn spans(report: &StepReport) -> Vec<(u64, u64)> {
    report
        .window
        .coverage
        .intervals()
        .iter()
        .map(|interval| (interval.oldest_id, interval.newest_id))
        .collect()
}

async fn replay(scenario: &Scenario) -> Vec<StepReport> {
    let config = scenario.window.clone().unwrap_or_default();
    let runner = Runner::new(scenario, config);
    let mut reports = Vec::new();
    for (index, step) in scenario.steps.iter().enumerate() {
        reports.push(runner.step(index, step).await.expect("step runs"));
    }
    reports
}

#[window_test::paused_test]
async fn deep_link_scenario_replays() {
    let scenario = bundled("deep_link.toml");
    let reports = replay(&scenario).await;
    assert_eq!(reports.len(), 9);

    let opened = &reports[0];
    assert_eq!(opened.result["outcome"], "loaded");
    assert_eq!(spans(opened), vec![(1961, 2000)]);

    assert_eq!(reports[1].result["mode"], "older_ward");
    assert_eq!(spans(&reports[1]), vec![(1921, 2000)]);

    let jumped = &reports[2];
    assert_eq!(jumped.result["outcome"], "focused");
    assert_eq!(jumped.result["attempts"], 3);
    assert_eq!(spans(jumped), vec![(400, 439)]);

    let pushed = &reports[3];
    assert_eq!(pushed.result["id"], 2001);
    assert_eq!(pushed.result["live"], "detached");
    assert_eq!(pushed.window.gaps.len(), 1);

    assert_eq!(spans(&reports[4]), vec![(400, 479), (2001, 2001)]);

    let failed = &reports[6];
    assert_eq!(failed.result["retryable"], true);
    assert_eq!(spans(failed), spans(&reports[4]));

    assert_eq!(spans(&reports[7]), vec![(360, 479), (2001, 2001)]);

    let switched = &reports[8];
    assert_eq!(spans(switched), vec![(1, 25)]);
    assert_eq!(switched.rendered, 24);
    assert!(switched.window.gaps.is_empty());
    assert!(switched.window.has_reached_oldest);
}

#[window_test::paused_test]
async fn late_delivery_is_reported_per_step() {
    let scenario = Scenario::from_toml_str(
        r#"
        [[chat]]
        id = 1
        kind = "group"
        last_id = 60

        [[step]]
        action = "deliver"
        chat = 1
        id = 61

        [[step]]
        action = "open"
        chat = 1

        [[step]]
        action = "deliver"
        chat = 1
        id = 61

        [[step]]
        action = "deliver"
        chat = 1
        id = 61

        [[step]]
        action = "close"
        "#,
    )
    .expect("parse scenario");
    assert_eq!(scenario.steps[4], Step::Close);

    let reports = replay(&scenario).await;
    assert_eq!(reports[0].result["live"], "no_active_chat");
    assert_eq!(reports[2].result["live"], "extended");
    assert_eq!(reports[3].result["live"], "duplicate");
    assert_eq!(spans(&reports[3]), vec![(11, 61)]);
    assert!(reports[4].window.chat.is_none());
    assert!(reports[4].window.coverage.is_empty());
    assert_eq!(reports[4].rendered, 0);
}

#[test]
fn default_config_applies_without_window_table() {
    let scenario = Scenario::from_toml_str("").expect("empty scenario");
    assert!(scenario.window.is_none());
    assert_eq!(scenario.window.unwrap_or_default(), WindowConfig::default());
}

/// Takes one line, then fails like a reader that went away.
#[derive(Default)]
struct ClosedPipe {
    lines: Vec<u8>,
}

impl io::Write for ClosedPipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.lines.contains(&b'\n') {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.lines.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[window_test::paused_test]
async fn report_write_failure_stops_the_run() {
    let scenario = Scenario::from_toml_str(
        r#"
        [[chat]]
        id = 1
        kind = "group"
        last_id = 200

        [[step]]
        action = "open"
        chat = 1

        [[step]]
        action = "older"

        [[step]]
        action = "older"
        "#,
    )
    .expect("parse scenario");

    let mut out = ClosedPipe::default();
    let mut emitted = 0;
    let err = run(&scenario, WindowConfig::default(), |report| {
        emitted += 1;
        write_report(&mut out, report, false)
    })
    .await
    .unwrap_err();

    match err {
        ScenarioError::Write { step, source } => {
            assert_eq!(step, 1);
            assert_eq!(source.kind(), io::ErrorKind::BrokenPipe);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(emitted, 2);
    let written = String::from_utf8(out.lines).expect("utf-8 report");
    assert!(written.starts_with(r#"{"step":0,"action":"open""#));
}
