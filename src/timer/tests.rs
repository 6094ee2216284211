//! Tests for deadline enforcement and timer hook dispatch.

use super::*;
use anyhow::{Result, bail, ensure};
use rstest::rstest;
use serde_json::json;
use std::sync::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().expect("log lock").clone()
}

fn record(
    log: &Log,
    hook: &'static str,
) -> impl Fn(&TimerReport<'_>) -> CallbackResult + Send + Sync + use<> {
    let sink = Arc::clone(log);
    move |_| {
        sink.lock().expect("log lock").push(hook.to_owned());
        Ok(json!(hook))
    }
}

fn sleeper(millis: u64) -> impl FnOnce(&CancelToken) -> CallbackResult + Send + 'static {
    move |_| {
        thread::sleep(Duration::from_millis(millis));
        Ok(json!("slept"))
    }
}

#[rstest]
fn finished_response_is_returned() -> Result<()> {
    let hooks_run = log();
    let mut timer = Timer::new(|_| Ok(json!(42)))
        .timeout(5, TimerUnit::Second)
        .finished(|report| {
            ensure!(report.outcome == TimerOutcome::Passed);
            Ok(json!("done"))
        })
        .after(record(&hooks_run, "after"));

    let response = timer.run()?;

    ensure!(response == Some(json!("done")));
    ensure!(timer.value() == Some(&json!(42)));
    ensure!(timer.outcome() == Some(TimerOutcome::Passed));
    ensure!(timer.time_remaining().is_some_and(|left| left > 0));
    ensure!(entries(&hooks_run) == ["after"]);
    Ok(())
}

#[rstest]
fn deadline_preempts_a_slow_task() -> Result<()> {
    let hooks_run = log();
    let started = Instant::now();
    let mut timer = Timer::new(sleeper(2_000))
        .timeout(50, TimerUnit::Millisecond)
        .timedout(record(&hooks_run, "timedout"))
        .finished(record(&hooks_run, "finished"))
        .after(record(&hooks_run, "after"));

    let Err(err) = timer.run() else {
        bail!("expected the deadline to fire");
    };

    ensure!(error::is_timeout(&err));
    ensure!(started.elapsed() < Duration::from_secs(1), "run must not wait for the worker");
    ensure!(timer.outcome() == Some(TimerOutcome::TimedOut));
    ensure!(entries(&hooks_run) == ["timedout", "after"]);
    Ok(())
}

#[rstest]
fn dont_rethrow_swallows_the_timeout() -> Result<()> {
    let mut timer = Timer::new(sleeper(1_000))
        .timeout(20, TimerUnit::Millisecond)
        .dont_rethrow();

    ensure!(timer.run()?.is_none());
    ensure!(timer.exception().is_some_and(error::is_timeout));
    Ok(())
}

#[rstest]
fn timedout_hook_can_force_a_rethrow() -> Result<()> {
    let mut timer = Timer::new(sleeper(1_000))
        .timeout(20, TimerUnit::Millisecond)
        .dont_rethrow()
        .timedout(|report| match report.error {
            Some(_) => Err(StoryError::Timeout {
                timeout: report.timeout,
                taken: report.taken.unwrap_or_default(),
            }
            .into()),
            None => Ok(Value::Null),
        });

    let Err(err) = timer.run() else {
        bail!("the hook asked for the timeout to propagate");
    };
    ensure!(error::is_timeout(&err));
    Ok(())
}

#[rstest]
fn errors_route_through_errored_and_propagate() -> Result<()> {
    let hooks_run = log();
    let mut timer = Timer::new(|_| Err(anyhow!("boom")))
        .errored(record(&hooks_run, "errored"))
        .after(record(&hooks_run, "after"));

    let Err(err) = timer.run() else {
        bail!("task error should propagate");
    };

    ensure!(err.to_string() == "boom");
    ensure!(timer.outcome() == Some(TimerOutcome::Errored));
    ensure!(entries(&hooks_run) == ["errored", "after"]);
    Ok(())
}

#[rstest]
fn a_timer_runs_at_most_once() -> Result<()> {
    let count = Arc::new(Mutex::new(0_u32));
    let counter = Arc::clone(&count);
    let mut timer = Timer::new(move |_| {
        *counter.lock().expect("count lock") += 1;
        Ok(Value::Null)
    });

    timer.run()?;
    ensure!(timer.run()?.is_none());
    ensure!(timer.has_run());
    ensure!(*count.lock().expect("count lock") == 1);
    Ok(())
}

#[rstest]
fn worker_panics_resurface_after_hooks() {
    let hooks_run = log();
    let mut timer = Timer::new(|_| panic!("assertion inside task"))
        .errored(record(&hooks_run, "errored"))
        .after(record(&hooks_run, "after"));

    let caught = panic::catch_unwind(panic::AssertUnwindSafe(|| timer.run()));

    assert!(caught.is_err());
    assert_eq!(entries(&hooks_run), ["errored", "after"]);
}

#[rstest]
fn swallowed_panics_are_reported_as_errors() -> Result<()> {
    let mut timer = Timer::new(|_| panic!("quiet failure")).dont_rethrow();

    ensure!(timer.run()?.is_none());
    let message = timer.exception().map(ToString::to_string).unwrap_or_default();
    ensure!(message.contains("quiet failure"), "unexpected message: {message}");
    Ok(())
}

#[rstest]
fn measuring_an_overrun_reports_a_timeout() -> Result<()> {
    let mut timer = Timer::measuring(Duration::from_millis(1));
    timer.start();
    thread::sleep(Duration::from_millis(20));
    timer.end();

    let Err(err) = timer.check(Ok(Value::Null)) else {
        bail!("an overrun span must time out");
    };
    ensure!(error::is_timeout(&err));
    ensure!(timer.time_remaining().is_some_and(|left| left < 0));
    Ok(())
}

#[rstest]
fn measuring_a_quick_span_passes() -> Result<()> {
    let settings = TimerSettings::default()
        .timeout(5, TimerUnit::Second)
        .finished(|_| Ok(json!("in time")));
    let mut timer = settings.measure().expect("a limit is configured");
    timer.start();
    ensure!(timer.check(Ok(json!(1)))? == Some(json!("in time")));
    Ok(())
}

#[rstest]
fn settings_without_a_limit_do_not_measure() {
    assert!(TimerSettings::default().measure().is_none());
    assert!(
        TimerSettings::default()
            .timeout(1, TimerUnit::Second)
            .no_timeout()
            .measure()
            .is_none()
    );
}

#[rstest]
fn cooperative_tasks_observe_cancellation() -> Result<()> {
    let observed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&observed);
    let mut timer = Timer::new(move |token| {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if token.is_cancelled() {
                flag.store(true, Ordering::SeqCst);
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        Ok(Value::Null)
    })
    .timeout(20, TimerUnit::Millisecond)
    .dont_rethrow();

    timer.run()?;
    let wait_until = Instant::now() + Duration::from_secs(1);
    while !observed.load(Ordering::SeqCst) && Instant::now() < wait_until {
        thread::sleep(Duration::from_millis(5));
    }
    ensure!(observed.load(Ordering::SeqCst));
    Ok(())
}

#[rstest]
fn failing_finished_hook_routes_through_errored_then_after() -> Result<()> {
    let hooks_run = log();
    let mut timer = Timer::new(|_| Ok(json!(1)))
        .finished(|_| bail!("finished hook failed"))
        .errored(record(&hooks_run, "errored"))
        .after(record(&hooks_run, "after"));

    let Err(err) = timer.run() else {
        bail!("a failing finished hook must fail the run");
    };

    ensure!(err.to_string() == "finished hook failed");
    ensure!(timer.outcome() == Some(TimerOutcome::Errored));
    ensure!(entries(&hooks_run) == ["errored", "after"]);
    Ok(())
}

#[rstest]
fn after_runs_even_when_errored_fails() -> Result<()> {
    let hooks_run = log();
    let mut timer = Timer::new(|_| bail!("task failed"))
        .errored(|_| bail!("errored hook failed"))
        .after(record(&hooks_run, "after"));

    let Err(err) = timer.run() else {
        bail!("the run must fail");
    };

    ensure!(err.to_string() == "errored hook failed");
    ensure!(entries(&hooks_run) == ["after"]);
    Ok(())
}
