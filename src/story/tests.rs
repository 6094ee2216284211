//! Tests for inheritance, naming and the case lifecycle.

use super::*;
use crate::callback::callback;
use crate::error::{self, ComponentKind, StoryError};
use anyhow::{Result, bail, ensure};
use rstest::{fixture, rstest};
use serde_json::json;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

type Journal = Arc<Mutex<Vec<String>>>;

#[fixture]
fn registry() -> Registry {
    Registry::new()
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().expect("journal lock").clone()
}

fn note(journal: &Journal, entry: &'static str) -> impl Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + use<> {
    let sink = Arc::clone(journal);
    move |_| {
        sink.lock().expect("journal lock").push(entry.to_owned());
        Ok(json!(entry))
    }
}

fn only_case(story: &Story, registry: &Registry) -> Case {
    let mut cases = story.all_stories(registry);
    assert_eq!(cases.len(), 1, "expected a single leaf");
    cases.swap_remove_index(0).map(|(_, case)| case).expect("one case")
}

fn generator(value: serde_json::Value) -> impl Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync {
    move |_| Ok(value.clone())
}

#[rstest]
fn child_callbacks_override_parent_callbacks(registry: Registry) -> Result<()> {
    let story = Story::named("parent")
        .task(|_| Ok(json!("parent task")))
        .after(|_| Ok(json!("parent after")))
        .story(Story::named("child").task(|_| Ok(json!("child task"))));
    let mut case = only_case(&story, &registry);

    ensure!(case.run_callback(hooks::TASK, &Arguments::new())? == Some(json!("child task")));
    ensure!(case.run_callback(hooks::AFTER, &Arguments::new())? == Some(json!("parent after")));
    ensure!(case.run_callback(hooks::BEFORE, &Arguments::new())?.is_none());
    Ok(())
}

#[rstest]
fn child_scenarios_replace_parent_scenarios_of_the_same_name(registry: Registry) -> Result<()> {
    registry.remember_scenario(Scenario::new("other").generator(generator(json!("other"))));
    let story = Story::named("parent")
        .scenario(Scenario::new("role").generator(generator(json!("customer"))))
        .scenario("other")
        .story(Story::named("child").scenario(Scenario::new("role").generator(generator(json!("admin")))));
    let mut case = only_case(&story, &registry);

    case.boot()?;

    ensure!(case.get("role") == Some(&json!("admin")));
    ensure!(case.get("other") == Some(&json!("other")));
    Ok(())
}

#[rstest]
fn child_data_overrides_parent_data(registry: Registry) {
    let story = Story::named("parent")
        .set_data("a", 1)
        .set_data("b", 1)
        .story(Story::named("child").set_data("b", 2));
    let case = only_case(&story, &registry);
    assert_eq!(case.get("a"), Some(&json!(1)));
    assert_eq!(case.get("b"), Some(&json!(2)));
}

#[rstest]
fn names_join_fragments_and_prefix_the_expectation(registry: Registry) {
    registry.remember_scenario(Scenario::new("test_c").append_name().generator(generator(json!(1))));
    registry.remember_scenario(
        Scenario::new("test_d")
            .append_custom_name("with custom name")
            .order(-1)
            .generator(generator(json!(1))),
    );
    let story = Story::named("parent").can().stories([
        Story::named("child a"),
        Story::new().story(Story::named("child b").cannot()),
        Story::named("child c").scenario("test_c").scenario("test_d"),
    ]);

    let cases = story.all_stories(&registry);
    let names: Vec<_> = cases.keys().map(String::as_str).collect();
    let labels: Vec<_> = cases.values().map(Case::label).collect();

    assert_eq!(
        names,
        [
            "[Can] parent child a",
            "[Cannot] parent child b",
            "[Can] parent child c with custom name test c",
        ]
    );
    assert_eq!(
        labels,
        [
            "[Can] child a",
            "[Cannot] child b",
            "[Can] child c with custom name test c",
        ]
    );
}

#[rstest]
fn scenarios_boot_in_order_key_order(registry: Registry) -> Result<()> {
    let journal = Journal::default();
    let mut story = Story::named("ordered");
    for (name, order) in [("three", 3), ("one", 1), ("four", 4), ("two", 2), ("also_one", 1)] {
        story = story.scenario(Scenario::new(name).order(order).generator(note(&journal, name)));
    }
    let mut case = only_case(&story, &registry);

    case.boot()?;
    case.boot()?;

    ensure!(entries(&journal) == ["one", "also_one", "two", "three", "four"]);
    ensure!(case.is_booted());
    Ok(())
}

#[rstest]
fn missing_scenarios_fail_before_anything_boots(registry: Registry) {
    let journal = Journal::default();
    let story = Story::named("missing")
        .scenario(Scenario::new("valid").generator(note(&journal, "valid")))
        .scenario("not_found");
    let mut case = only_case(&story, &registry);

    let err = case.boot().expect_err("unregistered scenario");

    assert_eq!(err.to_string(), "The `not_found` scenario could not be found.");
    assert!(matches!(
        err.downcast_ref::<StoryError>(),
        Some(StoryError::NotFound {
            kind: ComponentKind::Scenario,
            ..
        })
    ));
    assert!(entries(&journal).is_empty());
}

#[rstest]
fn generator_less_scenarios_fail_after_earlier_ones_ran(registry: Registry) {
    let journal = Journal::default();
    let story = Story::named("generators")
        .scenario(Scenario::new("something_cool").order(2))
        .scenario(Scenario::new("valid").order(1).generator(note(&journal, "valid")));
    let mut case = only_case(&story, &registry);

    let err = case.boot().expect_err("no generator");

    assert!(matches!(
        err.downcast_ref::<StoryError>(),
        Some(StoryError::GeneratorMissing { name }) if name == "something_cool"
    ));
    assert_eq!(entries(&journal), ["valid"]);
}

#[rstest]
fn scenario_results_flow_to_later_steps(registry: Registry) -> Result<()> {
    let story = Story::named("propagation")
        .scenario(Scenario::new("user").order(1).generator(generator(json!({"name": "Ada"}))))
        .scenario(
            Scenario::new("greeting")
                .order(2)
                .generator(|call| Ok(json!(format!("hi {}", call.arg::<String>("user.name")?)))),
        )
        .action(Action::new("shout").callback(|call| {
            Ok(json!(call.arg::<String>("greeting")?.to_uppercase()))
        }))
        .task(|call| {
            ensure!(call.arg::<String>("shout")? == "HI ADA");
            Ok(json!("checked"))
        });
    let mut case = only_case(&story, &registry);

    case.perform()?;

    ensure!(case.get("greeting") == Some(&json!("hi Ada")));
    Ok(())
}

#[rstest]
fn perform_runs_every_step_in_order(registry: Registry) -> Result<()> {
    let journal = Journal::default();
    registry.remember_action(
        Action::new("step")
            .booting(note(&journal, "action booting"))
            .callback(note(&journal, "action run")),
    );
    let story = Story::named("order")
        .scenario(Scenario::new("scenario").generator(note(&journal, "scenario")))
        .set_up(note(&journal, "setUp"))
        .before(note(&journal, "before"))
        .action("step")
        .task(note(&journal, "task"))
        .after(note(&journal, "after"))
        .check(note(&journal, "can"), note(&journal, "cannot"))
        .tear_down(note(&journal, "tearDown"))
        .can();
    let mut case = only_case(&story, &registry);

    case.perform()?;

    ensure!(
        entries(&journal)
            == [
                "scenario",
                "setUp",
                "before",
                "action booting",
                "action run",
                "task",
                "after",
                "can",
                "tearDown",
            ]
    );
    Ok(())
}

#[rstest]
fn tear_down_runs_after_a_failed_step(registry: Registry) {
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let story = Story::named("failing")
        .task(|_| bail!("task exploded"))
        .tear_down(move |call| {
            *sink.lock().expect("seen lock") = call.optional::<String>(case::EXCEPTION_ARGUMENT)?;
            Ok(json!(null))
        });
    let mut case = only_case(&story, &registry);

    let err = case.perform().expect_err("task fails");

    assert_eq!(err.to_string(), "task exploded");
    assert_eq!(
        seen.lock().expect("seen lock").as_deref(),
        Some("task exploded")
    );
}

#[rstest]
fn nearest_explicit_timeout_applies(registry: Registry) {
    let story = Story::named("root")
        .timeout(2, TimerUnit::Second)
        .stories([
            Story::named("inherits"),
            Story::named("disabled").no_timeout().story(Story::named("leaf")),
        ]);
    let cases = story.all_stories(&registry);
    let timeouts: Vec<_> = cases.values().map(Case::timeout).collect();
    assert_eq!(
        timeouts,
        [Timeout::Limit(Duration::from_secs(2)), Timeout::Disabled]
    );
}

#[rstest]
fn timed_out_runs_tear_down_with_the_exception(registry: Registry) -> Result<()> {
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let story = Story::named("slow")
        .timeout(30, TimerUnit::Millisecond)
        .task(|_| {
            thread::sleep(Duration::from_millis(500));
            Ok(json!(null))
        })
        .tear_down(move |call| {
            *sink.lock().expect("seen lock") = call.optional::<String>(case::EXCEPTION_ARGUMENT)?;
            Ok(json!(null))
        });
    let case = only_case(&story, &registry);

    let Err(err) = case.run() else {
        bail!("the task overran its deadline");
    };

    ensure!(error::is_timeout(&err));
    let message = seen.lock().expect("seen lock").clone().unwrap_or_default();
    ensure!(message.contains("exceeded its timeout"), "unexpected message: {message}");
    Ok(())
}

#[rstest]
fn acting_as_overrides_the_authenticator(registry: Registry) -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    registry.acting_as(Some(callback(move |call| {
        sink.lock().expect("seen lock").push(call.arg::<serde_json::Value>(case::USER_ARGUMENT)?);
        Ok(json!(null))
    })));
    let mut case = only_case(&Story::named("performer"), &registry);

    case.set_user(Some(json!({"id": 7})))?;
    case.set_user(None)?;

    ensure!(case.user().is_none());
    ensure!(*seen.lock().expect("seen lock") == [json!({"id": 7}), json!(null)]);
    Ok(())
}

#[rstest]
fn registering_hooks_run_for_story_and_actions(registry: Registry) -> Result<()> {
    let journal = Journal::default();
    let story = Story::named("registration")
        .registering(note(&journal, "story"))
        .action(Action::new("known").registering(note(&journal, "action")))
        .action("unknown_until_boot");
    let mut case = only_case(&story, &registry);

    case.register()?;

    ensure!(entries(&journal) == ["story", "action"]);
    Ok(())
}

#[rstest]
fn abandoned_workers_skip_the_remaining_steps(registry: Registry) -> Result<()> {
    let journal = Journal::default();
    let story = Story::named("overrun")
        .timeout(20, TimerUnit::Millisecond)
        .task(|_| {
            thread::sleep(Duration::from_millis(150));
            Ok(json!(null))
        })
        .after(note(&journal, "after"))
        .tear_down(note(&journal, "tearDown"));
    let case = only_case(&story, &registry);

    ensure!(case.run().is_err_and(|err| error::is_timeout(&err)));
    ensure!(entries(&journal) == ["tearDown"]);

    thread::sleep(Duration::from_millis(400));
    ensure!(entries(&journal) == ["tearDown"], "late steps ran: {:?}", entries(&journal));
    Ok(())
}

#[rstest]
fn failed_boots_can_be_retried(registry: Registry) -> Result<()> {
    let story = Story::named("retry").scenario("late");
    let mut case = only_case(&story, &registry);

    ensure!(case.boot().is_err());
    ensure!(!case.is_booted());

    registry.remember_scenario(Scenario::new("late").generator(generator(json!("arrived"))));
    case.boot()?;

    ensure!(case.is_booted());
    ensure!(case.get("late") == Some(&json!("arrived")));
    Ok(())
}

#[rstest]
fn perform_fails_while_boot_keeps_failing(registry: Registry) {
    let journal = Journal::default();
    let story = Story::named("never booted")
        .scenario("absent")
        .task(note(&journal, "task"));
    let mut case = only_case(&story, &registry);

    assert!(case.boot().is_err());
    assert!(case.perform().is_err());
    assert!(entries(&journal).is_empty());
}
