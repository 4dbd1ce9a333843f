// Result-returning submissions on both execution contexts.

mod common;

use common::harness;
use tasker_scheduler::{SchedulerError, TaskSpec, TaskState};
use tokio::sync::oneshot::error::TryRecvError;

#[test]
fn sync_submit_hands_the_value_back_after_its_tick() {
    let h = harness();
    let mut sub = h.scheduler.submit(2, || Ok(6 * 7)).unwrap();

    h.scheduler.tick(1).unwrap();
    assert!(matches!(sub.result.try_recv(), Err(TryRecvError::Empty)));

    h.scheduler.tick(2).unwrap();
    assert_eq!(sub.result.try_recv().unwrap().unwrap(), 42);
    assert_eq!(sub.handle.state(), TaskState::Completed);
}

#[test]
fn failed_work_reaches_caller_and_sink() {
    let h = harness();
    let mut sub = h
        .scheduler
        .submit(1, || -> anyhow::Result<u32> { anyhow::bail!("chunk not loaded") })
        .unwrap();

    let report = h.scheduler.tick(1).unwrap();
    assert_eq!(report.failed, 1);

    let err = sub.result.try_recv().unwrap().unwrap_err();
    assert!(err.to_string().contains("chunk not loaded"));
    assert_eq!(sub.handle.state(), TaskState::Cancelled);

    let failures = h.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, sub.handle.id());
}

#[test]
fn cancelled_submission_closes_the_channel() {
    let h = harness();
    let mut sub = h.scheduler.submit(3, || Ok("never")).unwrap();

    assert!(sub.handle.cancel());
    assert!(matches!(sub.result.try_recv(), Err(TryRecvError::Closed)));
}

#[test]
fn panicking_work_closes_the_channel() {
    let h = harness();
    let mut sub = h
        .scheduler
        .submit(1, || -> anyhow::Result<()> { panic!("bad state") })
        .unwrap();

    h.scheduler.tick(1).unwrap();
    assert!(matches!(sub.result.try_recv(), Err(TryRecvError::Closed)));
    assert_eq!(h.failures.lock().unwrap().len(), 1);
}

#[test]
fn async_submit_runs_on_the_pool() {
    let h = harness();
    let mut sub = h
        .scheduler
        .submit_async(4, || Ok(String::from("saved")))
        .unwrap();

    assert!(matches!(sub.result.try_recv(), Err(TryRecvError::Empty)));
    h.timer.fire_all();
    assert_eq!(sub.result.try_recv().unwrap().unwrap(), "saved");
}

#[test]
fn repeating_submission_is_rejected() {
    let h = harness();
    let err = h
        .scheduler
        .submit_with(TaskSpec::sync().every(2), || Ok(()))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidScheduleParameters(_)));
    assert!(h.scheduler.tasks().is_empty());
}

#[test]
fn owned_submission_is_cancelled_with_its_owner() {
    let h = harness();
    let mut sub = h
        .scheduler
        .submit_with(TaskSpec::sync().delay(1).owned_by("loader"), || Ok(1u8))
        .unwrap();

    assert_eq!(h.scheduler.cancel_all(&"loader".into()), 1);
    h.scheduler.tick(1).unwrap();
    assert!(matches!(sub.result.try_recv(), Err(TryRecvError::Closed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submission_can_be_awaited() {
    let h = harness();
    let sub = h.scheduler.submit(1, || Ok(vec![1, 2, 3])).unwrap();

    let scheduler = h.scheduler.clone();
    std::thread::spawn(move || scheduler.tick(1)).join().unwrap().unwrap();

    let value = sub.result.await.unwrap().unwrap();
    assert_eq!(value, vec![1, 2, 3]);
}
