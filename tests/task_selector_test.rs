mod common;

use common::*;
use std::sync::Arc;
use tao_orchestration::models::{ExecutionJob, LoopState};
use tao_orchestration::orchestration::{DefaultGroupTaskSelector, DefaultJobTaskSelector, TaskProvider, TaskSelector};
use tao_orchestration::persistence::InMemoryExecutionStore;
use tao_orchestration::state_machine::ExecutionStatus;

fn job_selector(store: &Arc<InMemoryExecutionStore>) -> DefaultJobTaskSelector {
    DefaultJobTaskSelector::new(store.clone(), store.clone())
}

async fn complete(store: &InMemoryExecutionStore, task_id: i64, output: &str) {
    let mut task = store.task(task_id).unwrap();
    task.status = ExecutionStatus::Done;
    task.set_output_parameter_value("out", Some(output.to_string()));
    TaskProvider::update(store, &task).await.unwrap();
}

fn running(store: &InMemoryExecutionStore, job_id: i64) -> ExecutionJob {
    let mut job = store.job(job_id).unwrap();
    job.status = ExecutionStatus::Running;
    job
}

#[tokio::test]
async fn test_undetermined_job_yields_first_task() {
    let store = Arc::new(InMemoryExecutionStore::new());
    let Diamond { mut job } = Diamond::insert(&store, 1, "alice");

    let next = job_selector(&store).choose_next(&mut job, None).await;

    assert_eq!(next.iter().map(|t| t.id).collect::<Vec<_>>(), vec![Diamond::task_id(1, Diamond::A)]);
}

#[tokio::test]
async fn test_diamond_fans_out_then_joins() {
    let store = Arc::new(InMemoryExecutionStore::new());
    Diamond::insert(&store, 1, "alice");
    let selector = job_selector(&store);
    let (a, b, c, d) = (
        Diamond::task_id(1, Diamond::A),
        Diamond::task_id(1, Diamond::B),
        Diamond::task_id(1, Diamond::C),
        Diamond::task_id(1, Diamond::D),
    );

    complete(&store, a, "a.tif").await;
    let mut job = running(&store, 1);
    let current = store.task(a).unwrap();
    let fan_out = selector.choose_next(&mut job, Some(&current)).await;
    assert_eq!(fan_out.iter().map(|t| t.id).collect::<Vec<_>>(), vec![b, c]);
    assert!(fan_out.iter().all(|t| t.input_value("in_1") == Some("a.tif")));

    // D waits for C
    complete(&store, b, "b.tif").await;
    let current = store.task(b).unwrap();
    assert!(selector.choose_next(&mut job, Some(&current)).await.is_empty());

    complete(&store, c, "c.tif").await;
    let current = store.task(c).unwrap();
    let join = selector.choose_next(&mut job, Some(&current)).await;
    assert_eq!(join.len(), 1);
    assert_eq!(join[0].id, d);
    assert_eq!(join[0].input_value("in_2"), Some("b.tif"));
    assert_eq!(join[0].input_value("in_3"), Some("c.tif"));
}

#[tokio::test]
async fn test_active_children_are_not_selected_twice() {
    let store = Arc::new(InMemoryExecutionStore::new());
    Diamond::insert(&store, 1, "alice");
    let (a, b) = (Diamond::task_id(1, Diamond::A), Diamond::task_id(1, Diamond::B));
    complete(&store, a, "a.tif").await;
    let mut started = store.task(b).unwrap();
    started.status = ExecutionStatus::QueuedActive;
    TaskProvider::update(store.as_ref(), &started).await.unwrap();

    let mut job = running(&store, 1);
    let current = store.task(a).unwrap();
    let next = job_selector(&store).choose_next(&mut job, Some(&current)).await;

    assert_eq!(next.iter().map(|t| t.id).collect::<Vec<_>>(), vec![Diamond::task_id(1, Diamond::C)]);
}

#[tokio::test]
async fn test_explicit_dependency_blocks_child() {
    let store = Arc::new(InMemoryExecutionStore::new());
    store.insert_node(node(1, &[]));
    store.insert_node(node(2, &[1]));
    store.insert_node(node(3, &[]));
    JobBuilder::new(1, "alice")
        .with_task(script_task(11, 1, 1))
        .with_task(script_task(12, 1, 2))
        .with_task(script_task(13, 1, 3))
        .with_dependency(12, 13)
        .insert(&store);
    complete(&store, 11, "a.tif").await;

    let mut job = running(&store, 1);
    let current = store.task(11).unwrap();
    assert!(job_selector(&store).choose_next(&mut job, Some(&current)).await.is_empty());

    complete(&store, 13, "c.tif").await;
    let next = job_selector(&store).choose_next(&mut job, Some(&current)).await;
    assert_eq!(next.iter().map(|t| t.id).collect::<Vec<_>>(), vec![12]);
}

#[tokio::test]
async fn test_non_running_jobs_select_nothing_or_resume_point() {
    let store = Arc::new(InMemoryExecutionStore::new());
    let Diamond { mut job } = Diamond::insert(&store, 1, "alice");
    let selector = job_selector(&store);

    job.status = ExecutionStatus::QueuedActive;
    assert!(selector.choose_next(&mut job, None).await.is_empty());

    job.status = ExecutionStatus::Done;
    assert!(selector.choose_next(&mut job, None).await.is_empty());

    job.status = ExecutionStatus::Suspended;
    job.find_task_mut(Diamond::task_id(1, Diamond::C)).unwrap().status = ExecutionStatus::Suspended;
    let next = selector.choose_next(&mut job, None).await;
    assert_eq!(next.iter().map(|t| t.id).collect::<Vec<_>>(), vec![Diamond::task_id(1, Diamond::C)]);
}

#[tokio::test]
async fn test_group_selector_follows_member_links() {
    let store = Arc::new(InMemoryExecutionStore::new());
    store.insert_node(node(201, &[]));
    store.insert_node(node(202, &[201]));
    store.insert_node(node(200, &[]).as_group(vec![201, 202]));
    let group = group_task(20, 1, 200, vec![sub_task(21, 1, 201, 20), sub_task(22, 1, 202, 20)]);
    JobBuilder::new(1, "alice").with_task(group).insert(&store);
    complete(&store, 21, "x.tif").await;

    let mut group_task = store.task(20).unwrap();
    group_task.status = ExecutionStatus::Running;
    let current = store.task(21).unwrap();
    let selector = DefaultGroupTaskSelector::new(store.clone(), store.clone());
    let next = selector.choose_next(&mut group_task, Some(&current)).await;

    assert_eq!(next.len(), 1);
    assert_eq!(next[0].id, 22);
    assert_eq!(next[0].input_value("in_201"), Some("x.tif"));
}

#[tokio::test]
async fn test_group_selector_restarts_loop_pass_with_sliced_inputs() {
    let store = Arc::new(InMemoryExecutionStore::new());
    let mut inner = group_task(30, 1, 300, vec![sub_task(31, 1, 301, 30)]);
    inner.group_id = Some(20);
    inner.level = 2;
    let mut outer = group_task(20, 1, 200, vec![inner, sub_task(32, 1, 302, 20)]);
    outer.set_input_parameter_value("items", Some(r#"["a","b"]"#.to_string()));
    if let Some(group) = outer.as_group_mut() {
        group.state_handler = Some(tao_orchestration::models::LoopStateHandler::new(LoopState::new(2, 2)));
    }
    JobBuilder::new(1, "alice").with_task(outer).insert(&store);

    let mut group_task = store.task(20).unwrap();
    let last = store.task(32).unwrap();
    let selector = DefaultGroupTaskSelector::new(store.clone(), store.clone());
    let next = selector.choose_next(&mut group_task, Some(&last)).await;

    assert_eq!(next.len(), 1);
    assert_eq!(next[0].id, 30);
    assert_eq!(next[0].input_value("items"), Some("b"));
}
