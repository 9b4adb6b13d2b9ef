#![allow(missing_docs)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use taskgraph::{
    error::TaskError,
    graph::TaskGraph,
    types::{RunState, WaitStatus},
};

#[test]
fn chain_runs_in_dependency_order() {
    let mut graph = TaskGraph::new(4, true);
    let total = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(Mutex::new(Vec::new()));

    let (counter, log) = (Arc::clone(&total), Arc::clone(&order));
    let a = graph
        .push_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            log.lock().unwrap().push("a");
        })
        .unwrap();
    let (counter, log) = (Arc::clone(&total), Arc::clone(&order));
    let b = graph
        .push_fn(move || {
            counter.fetch_add(2, Ordering::SeqCst);
            log.lock().unwrap().push("b");
        })
        .unwrap();
    let (counter, log) = (Arc::clone(&total), Arc::clone(&order));
    let c = graph
        .push_fn(move || {
            counter.fetch_add(3, Ordering::SeqCst);
            log.lock().unwrap().push("c");
        })
        .unwrap();

    b.depend(&a).unwrap();
    c.depend(&b).unwrap();

    graph.start().unwrap();
    graph.wait().unwrap();

    assert_eq!(total.load(Ordering::SeqCst), 6);
    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    for handle in [&a, &b, &c] {
        assert_eq!(handle.state(), Some(RunState::Completed));
    }
}

#[test]
fn fibonacci_graph() {
    let mut graph = TaskGraph::new(4, true);
    let fib = Arc::new(Mutex::new(vec![0_u64; 10]));

    let mut handles = Vec::new();
    for index in 0..10 {
        let fib = Arc::clone(&fib);
        let handle = graph
            .push_fn(move || {
                let mut fib = fib.lock().unwrap();
                fib[index] = match index {
                    0 => 0,
                    1 => 1,
                    _ => fib[index - 1] + fib[index - 2],
                };
            })
            .unwrap();
        handles.push(handle);
    }
    for index in 2..10 {
        handles[index].depend(&handles[index - 1]).unwrap();
        handles[index].depend(&handles[index - 2]).unwrap();
    }

    graph.start().unwrap();
    graph.wait().unwrap();

    assert_eq!(*fib.lock().unwrap(), vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34]);
}

#[test]
fn failing_node_skips_dependents() {
    let mut graph = TaskGraph::new(2, true);
    let b_ran = Arc::new(AtomicBool::new(false));
    let c_ran = Arc::new(AtomicBool::new(false));

    let a = graph
        .push(|| -> anyhow::Result<()> { anyhow::bail!("boom") })
        .unwrap();
    let flag = Arc::clone(&b_ran);
    let b = graph.push_fn(move || flag.store(true, Ordering::SeqCst)).unwrap();
    let flag = Arc::clone(&c_ran);
    let c = graph.push_fn(move || flag.store(true, Ordering::SeqCst)).unwrap();
    b.depend(&a).unwrap();
    c.depend(&b).unwrap();

    graph.start().unwrap();
    let error = graph.wait().unwrap_err();
    assert!(error.to_string().contains("boom"));
    assert!(!b_ran.load(Ordering::SeqCst));
    assert!(!c_ran.load(Ordering::SeqCst));

    // The graph stays valid once the failure is drained: drop the poisoned
    // task and the survivors run.
    assert!(graph.erase(&a).unwrap());
    graph.start().unwrap();
    graph.wait().unwrap();
    assert!(b_ran.load(Ordering::SeqCst));
    assert!(c_ran.load(Ordering::SeqCst));
}

#[test]
fn cycle_is_rejected() {
    let mut graph = TaskGraph::default();
    let a = graph.push_fn(|| {}).unwrap();
    let b = graph.push_fn(|| {}).unwrap();

    a.depend(&b).unwrap();
    assert!(matches!(b.depend(&a), Err(TaskError::Runtime(_))));
}

#[test]
fn wait_for_times_out_then_wait_drains() {
    let mut graph = TaskGraph::new(1, true);
    graph
        .push_fn(|| thread::sleep(Duration::from_secs(1)))
        .unwrap();

    graph.start().unwrap();
    let status = graph.wait_for(Duration::from_millis(100)).unwrap();
    assert_eq!(status, WaitStatus::Timeout);
    graph.wait().unwrap();
}

#[test]
fn wait_for_within_budget_reports_ready() {
    let mut graph = TaskGraph::new(1, true);
    graph
        .push_fn(|| thread::sleep(Duration::from_millis(100)))
        .unwrap();

    graph.start().unwrap();
    let status = graph.wait_for(Duration::from_secs(2)).unwrap();
    assert_eq!(status, WaitStatus::Ready);
}

#[test]
fn restarting_runs_every_node_again() {
    let mut graph = TaskGraph::new(2, true);
    let runs = Arc::new(AtomicUsize::new(0));

    let mut previous = None;
    for _ in 0..3 {
        let counter = Arc::clone(&runs);
        let handle = graph
            .push_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        if let Some(previous) = &previous {
            handle.depend(previous).unwrap();
        }
        previous = Some(handle);
    }

    graph.start().unwrap();
    graph.wait().unwrap();
    graph.start().unwrap();
    graph.wait().unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 6);
}

#[test]
fn wait_is_idempotent() {
    let mut graph = TaskGraph::default();
    graph.wait().unwrap();

    graph.push_fn(|| {}).unwrap();
    graph.start().unwrap();
    graph.wait().unwrap();
    graph.wait().unwrap();
}

#[test]
fn empty_graph_completes_immediately() {
    let mut graph = TaskGraph::new(4, true);
    assert!(graph.is_empty());
    graph.start().unwrap();
    graph.wait().unwrap();
}

#[test]
fn optimized_threads_clamp_to_task_count() {
    let mut graph = TaskGraph::new(8, true);
    for _ in 0..3 {
        graph.push_fn(|| {}).unwrap();
    }
    graph.start().unwrap();
    assert_eq!(graph.worker_count(), 3);
    graph.wait().unwrap();

    let mut unclamped = TaskGraph::new(4, false);
    unclamped.push_fn(|| {}).unwrap();
    unclamped.start().unwrap();
    assert_eq!(unclamped.worker_count(), 4);
    unclamped.wait().unwrap();
}

#[test]
fn mutation_is_refused_while_executing() {
    let mut graph = TaskGraph::new(1, true);
    let blocker = graph
        .push_fn(|| thread::sleep(Duration::from_millis(300)))
        .unwrap();

    graph.start().unwrap();
    assert!(matches!(graph.push_fn(|| {}), Err(TaskError::Runtime(_))));
    assert!(matches!(graph.erase(&blocker), Err(TaskError::Runtime(_))));
    assert!(matches!(graph.start(), Err(TaskError::Runtime(_))));
    graph.wait().unwrap();
}

#[test]
fn erase_unlinks_and_invalidates() {
    let mut graph = TaskGraph::default();
    let first = graph.push_fn(|| {}).unwrap();
    let second = graph.push_fn(|| {}).unwrap();
    let third = graph.push_fn(|| {}).unwrap();
    second.depend(&first).unwrap();
    third.depend(&second).unwrap();

    assert!(graph.erase(&third).unwrap());
    assert!(graph.erase(&second).unwrap());
    assert!(third.is_empty());
    assert!(second.is_empty());
    assert_eq!(first.successor_count(), 0);
    assert_eq!(graph.task_count(), 1);

    // Empty and foreign handles are refused without error.
    assert!(!graph.erase(&second).unwrap());
    let mut other = TaskGraph::default();
    let foreign = other.push_fn(|| {}).unwrap();
    assert!(!graph.erase(&foreign).unwrap());

    graph.start().unwrap();
    graph.wait().unwrap();
}

#[test]
fn terminate_skips_unclaimed_nodes() {
    let mut graph = TaskGraph::new(1, true);
    let runs = Arc::new(AtomicUsize::new(0));

    let mut previous = None;
    for _ in 0..10 {
        let counter = Arc::clone(&runs);
        let handle = graph
            .push_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
            })
            .unwrap();
        if let Some(previous) = &previous {
            handle.depend(previous).unwrap();
        }
        previous = Some(handle);
    }

    graph.start().unwrap();
    thread::sleep(Duration::from_millis(120));
    graph.terminate(true).unwrap();

    let completed = runs.load(Ordering::SeqCst);
    assert!(completed >= 1, "at least one node should have run");
    assert!(completed < 10, "termination should skip pending nodes");
}

#[test]
fn graph_inspection_surface() {
    let mut graph = TaskGraph::default();
    assert!(graph.is_empty());
    assert!(graph.task_at(0).is_none());

    let first = graph.push_fn(|| {}).unwrap();
    let second = graph.push_fn(|| {}).unwrap();

    assert_eq!(graph.task_count(), 2);
    assert_eq!(graph.task_at(0), Some(first.clone()));
    assert_eq!(graph.task_at(1), Some(second.clone()));
    assert_eq!(graph.tasks(), vec![first.clone(), second.clone()]);
    assert_eq!(graph.task_at(2), None);

    graph.clear();
    assert!(graph.is_empty());
    assert!(first.is_empty());
    assert!(second.is_empty());
}
