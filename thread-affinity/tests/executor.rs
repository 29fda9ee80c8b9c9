use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use futures_executor::block_on;

use thread_affinity::{Error, Executor, ExecutorConfig, Lifecycle, DEFAULT_THREAD_NAME};

mod utils;
use utils::{AtomicCounter, EventLog};

#[test]
fn test_invoke_fifo_single_producer() {
    let exec = Executor::create(Vec::new).unwrap();
    let tasks: Vec<_> = (0..100)
        .map(|i| exec.invoke_async(move |log: &mut Vec<usize>| log.push(i)).unwrap())
        .collect();
    for task in tasks {
        task.wait().unwrap();
    }
    let log = exec.invoke(|log| log.clone()).unwrap();
    assert_eq!(log, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_invoke_fifo_many_threads() {
    const THREADS: usize = 4;
    const ITEMS: usize = 50;

    let exec = Arc::new(Executor::new().unwrap());
    let counter = Arc::new(AtomicCounter::default());
    let log = Arc::new(EventLog::new());

    let handles: Vec<_> = (0..THREADS)
        .map(|thread_idx| {
            let exec = exec.clone();
            let counter = counter.clone();
            let log = log.clone();
            thread::spawn(move || {
                for seq in 0..ITEMS {
                    let counter = counter.clone();
                    let log = log.clone();
                    exec.invoke(move |_| log.push((counter.next(), thread_idx, seq)))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let events = log.events();
    assert_eq!(events.len(), THREADS * ITEMS);
    // the worker observed a strictly increasing counter, one item at a time
    for (idx, (count, _, _)) in events.iter().enumerate() {
        assert_eq!(*count, idx);
    }
    // and each producer's items in the order they were submitted
    for thread_idx in 0..THREADS {
        let seqs: Vec<usize> = events
            .iter()
            .filter(|(_, t, _)| *t == thread_idx)
            .map(|(_, _, s)| *s)
            .collect();
        assert_eq!(seqs, (0..ITEMS).collect::<Vec<_>>());
    }
}

#[test]
fn test_invoke_completes_before_return() {
    let exec = Executor::new().unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let fcopy = flag.clone();
    exec.invoke(move |_| {
        thread::sleep(Duration::from_millis(20));
        fcopy.store(true, Ordering::SeqCst);
    })
    .unwrap();
    assert!(flag.load(Ordering::SeqCst));
}

#[test]
fn test_invoke_panic_isolated() {
    let exec = Executor::create(|| 5u32).unwrap();
    match exec.invoke(|_| -> u32 { panic!("boom") }) {
        Err(Error::Panicked(panic)) => assert_eq!(panic.message(), Some("boom")),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(exec.invoke(|val| *val + 1).unwrap(), 6);
    assert_eq!(exec.lifecycle(), Lifecycle::Running);
}

#[test]
fn test_try_invoke_failed() {
    let exec = Executor::create(|| 0u32).unwrap();
    let result = exec.try_invoke(|_| -> Result<u32, &'static str> { Err("nope") });
    assert!(matches!(result, Err(Error::Failed("nope"))));
    assert_eq!(exec.try_invoke(|val| Ok::<_, ()>(*val)).unwrap(), 0);
}

#[test]
fn test_invoke_async_does_not_block() {
    let exec = Executor::new().unwrap();
    let start = Instant::now();
    let task = exec
        .invoke_async(|_| {
            thread::sleep(Duration::from_millis(100));
            42
        })
        .unwrap();
    assert!(start.elapsed() < Duration::from_millis(50));
    assert_eq!(block_on(task).unwrap(), 42);
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_try_invoke_async_failed() {
    let exec = Executor::new().unwrap();
    let task = exec
        .try_invoke_async(|_| Err::<(), _>(String::from("bad")))
        .unwrap();
    assert_eq!(block_on(task).unwrap_err().into_failed(), Some("bad".to_owned()));
}

#[test]
fn test_invoke_timeout_orphan_runs() {
    let exec = Executor::new().unwrap();
    let ran = Arc::new(AtomicCounter::default());
    let rcopy = ran.clone();
    let result = exec.invoke_timeout(
        move |_| {
            thread::sleep(Duration::from_millis(100));
            rcopy.increment();
        },
        Duration::from_millis(10),
    );
    assert!(matches!(result, Err(Error::TimedOut)));
    // queued behind the orphaned action
    exec.invoke(|_| ()).unwrap();
    assert_eq!(ran.value(), 1);
}

#[test]
fn test_resource_thread_affinity() {
    // Rc is not Send: it is only usable because it never leaves the worker
    let exec = Executor::create(|| Rc::new(Cell::new(0u32))).unwrap();
    let (worker_id, worker_name) = exec
        .invoke(|_| (thread::current().id(), thread::current().name().map(String::from)))
        .unwrap();
    assert_ne!(worker_id, thread::current().id());
    assert_eq!(worker_name.as_deref(), Some(DEFAULT_THREAD_NAME));
    for _ in 0..3 {
        exec.invoke(move |cell| {
            assert_eq!(thread::current().id(), worker_id);
            cell.set(cell.get() + 1);
        })
        .unwrap();
    }
    assert_eq!(exec.invoke(|cell| cell.get()).unwrap(), 3);
}

#[test]
fn test_config_thread_name() {
    let exec = ExecutorConfig::new()
        .thread_name("directory")
        .stack_size(256 * 1024)
        .build(|| ())
        .unwrap();
    assert_eq!(exec.thread_name(), Some("directory"));
    let name = exec
        .invoke(|_| thread::current().name().map(String::from))
        .unwrap();
    assert_eq!(name.as_deref(), Some("directory"));
}

#[test]
fn test_try_create_error() {
    let result = Executor::<u32>::try_create(|| Err("unavailable"));
    assert!(matches!(result, Err(Error::Failed("unavailable"))));

    let result = Executor::<u32>::create(|| panic!("ctor"));
    match result {
        Err(Error::Panicked(panic)) => assert_eq!(panic.message(), Some("ctor")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_dispose_lifecycle() {
    let exec = Executor::new().unwrap();
    assert_eq!(exec.lifecycle(), Lifecycle::Running);
    exec.dispose().unwrap();
    assert_eq!(exec.lifecycle(), Lifecycle::Disposed);
    assert!(matches!(exec.invoke(|_| ()), Err(Error::Closed)));
    assert!(matches!(exec.invoke_async(|_| ()), Err(Error::Closed)));
    // idempotent
    exec.dispose().unwrap();
    assert!(matches!(exec.dispose_with(|_| ()), Err(Error::Closed)));
}

#[test]
fn test_dispose_drains_queue() {
    let exec = Executor::create(|| 0usize).unwrap();
    let tasks: Vec<_> = (0..10)
        .map(|_| {
            exec.invoke_async(|count| {
                thread::sleep(Duration::from_millis(5));
                *count += 1;
                *count
            })
            .unwrap()
        })
        .collect();
    exec.dispose().unwrap();
    let results: Vec<usize> = tasks.into_iter().map(|t| t.wait().unwrap()).collect();
    assert_eq!(results, (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_dispose_with_resource() {
    let exec = Executor::create(|| vec![1, 2]).unwrap();
    exec.invoke(|items| items.push(3)).unwrap();
    let items = exec.dispose_with(|items| items).unwrap();
    assert_eq!(items, vec![1, 2, 3]);
}

#[test]
fn test_resource_released_on_worker() {
    struct Handle(Arc<Mutex<Option<String>>>);

    impl Drop for Handle {
        fn drop(&mut self) {
            self.0
                .lock()
                .unwrap()
                .replace(thread::current().name().unwrap_or("").to_owned());
        }
    }

    let dropped_on = Arc::new(Mutex::new(None));
    let dcopy = dropped_on.clone();
    let exec = ExecutorConfig::new()
        .thread_name("release-test")
        .build(move || Handle(dcopy))
        .unwrap();
    drop(exec);
    assert_eq!(dropped_on.lock().unwrap().as_deref(), Some("release-test"));
}

#[test]
fn test_dispose_concurrent() {
    let exec = Arc::new(Executor::new().unwrap());
    let blocker = exec
        .invoke_async(|_| thread::sleep(Duration::from_millis(50)))
        .unwrap();
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let exec = exec.clone();
            thread::spawn(move || exec.dispose())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(exec.lifecycle(), Lifecycle::Disposed);
    blocker.wait().unwrap();
}

#[test]
fn test_dispose_from_other_thread_while_blocked() {
    let exec = Arc::new(Executor::new().unwrap());
    let (send, recv) = mpsc::channel();
    let ecopy = exec.clone();
    let caller = thread::spawn(move || {
        ecopy.invoke(move |_| {
            send.send(()).unwrap();
            thread::sleep(Duration::from_millis(50));
            7
        })
    });
    recv.recv().unwrap();
    exec.dispose().unwrap();
    assert_eq!(caller.join().unwrap().unwrap(), 7);
}
