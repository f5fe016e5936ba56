mod common;
use common::*;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tanzim::prelude::*;

struct Slow {
    id: u32,
}
struct Fast {
    slow: Arc<Slow>,
}

fn registry(calls: Arc<AtomicU32>, scope: Scope) -> Registry {
    Registry::builder()
        .provide(Binding::<Slow>::new(scope).to(move |_| {
            let id = calls.fetch_add(1, Ordering::SeqCst) + 1;
            thread::sleep(Duration::from_millis(20));
            Ok(Slow { id })
        }))
        .provide(
            Binding::<Fast>::new(Scope::Request)
                .needs::<Slow>()
                .to(|args| Ok(Fast { slow: args.get()? })),
        )
        .build()
        .unwrap()
}

#[test]
fn racing_callers_share_one_instance() {
    init_tracing();
    const THREADS: usize = 8;
    let calls = Arc::new(AtomicU32::new(0));
    let app = Arc::new(Container::open(registry(calls.clone(), Scope::App)));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let app = Arc::clone(&app);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                app.get::<Slow>().unwrap()
            })
        })
        .collect();

    let instances: Vec<Arc<Slow>> = handles.into_iter().map(|h| h.join().expect("thread panicked")).collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|slow| Arc::ptr_eq(slow, &instances[0])));
    app.close().unwrap();
}

#[test]
fn sibling_requests_race_on_a_shared_singleton() {
    init_tracing();
    const THREADS: usize = 6;
    let calls = Arc::new(AtomicU32::new(0));
    let app = Arc::new(Container::open(registry(calls.clone(), Scope::App)));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let app = Arc::clone(&app);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let request = app.enter_scope().unwrap();
                barrier.wait();
                let fast: Arc<Fast> = request.get().unwrap();
                let id = fast.slow.id;
                request.close().unwrap();
                id
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("thread panicked"), 1);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    app.close().unwrap();
}

#[test]
fn request_scoped_instances_are_not_shared_across_requests() {
    init_tracing();
    let calls = Arc::new(AtomicU32::new(0));
    let app = Arc::new(Container::open(registry(calls.clone(), Scope::Request)));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let app = Arc::clone(&app);
            thread::spawn(move || {
                app
                    .scoped(|request| {
                        let first: Arc<Slow> = request.get()?;
                        let second: Arc<Slow> = request.get()?;
                        assert!(Arc::ptr_eq(&first, &second));
                        Ok::<_, ContainerError>(first.id)
                    })
                    .unwrap()
            })
        })
        .collect();

    let mut ids: Vec<u32> = handles.into_iter().map(|h| h.join().expect("thread panicked")).collect();
    ids.sort_unstable();
    assert_eq!(ids, [1, 2, 3, 4]);
    app.close().unwrap();
}

#[test]
fn sibling_request_builds_run_in_parallel() {
    init_tracing();
    struct Config;
    struct Report {
        _config: Arc<Config>,
    }

    let in_flight = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));
    let (current, highest) = (in_flight.clone(), peak.clone());

    let registry = Registry::builder()
        .value(Scope::App, Config)
        .provide(Binding::<Report>::new(Scope::Request).needs::<Config>().to(move |args| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            highest.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(Report { _config: args.get()? })
        }))
        .build()
        .unwrap();
    let app = Arc::new(Container::open(registry));
    let _: Arc<Config> = app.get().unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let app = Arc::clone(&app);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let request = app.enter_scope().unwrap();
                barrier.wait();
                let _: Arc<Report> = request.get().unwrap();
                request.close().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert_eq!(peak.load(Ordering::SeqCst), 2, "sibling requests were built one at a time");
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    app.close().unwrap();
}

#[test]
fn request_build_does_not_wait_for_unrelated_app_build() {
    init_tracing();
    struct SlowSingleton;
    struct Quick;

    let started = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let (started_in_factory, release_in_factory) = (started.clone(), release.clone());

    let registry = Registry::builder()
        .provide(Binding::<SlowSingleton>::new(Scope::App).to(move |_| {
            started_in_factory.wait();
            release_in_factory.wait();
            Ok(SlowSingleton)
        }))
        .provide(Binding::<Quick>::new(Scope::Request).to(|_| Ok(Quick)))
        .build()
        .unwrap();
    let app = Arc::new(Container::open(registry));

    let builder = {
        let app = Arc::clone(&app);
        thread::spawn(move || app.get::<SlowSingleton>().map(|_| ()))
    };

    // The App build is now in progress and holds the App container.
    started.wait();
    let request = app.enter_scope().unwrap();
    let _: Arc<Quick> = request.get().unwrap();
    request.close().unwrap();
    release.wait();

    builder.join().expect("thread panicked").unwrap();
    app.close().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_tasks_share_one_instance() {
    init_tracing();
    let calls = Arc::new(AtomicU32::new(0));
    let app = Arc::new(Container::open(registry(calls.clone(), Scope::App)));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let app = Arc::clone(&app);
            tokio::task::spawn_blocking(move || app.get::<Slow>().map(|slow| slow.id))
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.expect("task panicked").unwrap(), 1);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    app.close().unwrap();
}

#[test]
fn containers_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Container>();
    assert_send_sync::<Registry>();
    assert_send_sync::<Deferred<Slow>>();
}
