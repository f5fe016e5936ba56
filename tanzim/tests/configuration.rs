mod common;
use common::*;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tanzim::error::ConfigurationProblem;
use tanzim::prelude::*;

struct Database;
struct Repository {
    _db: Arc<Database>,
}
struct Session;
struct Cache {
    _session: Arc<Session>,
}

#[test]
fn missing_provider_is_reported_at_build() {
    init_tracing();
    let result = Registry::builder()
        .provide(
            Binding::<Repository>::new(Scope::App)
                .needs::<Database>()
                .to(|args| Ok(Repository { _db: args.get()? })),
        )
        .build();

    match result {
        Err(ContainerError::Configuration(err)) => {
            assert_eq!(err.problems.len(), 1);
            match &err.problems[0] {
                ConfigurationProblem::MissingProvider(missing) => {
                    assert_eq!(missing.requested, DependencyKey::of::<Database>());
                    assert_eq!(missing.required_by, Some(DependencyKey::of::<Repository>()));
                }
                other => panic!("expected MissingProvider, got: {other:?}"),
            }
        }
        other => panic!("expected Configuration, got: {:?}", other.err()),
    }
}

#[test]
fn every_problem_is_reported_together() {
    init_tracing();
    let result = Registry::builder()
        .provide(
            Binding::<Repository>::new(Scope::App)
                .needs::<Database>()
                .to(|args| Ok(Repository { _db: args.get()? })),
        )
        .provide(Binding::<Session>::new(Scope::Request).to(|_| Ok(Session)))
        .provide(
            Binding::<Cache>::new(Scope::App)
                .needs::<Session>()
                .to(|args| Ok(Cache { _session: args.get()? })),
        )
        .provide(Binding::<Session>::new(Scope::Request).to(|_| Ok(Session)))
        .build();

    let Err(ContainerError::Configuration(err)) = result else {
        panic!("expected a configuration error");
    };

    assert_eq!(err.problems.len(), 3);
    assert!(err.problems.iter().any(|p| matches!(p, ConfigurationProblem::DuplicateProvider { .. })));
    assert!(err.problems.iter().any(|p| matches!(p, ConfigurationProblem::MissingProvider(_))));
    assert!(err.problems.iter().any(|p| matches!(
        p,
        ConfigurationProblem::ScopeViolation(v)
            if v.consumer == DependencyKey::of::<Cache>() && v.dependency_scope == Scope::Request
    )));

    let message = err.to_string();
    assert!(message.contains("Database"), "{message}");
    assert!(message.contains("Cache"), "{message}");
}

#[test]
fn override_keeps_the_last_registration() {
    init_tracing();
    struct Port(u16);

    let registry = Registry::builder()
        .allow_override(true)
        .value(Scope::App, Port(8080))
        .value(Scope::App, Port(9090))
        .build()
        .unwrap();

    let app = Container::open(registry);
    assert_eq!(app.get::<Port>().unwrap().0, 9090);
    app.close().unwrap();
}

#[test]
fn settings_load_from_json() {
    let settings: Settings = serde_json::from_str(r#"{ "allow_override": true }"#).unwrap();
    assert!(settings.allow_override);
    assert!(!settings.strict_cycles);

    struct Port(u16);
    let registry = Registry::builder()
        .with_settings(settings)
        .value(Scope::App, Port(1))
        .value(Scope::App, Port(2))
        .build();
    assert!(registry.is_ok());
}

#[test]
fn unregistered_type_suggests_close_names() {
    init_tracing();
    struct UserRepository;
    struct UserRepositry;

    let registry = Registry::builder()
        .provide(Binding::<UserRepository>::new(Scope::App).to(|_| Ok(UserRepository)))
        .build()
        .unwrap();
    let app = Container::open(registry);

    match app.get::<UserRepositry>() {
        Err(ContainerError::NotRegistered(err)) => {
            assert_eq!(err.requested, DependencyKey::of::<UserRepositry>());
            assert_eq!(err.suggestions, vec![DependencyKey::of::<UserRepository>()]);
        }
        other => panic!("expected NotRegistered, got: {:?}", other.err()),
    }
    app.close().unwrap();
}

#[test]
fn failed_resolution_caches_nothing() {
    init_tracing();
    let db_calls = Arc::new(AtomicU32::new(0));
    let repo_calls = Arc::new(AtomicU32::new(0));
    let (db, repo) = (db_calls.clone(), repo_calls.clone());

    let registry = Registry::builder()
        .provide(Binding::<Database>::new(Scope::App).to(move |_| {
            db.fetch_add(1, Ordering::SeqCst);
            Ok(Database)
        }))
        .provide(Binding::<Repository>::new(Scope::App).needs::<Database>().to(move |args| {
            if repo.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err("connection refused".into());
            }
            Ok(Repository { _db: args.get()? })
        }))
        .build()
        .unwrap();
    let app = Container::open(registry);

    match app.get::<Repository>() {
        Err(ContainerError::FactoryFailed { key, source }) => {
            assert_eq!(key, DependencyKey::of::<Repository>());
            assert_eq!(source.to_string(), "connection refused");
        }
        other => panic!("expected FactoryFailed, got: {:?}", other.err()),
    }
    assert_eq!(app.cached_len(), 0);

    // The retry rebuilds the database the failed call had built.
    let repo: Arc<Repository> = app.get().unwrap();
    let db: Arc<Database> = app.get().unwrap();
    assert!(Arc::ptr_eq(&repo._db, &db));
    assert_eq!(db_calls.load(Ordering::SeqCst), 2);
    assert_eq!(repo_calls.load(Ordering::SeqCst), 2);

    app.close().unwrap();
}

#[test]
fn undeclared_dependency_is_rejected() {
    init_tracing();
    let registry = Registry::builder()
        .provide(Binding::<Database>::new(Scope::App).to(|_| Ok(Database)))
        .provide(
            Binding::<Repository>::new(Scope::App).to(|args| Ok(Repository { _db: args.get()? })),
        )
        .build()
        .unwrap();
    let app = Container::open(registry);

    assert!(matches!(
        app.get::<Repository>(),
        Err(ContainerError::UndeclaredDependency { .. })
    ));
    app.close().unwrap();
}

#[test]
fn provider_modules_register_together() {
    init_tracing();
    struct Storage;

    impl Provider for Storage {
        fn register(&self, registry: &mut dyn ProviderRegistry) {
            registry.add(Binding::<Database>::new(Scope::App).to(|_| Ok(Database)));
            registry.add(
                Binding::<Repository>::new(Scope::Request)
                    .needs::<Database>()
                    .to(|args| Ok(Repository { _db: args.get()? })),
            );
        }
    }

    let registry = Registry::builder().add_provider(&Storage).build().unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.scope_of(&DependencyKey::of::<Repository>()), Some(Scope::Request));

    let app = Container::open(registry);
    app
        .scoped(|request| request.get::<Repository>().map(|_| ()))
        .unwrap();
    app.close().unwrap();
}
