//! A tiny command runner wired with Tanzim.
//!
//! Every command runs in its own request scope: the adapter enters the
//! scope, pulls the handler out of the container, runs it, and closes the
//! scope whatever the handler returned.
//!
//! Run with `RUST_LOG=tanzim=debug cargo run --example request_scope`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tanzim::prelude::*;
use tracing_subscriber::EnvFilter;

// === Application services ===

struct Config {
    database_url: String,
}

struct Database {
    url: String,
    queries: AtomicU64,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.queries.fetch_add(1, Ordering::SeqCst);
        format!("{sql} @ {}", self.url)
    }
}

/// Collects lines written during one command.
struct Journal {
    lines: Mutex<Vec<String>>,
}

/// Needs the audit log and is needed by it.
struct UserService {
    db: Arc<Database>,
    audit: Deferred<AuditLog>,
}

impl UserService {
    fn find(&self, id: u64) -> std::result::Result<String, BoxError> {
        let row = self.db.query(&format!("SELECT name FROM users WHERE id = {id}"));
        self.audit.try_get()?.record(&format!("looked up user {id}"));
        Ok(row)
    }
}

struct AuditLog {
    users: Arc<UserService>,
    journal: Arc<Journal>,
}

impl AuditLog {
    fn record(&self, event: &str) {
        self.journal.lines.lock().push(event.to_string());
    }

    fn sees_same_service(&self, service: &Arc<UserService>) -> bool {
        Arc::ptr_eq(&self.users, service)
    }
}

// === Wiring ===

struct AppProvider;

impl Provider for AppProvider {
    fn register(&self, registry: &mut dyn ProviderRegistry) {
        registry.add(Binding::<Config>::new(Scope::App).to(|_| {
            Ok(Config { database_url: "postgres://localhost/app".to_string() })
        }));
        registry.add(
            Binding::<Database>::new(Scope::App)
                .needs::<Config>()
                .on_close(|db| {
                    println!("closing database after {} queries", db.queries.load(Ordering::SeqCst));
                    Ok(())
                })
                .to(|args| {
                    let config: Arc<Config> = args.get()?;
                    Ok(Database { url: config.database_url.clone(), queries: AtomicU64::new(0) })
                }),
        );
    }
}

struct RequestProvider;

impl Provider for RequestProvider {
    fn register(&self, registry: &mut dyn ProviderRegistry) {
        registry.add(
            Binding::<Journal>::new(Scope::Request)
                .on_close(|journal| {
                    for line in journal.lines.lock().iter() {
                        println!("  journal: {line}");
                    }
                    Ok(())
                })
                .to(|_| Ok(Journal { lines: Mutex::new(Vec::new()) })),
        );
        registry.add(
            Binding::<UserService>::new(Scope::Request)
                .needs::<Database>()
                .needs_deferred::<AuditLog>()
                .to(|args| Ok(UserService { db: args.get()?, audit: args.deferred()? })),
        );
        registry.add(
            Binding::<AuditLog>::new(Scope::Request)
                .needs::<UserService>()
                .needs::<Journal>()
                .to(|args| Ok(AuditLog { users: args.get()?, journal: args.get()? })),
        );
    }
}

// === Adapter ===

/// Runs one command inside a fresh request scope.
fn run_command(app: &Container, id: u64) -> std::result::Result<String, BoxError> {
    let _span = tracing::info_span!("command", user = id).entered();
    tracing::info!("Running command");
    app.scoped(|request| {
        let service: Arc<UserService> = request.get()?;
        let audit: Arc<AuditLog> = request.get()?;
        assert!(audit.sees_same_service(&service));
        service.find(id)
    })
}

fn main() -> std::result::Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tanzim=info")))
        .init();

    let registry = Registry::builder()
        .add_provider(&AppProvider)
        .add_provider(&RequestProvider)
        .build()?;
    println!("{registry:?}");

    let app = Container::open(registry);
    for id in [42, 7] {
        println!("command user {id}");
        println!("  -> {}", run_command(&app, id)?);
    }

    app.close()?;
    Ok(())
}
