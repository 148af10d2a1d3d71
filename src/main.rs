//! ClassChat webhook server
//!
//! Main application entry point

#![deny(unused_imports)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use ClassChat::{
    config::Settings,
    database::{connection::create_pool, run_migrations, AdminRepository},
    flows::{FlowDefinition, FlowEngine, FlowHandler, FlowRegistry, Step, Validation},
    handlers::{PatternLookup, Router},
    middleware::{AdminRegistry, StaticAdminRegistry},
    server::{app, AppState},
    state::{session_store_from_settings, FlowData},
    transport::{HttpMessenger, OutboundMessage},
    utils::logging,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    settings.validate()?;

    // Initialize logging
    let _log_guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", ClassChat::info());

    // Initialize session storage
    let store = session_store_from_settings(&settings).await?;
    info!(backend = ?settings.session.backend, durability = ?store.durability(), "Session store ready");

    // Initialize the admin allow-list
    let admins: Arc<dyn AdminRegistry> = match &settings.database {
        Some(database) => {
            info!("Connecting to database...");
            let pool = create_pool(database).await?;
            run_migrations(&pool).await?;
            Arc::new(AdminRepository::new(pool))
        }
        None => {
            warn!("No database configured, using the static admin list from settings");
            Arc::new(StaticAdminRegistry::new(&settings))
        }
    };

    // Register flows
    let registry = Arc::new(build_registry()?);
    info!(flows = registry.len(), "Flow registry ready");

    let engine = Arc::new(FlowEngine::new(registry, store.clone()));
    let messenger = Arc::new(HttpMessenger::new(&settings.bot)?);

    let mut router = Router::new(engine, admins, messenger, &settings.router);
    router.register_lookup(
        PatternLookup::new(r"^\d{5}$", |student_id: String| async move {
            anyhow::Ok(vec![OutboundMessage::text(format!(
                "🔎 Looking up student {}. Connect a student directory to show records here.",
                student_id
            ))])
        })?
        .restrict_to_admins(),
    );

    let state = AppState {
        router: Arc::new(router),
        store,
    };

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_address).await?;
    info!("Listening on {}", settings.server.bind_address);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("ClassChat has been shut down.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}

/// Logs collected answers; stands in for the school's record store
struct LogSubmission;

#[async_trait]
impl FlowHandler for LogSubmission {
    async fn on_complete(&self, data: &FlowData, user_id: &str) -> anyhow::Result<Option<String>> {
        info!(user_id = user_id, data = ?data, "Flow submitted");
        Ok(None)
    }
}

fn build_registry() -> ClassChat::Result<FlowRegistry> {
    let mut registry = FlowRegistry::new();

    registry.register(
        FlowDefinition::new("enquiry", "Ask a question", LogSubmission)
            .description("Send a question to the school office")
            .step(Step::text("name", "What is your name?").validate(|input| {
                if input.trim().chars().count() >= 2 {
                    Validation::Valid
                } else {
                    Validation::invalid("Please enter at least 2 characters.")
                }
            }))
            .step(Step::text("question", "What would you like to ask?")),
    )?;

    registry.register(
        FlowDefinition::new("add_student", "Add student", LogSubmission)
            .description("Register a new student")
            .requires_permission("students.write")
            .step(Step::text("full_name", "Student's full name?").validate(|input| (input.trim().len() >= 3).into()))
            .step(Step::date("birth_date", "Date of birth?"))
            .step(Step::select("grade", "Grade?", &["P1", "P2", "P3", "P4", "P5", "P6"]))
            .step(Step::confirm("has_sibling", "Does the student have a sibling at the school?"))
            .step(
                Step::text("sibling_id", "Sibling's student id?")
                    .validate(|input| (input.trim().len() == 5 && input.trim().chars().all(|c| c.is_ascii_digit())).into())
                    .skip_if(|data| data.get("has_sibling") == Some(&json!(false))),
            )
            .step(Step::image("photo", "Please send a photo of the student.")),
    )?;

    Ok(registry)
}
