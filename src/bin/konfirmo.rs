use anyhow::Result;
use konfirmo::cli::{actions, actions::Action, start, telemetry};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // Start the program
    let action = start()?;

    // Handle the action
    let result = match action {
        Action::Server(args) => actions::server::execute(args).await,
    };

    telemetry::shutdown_tracer();

    result
}
