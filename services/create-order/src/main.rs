use anyhow::Context as _;
use common::aws::load_sdk_config;
use common::config::{AwsConfig, FunctionConfig, IntakeConfig};
use common::telemetry::{init_telemetry, TelemetryConfig};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use order_store::DynamoOrderStore;
use pipeline::api::{handle_intake_event, IntakeResponse};
use pipeline::OrderIntake;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Function entry for one intake invocation
async fn function_handler(intake: &OrderIntake, event: LambdaEvent<Value>) -> Result<IntakeResponse, Error> {
    let request_id = event.context.request_id.clone();

    match handle_intake_event(intake, event.payload).await {
        Ok(response) => {
            info!(
                request_id = %request_id,
                status_code = response.status_code,
                "Intake request handled"
            );
            Ok(response)
        }
        Err(e) => {
            error!(request_id = %request_id, error_kind = e.kind(), "Error creating order: {}", e);
            Err(e.into())
        }
    }
}

async fn build_intake() -> anyhow::Result<OrderIntake> {
    let config = IntakeConfig::from_env().context("invalid intake configuration")?;
    let aws = AwsConfig::from_env();

    let sdk_config = load_sdk_config(&aws).await;
    let client = aws_sdk_dynamodb::Client::new(&sdk_config);

    info!(table = %config.table_name, ttl_days = config.ttl_days, "Order table configured");
    let store = Arc::new(DynamoOrderStore::new(client, config.table_name));

    Ok(OrderIntake::new(store, config.ttl_days))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();

    let function = FunctionConfig::create_order();
    init_telemetry(TelemetryConfig::for_function(function.name))?;

    info!(
        function = function.name,
        timeout_secs = function.timeout.as_secs(),
        memory_mb = function.memory_mb,
        "Starting create-order function"
    );

    // Clients are built once per process and shared by every invocation
    let intake = Arc::new(build_intake().await?);

    run(service_fn(move |event: LambdaEvent<Value>| {
        let intake = intake.clone();
        async move { function_handler(&intake, event).await }
    }))
    .await
}
