use anyhow::Context as _;
use common::aws::load_sdk_config;
use common::config::{AwsConfig, FunctionConfig, NotifierConfig};
use common::telemetry::{init_telemetry, TelemetryConfig};
use domain::BatchResponse;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use messaging::SnsPublisher;
use order_store::DynamoOrderStore;
use pipeline::api::handle_stream_event;
use pipeline::ChangeNotifier;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Function entry for one change-stream batch
async fn function_handler(notifier: &ChangeNotifier, event: LambdaEvent<Value>) -> Result<BatchResponse, Error> {
    let request_id = event.context.request_id.clone();

    match handle_stream_event(notifier, event.payload).await {
        Ok(response) => {
            if !response.is_success() {
                info!(
                    request_id = %request_id,
                    failures = response.batch_item_failures.len(),
                    "Reporting batch item failures"
                );
            }
            Ok(response)
        }
        Err(e) => {
            error!(request_id = %request_id, error_kind = e.kind(), "Error processing stream event: {}", e);
            Err(e.into())
        }
    }
}

async fn build_notifier() -> anyhow::Result<ChangeNotifier> {
    let config = NotifierConfig::from_env().context("invalid notifier configuration")?;
    let aws = AwsConfig::from_env();

    let sdk_config = load_sdk_config(&aws).await;
    let dynamodb = aws_sdk_dynamodb::Client::new(&sdk_config);
    let sns = aws_sdk_sns::Client::new(&sdk_config);

    info!(table = %config.table_name, topic = %config.topic_arn, "Notifier configured");
    let store = Arc::new(DynamoOrderStore::new(dynamodb, config.table_name));
    let publisher = Arc::new(SnsPublisher::new(sns, config.topic_arn));

    Ok(ChangeNotifier::new(store, publisher))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();

    let function = FunctionConfig::process_order();
    init_telemetry(TelemetryConfig::for_function(function.name))?;

    info!(
        function = function.name,
        timeout_secs = function.timeout.as_secs(),
        memory_mb = function.memory_mb,
        "Starting process-order function"
    );

    let notifier = Arc::new(build_notifier().await?);

    run(service_fn(move |event: LambdaEvent<Value>| {
        let notifier = notifier.clone();
        async move { function_handler(&notifier, event).await }
    }))
    .await
}
