use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::info;

use crate::config::AwsConfig;

/// Load the shared SDK configuration, honouring an endpoint override for local emulators
pub async fn load_sdk_config(config: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }

    if let Some(endpoint_url) = &config.endpoint_url {
        info!("Using AWS endpoint override: {}", endpoint_url);
        loader = loader.endpoint_url(endpoint_url);
    }

    loader.load().await
}
