//! RPC access for the tracker.
//!
//! Every blockchain read goes through a [`Gateway`], which caps how many calls are
//! in flight against one endpoint. [`create_provider`] builds the alloy provider a
//! gateway wraps via [`AlloyTransport`].

pub mod gateway;

use alloy_provider::{Provider, ProviderBuilder};
pub use gateway::{AlloyTransport, Gateway, GatewayError, RpcTransport};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Error parsing or validating URLs
    #[error("Invalid RPC URL: {0}")]
    InvalidUrl(String),
}

/// Convenience function to create an ethereum rpc provider from url.
pub fn create_provider(rpc_url: &str) -> Result<impl Provider + Clone, ClientError> {
    let url = rpc_url
        .parse()
        .map_err(|e| ClientError::InvalidUrl(format!("{}", e)))?;
    let provider = ProviderBuilder::new().connect_http(url);

    Ok(provider)
}

/// Create a gateway for `rpc_url` admitting at most `max_concurrency` concurrent calls.
pub fn create_gateway(
    endpoint: impl Into<String>,
    rpc_url: &str,
    max_concurrency: usize,
) -> Result<Gateway<AlloyTransport<impl Provider + Clone>>, ClientError> {
    let provider = create_provider(rpc_url)?;
    Ok(Gateway::new(
        endpoint,
        AlloyTransport::new(provider),
        max_concurrency,
    ))
}
