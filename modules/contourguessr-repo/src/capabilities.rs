use anyhow::Result;
use async_trait::async_trait;
use capabilities_client::CapabilitiesClient;

/// Source of WMTS capabilities documents for map layers.
#[async_trait]
pub trait CapabilitiesSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

#[async_trait]
impl CapabilitiesSource for CapabilitiesClient {
    async fn fetch(&self, url: &str) -> Result<String> {
        Ok(CapabilitiesClient::fetch(self, url).await?)
    }
}
