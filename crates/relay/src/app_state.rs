use reqwest::Client;
use url::Url;

use crate::config::RelayConfig;

#[derive(Clone)]
pub struct RelayState {
    pub(crate) http: Client,
    pub(crate) api_key: String,
    pub(crate) directory_url: Url,
    pub(crate) proxy_host: Url,
}

impl RelayState {
    pub fn new(http: Client, config: &RelayConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            directory_url: config.directory_url.clone(),
            proxy_host: config.proxy_host.clone(),
        }
    }
}
