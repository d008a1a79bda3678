use std::sync::Arc;

use crate::backend::domain::backend_client::BackendClient;
use crate::shared::run_config::{ClientType, ConfigError, RunConfig};

use super::compreface_client::CompreFaceClient;
use super::double_take_client::DoubleTakeClient;

/// Builds the backend client selected by the configuration.
pub fn create_client(config: &RunConfig) -> Result<Arc<dyn BackendClient>, ConfigError> {
    let backend = &config.backend;
    match config.client_type {
        ClientType::CompreFace => {
            let api_key = backend
                .compreface_api_key
                .as_deref()
                .filter(|key| !key.is_empty())
                .ok_or(ConfigError::MissingApiKey)?;
            log::info!("Using CompreFace at {}", backend.compreface_url);
            let client =
                CompreFaceClient::new(&backend.compreface_url, api_key, backend.request_timeout)
                    .map_err(ConfigError::HttpClient)?;
            Ok(Arc::new(client))
        }
        ClientType::DoubleTake => {
            log::info!("Using Double Take at {}", backend.doubletake_url);
            let client = DoubleTakeClient::new(&backend.doubletake_url, backend.request_timeout)
                .map_err(ConfigError::HttpClient)?;
            Ok(Arc::new(client))
        }
    }
}
