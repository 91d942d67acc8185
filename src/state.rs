mod request_id;

use bytes::Bytes;

use crate::auth::{authenticate, AllowedClientKeys};
use crate::config::{AppConfig, RenderingMode};
use crate::error::GatewayError;
use crate::protocol::openai_chat::{OpenAiModel, OpenAiModelList};
use crate::transport::HttpTransport;
use crate::util::unix_now_secs;

pub use request_id::RequestIds;
use request_id::RequestIdGenerator;

const MODEL_OWNER: &str = "z.ai";

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    infra: InfraState,
    models_response_body: Bytes,
}

struct InfraState {
    allowed_client_keys: AllowedClientKeys,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AppConfig,
        transport: HttpTransport,
        allowed_client_keys: AllowedClientKeys,
    ) -> Self {
        let models_response_body = build_models_response_body(&config);
        Self {
            config,
            transport,
            infra: InfraState {
                allowed_client_keys,
                request_ids: RequestIdGenerator::new(),
            },
            models_response_body,
        }
    }

    /// Authenticate a client request using the prebuilt key index.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Auth` when the API key is missing or invalid.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), GatewayError> {
        authenticate(headers, &self.infra.allowed_client_keys)
    }

    #[must_use]
    pub fn next_request_ids(&self) -> RequestIds {
        self.infra.request_ids.next_ids()
    }

    #[must_use]
    pub fn rendering_mode(&self) -> RenderingMode {
        self.config.features.think_tags_mode
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.config.features.model_name
    }

    #[must_use]
    pub fn models_response_body(&self) -> Bytes {
        self.models_response_body.clone()
    }
}

fn build_models_response_body(config: &AppConfig) -> Bytes {
    let list = OpenAiModelList {
        object: "list".to_string(),
        data: vec![OpenAiModel {
            id: config.features.model_name.clone(),
            object: "model".to_string(),
            created: unix_now_secs(),
            owned_by: MODEL_OWNER.to_string(),
        }],
    };
    serde_json::to_vec(&list).map_or_else(
        |err| {
            tracing::error!(error = %err, "failed to serialize models response");
            Bytes::from_static(br#"{"object":"list","data":[]}"#)
        },
        Bytes::from,
    )
}
