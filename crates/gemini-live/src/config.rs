//! Connection settings for a Gemini Live session.

use cubby_core::ToolDeclaration;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

const VERTEX_HOST_SUFFIX: &str = "aiplatform.googleapis.com";
const VERTEX_PATH: &str =
    "/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent";
const DEVELOPER_API_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Which Google endpoint hosts the live session.
pub enum Backend {
    /// Vertex AI, authenticated with an OAuth bearer token.
    Vertex {
        project: String,
        location: String,
        access_token: SecretString,
    },
    /// The Gemini Developer API, authenticated with an API key.
    DeveloperApi { api_key: SecretString },
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Vertex {
                project, location, ..
            } => f
                .debug_struct("Vertex")
                .field("project", project)
                .field("location", location)
                .finish_non_exhaustive(),
            Backend::DeveloperApi { .. } => f.debug_struct("DeveloperApi").finish_non_exhaustive(),
        }
    }
}

#[derive(Debug)]
pub struct LiveConfig {
    pub backend: Backend,
    /// Bare model id, e.g. `gemini-2.0-flash-live-preview-04-09`.
    pub model: String,
    pub voice_name: String,
    pub system_instruction: String,
    pub tools: Vec<ToolDeclaration>,
}

impl LiveConfig {
    /// WebSocket endpoint for the configured backend.
    pub fn url(&self) -> String {
        match &self.backend {
            Backend::Vertex { location, .. } => {
                format!("wss://{}-{}{}", location, VERTEX_HOST_SUFFIX, VERTEX_PATH)
            }
            Backend::DeveloperApi { api_key } => {
                format!("{}?key={}", DEVELOPER_API_URL, api_key.expose_secret())
            }
        }
    }

    /// Fully qualified model resource name as the backend expects it in `setup`.
    pub fn model_path(&self) -> String {
        match &self.backend {
            Backend::Vertex {
                project, location, ..
            } => format!(
                "projects/{}/locations/{}/publishers/google/models/{}",
                project, location, self.model
            ),
            Backend::DeveloperApi { .. } => format!("models/{}", self.model),
        }
    }

    /// Bearer token to send with the upgrade request, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        match &self.backend {
            Backend::Vertex { access_token, .. } => Some(access_token.expose_secret()),
            Backend::DeveloperApi { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: Backend) -> LiveConfig {
        LiveConfig {
            backend,
            model: "gemini-2.0-flash-live-preview-04-09".into(),
            voice_name: "Puck".into(),
            system_instruction: String::new(),
            tools: vec![],
        }
    }

    #[test]
    fn test_vertex_endpoint_and_model_path() {
        let cfg = config(Backend::Vertex {
            project: "cubby-demo".into(),
            location: "us-central1".into(),
            access_token: SecretString::from("ya29.token".to_string()),
        });
        assert_eq!(
            cfg.url(),
            "wss://us-central1-aiplatform.googleapis.com/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent"
        );
        assert_eq!(
            cfg.model_path(),
            "projects/cubby-demo/locations/us-central1/publishers/google/models/gemini-2.0-flash-live-preview-04-09"
        );
        assert_eq!(cfg.bearer_token(), Some("ya29.token"));
    }

    #[test]
    fn test_developer_api_endpoint_and_model_path() {
        let cfg = config(Backend::DeveloperApi {
            api_key: SecretString::from("abc123".to_string()),
        });
        assert!(cfg.url().ends_with("BidiGenerateContent?key=abc123"));
        assert_eq!(
            cfg.model_path(),
            "models/gemini-2.0-flash-live-preview-04-09"
        );
        assert_eq!(cfg.bearer_token(), None);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let cfg = config(Backend::Vertex {
            project: "cubby-demo".into(),
            location: "us-central1".into(),
            access_token: SecretString::from("ya29.token".to_string()),
        });
        let printed = format!("{:?}", cfg);
        assert!(printed.contains("cubby-demo"));
        assert!(!printed.contains("ya29.token"));
    }
}
