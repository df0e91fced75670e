use std::path::Path;

use stampline_core::{
    AnnotationResult, Annotator, ConfigError, Context, Failure, HttpError, Item, post_json,
    read_source,
};

use crate::api::{GenerateRequest, GenerateResponse};
use crate::config::GeminiConfig;

/// MIME type from the file extension
pub fn mime_type(path: &Path) -> Result<&'static str, Failure> {
    image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .map_err(|_| Failure::malformed(format!("unknown image format: {}", path.display())))
}

/// Answers that no row can fix halt the run.
///
/// A rejected key comes back as 400 `API_KEY_INVALID`, not 401. An unknown
/// model or endpoint is a 404 (or a 400 naming the model), not a missing item.
fn classify(e: &HttpError) -> Failure {
    let msg = e.to_string();
    match e.status() {
        Some(400) if msg.contains("API_KEY_INVALID") || msg.contains("API key not valid") => {
            Failure::unauthorized(msg)
        }
        Some(400)
            if msg.contains("not supported for generateContent")
                || msg.contains("not found for API version") =>
        {
            Failure::unauthorized(format!("unknown model (check gemini.model): {msg}"))
        }
        Some(404) => Failure::unauthorized(format!(
            "model or endpoint not found (check gemini.model and gemini.api_url): {msg}"
        )),
        _ => e.to_failure(),
    }
}

/// Cloud multimodal annotator: image plus prompt in, model text out
pub struct GeminiAnnotator {
    name: String,
    config: GeminiConfig,
    api_key: String,
    endpoint: String,
}

impl std::fmt::Debug for GeminiAnnotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAnnotator")
            .field("model", &self.config.model)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl GeminiAnnotator {
    /// Fails before any row runs when the key is missing or the config is invalid.
    pub fn new(config: GeminiConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let api_key = config.resolve_api_key()?;
        Ok(Self {
            name: format!("gemini/{}", config.model),
            endpoint: config.endpoint(),
            api_key,
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

impl Annotator for GeminiAnnotator {
    fn name(&self) -> &str {
        &self.name
    }

    fn annotate(&mut self, item: &Item, ctx: &Context) -> AnnotationResult {
        let mime = mime_type(&ctx.source)?;
        let bytes = read_source(ctx)?;
        log::debug!(
            "{}: {} bytes ({mime}) -> {}",
            item.identity,
            bytes.len(),
            self.config.model
        );

        let request = GenerateRequest::image_with_prompt(&bytes, mime, &self.config.prompt);
        let response: GenerateResponse = post_json(
            &self.endpoint,
            &[("x-goog-api-key", self.api_key.as_str())],
            &request,
            self.config.timeout(),
        )
        .map_err(|e| classify(&e))?;

        response
            .text()
            .ok_or_else(|| Failure::malformed(response.empty_reason()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampline_core::FailureKind;
    use tempfile::TempDir;

    fn keyed() -> GeminiConfig {
        GeminiConfig {
            api_key: Some("test-key".into()),
            // unroutable; these tests must fail before any request is sent
            api_url: "http://127.0.0.1:9/".into(),
            ..Default::default()
        }
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_type(Path::new("stamps/a.jpg")).unwrap(), "image/jpeg");
        assert_eq!(mime_type(Path::new("stamps/a.JPEG")).unwrap(), "image/jpeg");
        assert_eq!(mime_type(Path::new("b.png")).unwrap(), "image/png");
        assert_eq!(mime_type(Path::new("c.webp")).unwrap(), "image/webp");
        let err = mime_type(Path::new("notes.txt")).unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedInput);
    }

    #[test]
    fn invalid_key_response_is_unauthorized() {
        let e = HttpError::Http {
            status: Some(400),
            message: r#"{ "error": { "code": 400, "status": "INVALID_ARGUMENT", "details": [ { "reason": "API_KEY_INVALID" } ] } }"#.into(),
        };
        assert_eq!(classify(&e).kind, FailureKind::Unauthorized);
        let e = HttpError::Http {
            status: Some(400),
            message: "Unable to process input image".into(),
        };
        assert_eq!(classify(&e).kind, FailureKind::MalformedInput);
    }

    #[test]
    fn unknown_model_halts_instead_of_failing_rows() {
        let e = HttpError::Http {
            status: Some(404),
            message: r#"{ "error": { "code": 404, "message": "models/gemini-2.5-flsh is not found for API version v1beta", "status": "NOT_FOUND" } }"#.into(),
        };
        let failure = classify(&e);
        assert_eq!(failure.kind, FailureKind::Unauthorized);
        assert!(failure.message.contains("gemini.model"));

        let e = HttpError::Http {
            status: Some(400),
            message: "models/embedding-001 is not supported for generateContent".into(),
        };
        assert_eq!(classify(&e).kind, FailureKind::Unauthorized);
    }

    #[test]
    fn name_includes_model() {
        let annotator = GeminiAnnotator::new(keyed()).unwrap();
        assert_eq!(annotator.name(), "gemini/gemini-2.5-flash");
        assert_eq!(annotator.model(), "gemini-2.5-flash");
    }

    #[test]
    fn invalid_config_rejected() {
        let cfg = GeminiConfig {
            timeout_seconds: 0,
            ..keyed()
        };
        assert!(matches!(
            GeminiAnnotator::new(cfg),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn missing_source_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut annotator = GeminiAnnotator::new(keyed()).unwrap();
        let item = Item {
            index: 0,
            identity: "stamps/gone.jpg".into(),
        };
        let ctx = Context {
            source: dir.path().join("stamps/gone.jpg"),
        };
        let failure = annotator.annotate(&item, &ctx).unwrap_err();
        assert_eq!(failure.kind, FailureKind::NotFound);
    }

    #[test]
    fn empty_image_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.png");
        std::fs::write(&path, b"").unwrap();
        let mut annotator = GeminiAnnotator::new(keyed()).unwrap();
        let item = Item {
            index: 0,
            identity: "empty.png".into(),
        };
        let failure = annotator.annotate(&item, &Context { source: path }).unwrap_err();
        assert_eq!(failure.kind, FailureKind::MalformedInput);
    }
}
