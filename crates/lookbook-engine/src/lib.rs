use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};
use lookbook_contracts::config::{build_generation_payload, ShootConfig};
use lookbook_contracts::events::{EventPayload, EventWriter};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Map, Value};

pub const DEFAULT_UPLOAD_FOLDER: &str = "uploads";

/// Single-prompt refinement request for the backend's quick-update endpoint.
/// No section/type structure; reference URLs are passed straight through.
#[derive(Debug, Clone, PartialEq)]
pub struct QuickUpdateRequest {
    pub prompt: String,
    pub image_urls: Vec<String>,
    pub aspect_ratio: String,
    pub resolution: String,
}

/// The generation backend seam. Image references coming back are opaque
/// strings (URLs or encoded payloads); the engine never looks inside them.
pub trait PhotoshootBackend {
    fn name(&self) -> &str;
    fn generate(&self, payload: &ShootConfig) -> Result<Vec<String>>;
    fn quick_update(&self, request: &QuickUpdateRequest) -> Result<String>;
}

/// Talks to the real generation service over its two endpoints. Either
/// endpoint may be left unconfigured; calling it then fails locally.
pub struct HttpBackend {
    generate_url: Option<String>,
    quick_update_url: Option<String>,
    http: HttpClient,
}

impl HttpBackend {
    pub fn new(generate_url: Option<String>, quick_update_url: Option<String>) -> Self {
        Self {
            generate_url,
            quick_update_url,
            http: HttpClient::new(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let generate_url = non_empty_env("LOOKBOOK_API_URL");
        let quick_update_url = non_empty_env("LOOKBOOK_QUICK_API_URL");
        if generate_url.is_none() && quick_update_url.is_none() {
            bail!("neither LOOKBOOK_API_URL nor LOOKBOOK_QUICK_API_URL is set");
        }
        Ok(Self::new(generate_url, quick_update_url))
    }
}

impl PhotoshootBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    fn generate(&self, payload: &ShootConfig) -> Result<Vec<String>> {
        let Some(endpoint) = self.generate_url.as_deref() else {
            bail!("generation endpoint not configured (LOOKBOOK_API_URL)");
        };
        let response = self
            .http
            .post(endpoint)
            .json(payload)
            .send()
            .with_context(|| format!("generation request failed ({endpoint})"))?;
        let envelope = response_json_or_error("generation backend", response)?;
        parse_generate_envelope(&envelope)
    }

    fn quick_update(&self, request: &QuickUpdateRequest) -> Result<String> {
        let Some(endpoint) = self.quick_update_url.as_deref() else {
            bail!("quick-update endpoint not configured (LOOKBOOK_QUICK_API_URL)");
        };
        let body = json!({
            "prompt": request.prompt,
            "image_urls": request.image_urls,
            "aspect_ratio": request.aspect_ratio,
            "resolution": request.resolution,
        });
        let response = self
            .http
            .post(endpoint)
            .json(&body)
            .send()
            .with_context(|| format!("quick-update request failed ({endpoint})"))?;
        let envelope = response_json_or_error("quick-update backend", response)?;
        parse_quick_envelope(&envelope)
    }
}

/// Full-generation envelope: `{"status": "success", "data": {"images": [..]}}`
/// on success, `message` otherwise.
pub fn parse_generate_envelope(payload: &Value) -> Result<Vec<String>> {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if status == "success" {
        let images = payload
            .get("data")
            .and_then(|data| data.get("images"))
            .and_then(Value::as_array);
        if let Some(rows) = images {
            return Ok(rows
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect());
        }
    }
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Generation failed");
    bail!("{message}");
}

/// Quick-update envelope: `{"success": true, "image": ".."}` on success,
/// `error` otherwise.
pub fn parse_quick_envelope(payload: &Value) -> Result<String> {
    let success = payload
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if success {
        if let Some(image) = payload
            .get("image")
            .and_then(Value::as_str)
            .filter(|image| !image.is_empty())
        {
            return Ok(image.to_string());
        }
    }
    let message = payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("Failed to generate image");
    bail!("{message}");
}

/// Offline stand-in that fabricates stable reference strings. Keeps the CLI
/// and the batch runner exercisable without the remote service.
#[derive(Default)]
pub struct DryrunBackend {
    sequence: AtomicU64,
}

impl DryrunBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PhotoshootBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, payload: &ShootConfig) -> Result<Vec<String>> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(vec![format!(
            "dryrun://{}/image-{seq:02}.png",
            payload.meta.job_id
        )])
    }

    fn quick_update(&self, request: &QuickUpdateRequest) -> Result<String> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let refs = request.image_urls.len();
        Ok(format!("dryrun://quick/update-{seq:02}-refs{refs}.png"))
    }
}

/// Uploads a reference file: asks the permit endpoint for a destination,
/// PUTs the raw bytes there, and returns the stable public URL. A failed
/// upload affects nothing but the one item being edited.
pub struct Uploader {
    permit_url: String,
    http: HttpClient,
}

impl Uploader {
    pub fn new(permit_url: impl Into<String>) -> Self {
        Self {
            permit_url: permit_url.into(),
            http: HttpClient::new(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let Some(permit_url) = non_empty_env("LOOKBOOK_UPLOAD_URL") else {
            bail!("LOOKBOOK_UPLOAD_URL not set");
        };
        Ok(Self::new(permit_url))
    }

    pub fn upload_file(&self, path: &Path, folder: &str) -> Result<String> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed reading upload source ({})", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("file")
            .to_string();
        let content_type = mime_for_path(path).unwrap_or("image/jpeg");
        self.upload_bytes(&bytes, &file_name, content_type, folder)
    }

    pub fn upload_bytes(
        &self,
        bytes: &[u8],
        file_name: &str,
        content_type: &str,
        folder: &str,
    ) -> Result<String> {
        let permit_body = json!({
            "fileName": file_name,
            "fileType": content_type,
            "folder": folder,
        });
        let response = self
            .http
            .post(&self.permit_url)
            .json(&permit_body)
            .send()
            .with_context(|| format!("upload permit request failed ({})", self.permit_url))?;
        let permit = response_json_or_error("upload permit", response)?;
        let upload_url = permit
            .get("uploadUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .context("upload permit response missing uploadUrl")?;
        let final_url = permit
            .get("finalUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .context("upload permit response missing finalUrl")?;

        let put = self
            .http
            .put(upload_url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .context("direct upload failed")?;
        if !put.status().is_success() {
            bail!("direct upload failed ({})", put.status());
        }
        Ok(final_url.to_string())
    }
}

/// Enumerable batch lifecycle. Failure is terminal for the batch, not for
/// the session.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchPhase {
    Idle,
    Generating { current: u64, total: u64 },
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub iteration: u64,
    pub message: String,
}

/// What a batch run leaves behind: every reference produced before the end
/// of the run, in call order, plus the terminal phase.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub images: Vec<String>,
    pub phase: BatchPhase,
    pub failure: Option<BatchFailure>,
}

/// Receives progress as the batch advances, so partial results can be shown
/// before the batch finishes.
pub trait BatchObserver {
    fn on_phase(&mut self, _phase: &BatchPhase) {}
    fn on_image(&mut self, _reference: &str) {}
}

impl BatchObserver for () {}

/// Drives `output.count` sequential single-image generation calls.
///
/// Each call submits the full configuration with the count forced to 1; the
/// backend's contract is one image per invocation. Calls are strictly
/// sequential; the first failure aborts the remainder without retries and
/// without discarding what already succeeded.
pub struct BatchRunner<'a> {
    backend: &'a dyn PhotoshootBackend,
    events: Option<&'a EventWriter>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(backend: &'a dyn PhotoshootBackend) -> Self {
        Self {
            backend,
            events: None,
        }
    }

    pub fn with_events(mut self, events: &'a EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    /// Rejects an empty configuration before any network call.
    pub fn ensure_submittable(config: &ShootConfig) -> Result<()> {
        if config.total_items() == 0 {
            bail!("Please add at least one item to generate.");
        }
        Ok(())
    }

    pub fn run(
        &self,
        config: &ShootConfig,
        observer: &mut dyn BatchObserver,
    ) -> Result<BatchOutcome> {
        Self::ensure_submittable(config)?;

        let total = u64::from(config.output.count).max(1);
        self.emit(
            "batch_started",
            map_object(json!({
                "total": total,
                "backend": self.backend.name(),
            })),
        )?;

        let mut images: Vec<String> = Vec::new();
        for iteration in 1..=total {
            observer.on_phase(&BatchPhase::Generating {
                current: iteration,
                total,
            });

            let mut single = config.clone();
            single.output.count = 1;
            let payload = build_generation_payload(&single);

            match self.backend.generate(&payload) {
                Ok(references) => {
                    self.emit(
                        "image_generated",
                        map_object(json!({
                            "iteration": iteration,
                            "references": references,
                        })),
                    )?;
                    for reference in references {
                        observer.on_image(&reference);
                        images.push(reference);
                    }
                }
                Err(err) => {
                    let failure = BatchFailure {
                        iteration,
                        message: error_chain_text(&err),
                    };
                    self.emit(
                        "batch_failed",
                        map_object(json!({
                            "iteration": iteration,
                            "error": failure.message,
                            "completed": images.len(),
                        })),
                    )?;
                    observer.on_phase(&BatchPhase::Failed);
                    return Ok(BatchOutcome {
                        images,
                        phase: BatchPhase::Failed,
                        failure: Some(failure),
                    });
                }
            }
        }

        self.emit(
            "batch_completed",
            map_object(json!({ "count": images.len() })),
        )?;
        observer.on_phase(&BatchPhase::Complete);
        Ok(BatchOutcome {
            images,
            phase: BatchPhase::Complete,
            failure: None,
        })
    }

    fn emit(&self, event_type: &str, payload: EventPayload) -> Result<()> {
        if let Some(events) = self.events {
            events.emit(event_type, payload)?;
        }
        Ok(())
    }
}

fn response_json_or_error(label: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("{label} response could not be read"))?;
    if !status.is_success() {
        bail!(
            "{label} error ({}): {}",
            status.as_u16(),
            truncate_text(&body, 512)
        );
    }
    serde_json::from_str(&body)
        .with_context(|| format!("{label} returned invalid JSON: {}", truncate_text(&body, 256)))
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept: String = value.chars().take(max_chars).collect();
    format!("{kept}…")
}

fn error_chain_text(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use lookbook_contracts::config::{ConfigStore, ItemDraft, ItemKind, Section};
    use serde_json::json;

    use super::*;

    /// Feeds pre-scripted responses and records every payload it was given.
    struct ScriptedBackend {
        responses: RefCell<VecDeque<Result<Vec<String>, String>>>,
        payloads: RefCell<Vec<ShootConfig>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Result<Vec<String>, String>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                payloads: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.payloads.borrow().len()
        }
    }

    impl PhotoshootBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate(&self, payload: &ShootConfig) -> Result<Vec<String>> {
            self.payloads.borrow_mut().push(payload.clone());
            match self.responses.borrow_mut().pop_front() {
                Some(Ok(images)) => Ok(images),
                Some(Err(message)) => bail!("{message}"),
                None => bail!("scripted backend exhausted"),
            }
        }

        fn quick_update(&self, _request: &QuickUpdateRequest) -> Result<String> {
            bail!("not scripted");
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        phases: Vec<BatchPhase>,
        images: Vec<String>,
    }

    impl BatchObserver for RecordingObserver {
        fn on_phase(&mut self, phase: &BatchPhase) {
            self.phases.push(phase.clone());
        }

        fn on_image(&mut self, reference: &str) {
            self.images.push(reference.to_string());
        }
    }

    fn config_with_items(count: u32) -> ShootConfig {
        let mut store = ConfigStore::new();
        store.add_item(
            Section::Model,
            ItemDraft {
                text: "tall, short dark hair".to_string(),
                ..ItemDraft::new(ItemKind::FaceAndBody)
            },
        );
        store.update_output(lookbook_contracts::config::OutputUpdate {
            count: Some(count),
            ..Default::default()
        });
        store.config().clone()
    }

    #[test]
    fn batch_collects_results_in_call_order() -> Result<()> {
        let backend = ScriptedBackend::new(vec![
            Ok(vec!["img-1".to_string()]),
            Ok(vec!["img-2".to_string()]),
        ]);
        let config = config_with_items(2);
        let mut observer = RecordingObserver::default();

        let outcome = BatchRunner::new(&backend).run(&config, &mut observer)?;

        assert_eq!(outcome.phase, BatchPhase::Complete);
        assert_eq!(outcome.images, vec!["img-1", "img-2"]);
        assert!(outcome.failure.is_none());
        assert_eq!(observer.images, outcome.images);
        assert_eq!(observer.phases.last(), Some(&BatchPhase::Complete));
        Ok(())
    }

    #[test]
    fn batch_aborts_on_first_failure_keeping_partials() -> Result<()> {
        let backend = ScriptedBackend::new(vec![
            Ok(vec!["img-1".to_string()]),
            Err("backend exploded".to_string()),
            Ok(vec!["img-3".to_string()]),
        ]);
        let config = config_with_items(3);
        let mut observer = RecordingObserver::default();

        let outcome = BatchRunner::new(&backend).run(&config, &mut observer)?;

        assert_eq!(outcome.phase, BatchPhase::Failed);
        assert_eq!(outcome.images, vec!["img-1"]);
        let failure = outcome.failure.expect("failure recorded");
        assert_eq!(failure.iteration, 2);
        assert!(failure.message.contains("backend exploded"));
        // the third call must never be issued
        assert_eq!(backend.calls(), 2);
        Ok(())
    }

    #[test]
    fn each_call_sees_count_one_and_annotated_payload() -> Result<()> {
        let backend = ScriptedBackend::new(vec![
            Ok(vec!["img-1".to_string()]),
            Ok(vec!["img-2".to_string()]),
            Ok(vec!["img-3".to_string()]),
        ]);
        let mut store = ConfigStore::new();
        store.add_item(
            Section::Model,
            ItemDraft {
                reference_image_url: Some("u1".to_string()),
                ..ItemDraft::new(ItemKind::FaceAndBody)
            },
        );
        store.update_output(lookbook_contracts::config::OutputUpdate {
            count: Some(3),
            ..Default::default()
        });
        let config = store.config().clone();

        let outcome = BatchRunner::new(&backend).run(&config, &mut ())?;

        assert_eq!(outcome.images.len(), 3);
        for payload in backend.payloads.borrow().iter() {
            assert_eq!(payload.output.count, 1);
            assert_eq!(
                payload.model[0].reference_image.as_deref(),
                Some("ATTACHED IMAGE 1")
            );
        }
        // the caller's configuration keeps its batch count
        assert_eq!(config.output.count, 3);
        Ok(())
    }

    #[test]
    fn empty_config_rejected_before_any_call() {
        let backend = ScriptedBackend::new(vec![Ok(vec!["img-1".to_string()])]);
        let config = ShootConfig::new();

        let err = BatchRunner::new(&backend)
            .run(&config, &mut ())
            .expect_err("empty config must be rejected");

        assert!(err.to_string().contains("at least one item"));
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn batch_events_trace_the_run() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let config = config_with_items(2);
        let events = EventWriter::new(&events_path, config.meta.job_id.clone());
        let backend = ScriptedBackend::new(vec![
            Ok(vec!["img-1".to_string()]),
            Err("boom".to_string()),
        ]);

        let outcome = BatchRunner::new(&backend)
            .with_events(&events)
            .run(&config, &mut ())?;
        assert_eq!(outcome.phase, BatchPhase::Failed);

        let raw = std::fs::read_to_string(&events_path)?;
        let types: Vec<String> = raw
            .lines()
            .map(|line| {
                let event: Value = serde_json::from_str(line).expect("event line parses");
                event["type"].as_str().unwrap_or_default().to_string()
            })
            .collect();
        assert_eq!(types, vec!["batch_started", "image_generated", "batch_failed"]);
        Ok(())
    }

    #[test]
    fn dryrun_backend_produces_one_reference_per_call() -> Result<()> {
        let backend = DryrunBackend::new();
        let config = config_with_items(2);

        let outcome = BatchRunner::new(&backend).run(&config, &mut ())?;

        assert_eq!(outcome.phase, BatchPhase::Complete);
        assert_eq!(outcome.images.len(), 2);
        assert_ne!(outcome.images[0], outcome.images[1]);
        assert!(outcome.images[0].starts_with("dryrun://"));
        Ok(())
    }

    #[test]
    fn generate_envelope_parsing() {
        let ok = json!({"status": "success", "data": {"images": ["a", "b"]}});
        assert_eq!(
            parse_generate_envelope(&ok).expect("success envelope"),
            vec!["a", "b"]
        );

        let failed = json!({"status": "error", "message": "quota exceeded"});
        let err = parse_generate_envelope(&failed).expect_err("error envelope");
        assert_eq!(err.to_string(), "quota exceeded");

        let empty = json!({});
        let err = parse_generate_envelope(&empty).expect_err("empty envelope");
        assert_eq!(err.to_string(), "Generation failed");
    }

    #[test]
    fn quick_envelope_parsing() {
        let ok = json!({"success": true, "image": "img"});
        assert_eq!(parse_quick_envelope(&ok).expect("success envelope"), "img");

        let failed = json!({"success": false, "error": "no prompt"});
        let err = parse_quick_envelope(&failed).expect_err("error envelope");
        assert_eq!(err.to_string(), "no prompt");

        let missing_image = json!({"success": true});
        let err = parse_quick_envelope(&missing_image).expect_err("missing image");
        assert_eq!(err.to_string(), "Failed to generate image");
    }

    #[test]
    fn mime_guessing_defaults_sensibly() {
        assert_eq!(mime_for_path(Path::new("a.JPG")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("a.png")), Some("image/png"));
        assert_eq!(mime_for_path(Path::new("a.bin")), None);
        assert_eq!(mime_for_path(Path::new("noext")), None);
    }

    #[test]
    fn truncate_text_keeps_short_strings() {
        assert_eq!(truncate_text("short", 10), "short");
        let truncated = truncate_text(&"x".repeat(20), 5);
        assert_eq!(truncated, "xxxxx…");
    }
}
