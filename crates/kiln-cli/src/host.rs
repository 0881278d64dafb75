//! The pipeline host behind the `kiln` binary.
//!
//! Fragment helpers write `key -> value` entries into a shared document draft.
//! Builder helpers render the finished document into output lines.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use kiln_pipeline::{
    BuilderArgsInput, FinalizeInput, FragmentArgsInput, FragmentStateInput, Helper, Pipeline,
    PipelineHost, RunResult, RunState,
};
use kiln_types::{HelperKind, PipelineContext, ReporterHandle, Result, TracingReporter};

use crate::manifest::{HelperSpec, Manifest};

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub key: String,
    pub value: Value,
}

/// An insertion-ordered map of entries. Writing an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    pub name: String,
    pub entries: Vec<Entry>,
}

impl Document {
    pub fn insert(&mut self, key: &str, value: Value) {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.value = value,
            None => self.entries.push(Entry {
                key: key.to_string(),
                value,
            }),
        }
    }

    /// `k=v, k=v`, strings unquoted.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| match &e.value {
                Value::String(s) => format!("{}={}", e.key, s),
                other => format!("{}={}", e.key, other),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

pub struct CliContext {
    reporter: ReporterHandle,
}

impl PipelineContext for CliContext {
    fn reporter(&self) -> &ReporterHandle {
        &self.reporter
    }
}

pub struct RunOptions {
    pub reporter: ReporterHandle,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            reporter: ReporterHandle::new(TracingReporter::new("kiln")),
        }
    }
}

pub struct FragmentArgs {
    pub key: String,
    pub draft: Arc<Mutex<Document>>,
}

pub struct BuilderArgs {
    pub key: String,
    pub document: Document,
    pub output: Arc<Mutex<Vec<String>>>,
}

/// What `kiln run` reports.
#[derive(Debug, Clone)]
pub struct ManifestRun {
    pub result: RunResult<Document>,
    pub output: Vec<String>,
}

pub struct ManifestHost {
    name: String,
}

impl ManifestHost {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl PipelineHost for ManifestHost {
    type RunOptions = RunOptions;
    type BuildOptions = Mutex<Vec<String>>;
    type Context = CliContext;
    type Draft = Mutex<Document>;
    type Artifact = Document;
    type FragmentArgs = FragmentArgs;
    type BuilderArgs = BuilderArgs;
    type RunResult = ManifestRun;

    fn create_build_options(&self, _options: &RunOptions) -> Result<Mutex<Vec<String>>> {
        Ok(Mutex::new(Vec::new()))
    }

    fn create_context(&self, options: &RunOptions) -> Result<CliContext> {
        Ok(CliContext {
            reporter: options.reporter.clone(),
        })
    }

    fn create_fragment_state(&self, _input: FragmentStateInput<'_, Self>) -> Result<Self::Draft> {
        Ok(Mutex::new(Document {
            name: self.name.clone(),
            entries: Vec::new(),
        }))
    }

    fn create_fragment_args(&self, input: FragmentArgsInput<'_, Self>) -> Result<FragmentArgs> {
        Ok(FragmentArgs {
            key: input.helper.key.clone(),
            draft: Arc::clone(input.draft),
        })
    }

    fn finalize_fragment_state(&self, input: FinalizeInput<'_, Self>) -> Result<Document> {
        let document = input.draft.lock().clone();
        input.context.reporter().debug(
            "Fragment state finalized.",
            Some(&serde_json::json!({
                "entries": document.entries.len(),
                "executed": input.helpers.executed,
            })),
        );
        Ok(document)
    }

    fn create_builder_args(&self, input: BuilderArgsInput<'_, Self>) -> Result<BuilderArgs> {
        Ok(BuilderArgs {
            key: input.helper.key.clone(),
            document: input.artifact.clone(),
            output: Arc::clone(input.build_options),
        })
    }

    fn create_run_result(&self, state: RunState<Self>) -> Result<ManifestRun> {
        let output = state.build_options.lock().clone();
        Ok(ManifestRun {
            result: state.into(),
            output,
        })
    }
}

// ---------------------------------------------------------------------------
// Manifest -> helpers
// ---------------------------------------------------------------------------

fn configure<A: Send + 'static>(helper: Helper<A>, spec: &HelperSpec) -> Helper<A> {
    let helper = helper
        .with_mode(spec.mode)
        .with_priority(spec.priority)
        .depends_on(spec.depends_on.iter().cloned());
    let helper = match &spec.origin {
        Some(origin) => helper.with_origin(origin.clone()),
        None => helper,
    };
    if spec.optional {
        helper.optional()
    } else {
        helper
    }
}

pub fn fragment_helper(spec: &HelperSpec) -> Helper<FragmentArgs> {
    let value = spec.value.clone().unwrap_or(Value::Bool(true));
    let halt = spec.halt;
    let helper = Helper::from_fn(
        spec.key.clone(),
        HelperKind::fragment(),
        move |args: FragmentArgs, next| {
            let value = value.clone();
            async move {
                args.draft.lock().insert(&args.key, value);
                if halt {
                    return Ok(());
                }
                next.run().await
            }
        },
    );
    configure(helper, spec)
}

pub fn builder_helper(spec: &HelperSpec) -> Helper<BuilderArgs> {
    let halt = spec.halt;
    let helper = Helper::from_fn(
        spec.key.clone(),
        HelperKind::builder(),
        move |args: BuilderArgs, next| async move {
            args.output
                .lock()
                .push(format!("{}: {}", args.key, args.document.render()));
            if halt {
                return Ok(());
            }
            next.run().await
        },
    );
    configure(helper, spec)
}

/// Build a pipeline with every helper of `manifest` registered.
pub fn pipeline_from_manifest(manifest: &Manifest) -> Result<Pipeline<ManifestHost>> {
    let pipeline = Pipeline::new(ManifestHost::new(manifest.name.clone()));
    for spec in &manifest.fragments {
        pipeline.ir().use_helper(fragment_helper(spec))?;
    }
    for spec in &manifest.builders {
        pipeline.builders().use_helper(builder_helper(spec))?;
    }
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::{RecordingReporter, ReportLevel};

    fn manifest(source: &str) -> Manifest {
        Manifest::parse(source).unwrap()
    }

    fn recording() -> (RunOptions, RecordingReporter) {
        let recorder = RecordingReporter::new();
        let options = RunOptions {
            reporter: ReporterHandle::new(recorder.clone()),
        };
        (options, recorder)
    }

    #[test]
    fn document_keeps_insertion_order_and_overwrites_in_place() {
        let mut doc = Document::default();
        doc.insert("b", Value::from(1));
        doc.insert("a", Value::from("x"));
        doc.insert("b", Value::from(2));

        assert_eq!(doc.render(), "b=2, a=x");
        assert_eq!(doc.entries.len(), 2);
    }

    #[tokio::test]
    async fn runs_manifest_end_to_end() {
        let pipeline = pipeline_from_manifest(&manifest(
            r#"{
                "name": "release",
                "fragments": [
                    { "key": "notes", "dependsOn": ["version"], "value": "fixes" },
                    { "key": "version", "value": "1.2.0" }
                ],
                "builders": [{ "key": "changelog" }, { "key": "summary", "priority": -1 }]
            }"#,
        ))
        .unwrap();
        let (options, _) = recording();

        let run = pipeline.run(options).await.unwrap();

        assert_eq!(
            run.result.step_keys(),
            vec!["version", "notes", "summary", "changelog"]
        );
        assert_eq!(run.result.artifact.name, "release");
        assert_eq!(
            run.output,
            vec![
                "summary: version=1.2.0, notes=fixes",
                "changelog: version=1.2.0, notes=fixes",
            ]
        );
    }

    #[tokio::test]
    async fn halting_fragment_starves_required_dependants() {
        let pipeline = pipeline_from_manifest(&manifest(
            r#"{
                "fragments": [
                    { "key": "gate", "halt": true },
                    { "key": "after", "dependsOn": ["gate"] }
                ]
            }"#,
        ))
        .unwrap();
        let (options, _) = recording();

        let err = pipeline.run(options).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("Fragment helper \"after\""));
    }

    #[tokio::test]
    async fn missing_dependency_reaches_the_reporter() {
        let pipeline = pipeline_from_manifest(&manifest(
            r#"{ "fragments": [{ "key": "b", "dependsOn": ["a"], "optional": true }] }"#,
        ))
        .unwrap();
        let (options, recorder) = recording();

        let run = pipeline.run(options).await.unwrap();

        assert!(run.result.step_keys().is_empty());
        assert_eq!(run.result.helpers.fragments.missing, vec!["b"]);
        let warnings = recorder.messages_at(ReportLevel::Warn);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].message.contains("unregistered helper \"a\""));
    }

    #[tokio::test]
    async fn output_is_fresh_for_each_run() {
        let pipeline = pipeline_from_manifest(&manifest(
            r#"{ "fragments": [{ "key": "a" }], "builders": [{ "key": "out" }] }"#,
        ))
        .unwrap();

        let first = pipeline.run(recording().0).await.unwrap();
        let second = pipeline.run(recording().0).await.unwrap();

        assert_eq!(first.output, vec!["out: a=true"]);
        assert_eq!(second.output, first.output);
    }
}
