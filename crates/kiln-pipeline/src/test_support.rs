//! A small host used by the unit tests in this crate.

use std::sync::Arc;

use parking_lot::Mutex;

use kiln_types::{PipelineContext, RecordingReporter, ReporterHandle, Result};

use crate::host::{
    BuilderArgsInput, FinalizeInput, FragmentArgsInput, FragmentStateInput, PipelineHost,
    RunResult, RunState,
};

pub type Journal = Arc<Mutex<Vec<String>>>;

pub struct TestContext {
    pub reporter: ReporterHandle,
}

impl Default for TestContext {
    fn default() -> Self {
        Self {
            reporter: ReporterHandle::new(RecordingReporter::new()),
        }
    }
}

impl PipelineContext for TestContext {
    fn reporter(&self) -> &ReporterHandle {
        &self.reporter
    }
}

pub struct FragmentArgs {
    pub key: String,
    pub draft: Arc<Mutex<Vec<String>>>,
}

pub struct BuilderArgs {
    pub key: String,
    pub artifact: Vec<String>,
    pub output: Journal,
}

/// Fragment helpers push into the draft; the artifact is the draft's contents.
/// `RunOptions` may override the host's reporter for a single run.
pub struct TestHost {
    pub reporter: ReporterHandle,
    pub output: Journal,
}

impl TestHost {
    pub fn new(recorder: &RecordingReporter) -> Self {
        Self {
            reporter: ReporterHandle::new(recorder.clone()),
            output: Journal::default(),
        }
    }
}

impl PipelineHost for TestHost {
    type RunOptions = Option<ReporterHandle>;
    type BuildOptions = Journal;
    type Context = TestContext;
    type Draft = Arc<Mutex<Vec<String>>>;
    type Artifact = Vec<String>;
    type FragmentArgs = FragmentArgs;
    type BuilderArgs = BuilderArgs;
    type RunResult = RunResult<Vec<String>>;

    fn create_build_options(&self, _options: &Self::RunOptions) -> Result<Journal> {
        Ok(Arc::clone(&self.output))
    }

    fn create_context(&self, options: &Self::RunOptions) -> Result<TestContext> {
        Ok(TestContext {
            reporter: options.clone().unwrap_or_else(|| self.reporter.clone()),
        })
    }

    fn create_fragment_state(&self, _input: FragmentStateInput<'_, Self>) -> Result<Self::Draft> {
        Ok(Arc::default())
    }

    fn create_fragment_args(&self, input: FragmentArgsInput<'_, Self>) -> Result<FragmentArgs> {
        Ok(FragmentArgs {
            key: input.helper.key.clone(),
            draft: Arc::clone(input.draft.as_ref()),
        })
    }

    fn finalize_fragment_state(&self, input: FinalizeInput<'_, Self>) -> Result<Vec<String>> {
        Ok(input.draft.lock().clone())
    }

    fn create_builder_args(&self, input: BuilderArgsInput<'_, Self>) -> Result<BuilderArgs> {
        Ok(BuilderArgs {
            key: input.helper.key.clone(),
            artifact: input.artifact.clone(),
            output: Arc::clone(input.build_options.as_ref()),
        })
    }

    fn create_run_result(&self, state: RunState<Self>) -> Result<Self::RunResult> {
        Ok(state.into())
    }
}
