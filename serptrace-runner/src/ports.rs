// serptrace-runner/src/ports.rs
// ============================================================================
// Module: External Stage Ports
// Description: Narrow trait interfaces to the collector, annotation, and
//              metrics applications, whose internals are out of scope.
// Purpose: Give the runner a fixed surface to drive external stages and let
//          tests substitute fakes.
// Dependencies: async-trait, tokio (process)
// ============================================================================

//! ## Overview
//! Three single-method traits, one per externally-implemented stage, mirror
//! the narrow-capability trait style used throughout this codebase. Two
//! concrete implementations are provided: [`NoopStagePort`] (immediate
//! success, used in tests and minimal deployments) and [`ScriptStagePort`]
//! (spawns a configured external command and waits for exit status 0).

use async_trait::async_trait;

use crate::error::AnnotationPortError;
use crate::error::CollectorPortError;
use crate::error::MetricsPortError;

/// Context passed to [`CollectorPort::run_collection`].
#[derive(Debug, Clone)]
pub struct CollectorContext {
    /// Run this invocation belongs to.
    pub run_id: String,
    /// Directory the collector is expected to write JSON files into.
    pub collector_output_dir: String,
}

/// Context passed to [`AnnotationPort::run_annotation`].
#[derive(Debug, Clone)]
pub struct AnnotationContext {
    /// Run this invocation belongs to.
    pub run_id: String,
}

/// Context passed to [`MetricsPort::run_metrics`].
#[derive(Debug, Clone)]
pub struct MetricsContext {
    /// Run this invocation belongs to.
    pub run_id: String,
}

/// Triggers the external multi-engine search collector.
#[async_trait]
pub trait CollectorPort: Send + Sync {
    /// Runs the collector to completion, returning once it has finished
    /// writing JSON result files to the configured output directory.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorPortError`] when the collector fails to run.
    async fn run_collection(&self, ctx: &CollectorContext) -> Result<(), CollectorPortError>;
}

/// Triggers the external LLM-based annotation application.
#[async_trait]
pub trait AnnotationPort: Send + Sync {
    /// Runs annotation to completion. The external application is expected
    /// to have read pending search results and written annotation rows via
    /// the shared storage handle by the time this returns.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotationPortError`] when annotation fails to run.
    async fn run_annotation(&self, ctx: &AnnotationContext) -> Result<(), AnnotationPortError>;
}

/// Triggers the external bias-metrics computation application.
#[async_trait]
pub trait MetricsPort: Send + Sync {
    /// Runs metrics computation to completion. The external application is
    /// expected to have written metric records and annotation aggregates by
    /// the time this returns.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsPortError`] when metrics computation fails to run.
    async fn run_metrics(&self, ctx: &MetricsContext) -> Result<(), MetricsPortError>;
}

/// A stage port that always succeeds immediately, for tests and minimal
/// deployments that do not wire a real external stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStagePort;

#[async_trait]
impl CollectorPort for NoopStagePort {
    async fn run_collection(&self, _ctx: &CollectorContext) -> Result<(), CollectorPortError> {
        Ok(())
    }
}

#[async_trait]
impl AnnotationPort for NoopStagePort {
    async fn run_annotation(&self, _ctx: &AnnotationContext) -> Result<(), AnnotationPortError> {
        Ok(())
    }
}

#[async_trait]
impl MetricsPort for NoopStagePort {
    async fn run_metrics(&self, _ctx: &MetricsContext) -> Result<(), MetricsPortError> {
        Ok(())
    }
}

/// A stage port that spawns a configured external command and waits for it
/// to exit with status 0. Stdout/stderr are logged at debug level.
#[derive(Debug, Clone)]
pub struct ScriptStagePort {
    argv: Vec<String>,
}

impl ScriptStagePort {
    /// Builds a script stage port from an argv (`argv[0]` is the program).
    #[must_use]
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    async fn run(&self, run_id: &str) -> Result<(), String> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err("script stage port configured with empty argv".to_owned());
        };
        let output = tokio::process::Command::new(program)
            .args(args)
            .env("SERPTRACE_RUN_ID", run_id)
            .output()
            .await
            .map_err(|err| format!("failed to spawn {program}: {err}"))?;

        tracing::debug!(
            program = program.as_str(),
            stdout = %String::from_utf8_lossy(&output.stdout),
            stderr = %String::from_utf8_lossy(&output.stderr),
            "stage script output"
        );

        if output.status.success() {
            Ok(())
        } else {
            Err(format!("{program} exited with {}", output.status))
        }
    }
}

#[async_trait]
impl CollectorPort for ScriptStagePort {
    async fn run_collection(&self, ctx: &CollectorContext) -> Result<(), CollectorPortError> {
        self.run(&ctx.run_id).await.map_err(CollectorPortError::Failed)
    }
}

#[async_trait]
impl AnnotationPort for ScriptStagePort {
    async fn run_annotation(&self, ctx: &AnnotationContext) -> Result<(), AnnotationPortError> {
        self.run(&ctx.run_id).await.map_err(AnnotationPortError::Failed)
    }
}

#[async_trait]
impl MetricsPort for ScriptStagePort {
    async fn run_metrics(&self, ctx: &MetricsContext) -> Result<(), MetricsPortError> {
        self.run(&ctx.run_id).await.map_err(MetricsPortError::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn noop_port_succeeds_for_all_three_stages() {
        let port = NoopStagePort;
        port.run_collection(&CollectorContext {
            run_id: "r1".to_owned(),
            collector_output_dir: "data/serp".to_owned(),
        })
        .await
        .expect("collector");
        port.run_annotation(&AnnotationContext { run_id: "r1".to_owned() }).await.expect("annotation");
        port.run_metrics(&MetricsContext { run_id: "r1".to_owned() }).await.expect("metrics");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn script_port_runs_true_successfully() {
        let port = ScriptStagePort::new(vec!["true".to_owned()]);
        port.run_metrics(&MetricsContext { run_id: "r1".to_owned() }).await.expect("metrics");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn script_port_surfaces_nonzero_exit() {
        let port = ScriptStagePort::new(vec!["false".to_owned()]);
        let result = port.run_metrics(&MetricsContext { run_id: "r1".to_owned() }).await;
        assert!(result.is_err());
    }
}
