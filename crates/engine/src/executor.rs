//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Parses the script, resolves dependencies and checks that every model
//!    the script needs is known to the completion client.
//! 2. Runs in rounds. Each round takes every pending node whose dependencies
//!    have all completed.
//! 3. Static nodes of a round resolve first, all of them, before any LLM
//!    node of that round issues a call.
//! 4. LLM nodes then run one at a time (sequential) or all at once
//!    (parallel), each waiting out the configured request delay.
//! 5. Any node failure aborts the run. A graph that stops making progress is
//!    reported as a deadlock after a grace period of empty rounds.

use std::sync::Arc;

use completion::{CompletionClient, Message};
use futures::future::try_join_all;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::dag::{bind_model_variables, build_workflow, check_models};
use crate::error::{EngineError, NodeFailure};
use crate::models::{ModelRef, Node, Workflow};
use crate::state::{OutputStore, RunState};
use crate::template;

/// Flag that makes an LLM node send the whole conversation, not just its prompt.
pub const HISTORY_FLAG: &str = "history";

/// Status callback. Observability only; the engine never depends on it.
pub type Progress = dyn Fn(&str) + Send + Sync;

// ---------------------------------------------------------------------------
// Output of a completed execution
// ---------------------------------------------------------------------------

/// One node's stored output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutput {
    pub id: String,
    pub output: String,
}

/// The result of running a full workflow.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Correlates the run's log lines.
    pub run_id: Uuid,
    /// Outputs of the indent-0 LLM nodes, joined by a blank line.
    pub output: String,
    /// Every node's output, in declaration order.
    pub node_outputs: Vec<NodeOutput>,
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Runs workflow scripts against a completion client.
///
/// Holds no per-run state; one executor can serve any number of runs.
pub struct WorkflowExecutor {
    client: Arc<dyn CompletionClient>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(client: Arc<dyn CompletionClient>, config: ExecutorConfig) -> Self {
        Self { client, config }
    }

    /// Run `source` with `user_input` and return the final joined output.
    ///
    /// # Errors
    /// Returns `EngineError` for parse failures, unknown models, node
    /// failures, or a deadlocked graph.
    pub async fn execute(
        &self,
        source: &str,
        user_input: &str,
        on_progress: &Progress,
    ) -> Result<String, EngineError> {
        self.run(source, user_input, on_progress)
            .await
            .map(|result| result.output)
    }

    /// Like [`execute`](Self::execute), but also returns every node's output.
    pub async fn run(
        &self,
        source: &str,
        user_input: &str,
        on_progress: &Progress,
    ) -> Result<ExecutionResult, EngineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("workflow_run", %run_id);
        self.run_rounds(run_id, source, user_input, on_progress)
            .instrument(span)
            .await
    }

    async fn run_rounds(
        &self,
        run_id: Uuid,
        source: &str,
        user_input: &str,
        on_progress: &Progress,
    ) -> Result<ExecutionResult, EngineError> {
        let mut workflow = build_workflow(source)?;
        if workflow.is_empty() {
            return Ok(ExecutionResult {
                run_id,
                output: String::new(),
                node_outputs: Vec::new(),
            });
        }

        let models = self.client.models();
        bind_model_variables(&mut workflow, &models);
        if let Err(err) = check_models(&workflow, &models) {
            warn!("{err}");
            return Err(err);
        }

        info!(
            nodes = workflow.len(),
            sequential = self.config.sequential,
            "executing workflow"
        );

        let mut run = RunState::new(&workflow);
        let mut round = 0u32;
        let mut last_runnable: Option<usize> = None;
        let mut stalled_ticks = 0u32;

        while run.has_unfinished() {
            let runnable = run.runnable(&workflow);

            if runnable.is_empty() {
                stalled_ticks = if last_runnable == Some(0) { stalled_ticks + 1 } else { 0 };
                if stalled_ticks > self.config.deadlock_grace_ticks {
                    let pending = run.unfinished_ids(&workflow);
                    warn!(?pending, round, "deadlock detected");
                    return Err(EngineError::Deadlock { pending });
                }
            }
            last_runnable = Some(runnable.len());
            round += 1;
            debug!(round, runnable = runnable.len(), "starting round");

            let mut statics = Vec::new();
            let mut llms = Vec::new();
            for index in runnable {
                run.start(index);
                match workflow.nodes[index].model() {
                    None => statics.push(index),
                    Some(model) => llms.push((index, model)),
                }
            }

            for index in statics {
                self.resolve_static(&workflow, &mut run, index, user_input, on_progress)?;
            }

            if !llms.is_empty() {
                if self.config.sequential {
                    self.run_sequential(&workflow, &mut run, &llms, user_input, on_progress)
                        .await?;
                } else {
                    self.run_parallel(&workflow, &mut run, &llms, user_input, on_progress)
                        .await?;
                }
            }

            if !self.config.round_pause.is_zero() {
                tokio::time::sleep(self.config.round_pause).await;
            }
        }

        let output = workflow
            .roots()
            .filter_map(|node| run.outputs.get(&node.id))
            .collect::<Vec<_>>()
            .join("\n\n");

        let node_outputs = workflow
            .nodes
            .iter()
            .filter_map(|node| {
                run.outputs.get(&node.id).map(|output| NodeOutput {
                    id: node.id.clone(),
                    output: output.to_owned(),
                })
            })
            .collect();

        info!(rounds = round, "workflow succeeded");
        Ok(ExecutionResult { run_id, output, node_outputs })
    }

    // -----------------------------------------------------------------------
    // Static nodes
    // -----------------------------------------------------------------------

    fn resolve_static(
        &self,
        workflow: &Workflow,
        run: &mut RunState,
        index: usize,
        user_input: &str,
        on_progress: &Progress,
    ) -> Result<(), EngineError> {
        let node = &workflow.nodes[index];
        on_progress(&format!("Resolving: {}", node.id));

        let result = template::render(
            &node.prompt,
            user_input,
            &node.explicit_dependencies,
            &run.outputs,
        )
        .map_err(NodeFailure::from);

        self.settle(workflow, run, index, result, on_progress)
    }

    // -----------------------------------------------------------------------
    // LLM nodes
    // -----------------------------------------------------------------------

    async fn run_sequential(
        &self,
        workflow: &Workflow,
        run: &mut RunState,
        batch: &[(usize, &ModelRef)],
        user_input: &str,
        on_progress: &Progress,
    ) -> Result<(), EngineError> {
        for (position, &(index, model)) in batch.iter().enumerate() {
            let node = &workflow.nodes[index];
            if position > 0 {
                self.throttle(node, on_progress).await;
            }
            let result = self
                .call_llm(node, model, &run.outputs, user_input, on_progress)
                .await;
            self.settle(workflow, run, index, result, on_progress)?;
        }
        Ok(())
    }

    async fn run_parallel(
        &self,
        workflow: &Workflow,
        run: &mut RunState,
        batch: &[(usize, &ModelRef)],
        user_input: &str,
        on_progress: &Progress,
    ) -> Result<(), EngineError> {
        let outputs = &run.outputs;
        let calls = batch.iter().map(|&(index, model)| {
            let node = &workflow.nodes[index];
            async move {
                self.throttle(node, on_progress).await;
                self.call_llm(node, model, outputs, user_input, on_progress)
                    .await
                    .map(|output| (index, output))
                    .map_err(|failure| (index, failure))
            }
        });

        // The first failure drops the calls still in flight.
        match try_join_all(calls).await {
            Ok(done) => {
                for (index, output) in done {
                    self.settle(workflow, run, index, Ok(output), on_progress)?;
                }
                Ok(())
            }
            Err((index, failure)) => self.settle(workflow, run, index, Err(failure), on_progress),
        }
    }

    async fn throttle(&self, node: &Node, on_progress: &Progress) {
        let delay = self.config.request_delay;
        if delay.is_zero() {
            return;
        }
        on_progress(&format!("Waiting {}s before {}", delay.as_secs_f64(), node.id));
        tokio::time::sleep(delay).await;
    }

    async fn call_llm(
        &self,
        node: &Node,
        model: &ModelRef,
        outputs: &OutputStore,
        user_input: &str,
        on_progress: &Progress,
    ) -> Result<String, NodeFailure> {
        let nickname = self.resolve_model(model, outputs)?;
        on_progress(&format!("Running: {} ({})", node.id, nickname));

        let prompt = template::compose_prompt(node, user_input, outputs)?;
        let mut messages = if node.has_flag(HISTORY_FLAG) {
            self.client.messages().await?
        } else {
            Vec::new()
        };
        messages.push(Message::user(prompt));

        debug!(node_id = %node.id, model = %nickname, turns = messages.len(), "calling model");
        let reply = self.client.generate(&nickname, messages, &node.flags).await?;
        Ok(reply)
    }

    fn resolve_model(&self, model: &ModelRef, outputs: &OutputStore) -> Result<String, NodeFailure> {
        match model {
            ModelRef::Nickname(name) => Ok(name.clone()),
            ModelRef::Variable(target) => {
                let name = outputs
                    .get(target)
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| NodeFailure::MissingModelVariable(target.clone()))?;
                if !self.client.models().iter().any(|m| m.answers_to(name)) {
                    return Err(NodeFailure::UnknownModel(name.to_owned()));
                }
                Ok(name.to_owned())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    /// Record a node's outcome. A failure marks the node `Failed` and aborts
    /// the run.
    fn settle(
        &self,
        workflow: &Workflow,
        run: &mut RunState,
        index: usize,
        result: Result<String, NodeFailure>,
        on_progress: &Progress,
    ) -> Result<(), EngineError> {
        let node = &workflow.nodes[index];
        match result {
            Ok(output) => {
                run.complete(workflow, index, output);
                info!(node_id = %node.id, "node completed");
                on_progress(&format!("Completed: {}", node.id));
                Ok(())
            }
            Err(failure) => {
                run.fail(index);
                error!(node_id = %node.id, error = %failure, "node failed");
                on_progress(&format!("Failed: {} - {}", node.id, failure));
                Err(EngineError::node(&node.id, failure))
            }
        }
    }
}
