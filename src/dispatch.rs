//! Agent invocation and conversation-chain execution.
//!
//! A dispatch resolves a prompt, runs the external agent binary with the
//! prompt text, and on success walks the chain through `next_prompt_id`.
//! Every outcome is logged and reported; none of them propagate past the
//! dispatch boundary, so a failing agent can never stop the scheduler loop.

use crate::config::AgentConfig;
use crate::store::PromptStore;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Tagged result of dispatching a single prompt.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The agent exited zero; stdout is the captured response.
    Success {
        /// Captured standard output.
        output: String,
    },
    /// The prompt id did not resolve (tolerated: out-of-band deletion can
    /// leave dangling chain references).
    PromptNotFound,
    /// The agent binary could not be found.
    AgentNotFound,
    /// The agent failed to run or exited non-zero.
    AgentError {
        /// Exit status code, if the process ran.
        status: Option<i32>,
        /// Captured diagnostics.
        stderr: String,
    },
    /// The agent exceeded the per-dispatch timeout and was terminated.
    TimedOut,
    /// The chain's `next_prompt_id` links revisited a prompt: corrupted
    /// data, never infinite recursion.
    CycleDetected,
}

impl DispatchOutcome {
    /// Returns `true` only for a successful agent run.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short label for history and display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::PromptNotFound => "prompt not found",
            Self::AgentNotFound => "agent not found",
            Self::AgentError { .. } => "agent error",
            Self::TimedOut => "timed out",
            Self::CycleDetected => "cycle detected",
        }
    }
}

/// One hop of a dispatch call: which prompt ran and how it ended.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// Id of the prompt this hop dispatched (or failed to resolve).
    pub prompt_id: String,
    /// How the hop ended.
    pub outcome: DispatchOutcome,
}

/// Invokes the external agent for prompts and walks conversation chains.
pub struct Dispatcher {
    store: Arc<PromptStore>,
    binary: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher from the agent configuration.
    pub fn new(store: Arc<PromptStore>, agent: &AgentConfig) -> Self {
        Self {
            store,
            binary: agent.binary.clone(),
            args: agent.args.clone(),
            timeout: Duration::from_secs(agent.timeout_secs),
        }
    }

    /// Override the per-dispatch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dispatch a prompt and, on success, its chain successors.
    ///
    /// Conversations are a synchronous call chain: the successor is only
    /// invoked after the predecessor's process has exited, and only when
    /// it exited successfully. Always returns normally; the reports carry
    /// one entry per hop in execution order.
    pub async fn dispatch(&self, prompt_id: &str) -> Vec<DispatchReport> {
        let mut reports = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = Some(prompt_id.to_owned());

        while let Some(id) = current.take() {
            if !visited.insert(id.clone()) {
                error!(prompt_id = %id, "cyclic next_prompt_id chain detected, halting");
                reports.push(DispatchReport {
                    prompt_id: id,
                    outcome: DispatchOutcome::CycleDetected,
                });
                break;
            }

            // Resolve fresh each hop so out-of-band deletions are seen.
            let Some(prompt) = self.store.get(&id) else {
                warn!(prompt_id = %id, "prompt not found, halting chain");
                reports.push(DispatchReport {
                    prompt_id: id,
                    outcome: DispatchOutcome::PromptNotFound,
                });
                break;
            };

            info!(prompt_id = %id, "dispatching prompt");
            let outcome = self.invoke_agent(&prompt.text).await;
            self.log_outcome(&id, &outcome);

            let halt = !outcome.is_success();
            reports.push(DispatchReport {
                prompt_id: id,
                outcome,
            });
            if halt {
                break;
            }
            current = prompt.next_prompt_id.clone();
        }

        reports
    }

    /// Run the agent once with `text` as the final argument, bounded by the
    /// configured timeout.
    async fn invoke_agent(&self, text: &str) -> DispatchOutcome {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return DispatchOutcome::AgentNotFound;
            }
            Err(e) => {
                return DispatchOutcome::AgentError {
                    status: None,
                    stderr: format!("failed to spawn {}: {e}", self.binary.display()),
                };
            }
        };

        // On timeout the wait future is dropped and kill_on_drop reaps the
        // process.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return DispatchOutcome::AgentError {
                    status: None,
                    stderr: format!("failed to collect agent output: {e}"),
                };
            }
            Err(_) => return DispatchOutcome::TimedOut,
        };

        if output.status.success() {
            DispatchOutcome::Success {
                output: String::from_utf8_lossy(&output.stdout).into_owned(),
            }
        } else {
            DispatchOutcome::AgentError {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        }
    }

    fn log_outcome(&self, prompt_id: &str, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Success { output } => {
                info!(prompt_id, bytes = output.len(), "agent run complete");
                debug!(prompt_id, %output, "agent response");
            }
            DispatchOutcome::AgentNotFound => {
                error!(
                    prompt_id,
                    binary = %self.binary.display(),
                    "agent binary not found; is it installed and on PATH?"
                );
            }
            DispatchOutcome::AgentError { status, stderr } => {
                error!(prompt_id, ?status, %stderr, "agent run failed");
            }
            DispatchOutcome::TimedOut => {
                error!(prompt_id, timeout = ?self.timeout, "agent run timed out, process terminated");
            }
            DispatchOutcome::PromptNotFound | DispatchOutcome::CycleDetected => {}
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::store::Prompt;

    fn temp_store() -> (tempfile::TempDir, Arc<PromptStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PromptStore::open(dir.path().join("prompts.jsonl")).unwrap());
        (dir, store)
    }

    /// Dispatcher whose "agent" is `/bin/sh -c <script>`; the prompt text
    /// arrives as `$0` inside the script.
    fn sh_dispatcher(store: Arc<PromptStore>, script: &str) -> Dispatcher {
        let agent = AgentConfig {
            binary: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_owned(), script.to_owned()],
            timeout_secs: 5,
        };
        Dispatcher::new(store, &agent)
    }

    fn chain_prompt(id: &str, text: &str, next: Option<&str>) -> Prompt {
        Prompt {
            id: id.to_owned(),
            text: text.to_owned(),
            schedule: String::new(),
            conversation_id: Some("conv".to_owned()),
            next_prompt_id: next.map(str::to_owned),
            is_first: false,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_captures_stdout() {
        let (_dir, store) = temp_store();
        let id = store.add("hello agent", "", None, None).unwrap();
        let dispatcher = sh_dispatcher(Arc::clone(&store), "printf '%s' \"$0\"");

        let reports = dispatcher.dispatch(&id).await;
        assert_eq!(reports.len(), 1);
        match &reports[0].outcome {
            DispatchOutcome::Success { output } => assert_eq!(output, "hello agent"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_an_agent_error_with_stderr() {
        let (_dir, store) = temp_store();
        let id = store.add("ignored", "", None, None).unwrap();
        let dispatcher = sh_dispatcher(Arc::clone(&store), "echo boom >&2; exit 3");

        let reports = dispatcher.dispatch(&id).await;
        match &reports[0].outcome {
            DispatchOutcome::AgentError { status, stderr } => {
                assert_eq!(*status, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected agent error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_agent_not_found() {
        let (_dir, store) = temp_store();
        let id = store.add("ignored", "", None, None).unwrap();
        let agent = AgentConfig {
            binary: PathBuf::from("/definitely/not/a/real/agent"),
            args: Vec::new(),
            timeout_secs: 5,
        };
        let dispatcher = Dispatcher::new(Arc::clone(&store), &agent);

        let reports = dispatcher.dispatch(&id).await;
        assert!(matches!(
            reports[0].outcome,
            DispatchOutcome::AgentNotFound
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_agent_times_out() {
        let (_dir, store) = temp_store();
        let id = store.add("ignored", "", None, None).unwrap();
        let dispatcher = sh_dispatcher(Arc::clone(&store), "sleep 5")
            .with_timeout(Duration::from_millis(100));

        let reports = dispatcher.dispatch(&id).await;
        assert!(matches!(reports[0].outcome, DispatchOutcome::TimedOut));
    }

    #[tokio::test]
    async fn unknown_prompt_is_reported_not_fatal() {
        let (_dir, store) = temp_store();
        let dispatcher = sh_dispatcher(store, "true");

        let reports = dispatcher.dispatch("ghost").await;
        assert_eq!(reports.len(), 1);
        assert!(matches!(
            reports[0].outcome,
            DispatchOutcome::PromptNotFound
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn chain_continues_in_order_on_success() {
        let (_dir, store) = temp_store();
        store
            .append_chain(vec![
                chain_prompt("a", "first", Some("b")),
                chain_prompt("b", "second", None),
            ])
            .unwrap();
        let dispatcher = sh_dispatcher(Arc::clone(&store), "printf '%s' \"$0\"");

        let reports = dispatcher.dispatch("a").await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].prompt_id, "a");
        assert_eq!(reports[1].prompt_id, "b");
        assert!(reports.iter().all(|r| r.outcome.is_success()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_predecessor_halts_the_chain() {
        let (_dir, store) = temp_store();
        store
            .append_chain(vec![
                chain_prompt("a", "first", Some("b")),
                chain_prompt("b", "second", None),
            ])
            .unwrap();
        let dispatcher = sh_dispatcher(Arc::clone(&store), "exit 1");

        let reports = dispatcher.dispatch("a").await;
        assert_eq!(reports.len(), 1, "successor must not be dispatched");
        assert!(matches!(
            reports[0].outcome,
            DispatchOutcome::AgentError { .. }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dangling_successor_is_tolerated() {
        let (_dir, store) = temp_store();
        store
            .append_chain(vec![chain_prompt("a", "first", Some("deleted"))])
            .unwrap();
        let dispatcher = sh_dispatcher(Arc::clone(&store), "true");

        let reports = dispatcher.dispatch("a").await;
        assert_eq!(reports.len(), 2);
        assert!(reports[0].outcome.is_success());
        assert!(matches!(
            reports[1].outcome,
            DispatchOutcome::PromptNotFound
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cyclic_chain_is_detected_and_halted() {
        let (_dir, store) = temp_store();
        store
            .append_chain(vec![
                chain_prompt("a", "first", Some("b")),
                chain_prompt("b", "second", Some("a")),
            ])
            .unwrap();
        let dispatcher = sh_dispatcher(Arc::clone(&store), "true");

        let reports = dispatcher.dispatch("a").await;
        assert_eq!(reports.len(), 3);
        assert!(matches!(
            reports[2].outcome,
            DispatchOutcome::CycleDetected
        ));
        assert_eq!(reports[2].prompt_id, "a");
    }
}
