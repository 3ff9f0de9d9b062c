//! Sandboxed code execution
//!
//! Runs hub-submitted snippets in an embedded interpreter with no host
//! I/O, no filesystem and no network. The language is a small
//! expression/statement dialect (assignments, `if`/`while`/`for`,
//! brace-delimited blocks) over a curated builtin set; `print` writes
//! to a per-execution buffer that becomes the reported output. Every
//! run is bounded by a wall-clock timeout enforced from outside the
//! worker thread.

mod builtins;
mod eval;
mod lexer;
mod parser;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value as Json};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use eval::Value;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Result of one sandboxed execution, shaped for the hub
#[derive(Debug, Clone)]
pub struct SandboxOutcome {
    /// Everything `print` produced, in order
    pub output: String,
    /// Final top-level bindings, filtered and JSON-rendered
    pub variables: Map<String, Json>,
    pub exit_code: i32,
    pub success: bool,
    pub error: Option<String>,
}

/// Interpreter front-end owning the default timeout
#[derive(Debug, Clone)]
pub struct Sandbox {
    default_timeout: Duration,
}

impl Sandbox {
    pub fn new(default_timeout_secs: u64) -> Self {
        Sandbox {
            default_timeout: Duration::from_secs(default_timeout_secs),
        }
    }

    /// Execute `code`, bounded by `timeout` (or the configured
    /// default). The interpreter runs on a dedicated worker thread; on
    /// timeout the worker is flagged to stop and the failure is
    /// reported immediately, without waiting for it to notice.
    pub async fn execute(&self, code: &str, timeout: Option<Duration>) -> SandboxOutcome {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();

        let source = code.to_string();
        let worker_cancel = cancel.clone();
        let spawned = std::thread::Builder::new()
            .name("sandbox-exec".to_string())
            .spawn(move || {
                let _ = tx.send(eval::run(&source, worker_cancel));
            });
        if let Err(e) = spawned {
            return failure(String::new(), format!("failed to start worker: {e}"), 1);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok((output, Ok(bindings)))) => SandboxOutcome {
                output,
                variables: render_bindings(bindings),
                exit_code: 0,
                success: true,
                error: None,
            },
            Ok(Ok((output, Err(e)))) => {
                debug!(error = %e, "sandboxed execution failed");
                failure(output, e.to_string(), 1)
            }
            Ok(Err(_)) => failure(
                String::new(),
                "execution worker terminated unexpectedly".to_string(),
                1,
            ),
            Err(_) => {
                // The worker checks this flag at statement boundaries
                // and unwinds on its own; nothing joins it.
                cancel.store(true, Ordering::Relaxed);
                warn!(?timeout, "sandboxed execution timed out");
                // The timeout description doubles as the reported
                // output; nothing printed by the worker is recoverable.
                let message = format!("execution timed out after {timeout:?}");
                failure(message.clone(), message, 1)
            }
        }
    }
}

fn failure(output: String, error: String, exit_code: i32) -> SandboxOutcome {
    SandboxOutcome {
        output,
        variables: Map::new(),
        exit_code,
        success: false,
        error: Some(error),
    }
}

/// Render final bindings for the hub: underscore-prefixed names and
/// callables are dropped, values that have no JSON form degrade to
/// their textual form.
fn render_bindings(bindings: BTreeMap<String, Value>) -> Map<String, Json> {
    let mut out = Map::new();
    for (name, value) in bindings {
        if name.starts_with('_') || value.is_callable() {
            continue;
        }
        out.insert(name, value.to_json());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sandbox() -> Sandbox {
        Sandbox::new(30)
    }

    #[tokio::test]
    async fn test_print_expression() {
        let outcome = sandbox().execute("print(1 + 1)", None).await;
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.output, "2\n");
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_variables_reported() {
        let code = "x = 5\nname = \"agent\"\nflags = [true, false]";
        let outcome = sandbox().execute(code, None).await;
        assert!(outcome.success);
        assert_eq!(outcome.variables["x"], json!(5));
        assert_eq!(outcome.variables["name"], json!("agent"));
        assert_eq!(outcome.variables["flags"], json!([true, false]));
    }

    #[tokio::test]
    async fn test_private_and_callable_bindings_filtered() {
        let code = "_secret = 1\nvisible = 2\nf = print";
        let outcome = sandbox().execute(code, None).await;
        assert!(outcome.success);
        assert!(!outcome.variables.contains_key("_secret"));
        assert!(!outcome.variables.contains_key("f"));
        assert_eq!(outcome.variables["visible"], json!(2));
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out() {
        let outcome = sandbox()
            .execute("while true { }", Some(Duration::from_millis(200)))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, 1);
        assert!(outcome.output.contains("timed out"));
        assert!(outcome.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_syntax_error_reported() {
        let outcome = sandbox().execute("x = = 3", None).await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, 1);
        assert!(outcome.error.as_deref().unwrap().contains("syntax error"));
    }

    #[tokio::test]
    async fn test_runtime_error_keeps_prior_output() {
        let code = "print(\"before\")\nundefined_name";
        let outcome = sandbox().execute(code, None).await;
        assert!(!outcome.success);
        assert_eq!(outcome.output, "before\n");
        assert!(outcome.error.as_deref().unwrap().contains("undefined_name"));
    }

    #[tokio::test]
    async fn test_loops_and_builtins() {
        let code = "total = 0\nfor i in range(5) { total = total + i }\nprint(total)";
        let outcome = sandbox().execute(code, None).await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.output, "10\n");
        assert_eq!(outcome.variables["total"], json!(10));
    }

    #[tokio::test]
    async fn test_map_bindings_reported_as_objects() {
        let code = "m = {\"name\": \"agent\", \"n\": 3}\nprint(m[\"name\"])";
        let outcome = sandbox().execute(code, None).await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.output, "agent\n");
        assert_eq!(outcome.variables["m"], json!({"name": "agent", "n": 3}));
    }

    #[tokio::test]
    async fn test_break_exits_unbounded_loop() {
        let code = "n = 0\nwhile true {\n  n = n + 1\n  if n >= 10 { break }\n}";
        let outcome = sandbox().execute(code, Some(Duration::from_secs(5))).await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.variables["n"], json!(10));
    }

    #[tokio::test]
    async fn test_conditionals() {
        let code = "x = 7\nif x > 5 { label = \"big\" } else { label = \"small\" }";
        let outcome = sandbox().execute(code, None).await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.variables["label"], json!("big"));
    }

    #[tokio::test]
    async fn test_unknown_builtin_rejected() {
        let outcome = sandbox().execute("open(\"/etc/passwd\")", None).await;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("open"));
    }
}
