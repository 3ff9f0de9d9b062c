//! Call interception
//!
//! Wrapper builders producing correlated `call_enter`/`call_exit`
//! telemetry around monitored functions, plus the manual tracker for
//! call sites that cannot be wrapped. The blocking/suspending variant
//! is chosen at wrap time; parameter names are captured once from the
//! wrap declaration rather than recovered per invocation.

use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::agent::{now_ms, Agent};
use crate::protocol::ExecutionEvent;

/// One instrumented call site: correlation, timing and serialization
/// shared by both wrapper variants.
#[derive(Clone)]
struct CallSite {
    agent: Agent,
    name: String,
    param_names: Vec<String>,
}

impl CallSite {
    fn new(agent: Agent, name: impl Into<String>, param_names: &[&str]) -> Self {
        CallSite {
            agent,
            name: name.into(),
            param_names: param_names.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Pair positional values with the declared parameter names;
    /// surplus values fall back to `arg_<index>`.
    fn named_parameters(&self, args: Vec<Value>) -> Map<String, Value> {
        let serializer = self.agent.serializer();
        let mut out = Map::new();
        for (i, value) in args.into_iter().enumerate() {
            let name = match self.param_names.get(i) {
                Some(name) => name.clone(),
                None => format!("arg_{i}"),
            };
            out.insert(name, serializer.bound(value, 0));
        }
        out
    }

    fn enter(&self, args: Vec<Value>) -> (String, f64) {
        let call_id = Uuid::new_v4().to_string();
        let started = now_ms();
        self.agent.emit_execution(ExecutionEvent::CallEnter {
            call_id: call_id.clone(),
            function_name: self.name.clone(),
            timestamp: started,
            parameters: self.named_parameters(args),
        });
        (call_id, started)
    }

    fn exit_ok<R: Serialize>(&self, call_id: String, started: f64, result: &R) {
        let ended = now_ms();
        self.agent.emit_execution(ExecutionEvent::CallExit {
            call_id,
            function_name: self.name.clone(),
            timestamp: ended,
            duration: ended - started,
            success: true,
            return_value: Some(self.agent.serializer().serialize(result)),
            error: None,
            stack_trace: None,
        });
    }

    fn exit_err(&self, call_id: String, started: f64, error: String, trace: String) {
        let ended = now_ms();
        self.agent.emit_execution(ExecutionEvent::CallExit {
            call_id,
            function_name: self.name.clone(),
            timestamp: ended,
            duration: ended - started,
            success: false,
            return_value: None,
            error: Some(error),
            stack_trace: Some(trace),
        });
    }
}

/// Wrapper for blocking functions
#[derive(Clone)]
pub struct SyncInterceptor {
    site: CallSite,
}

impl SyncInterceptor {
    /// Run `f` bracketed by enter/exit telemetry.
    ///
    /// The outcome is returned unchanged: errors propagate with their
    /// original type, and panics are re-raised after the failure exit
    /// event is recorded.
    pub fn invoke<R, E, F>(&self, args: Vec<Value>, f: F) -> Result<R, E>
    where
        R: Serialize,
        E: std::error::Error,
        F: FnOnce() -> Result<R, E>,
    {
        let (call_id, started) = self.site.enter(args);
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(result)) => {
                self.site.exit_ok(call_id, started, &result);
                Ok(result)
            }
            Ok(Err(error)) => {
                self.site
                    .exit_err(call_id, started, error.to_string(), error_chain(&error));
                Err(error)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.site
                    .exit_err(call_id, started, message.clone(), message);
                panic::resume_unwind(payload)
            }
        }
    }
}

/// Wrapper for suspending functions
///
/// Awaits only at the target's own suspension points; emission is a
/// non-blocking send on both sides of the delegation.
#[derive(Clone)]
pub struct AsyncInterceptor {
    site: CallSite,
}

impl AsyncInterceptor {
    pub async fn invoke<R, E, Fut>(&self, args: Vec<Value>, fut: Fut) -> Result<R, E>
    where
        R: Serialize,
        E: std::error::Error,
        Fut: std::future::Future<Output = Result<R, E>>,
    {
        let (call_id, started) = self.site.enter(args);
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(result)) => {
                self.site.exit_ok(call_id, started, &result);
                Ok(result)
            }
            Ok(Err(error)) => {
                self.site
                    .exit_err(call_id, started, error.to_string(), error_chain(&error));
                Err(error)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.site
                    .exit_err(call_id, started, message.clone(), message);
                panic::resume_unwind(payload)
            }
        }
    }
}

/// Explicitly reported call for code that cannot be wrapped, e.g.
/// multi-step pipelines reporting named sub-steps.
#[derive(Debug, Clone, Default)]
pub struct ManualCall {
    name: String,
    parameters: Map<String, Value>,
    return_value: Option<Value>,
    error: Option<String>,
    stack_trace: Option<String>,
    started_at: Option<f64>,
    ended_at: Option<f64>,
}

impl ManualCall {
    pub fn new(name: impl Into<String>) -> Self {
        ManualCall {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn returned(mut self, value: Value) -> Self {
        self.return_value = Some(value);
        self
    }

    pub fn failed(mut self, error: &dyn std::error::Error) -> Self {
        self.error = Some(error.to_string());
        self.stack_trace = Some(error_chain(error));
        self
    }

    /// Explicit start/end timestamps in epoch milliseconds
    pub fn spanning(mut self, started_at: f64, ended_at: f64) -> Self {
        self.started_at = Some(started_at);
        self.ended_at = Some(ended_at);
        self
    }
}

impl Agent {
    /// Build a wrapper for a blocking function. Parameter names are
    /// fixed here, at composition time.
    pub fn wrap(&self, name: impl Into<String>, param_names: &[&str]) -> SyncInterceptor {
        SyncInterceptor {
            site: CallSite::new(self.clone(), name, param_names),
        }
    }

    /// Build a wrapper for a suspending function
    pub fn wrap_async(&self, name: impl Into<String>, param_names: &[&str]) -> AsyncInterceptor {
        AsyncInterceptor {
            site: CallSite::new(self.clone(), name, param_names),
        }
    }

    /// Synthesize an enter/exit pair from a single report. Missing
    /// timestamps default to now, yielding a near-zero duration. Unlike
    /// the wrappers this never re-raises; the caller owns propagation.
    pub fn track(&self, call: ManualCall) {
        let serializer = self.serializer();
        let started = call.started_at.unwrap_or_else(now_ms);
        let ended = call.ended_at.unwrap_or_else(now_ms);
        let call_id = Uuid::new_v4().to_string();

        let mut parameters = Map::new();
        for (name, value) in call.parameters {
            parameters.insert(name, serializer.bound(value, 0));
        }

        self.emit_execution(ExecutionEvent::CallEnter {
            call_id: call_id.clone(),
            function_name: call.name.clone(),
            timestamp: started,
            parameters,
        });
        self.emit_execution(ExecutionEvent::CallExit {
            call_id,
            function_name: call.name,
            timestamp: ended,
            duration: ended - started,
            success: call.error.is_none(),
            return_value: call.return_value.map(|v| serializer.bound(v, 0)),
            error: call.error,
            stack_trace: call.stack_trace,
        });
    }
}

/// Flatten an error's source chain into one trace string
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut trace = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(trace, "\ncaused by: {cause}");
        source = cause.source();
    }
    trace
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: unknown payload".to_string()
    }
}
