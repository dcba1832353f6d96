//! Build-time script engine.
//!
//! One QuickJS runtime lives as long as the [`Sandbox`]; every evaluation
//! gets a fresh context, so nothing leaks between builds. A context only has
//! the ECMAScript intrinsics: no filesystem, no network, no DOM and no module
//! loader.

use crate::bundler::js_string;
use regex::Regex;
use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Runtime};
use std::sync::LazyLock;
use thiserror::Error;

/// One stack frame: `at name (file:line:column)` or `at file:line`.
pub(crate) static STACK_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"at[ \t]+(?:(\S+)[ \t]+)?\(?([^()\s]+?):(\d+)(?::(\d+))?\)?").unwrap()
});

/// Silences console calls instead of failing on a missing global.
const PRELUDE: &str = "globalThis.console = { log() {}, info() {}, warn() {}, error() {}, debug() {} };";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SandboxError {
    pub message: String,
    pub stack: Option<String>,
    /// 1-based (line, column) of the throw site in the evaluated script.
    pub location: Option<(usize, Option<usize>)>,
}

impl SandboxError {
    fn new(message: impl Into<String>, stack: Option<String>) -> Self {
        let location = stack.as_deref().and_then(first_frame);
        Self {
            message: message.into(),
            stack,
            location,
        }
    }

    fn caught(err: CaughtError<'_>) -> Self {
        match err {
            CaughtError::Exception(exception) => {
                let message = exception
                    .message()
                    .unwrap_or_else(|| "uncaught exception".to_owned());
                let stack = exception.stack().filter(|s| !s.trim().is_empty());
                Self::new(message, stack)
            }
            CaughtError::Value(value) => Self::new(format!("uncaught value: {value:?}"), None),
            CaughtError::Error(err) => Self::new(err.to_string(), None),
        }
    }
}

fn first_frame(stack: &str) -> Option<(usize, Option<usize>)> {
    let caps = STACK_FRAME.captures(stack)?;
    let line = caps[3].parse().ok()?;
    let column = caps.get(4).and_then(|c| c.as_str().parse().ok());
    Some((line, column))
}

pub struct Sandbox {
    runtime: Runtime,
}

impl Sandbox {
    pub fn new(memory_limit: usize) -> Result<Self, SandboxError> {
        let runtime = Runtime::new().map_err(|err| SandboxError::new(err.to_string(), None))?;
        runtime.set_memory_limit(memory_limit);
        Ok(Self { runtime })
    }

    /// Run `script`, then return `globalThis[global]` as JSON text.
    pub fn eval_json(&self, script: &str, global: &str) -> Result<String, SandboxError> {
        let context = Context::full(&self.runtime).map_err(|err| SandboxError::new(err.to_string(), None))?;
        context.with(|ctx| {
            eval::<()>(&ctx, PRELUDE)?;
            eval::<()>(&ctx, script)?;
            let read = format!(
                "JSON.stringify(globalThis[{}] === undefined ? null : globalThis[{0}])",
                js_string(global)
            );
            eval::<String>(&ctx, &read)
        })
    }
}

fn eval<'js, T: rquickjs::FromJs<'js>>(ctx: &Ctx<'js>, source: &str) -> Result<T, SandboxError> {
    ctx.eval::<T, _>(source)
        .catch(ctx)
        .map_err(SandboxError::caught)
}
