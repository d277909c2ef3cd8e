//! Pluggable scripted-step mechanism for `JAVASCRIPT`-kind scripts.
//!
//! Design note §9 flags the spec's raw JS-sandbox-and-`eval` description as a
//! hazard and offers three ways out: precompiled plugins registered with the
//! engine, a real sandboxed interpreter, or dropping the feature down to SQL
//! only. This module implements the first: a [`ScriptStep`] handler is
//! registered at compile time via [`inventory::submit!`] (the same mechanism
//! the teacher ORM uses to auto-register model schemas), and the engine
//! dispatches a `JAVASCRIPT`-kind script to whichever handler is registered.
//! If none is registered, such scripts fall back to the same warn-and-skip
//! path as an `UNKNOWN`-kind script — option (c) is what you get for free by
//! registering nothing.
//!
//! ```ignore
//! struct LuaStep;
//!
//! impl migra::step::ScriptStep for LuaStep {
//!     fn run<'a>(
//!         &'a self,
//!         cancel: &'a migra::CancellationToken,
//!         provider: &'a dyn migra::step::ExecuteStep,
//!         logger: &'a migra::log::CaptureLogger,
//!         script: &'a migra::source::Script,
//!     ) -> migra::step::StepFuture<'a> {
//!         Box::pin(async move {
//!             // interpret `script.content()` in a real sandboxed runtime,
//!             // using `provider`/`logger`/`cancel` as the capability envelope.
//!             Ok(())
//!         })
//!     }
//! }
//!
//! inventory::submit! { migra::step::StepRegistration { step: &LuaStep } }
//! ```

use crate::cancel::CancellationToken;
use crate::driver::{Provider, SqlParam};
use crate::error::MigrationResult;
use crate::log::CaptureLogger;
use crate::source::Script;
use std::future::Future;
use std::pin::Pin;

/// The future type returned by [`ScriptStep::run`].
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = MigrationResult<()>> + Send + 'a>>;

/// Object-safe bridge onto [`Provider`], so scripted steps can issue SQL
/// through the same connection the engine is using without the engine
/// needing to be generic over the step handler's own type parameters.
pub trait ExecuteStep: Send + Sync {
    fn execute_sql<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        sql: &'a str,
        params: &'a [SqlParam],
    ) -> Pin<Box<dyn Future<Output = MigrationResult<u64>> + Send + 'a>>;
}

impl<P: Provider> ExecuteStep for P {
    fn execute_sql<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        sql: &'a str,
        params: &'a [SqlParam],
    ) -> Pin<Box<dyn Future<Output = MigrationResult<u64>> + Send + 'a>> {
        Box::pin(Provider::execute_sql(self, cancel, sql, params))
    }
}

/// A handler for `JAVASCRIPT`-kind scripts, given the same
/// `(cancel, sql_provider, logger)` capability envelope the spec grants
/// embedded scripts.
pub trait ScriptStep: Send + Sync {
    fn run<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        provider: &'a dyn ExecuteStep,
        logger: &'a CaptureLogger,
        script: &'a Script,
    ) -> StepFuture<'a>;
}

/// Compile-time registration entry collected via `inventory`.
pub struct StepRegistration {
    pub step: &'static dyn ScriptStep,
}

inventory::collect!(StepRegistration);

/// The registered `JAVASCRIPT`-step handler, if any crate linked into the
/// binary registered one. The engine falls back to the `UNKNOWN`-kind
/// warn-and-skip path when this returns `None`.
pub fn javascript_step() -> Option<&'static dyn ScriptStep> {
    inventory::iter::<StepRegistration>().next().map(|reg| reg.step)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoStep;

    impl ScriptStep for EchoStep {
        fn run<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
            _provider: &'a dyn ExecuteStep,
            logger: &'a CaptureLogger,
            script: &'a Script,
        ) -> StepFuture<'a> {
            Box::pin(async move {
                logger.info(format!("ran {}", script.name()));
                Ok(())
            })
        }
    }

    inventory::submit! {
        StepRegistration { step: &EchoStep }
    }

    #[test]
    fn registered_step_is_discoverable() {
        assert!(javascript_step().is_some());
    }
}
