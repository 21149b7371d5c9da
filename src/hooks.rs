//! Lifecycle hooks declared on a mapped type.
//!
//! A hook is a named `fn(&mut T)` registered with
//! [`Describe::post_load`](crate::Describe::post_load) or
//! [`Describe::on_reload`](crate::Describe::on_reload). Hooks run in
//! declaration order. A failing hook is reported and the remaining hooks still
//! run.

use std::fmt;

use crate::descriptor::{Mapped, resolve};
use crate::report::{Diagnostic, Reporter};

/// Error a hook may return. Anything that converts into a boxed error works
/// with `?` inside the hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// When a hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// After a top-level load completes.
    PostLoad,
    /// After [`ConfigFile::reload`](crate::ConfigFile::reload) has reloaded
    /// and persisted the instance.
    OnReload,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::PostLoad => write!(f, "post-load"),
            HookPhase::OnReload => write!(f, "on-reload"),
        }
    }
}

pub struct Hook<T> {
    pub(crate) name: &'static str,
    pub(crate) run: fn(&mut T) -> Result<(), HookError>,
}

impl<T> Hook<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("name", &self.name).finish()
    }
}

/// Run every post-load hook of `T` against `instance`.
///
/// [`load_from_config`](crate::load_from_config) calls this after a top-level
/// load. Nested objects and sequence elements never fire hooks.
pub fn run_post_load<T: Mapped>(instance: &mut T, reporter: &mut dyn Reporter) {
    run(&resolve::<T>().post_load, HookPhase::PostLoad, instance, reporter);
}

/// Run every reload hook of `T` against `instance`.
pub fn run_on_reload<T: Mapped>(instance: &mut T, reporter: &mut dyn Reporter) {
    run(&resolve::<T>().on_reload, HookPhase::OnReload, instance, reporter);
}

fn run<T>(hooks: &[Hook<T>], phase: HookPhase, instance: &mut T, reporter: &mut dyn Reporter) {
    for hook in hooks {
        if let Err(e) = (hook.run)(instance) {
            reporter.report(Diagnostic::HookFailed {
                hook: hook.name,
                phase,
                reason: e.to_string(),
            });
        }
    }
}
