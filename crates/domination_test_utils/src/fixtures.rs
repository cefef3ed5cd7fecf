//! Test fixtures and helpers.
//!
//! Hand-built fields, settings for short matches and agents with scripted
//! behaviour for consistent testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use domination_core::agent::{Action, Agent, AgentContext, AgentFactory, NamedFactory, NoOpAgent};
use domination_core::error::AgentError;
use domination_core::field::Field;
use domination_core::observation::Observation;
use domination_core::settings::{EndCondition, Settings};

/// One red and one blue spawn in a walled corridor with a control point
/// between them.
pub const CORRIDOR_FIELD: &str = "\
w w w w w w w w w
w R _ _ C _ _ B w
w _ _ _ _ _ _ _ w
w w w w w w w w w
";

/// Red spawn with an ammo fountain two tiles to its right; blue spawn far
/// away.
pub const AMMO_FIELD: &str = "\
w w w w w w w w w w w
w R _ A _ _ _ _ _ B w
w _ _ _ _ _ _ _ _ _ w
w w w w w w w w w w w
";

/// Crumb fountain in the middle of an open room.
pub const CRUMB_FIELD: &str = "\
w w w w w w w w w w w w w w w
w R _ _ _ _ _ _ _ _ _ _ _ B w
w _ _ _ _ _ _ _ _ _ _ _ _ _ w
w _ _ _ _ _ _ _ _ _ _ _ _ _ w
w _ _ _ _ _ _ F _ _ _ _ _ _ w
w _ _ _ _ _ _ _ _ _ _ _ _ _ w
w _ _ _ _ _ _ _ _ _ _ _ _ _ w
w _ _ _ _ _ _ _ _ _ _ _ _ _ w
w w w w w w w w w w w w w w w
";

/// Parse a fixture field.
///
/// # Panics
///
/// Panics if the text is not a valid field.
#[must_use]
pub fn field(text: &str) -> Arc<Field> {
    Arc::new(text.parse().expect("fixture field must parse"))
}

/// Settings for a short one-tank-per-side match.
///
/// The think budget is generous so that ordinary test agents never time
/// out on a loaded machine.
#[must_use]
pub fn quick_settings(max_steps: u32) -> Settings {
    Settings {
        max_steps,
        max_score: 2,
        num_agents: 1,
        think_time: 1.0,
        end_condition: EndCondition::SCORE,
        ..Settings::default()
    }
}

/// Factory for [`NoOpAgent`]s.
#[must_use]
pub fn noop_factory() -> Arc<dyn AgentFactory> {
    Arc::new(NamedFactory::new("noop", |_: AgentContext| -> Box<dyn Agent> {
        Box::new(NoOpAgent)
    }))
}

/// Agent that plays a fixed list of actions, then no-ops.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    script: Vec<Action>,
    next: usize,
    /// Observations received so far.
    pub seen: Vec<Observation>,
}

impl ScriptedAgent {
    /// Agent playing `script` in order.
    #[must_use]
    pub fn new(script: Vec<Action>) -> Self {
        Self {
            script,
            next: 0,
            seen: Vec::new(),
        }
    }
}

impl Agent for ScriptedAgent {
    fn observe(&mut self, observation: &Observation) -> Result<(), AgentError> {
        self.seen.push(observation.clone());
        Ok(())
    }

    fn act(&mut self) -> Result<Action, AgentError> {
        let action = self.script.get(self.next).copied().unwrap_or(Action::NOOP);
        self.next += 1;
        Ok(action)
    }
}

/// Factory giving every tank the same script.
#[must_use]
pub fn scripted_factory(script: Vec<Action>) -> Arc<dyn AgentFactory> {
    Arc::new(NamedFactory::new("scripted", move |_: AgentContext| -> Box<dyn Agent> {
        Box::new(ScriptedAgent::new(script.clone()))
    }))
}

/// Agent that sleeps before answering, then asks for full speed.
#[derive(Debug, Clone, Copy)]
pub struct SleepyAgent {
    /// Time spent in every `act` call.
    pub delay: Duration,
}

impl Agent for SleepyAgent {
    fn observe(&mut self, _observation: &Observation) -> Result<(), AgentError> {
        Ok(())
    }

    fn act(&mut self) -> Result<Action, AgentError> {
        thread::sleep(self.delay);
        Ok(Action::new(0.5, 10.0, true))
    }
}

/// Factory for [`SleepyAgent`]s.
#[must_use]
pub fn sleepy_factory(delay: Duration) -> Arc<dyn AgentFactory> {
    Arc::new(NamedFactory::new("sleepy", move |_: AgentContext| -> Box<dyn Agent> {
        Box::new(SleepyAgent { delay })
    }))
}

/// Agent whose `act` always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingAgent;

impl Agent for FailingAgent {
    fn observe(&mut self, _observation: &Observation) -> Result<(), AgentError> {
        Ok(())
    }

    fn act(&mut self) -> Result<Action, AgentError> {
        Err(AgentError::new("division by zero"))
    }

    fn finalize(&mut self, _interrupted: bool) -> Result<(), AgentError> {
        Err(AgentError::new("cannot flush"))
    }
}

/// Factory for [`FailingAgent`]s.
#[must_use]
pub fn failing_factory() -> Arc<dyn AgentFactory> {
    Arc::new(NamedFactory::new("failing", |_: AgentContext| -> Box<dyn Agent> {
        Box::new(FailingAgent)
    }))
}

/// Shared record of `finalize` calls made by [`FinalizeProbe`] agents.
#[derive(Debug, Clone, Default)]
pub struct FinalizeLog {
    calls: Arc<AtomicUsize>,
    flags: Arc<Mutex<Vec<bool>>>,
}

impl FinalizeLog {
    /// Number of `finalize` calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `interrupted` argument of every call.
    ///
    /// # Panics
    ///
    /// Panics if a probe panicked while holding the lock.
    #[must_use]
    pub fn flags(&self) -> Vec<bool> {
        self.flags.lock().expect("finalize log poisoned").clone()
    }

    /// Factory whose agents report into this log.
    #[must_use]
    pub fn factory(&self) -> Arc<dyn AgentFactory> {
        let log = self.clone();
        Arc::new(NamedFactory::new("probe", move |_: AgentContext| -> Box<dyn Agent> {
            Box::new(FinalizeProbe { log: log.clone() })
        }))
    }
}

/// No-op agent that records its `finalize` call.
#[derive(Debug, Clone)]
pub struct FinalizeProbe {
    log: FinalizeLog,
}

impl Agent for FinalizeProbe {
    fn observe(&mut self, _observation: &Observation) -> Result<(), AgentError> {
        Ok(())
    }

    fn act(&mut self) -> Result<Action, AgentError> {
        Ok(Action::NOOP)
    }

    fn finalize(&mut self, interrupted: bool) -> Result<(), AgentError> {
        self.log.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut flags) = self.log.flags.lock() {
            flags.push(interrupted);
        }
        Ok(())
    }
}
