use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sequencer::exec::process::{LaunchFuture, ProcessLauncher};

/// What a scripted launch does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// The program runs and exits with this code.
    Exit(i32),
    /// The program cannot be started.
    LaunchError,
    /// The program never exits (until its future is dropped).
    Hang,
}

/// One launch request as the launcher saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// True if any argument contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a.contains(needle))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchEvent {
    Started(Invocation),
    Finished(Invocation),
}

type Effect = Box<dyn Fn(&Invocation) + Send + Sync>;

struct Rule {
    program: String,
    needle: Option<String>,
    outcomes: Vec<Scripted>,
}

#[derive(Default)]
struct Inner {
    rules: Vec<Rule>,
    effects: Vec<(String, Effect)>,
    events: Vec<LaunchEvent>,
}

/// A `ProcessLauncher` that never spawns anything.
///
/// - Outcomes are scripted per program (optionally only for invocations
///   whose arguments mention a string, e.g. a run number) and consumed in
///   order; unscripted launches exit 0.
/// - Effects run when a scripted program exits 0, e.g. to create the files
///   the real program would write.
/// - Every start and finish is recorded.
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    inner: Arc<Mutex<Inner>>,
    delay: Option<Duration>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every launch take `delay` before it exits.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn script(&self, program: &str, outcomes: &[Scripted]) -> &Self {
        self.push_rule(program, None, outcomes)
    }

    /// Script `program` only for invocations whose arguments mention `needle`.
    pub fn script_for(&self, program: &str, needle: &str, outcomes: &[Scripted]) -> &Self {
        self.push_rule(program, Some(needle.to_string()), outcomes)
    }

    pub fn on_success<F>(&self, program: &str, effect: F) -> &Self
    where
        F: Fn(&Invocation) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        inner.effects.push((program.to_string(), Box::new(effect)));
        self
    }

    pub fn events(&self) -> Vec<LaunchEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    /// Every started invocation, in start order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LaunchEvent::Started(inv) => Some(inv),
                LaunchEvent::Finished(_) => None,
            })
            .collect()
    }

    /// Programs started, in start order.
    pub fn programs(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.program).collect()
    }

    fn push_rule(&self, program: &str, needle: Option<String>, outcomes: &[Scripted]) -> &Self {
        let mut inner = self.inner.lock().unwrap();
        inner.rules.push(Rule {
            program: program.to_string(),
            needle,
            outcomes: outcomes.to_vec(),
        });
        self
    }

    fn next_outcome(&self, invocation: &Invocation) -> Scripted {
        let mut inner = self.inner.lock().unwrap();
        inner.events.push(LaunchEvent::Started(invocation.clone()));

        let rule = inner.rules.iter_mut().find(|r| {
            r.program == invocation.program
                && !r.outcomes.is_empty()
                && r.needle.as_deref().is_none_or(|n| invocation.mentions(n))
        });

        match rule {
            Some(rule) => rule.outcomes.remove(0),
            None => Scripted::Exit(0),
        }
    }

    fn finish(&self, invocation: Invocation, code: i32) {
        let mut inner = self.inner.lock().unwrap();
        if code == 0 {
            for (program, effect) in &inner.effects {
                if *program == invocation.program {
                    effect(&invocation);
                }
            }
        }
        inner.events.push(LaunchEvent::Finished(invocation));
    }
}

impl fmt::Debug for ScriptedLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedLauncher")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn launch<'a>(&'a self, program: &'a str, args: &'a [String]) -> LaunchFuture<'a> {
        Box::pin(async move {
            let invocation = Invocation {
                program: program.to_string(),
                args: args.to_vec(),
            };

            match self.next_outcome(&invocation) {
                Scripted::LaunchError => Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{program}: command not found"),
                )),
                Scripted::Hang => std::future::pending::<io::Result<i32>>().await,
                Scripted::Exit(code) => {
                    if let Some(delay) = self.delay {
                        tokio::time::sleep(delay).await;
                    }
                    self.finish(invocation, code);
                    Ok(code)
                }
            }
        })
    }
}
