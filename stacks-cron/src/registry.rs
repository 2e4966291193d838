//! Schedule registration.

use crate::builder::ScheduleBuilder;
use crate::entry::{ScheduleEntry, Target};
use crate::error::ScheduleDefinitionError;
use std::future::Future;
use std::path::PathBuf;

/// Entries registered at startup. Read-only once the scheduler runs.
///
/// No deduplication: registering the same entry twice makes it fire twice.
#[derive(Debug, Clone, Default)]
pub struct ScheduleRegistry {
    entries: Vec<ScheduleEntry>,
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: ScheduleEntry) {
        self.entries.push(entry);
    }

    /// Entries in registration order.
    pub fn all(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<ScheduleEntry> {
        self.entries
    }
}

impl Extend<ScheduleEntry> for ScheduleRegistry {
    fn extend<I: IntoIterator<Item = ScheduleEntry>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

#[derive(Debug)]
enum Slot {
    Built(ScheduleEntry),
    /// Next unconsumed item of `chains`
    Chain,
}

/// Registration context handed to schedule definitions.
///
/// Each target method returns the builder for a new entry; the chain is
/// validated when [`finish`](Self::finish) is called.
///
/// ```
/// use stacks_cron::SchedulerContext;
///
/// let mut run = SchedulerContext::new();
/// run.command("php artisan inspire").every_five_minutes();
/// run.job("SendDigest").weekly().mondays().at("08:00");
///
/// let registry = run.finish().unwrap();
/// assert_eq!(registry.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct SchedulerContext {
    slots: Vec<Slot>,
    chains: Vec<(Target, ScheduleBuilder)>,
}

impl SchedulerContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn chain(&mut self, target: Target) -> &mut ScheduleBuilder {
        let index = self.chains.len();
        self.chains.push((target, ScheduleBuilder::new()));
        self.slots.push(Slot::Chain);
        &mut self.chains[index].1
    }

    /// Shell command line.
    pub fn command(&mut self, command: impl Into<String>) -> &mut ScheduleBuilder {
        self.chain(Target::Command(command.into()))
    }

    /// Script file, executed directly.
    pub fn exec(&mut self, path: impl Into<PathBuf>) -> &mut ScheduleBuilder {
        self.chain(Target::Script(path.into()))
    }

    /// Alias of [`exec`](Self::exec).
    pub fn script(&mut self, path: impl Into<PathBuf>) -> &mut ScheduleBuilder {
        self.exec(path)
    }

    /// Registered action, by name.
    pub fn action(&mut self, name: impl Into<String>) -> &mut ScheduleBuilder {
        self.chain(Target::Action(name.into()))
    }

    /// Registered job, by name.
    pub fn job(&mut self, name: impl Into<String>) -> &mut ScheduleBuilder {
        self.chain(Target::Job(name.into()))
    }

    /// Inline async function.
    pub fn call<F, Fut>(&mut self, f: F) -> &mut ScheduleBuilder
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::CronResult<()>> + Send + 'static,
    {
        self.chain(Target::callback(f))
    }

    /// Add an entry that was built elsewhere.
    pub fn register(&mut self, entry: ScheduleEntry) {
        self.slots.push(Slot::Built(entry));
    }

    /// Number of entries registered so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Build every pending chain, failing on the first invalid one.
    pub fn finish(self) -> Result<ScheduleRegistry, ScheduleDefinitionError> {
        let mut registry = ScheduleRegistry::new();
        let mut chains = self.chains.into_iter();
        for slot in self.slots {
            let entry = match slot {
                Slot::Built(entry) => entry,
                Slot::Chain => {
                    let Some((target, builder)) = chains.next() else {
                        continue;
                    };
                    let label = builder
                        .entry_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| target.label());
                    builder.build(target).map_err(|e| e.in_entry(label))?
                }
            };
            registry.register(entry);
        }
        Ok(registry)
    }
}

/// Run a schedule definition and collect its entries.
///
/// ```
/// use stacks_cron::define;
///
/// let registry = define(|run| {
///     run.job("Backup").daily().at("02:30");
///     run.call(|| async { Ok(()) }).hourly();
/// })
/// .unwrap();
///
/// assert_eq!(registry.all()[0].spec.to_string(), "30 2 * * *");
/// ```
pub fn define<F>(definition: F) -> Result<ScheduleRegistry, ScheduleDefinitionError>
where
    F: FnOnce(&mut SchedulerContext),
{
    let mut context = SchedulerContext::new();
    definition(&mut context);
    context.finish()
}
