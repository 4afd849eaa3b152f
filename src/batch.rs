use std::fmt::Display;
use std::future::Future;
use std::time::Instant;
use tracing::debug;
use tracing::error;

use crate::cooldown::Cooldown;
use crate::key::Prekey;
use crate::traits::CooldownScheme;

/// When a batch run starts the cooldown of an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CooldownTiming {
    /// Before the work. A failed run still cools down.
    BeforeRun,
    /// Once the work succeeded. A failed run can be retried by the next batch.
    #[default]
    AfterRun,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub executed: usize,
    pub skipped:  usize,
    pub failed:   usize,
}

/// Runs a unit of work over a set of entities, skipping those still on cooldown.
#[derive(Debug)]
pub struct CooldownBatch<S>
where
    S: CooldownScheme,
{
    cooldown: Cooldown<S>,
    timing:   CooldownTiming,
}

impl<S> CooldownBatch<S>
where
    S: CooldownScheme,
{
    pub fn new(cooldown: Cooldown<S>, timing: CooldownTiming) -> Self {
        Self { cooldown, timing }
    }

    pub fn cooldown(&self) -> &Cooldown<S> {
        &self.cooldown
    }

    pub fn timing(&self) -> CooldownTiming {
        self.timing
    }

    /// Process `entities` one after another. `key_of` gives the cooldown prekey of an entity. Failures of `work` are
    /// logged and counted, they don't stop the batch.
    pub async fn run<E, K, W, Fut, Err>(
        &self,
        entities: impl IntoIterator<Item = E>,
        key_of: K,
        mut work: W,
    ) -> BatchReport
    where
        K: Fn(&E) -> Prekey,
        W: FnMut(E) -> Fut,
        Fut: Future<Output = Result<(), Err>>,
        Err: Display,
    {
        let mut report = BatchReport::default();
        for entity in entities {
            let prekey = key_of(&entity);
            if self.cooldown.has_cooldown(&prekey).await {
                report.skipped += 1;
                continue;
            }

            if self.timing == CooldownTiming::BeforeRun {
                self.cooldown.start_cooldown(&prekey).await;
            }

            match work(entity).await {
                Ok(()) => {
                    report.executed += 1;
                    if self.timing == CooldownTiming::AfterRun {
                        self.cooldown.start_cooldown(&prekey).await;
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    error!("[{}] batch work failed: {err}", self.cooldown.key(&prekey));
                }
            }
        }
        debug!(
            "batch done: {} executed, {} skipped, {} failed",
            report.executed, report.skipped, report.failed
        );
        report
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Throttled<T> {
    /// The cooldown was running; nothing was done.
    Skipped,
    Ran(T),
}

impl<T> Throttled<T> {
    pub fn was_skipped(&self) -> bool {
        matches!(self, Throttled::Skipped)
    }
}

/// Run a single task unless it is on cooldown for `entity`, then start its cooldown. With `force` the cooldown is
/// restarted even if another run started one meanwhile.
pub async fn throttled<S, F, T>(cooldown: &Cooldown<S>, entity: &Prekey, force: bool, task: F) -> Throttled<T>
where
    S: CooldownScheme,
    F: Future<Output = T>,
{
    if cooldown.has_cooldown(entity).await {
        debug!("[{}] skipped, on cooldown", cooldown.key(entity));
        return Throttled::Skipped;
    }
    let started = Instant::now();
    let result = task.await;
    cooldown.reset_cooldown(entity, force).await;
    debug!("[{}] finished in {:?}", cooldown.key(entity), started.elapsed());
    Throttled::Ran(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::memory::MemoryStore;
    use crate::prekey;
    use crate::stock::CooldownSpec;
    use std::sync::Arc;
    use std::time::Duration;

    fn cooldown() -> Cooldown<CooldownSpec> {
        let store = Arc::new(MemoryStore::builder().build().expect("memory store"));
        let backend = Backend::builder().store(store).build().expect("backend");
        Cooldown::new(&backend, CooldownSpec::new("Digest", Duration::from_secs(3600)))
    }

    #[tokio::test]
    async fn after_run_skips_cooled_down_entities() {
        let cooldown = cooldown();
        cooldown.start_cooldown(&prekey![2u64]).await;
        let batch = CooldownBatch::new(cooldown, CooldownTiming::AfterRun);

        let mut seen = Vec::new();
        let report = batch
            .run(
                vec![1u64, 2, 3, 4],
                |id| prekey![*id],
                |id| {
                    seen.push(id);
                    async move {
                        if id == 4 {
                            Err("mail server said no")
                        }
                        else {
                            Ok(())
                        }
                    }
                },
            )
            .await;

        assert_eq!(seen, vec![1, 3, 4]);
        assert_eq!(
            report,
            BatchReport {
                executed: 2,
                skipped:  1,
                failed:   1,
            }
        );
        assert!(batch.cooldown().has_cooldown(&prekey![1u64]).await);
        assert!(batch.cooldown().has_cooldown(&prekey![3u64]).await);
        // Failed work doesn't cool down, the next batch retries it.
        assert!(!batch.cooldown().has_cooldown(&prekey![4u64]).await);

        let report = batch
            .run(vec![1u64, 2, 3, 4], |id| prekey![*id], |_| async { Ok::<(), String>(()) })
            .await;
        assert_eq!(report.executed, 1);
        assert_eq!(report.skipped, 3);
    }

    #[tokio::test]
    async fn before_run_cools_down_failures_too() {
        let batch = CooldownBatch::new(cooldown(), CooldownTiming::BeforeRun);
        let report = batch
            .run(vec!["a@b.c"], |email| prekey![*email], |_| async { Err::<(), _>("boom") })
            .await;
        assert_eq!(report.failed, 1);
        assert!(batch.cooldown().has_cooldown(&prekey!["a@b.c"]).await);
    }

    #[tokio::test]
    async fn throttled_task() {
        let cooldown = cooldown();
        let entity = prekey!["nightly-report"];
        assert_eq!(throttled(&cooldown, &entity, false, async { 1 }).await, Throttled::Ran(1));
        let second = throttled(&cooldown, &entity, false, async { 2 }).await;
        assert!(second.was_skipped());
        cooldown.clear_cooldown(&entity).await;
        assert_eq!(throttled(&cooldown, &entity, true, async { 3 }).await, Throttled::Ran(3));
    }
}
