use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::executor::{CapturedOutput, CommandExecutor, ProcessExecutor};
use super::policy::CachePolicy;
use crate::app::Config;
use crate::cache::{CacheStore, EntryOrigin, Fingerprint, StatsCounters, StatsEvent};
use crate::signature::SignatureEngine;
use crate::utils::ExecError;

/// Where the output of a run came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Cache,
    Fresh,
}

/// Result of one memoized invocation
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output: CapturedOutput,
    pub source: OutputSource,
    pub fingerprint: Option<Fingerprint>,
    /// Whether a fresh result was written to the cache
    pub stored: bool,
}

/// Ties signature, store and executor together for one invocation
///
/// Cache problems never reach the caller: they are logged and the command
/// runs uncached. Only failing to run the command at all is an error.
pub struct Orchestrator {
    engine: SignatureEngine,
    store: CacheStore,
    executor: Box<dyn CommandExecutor>,
    policy: CachePolicy,
    stats: bool,
}

impl Orchestrator {
    /// Production wiring: `ldd` resolver, real processes
    pub fn new(config: &Config) -> Self {
        Self::with_parts(
            SignatureEngine::default(),
            CacheStore::from_config(config),
            Box::new(ProcessExecutor),
            CachePolicy::from_config(config),
        )
        .with_stats(config.stats)
    }

    pub fn with_parts(
        engine: SignatureEngine,
        store: CacheStore,
        executor: Box<dyn CommandExecutor>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            engine,
            store,
            executor,
            policy,
            stats: false,
        }
    }

    /// Record hit/miss counters in the cache root
    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.stats = enabled;
        self
    }

    /// Return the cached output of `command args`, or run it and cache the
    /// result if the policy allows.
    pub fn run(&self, command: &str, args: &[String]) -> Result<RunOutcome, ExecError> {
        let binary = resolve_command(command);
        let fingerprint = binary
            .as_deref()
            .and_then(|binary| self.fingerprint(binary, args));

        if let Some(fp) = &fingerprint {
            match self.store.get::<CapturedOutput>(fp) {
                Ok(Some(output)) => {
                    info!("Cache hit for {} ({})", command, fp);
                    self.record(StatsEvent::Hit);
                    return Ok(RunOutcome {
                        output,
                        source: OutputSource::Cache,
                        fingerprint,
                        stored: false,
                    });
                }
                Ok(None) => {
                    debug!("Cache miss for {} ({})", command, fp);
                    self.record(StatsEvent::Miss);
                }
                Err(e) => {
                    warn!("Cache read failed for {}, running uncached: {}", fp, e);
                    self.record(StatsEvent::Miss);
                }
            }
        } else {
            debug!("No signature for {}, running uncached", command);
        }

        let program = binary.unwrap_or_else(|| PathBuf::from(command));
        let output = self.executor.execute(&program, args)?;

        let stored = match &fingerprint {
            Some(fp) if self.policy.is_cacheable(&output) => {
                let origin = EntryOrigin::new(&program, args);
                match self.store.put_with_origin(fp, &output, &origin) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to cache output of {}: {}", command, e);
                        false
                    }
                }
            }
            Some(_) => {
                debug!(
                    "Not caching {}: exit code {}, {} bytes of stderr",
                    command,
                    output.exit_code,
                    output.stderr.len()
                );
                false
            }
            None => false,
        };

        Ok(RunOutcome {
            output,
            source: OutputSource::Fresh,
            fingerprint,
            stored,
        })
    }

    fn fingerprint(&self, binary: &Path, args: &[String]) -> Option<Fingerprint> {
        match self.engine.signature(binary, args) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                warn!("Cannot fingerprint {}: {}", binary.display(), e);
                None
            }
        }
    }

    fn record(&self, event: StatsEvent) {
        if !self.stats {
            return;
        }
        let temporary_dir = self.store.temporary_dir();
        if let Err(e) = StatsCounters::record(self.store.root(), temporary_dir, event) {
            warn!("Failed to update stats: {}", e);
        }
    }
}

/// Find the binary a command word refers to, searching PATH when needed
pub fn resolve_command(command: &str) -> Option<PathBuf> {
    if command.is_empty() {
        return None;
    }
    match which::which(command) {
        Ok(path) => Some(path),
        Err(e) => {
            debug!("Cannot resolve {}: {}", command, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::collect_garbage;
    use crate::runtime::executor::MockCommandExecutor;
    use crate::signature::{DependencyResolver, LinkedLibrary};
    use crate::utils::{BincacheError, Result};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    /// Resolver reporting a fixed, empty dependency list
    struct NoDependencies;

    impl DependencyResolver for NoDependencies {
        fn resolve(&self, _binary: &Path) -> Result<Vec<LinkedLibrary>> {
            Ok(Vec::new())
        }
    }

    struct Unresolvable;

    impl DependencyResolver for Unresolvable {
        fn resolve(&self, binary: &Path) -> Result<Vec<LinkedLibrary>> {
            Err(BincacheError::DependencyResolution {
                binary: binary.to_path_buf(),
                reason: "not a dynamic executable".to_string(),
            })
        }
    }

    fn store(temp: &TempDir) -> CacheStore {
        CacheStore::new(temp.path().join("cache"), u64::MAX)
            .with_temporary_dir(temp.path().join("cache").join("tmp"))
    }

    fn hello() -> CapturedOutput {
        CapturedOutput {
            exit_code: 0,
            stdout: b"Hello\n".to_vec(),
            stderr: Vec::new(),
        }
    }

    fn orchestrator(
        temp: &TempDir,
        executor: MockCommandExecutor,
        policy: CachePolicy,
    ) -> Orchestrator {
        Orchestrator::with_parts(
            SignatureEngine::new(Box::new(NoDependencies)),
            store(temp),
            Box::new(executor),
            policy,
        )
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_second_run_served_from_cache() {
        let temp = TempDir::new().unwrap();
        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().times(1).returning(|_, _| Ok(hello()));
        let orchestrator = orchestrator(&temp, executor, CachePolicy::default());

        let first = orchestrator.run("echo", &args(&["Hello"])).unwrap();
        assert_eq!(first.source, OutputSource::Fresh);
        assert!(first.stored);
        assert!(first.fingerprint.is_some());

        let second = orchestrator.run("echo", &args(&["Hello"])).unwrap();
        assert_eq!(second.source, OutputSource::Cache);
        assert_eq!(second.output, hello());
        assert_eq!(second.fingerprint, first.fingerprint);
    }

    #[test]
    fn test_different_args_miss() {
        let temp = TempDir::new().unwrap();
        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().times(2).returning(|_, _| Ok(hello()));
        let orchestrator = orchestrator(&temp, executor, CachePolicy::default());

        orchestrator.run("echo", &args(&["Hello"])).unwrap();
        let other = orchestrator.run("echo", &args(&["Hello", "again"])).unwrap();
        assert_eq!(other.source, OutputSource::Fresh);
    }

    #[test]
    fn test_failed_command_never_cached() {
        let temp = TempDir::new().unwrap();
        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().times(2).returning(|_, _| {
            Ok(CapturedOutput {
                exit_code: 1,
                stdout: Vec::new(),
                stderr: b"boom\n".to_vec(),
            })
        });
        let orchestrator = orchestrator(&temp, executor, CachePolicy::default());

        for _ in 0..2 {
            let outcome = orchestrator.run("false", &[]).unwrap();
            assert_eq!(outcome.source, OutputSource::Fresh);
            assert_eq!(outcome.output.exit_code, 1);
            assert!(!outcome.stored);
        }
    }

    #[test]
    fn test_stderr_policy() {
        let noisy = || CapturedOutput {
            exit_code: 0,
            stdout: b"ok\n".to_vec(),
            stderr: b"warning: deprecated\n".to_vec(),
        };

        let temp = TempDir::new().unwrap();
        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().times(2).returning(move |_, _| Ok(noisy()));
        let strict = orchestrator(&temp, executor, CachePolicy::default());
        assert!(!strict.run("echo", &[]).unwrap().stored);
        assert!(!strict.run("echo", &[]).unwrap().stored);

        let temp = TempDir::new().unwrap();
        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().times(1).returning(move |_, _| Ok(noisy()));
        let tolerant = orchestrator(
            &temp,
            executor,
            CachePolicy {
                cache_nonempty_stderr: true,
            },
        );
        assert!(tolerant.run("echo", &[]).unwrap().stored);
        let replay = tolerant.run("echo", &[]).unwrap();
        assert_eq!(replay.source, OutputSource::Cache);
        assert_eq!(replay.output.stderr, b"warning: deprecated\n".to_vec());
    }

    #[test]
    fn test_unresolvable_command_runs_uncached() {
        let temp = TempDir::new().unwrap();
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_execute()
            .withf(|program, _| program == Path::new("no-such-command-xyz"))
            .times(1)
            .returning(|program, _| Err(ExecError::NotFound(program.display().to_string())));
        let orchestrator = orchestrator(&temp, executor, CachePolicy::default());

        let err = orchestrator.run("no-such-command-xyz", &[]).unwrap_err();
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn test_resolution_failure_runs_uncached() {
        let temp = TempDir::new().unwrap();
        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().times(2).returning(|_, _| Ok(hello()));
        let orchestrator = Orchestrator::with_parts(
            SignatureEngine::new(Box::new(Unresolvable)),
            store(&temp),
            Box::new(executor),
            CachePolicy::default(),
        );

        for _ in 0..2 {
            let outcome = orchestrator.run("echo", &args(&["Hello"])).unwrap();
            assert_eq!(outcome.source, OutputSource::Fresh);
            assert_eq!(outcome.fingerprint, None);
            assert!(!outcome.stored);
        }
    }

    #[test]
    fn test_corrupt_entry_falls_back_and_heals() {
        let temp = TempDir::new().unwrap();
        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().times(2).returning(|_, _| Ok(hello()));
        let orchestrator = orchestrator(&temp, executor, CachePolicy::default());

        let first = orchestrator.run("echo", &args(&["Hello"])).unwrap();
        let path = store(&temp).entry_path(&first.fingerprint.unwrap()).unwrap();
        fs::write(&path, b"not an entry").unwrap();

        let second = orchestrator.run("echo", &args(&["Hello"])).unwrap();
        assert_eq!(second.source, OutputSource::Fresh);
        assert!(second.stored);

        let third = orchestrator.run("echo", &args(&["Hello"])).unwrap();
        assert_eq!(third.source, OutputSource::Cache);
    }

    #[test]
    fn test_unwritable_cache_still_returns_output() {
        let temp = TempDir::new().unwrap();
        // The cache root is a file, so nothing can be stored under it
        let root = temp.path().join("cache");
        fs::write(&root, b"").unwrap();

        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().times(1).returning(|_, _| Ok(hello()));
        let orchestrator = Orchestrator::with_parts(
            SignatureEngine::new(Box::new(NoDependencies)),
            CacheStore::new(&root, u64::MAX),
            Box::new(executor),
            CachePolicy::default(),
        );

        let outcome = orchestrator.run("echo", &args(&["Hello"])).unwrap();
        assert_eq!(outcome.output, hello());
        assert!(!outcome.stored);
    }

    #[test]
    fn test_stats_recorded_when_enabled() {
        let temp = TempDir::new().unwrap();
        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().times(1).returning(|_, _| Ok(hello()));
        let orchestrator =
            orchestrator(&temp, executor, CachePolicy::default()).with_stats(true);

        orchestrator.run("echo", &args(&["Hello"])).unwrap();
        orchestrator.run("echo", &args(&["Hello"])).unwrap();
        orchestrator.run("echo", &args(&["Hello"])).unwrap();

        let counters = StatsCounters::load(&temp.path().join("cache")).unwrap();
        assert_eq!((counters.hits, counters.misses), (2, 1));
    }

    #[test]
    fn test_real_echo_end_to_end() {
        let temp = TempDir::new().unwrap();
        let config = Config::with_cache_dir(temp.path().join("cache"));
        let orchestrator = Orchestrator::with_parts(
            SignatureEngine::new(Box::new(NoDependencies)),
            CacheStore::from_config(&config),
            Box::new(ProcessExecutor),
            CachePolicy::from_config(&config),
        );

        let first = orchestrator.run("echo", &args(&["Hello"])).unwrap();
        assert_eq!(first.output.stdout, b"Hello\n".to_vec());
        assert_eq!(first.source, OutputSource::Fresh);

        let second = orchestrator.run("echo", &args(&["Hello"])).unwrap();
        assert_eq!(second.output.stdout, b"Hello\n".to_vec());
        assert_eq!(second.source, OutputSource::Cache);

        // The staging directory is left clean
        let report = collect_garbage(&config.cache_dir, &config.temporary_dir).unwrap();
        assert_eq!(report.removed_temp_files, 0);
    }

    #[test]
    fn test_resolve_command() {
        assert!(resolve_command("sh").is_some());
        assert_eq!(resolve_command(""), None);
        assert_eq!(resolve_command("no-such-command-xyz"), None);
    }
}
