use camino::Utf8PathBuf;
use std::cell::RefCell;

// Thread-local override used only in tests to avoid process-global env races.
thread_local! {
    static THREAD_HOME: RefCell<Option<Utf8PathBuf>> = const { RefCell::new(None) };
}

/// Resolve scout home:
/// 1) thread-local override (tests use this)
/// 2) env `SCOUT_HOME` (opt-in for users/CI)
/// 3) default `~/.scout` (falls back to a relative `.scout` with no home dir)
#[must_use]
pub fn scout_home() -> Utf8PathBuf {
    if let Some(tl) = THREAD_HOME.with(|tl| tl.borrow().clone()) {
        return tl;
    }
    if let Ok(p) = std::env::var("SCOUT_HOME") {
        return Utf8PathBuf::from(p);
    }
    match dirs::home_dir() {
        Some(home) => Utf8PathBuf::from_path_buf(home)
            .unwrap_or_else(|p| Utf8PathBuf::from(p.to_string_lossy().into_owned()))
            .join(".scout"),
        None => Utf8PathBuf::from(".scout"),
    }
}

/// Returns `<SCOUT_HOME>/audit.jsonl`
#[must_use]
pub fn audit_log_path() -> Utf8PathBuf {
    scout_home().join("audit.jsonl")
}

/// Returns `<SCOUT_HOME>/raw_briefs`
#[must_use]
pub fn raw_briefs_dir() -> Utf8PathBuf {
    scout_home().join("raw_briefs")
}

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// RAII guard for isolated home that clears thread-local state on drop
#[cfg(any(test, feature = "test-utils"))]
pub struct HomeGuard {
    inner: tempfile::TempDir,
}

#[cfg(any(test, feature = "test-utils"))]
impl Drop for HomeGuard {
    fn drop(&mut self) {
        THREAD_HOME.with(|tl| *tl.borrow_mut() = None);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl std::ops::Deref for HomeGuard {
    type Target = tempfile::TempDir;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Test helper: provides isolated home testing; not part of public API stability guarantees.
///
/// Give this test a unique home under the system temp dir.
/// Hold the `HomeGuard` for the test's duration so the directory stays alive and
/// thread-local state is cleaned up.
#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn with_isolated_home() -> HomeGuard {
    let td = tempfile::TempDir::new().expect("create temp home");
    let p = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).unwrap();
    THREAD_HOME.with(|tl| *tl.borrow_mut() = Some(p));
    HomeGuard { inner: td }
}
