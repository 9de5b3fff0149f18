use cast;

use error::LockError;
use error::Result;
use ident::Identifier;
use semaphore::is_gone;
use semaphore::Semaphore;

/// Options for opening a [`SemLock`].
#[derive(Copy, Clone, Debug)]
pub struct Builder {
    auto_release: bool,
    max_permits: u32,
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            auto_release: false,
            max_permits: 1,
        }
    }
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Remove the kernel semaphore when the last handle to it is dropped,
    /// handing back anything this handle still holds. Off by default: the
    /// semaphore normally outlives every process until someone calls
    /// [`SemLock::remove`].
    pub fn auto_release(&mut self, auto_release: bool) -> &mut Builder {
        self.auto_release = auto_release;
        self
    }

    /// How many holders may be inside at once. Only applied when the
    /// semaphore is created; an existing one keeps its count.
    pub fn max_permits(&mut self, max_permits: u32) -> &mut Builder {
        self.max_permits = max_permits;
        self
    }

    pub fn open<S: Into<String>>(&self, key: S) -> Result<SemLock> {
        let key = key.into();
        if key.is_empty() {
            return Err(LockError::InvalidParameter("empty key".to_string()));
        }

        if 0 == self.max_permits {
            return Err(LockError::InvalidParameter(
                "max_permits must be at least 1".to_string(),
            ));
        }

        // SETVAL takes an int, semop a short
        cast::i16(self.max_permits).map_err(|e| {
            LockError::InvalidParameter(format!("max_permits {}: {:?}", self.max_permits, e))
        })?;

        let identifier = Identifier::from_key(&key);
        if identifier.is_private() {
            return Err(LockError::InvalidParameter(format!(
                "key {:?} hashes to the private ipc key",
                key
            )));
        }

        let mut lock = SemLock {
            key,
            identifier,
            max_permits: self.max_permits,
            auto_release: self.auto_release,
            non_blocking: true,
            handle: None,
            held: 0,
        };

        lock.connect()?;

        Ok(lock)
    }
}

/// A lock shared between processes through a named kernel semaphore.
///
/// Every `SemLock` opened with the same key, in any process on the host,
/// talks to the same semaphore. New locks don't wait: [`acquire`] returns
/// `false` if nothing is free until [`set_non_blocking(false)`] is called.
///
/// [`acquire`]: #method.acquire
/// [`set_non_blocking(false)`]: #method.set_non_blocking
#[derive(Debug)]
pub struct SemLock {
    key: String,
    identifier: Identifier,
    max_permits: u32,
    auto_release: bool,
    non_blocking: bool,
    handle: Option<Semaphore>,
    held: u32,
}

impl SemLock {
    /// A single-holder lock that persists after the handle is dropped.
    pub fn new<S: Into<String>>(key: S) -> Result<SemLock> {
        Builder::new().open(key)
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn identifier(&self) -> Identifier {
        self.identifier
    }

    pub fn max_permits(&self) -> u32 {
        self.max_permits
    }

    pub fn auto_release(&self) -> bool {
        self.auto_release
    }

    pub fn is_non_blocking(&self) -> bool {
        self.non_blocking
    }

    /// With `true` (the default), `acquire` gives up immediately instead of waiting.
    pub fn set_non_blocking(&mut self, non_blocking: bool) {
        self.non_blocking = non_blocking;
    }

    /// Take a permit.
    ///
    /// Returns `false` only in non-blocking mode when no permit is free. In
    /// blocking mode, waits as long as it takes. If the semaphore was
    /// removed since it was last used, it's recreated first.
    pub fn acquire(&mut self) -> Result<bool> {
        self.ensure_connected()?;

        let acquired = {
            let sem = self.handle("acquire")?;
            sem.acquire(!self.non_blocking)
        };

        match acquired {
            Ok(true) => {
                self.held += 1;
                debug!("{:?}: acquired ({} held)", self.key, self.held);
                Ok(true)
            }
            Ok(false) => {
                debug!("{:?}: busy", self.key);
                Ok(false)
            }
            Err(e) => {
                if is_gone(&e) {
                    warn!("{:?}: removed while acquiring", self.key);
                    self.disconnect();
                }
                Err(LockError::resource("acquire", e))
            }
        }
    }

    /// Give a permit back.
    ///
    /// Only call this after a successful `acquire`; the kernel doesn't
    /// stop a release from pushing the count past `max_permits`.
    pub fn release(&mut self) -> Result<bool> {
        let released = self.handle("release")?.release(1);

        match released {
            Ok(()) => {
                self.held = self.held.saturating_sub(1);
                debug!("{:?}: released ({} held)", self.key, self.held);
                Ok(true)
            }
            Err(e) => {
                warn!("{:?}: release failed: {}", self.key, e);
                if is_gone(&e) {
                    self.disconnect();
                }
                Ok(false)
            }
        }
    }

    /// Destroy the kernel semaphore, for every process using this key.
    ///
    /// Anyone blocked in `acquire` wakes with an error; other handles
    /// recreate the semaphore on their next `acquire`.
    pub fn remove(&mut self) -> bool {
        let sem = match self.handle.take() {
            Some(sem) => sem,
            None => {
                warn!("{:?}: nothing to remove", self.key);
                return false;
            }
        };

        self.held = 0;

        match sem.remove() {
            Ok(()) => {
                info!("{:?}: removed semaphore {}", self.key, sem.id());
                true
            }
            Err(e) => {
                warn!("{:?}: remove failed: {}", self.key, e);
                false
            }
        }
    }

    fn handle(&self, op: &'static str) -> Result<&Semaphore> {
        self.handle.as_ref().ok_or_else(|| LockError::removed(op))
    }

    fn ensure_connected(&mut self) -> Result<()> {
        let alive = match self.handle {
            Some(ref sem) => sem
                .is_alive()
                .map_err(|e| LockError::resource("check", e))?,
            None => false,
        };

        if !alive {
            if self.handle.is_some() {
                info!("{:?}: semaphore went away, reopening", self.key);
            }
            self.disconnect();
            self.connect()?;
        }

        Ok(())
    }

    fn connect(&mut self) -> Result<()> {
        let permits = cast::i32(self.max_permits)
            .map_err(|e| LockError::InvalidParameter(format!("max_permits: {:?}", e)))?;

        let sem = Semaphore::open(self.identifier.ipc_key(), permits)
            .map_err(|e| LockError::resource("get", e))?;

        debug!(
            "{:?}: opened semaphore {} (ipc key {})",
            self.key,
            sem.id(),
            self.identifier
        );

        self.handle = Some(sem);
        self.held = 0;
        Ok(())
    }

    /// Forget a handle whose set no longer exists.
    fn disconnect(&mut self) {
        self.handle = None;
        self.held = 0;
    }
}

/// Unregisters from the kernel set. This briefly contends with other
/// handles opening or closing the same key, but never waits on a permit.
impl Drop for SemLock {
    fn drop(&mut self) {
        let sem = match self.handle.take() {
            Some(sem) => sem,
            None => return,
        };

        let held = if self.auto_release {
            cast::i16(self.held).unwrap_or(i16::max_value())
        } else {
            0
        };

        match sem.close(held, self.auto_release) {
            Ok(true) => info!("{:?}: last user gone, semaphore removed", self.key),
            Ok(false) => (),
            Err(ref e) if is_gone(e) => (),
            Err(e) => warn!("{:?}: closing semaphore: {}", self.key, e),
        }
    }
}
