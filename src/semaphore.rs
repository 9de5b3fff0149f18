//! A counting semaphore in the kernel's System V IPC table.
//!
//! Each named lock is a set of four semaphores: the permits themselves, a
//! count of open handles, a guard that serializes opening and closing, and
//! a flag raised once the permits have been given their initial value.
//! Every adjustment carries `SEM_UNDO`, so a process that dies hands back
//! whatever it held.

use std::io;

use libc;
use libc::c_int;
use libc::c_short;

const PERMITS: u16 = 0;
const USERS: u16 = 1;
const GUARD: u16 = 2;
const READY: u16 = 3;
const SET_SIZE: c_int = 4;

/// rw-rw-rw-
const MODE: c_int = 0o666;

macro_rules! syscall {
    ($fn:ident $args:tt) => {{
        let res = unsafe { libc::$fn $args };
        if res == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

fn op(num: u16, delta: c_short, flags: c_int) -> libc::sembuf {
    libc::sembuf {
        sem_num: num,
        sem_op: delta,
        sem_flg: flags as c_short,
    }
}

/// The set was removed, or the id was never valid.
pub(crate) fn is_gone(e: &io::Error) -> bool {
    match e.raw_os_error() {
        Some(libc::EIDRM) | Some(libc::EINVAL) => true,
        _ => false,
    }
}

#[derive(Debug)]
pub struct Semaphore {
    id: c_int,
}

impl Semaphore {
    /// Find or create the set for `key` and register as one of its users.
    ///
    /// `permits` is only written by whoever opens a freshly created set;
    /// later callers see the count as it stands.
    pub fn open(key: libc::key_t, permits: c_int) -> io::Result<Semaphore> {
        let id = syscall!(semget(key, SET_SIZE, MODE | libc::IPC_CREAT))?;
        let sem = Semaphore { id };

        sem.lock_guard()?;
        sem.register(permits).map_err(|e| {
            let _ = sem.unlock_guard();
            e
        })?;

        if let Err(e) = sem.unlock_guard() {
            let _ = sem.leave();
            return Err(e);
        }

        Ok(sem)
    }

    /// Count ourselves as a user, and set up the permits if nobody has yet.
    /// Leaves the user count as it was on failure.
    fn register(&self, permits: c_int) -> io::Result<()> {
        self.apply(&mut [op(USERS, 1, libc::SEM_UNDO)])?;

        if let Err(e) = self.init(permits) {
            let _ = self.leave();
            return Err(e);
        }

        Ok(())
    }

    fn init(&self, permits: c_int) -> io::Result<()> {
        if 0 != self.value(READY)? {
            debug!("semaphore {}: already set up", self.id);
            return Ok(());
        }

        debug!("semaphore {}: new, setting {} permits", self.id, permits);
        self.set_value(PERMITS, permits)?;
        self.set_value(READY, 1)
    }

    fn leave(&self) -> io::Result<()> {
        self.apply(&mut [op(USERS, -1, libc::SEM_UNDO | libc::IPC_NOWAIT)])
    }

    pub fn id(&self) -> c_int {
        self.id
    }

    /// Does the id still refer to a live set?
    pub fn is_alive(&self) -> io::Result<bool> {
        match self.value(PERMITS) {
            Ok(_) => Ok(true),
            Err(ref e) if is_gone(e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Take one permit. Without `wait`, returns `false` instead of sleeping.
    pub fn acquire(&self, wait: bool) -> io::Result<bool> {
        let flags = if wait {
            libc::SEM_UNDO
        } else {
            libc::SEM_UNDO | libc::IPC_NOWAIT
        };

        loop {
            match self.apply(&mut [op(PERMITS, -1, flags)]) {
                Ok(()) => return Ok(true),
                Err(ref e) if !wait && e.raw_os_error() == Some(libc::EAGAIN) => return Ok(false),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Hand back `count` permits, waking waiters.
    pub fn release(&self, count: c_short) -> io::Result<()> {
        self.apply(&mut [op(PERMITS, count, libc::SEM_UNDO)])
    }

    #[cfg(test)]
    pub fn available(&self) -> io::Result<c_int> {
        self.value(PERMITS)
    }

    /// Threads currently blocked waiting for a permit.
    #[cfg(test)]
    pub fn waiting(&self) -> io::Result<c_int> {
        syscall!(semctl(self.id, c_int::from(PERMITS), libc::GETNCNT))
    }

    #[cfg(test)]
    pub fn users(&self) -> io::Result<c_int> {
        self.value(USERS)
    }

    /// Destroy the set for everyone. Blocked waiters wake with `EIDRM`.
    pub fn remove(&self) -> io::Result<()> {
        syscall!(semctl(self.id, 0, libc::IPC_RMID))?;
        Ok(())
    }

    /// Unregister this handle, first returning `held` permits.
    ///
    /// Takes the guard, so this waits while another handle to the same set
    /// is opening or closing. That's a handful of syscalls, not a permit wait.
    ///
    /// With `remove_if_last`, the set is destroyed when no users remain;
    /// returns whether that happened.
    pub fn close(self, held: c_short, remove_if_last: bool) -> io::Result<bool> {
        self.lock_guard()?;

        let closed = self.unregister(held, remove_if_last);

        match closed {
            Ok(true) => Ok(true),
            Ok(false) => self.unlock_guard().map(|()| false),
            Err(e) => {
                self.unlock_guard()?;
                Err(e)
            }
        }
    }

    fn unregister(&self, held: c_short, remove_if_last: bool) -> io::Result<bool> {
        if held > 0 {
            self.release(held)?;
        }

        self.leave()?;

        if remove_if_last && 0 == self.value(USERS)? {
            self.remove()?;
            return Ok(true);
        }

        Ok(false)
    }

    fn lock_guard(&self) -> io::Result<()> {
        loop {
            match self.apply(&mut [op(GUARD, 0, 0), op(GUARD, 1, libc::SEM_UNDO)]) {
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn unlock_guard(&self) -> io::Result<()> {
        self.apply(&mut [op(GUARD, -1, libc::SEM_UNDO)])
    }

    fn value(&self, num: u16) -> io::Result<c_int> {
        syscall!(semctl(self.id, c_int::from(num), libc::GETVAL))
    }

    fn set_value(&self, num: u16, value: c_int) -> io::Result<()> {
        syscall!(semctl(self.id, c_int::from(num), libc::SETVAL, value))?;
        Ok(())
    }

    fn apply(&self, ops: &mut [libc::sembuf]) -> io::Result<()> {
        syscall!(semop(self.id, ops.as_mut_ptr(), ops.len()))?;
        Ok(())
    }
}

/// Is there a set for `key`, without creating one?
#[cfg(test)]
pub fn exists(key: libc::key_t) -> io::Result<bool> {
    match syscall!(semget(key, 0, 0)) {
        Ok(_) => Ok(true),
        Err(ref e) if e.raw_os_error() == Some(libc::ENOENT) => Ok(false),
        Err(e) => Err(e),
    }
}
