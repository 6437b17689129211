mod state;

use std::sync::{Arc, Mutex, MutexGuard};

pub use state::{Phase, Session};

/// The session shared by the dispatcher and the worker.
///
/// Every access is a short critical section; the guard is never held across
/// an await.
pub type SharedSession = Arc<Mutex<Session>>;

pub fn shared(session: Session) -> SharedSession {
    Arc::new(Mutex::new(session))
}

/// Lock the session, recovering the data if a panicking task poisoned it.
pub fn lock(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
