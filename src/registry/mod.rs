//! Registry of live sessions
//!
//! Every session whose answer was returned is registered until it closes.
//! The registry is what a shutdown drains: it closes every remaining
//! transport concurrently and reports the sessions that failed to close.
//!
//! ```text
//!                     Arc<SessionRegistry<T>>
//!                 ┌─────────────────────────────┐
//!                 │ sessions: HashMap<SessionId,│
//!                 │   SessionEntry {            │
//!                 │     transport: Arc<T>,      │
//!                 │     phase: watch::Rx,       │
//!                 │   }                         │
//!                 │ >                           │
//!                 └──────────────┬──────────────┘
//!           ┌────────────────────┼────────────────────┐
//!           ▼                    ▼                    ▼
//!   handle_offer()        session task close      shutdown()
//!   add()                 remove()                drain_all()
//! ```

pub mod entry;
pub mod store;

pub use entry::SessionEntry;
pub use store::{DrainReport, SessionRegistry};
