pub mod config;
pub mod directory;
pub mod errors;
pub mod guard;
pub mod lifecycle;
pub mod routing;
pub mod session;
pub mod significance;
pub mod store;

pub use directory::{
    is_plausible_international, BusinessSearchResult, PhoneDirectory, PhoneDirectoryEntry,
};
pub use errors::{DomainError, OrchestrationError};
pub use guard::DispatchGuardStore;
pub use lifecycle::{transition, DispatchEvent, DispatchPhase, DispatchTransitionError};
pub use routing::{CallAction, CallActionPolicy, CallActionPreference};
pub use session::{
    AgentSession, ContextUpdate, ContextUpdateKind, ConversationContextEntry, PollingSession,
    Specialization, CONTEXT_UPDATE_WINDOW,
};
pub use significance::{PhraseDeltaDetector, SignificanceDetector};
pub use store::{InMemoryStore, KeyValueStore};
