// Sniffer components
pub mod classifier; // Creation-event regexes over log lines
pub mod dedupe; // Bounded signature set, clear or ring eviction
pub mod subscriber; // Stream consumer feeding the retrieval queue

pub use classifier::CreationClassifier;
pub use dedupe::{DedupeMode, SignatureSet};
pub use subscriber::{LogSubscriber, NotificationOutcome};
