//! The interop message subsystem: a continuous indexer of cross-domain
//! messages across every L2 chain, and an optional relayer that delivers
//! indexed messages to their destination chains.

mod index;
pub use index::{IndexError, MessageIndex};

mod source;
pub use source::{LogSource, LogStream, ProviderLogSource, SubscriptionError};

mod indexer;
pub use indexer::{CrossDomainMessageIndexer, IndexerError};

mod submitter;
pub use submitter::{MessengerSubmitter, RelayError, RelayOutcome, RelaySubmitter};

mod relayer;
pub use relayer::{CrossDomainMessageRelayer, RelayerError};
