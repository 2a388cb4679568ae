//! Ad policy: the snapshot model, document parsing, the current-policy
//! store, the on-disk cache and the background refresher.

pub mod cache;
pub mod document;
pub mod model;
pub mod refresh;
pub mod store;

pub use cache::{CachedDocument, PolicyCache};
pub use document::{parse_policy, parse_policy_or_fail_closed};
pub use model::{AdPolicy, KindPolicy, Limit};
pub use refresh::{FilePolicySource, PolicyRefresher, PolicySource, RefreshOutcome, StaticPolicySource};
pub use store::{PolicyChange, PolicyStore};
