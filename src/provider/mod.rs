/// Endpoint racing, ranking, and leasing
pub mod pool;

pub use pool::{NodeProbe, ProviderLease, ProviderPool};
