/// Generic LRU cache engine with pinning.
pub mod lru;
/// Path-metadata specialization of the engine.
pub mod meta;
