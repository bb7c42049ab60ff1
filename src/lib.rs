/// Content file codec: reading, writing and the cache of open readers
pub mod esm;
/// Error definitions
pub mod error;
/// Typed records and their wire encodings
pub mod records;
/// Record collections and the registry owning them
pub mod store;
/// Progress reporting while loading and saving
pub mod loading;
/// Loading a list of content files into a store
pub mod content;

#[cfg(test)]
mod testing;
