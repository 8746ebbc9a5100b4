use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::filter::IndexValue;

/// A type that can be persisted in a [`crate::Store`].
///
/// `collection_name` must be stable across releases: it names the backing
/// SQLite table. `indexed_fields` lists the subset of fields `list` can
/// filter on; everything else is only reachable by deserializing the full
/// record.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    fn updated_at(&self) -> i64;

    fn collection_name() -> &'static str;

    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}
