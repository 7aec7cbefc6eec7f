//! Map change notifications.

/// An observer of map mutations. All handlers default to no-ops, so sinks
/// implement only the events they care about. Handlers run synchronously
/// inside the mutating operation, after the map's own state is consistent,
/// and must not re-enter the map.
pub trait EventSink<K, V> {
    /// A key was written (insert or update).
    fn on_set(&mut self, _key: &K, _value: &V) {}

    /// A key was explicitly deleted.
    fn on_delete(&mut self, _key: &K) {}

    /// A key was discovered past its TTL and dropped.
    fn on_expire(&mut self, _key: &K) {}

    /// The hot cache evicted an entry to make room.
    fn on_evict(&mut self, _key: &K, _value: &V) {}

    /// The map was cleared.
    fn on_clear(&mut self) {}
}
