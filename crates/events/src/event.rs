/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts emitted upstream)
/// - **versioned** (schema evolution)
/// - consumed in log order, possibly more than once
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "registry.package.created").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;
}
