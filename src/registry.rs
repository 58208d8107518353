//! Static registry of intercepted client methods.
//!
//! The registry is the fixed table describing which client operations receive
//! method-specific instrumentation and under which span name. It is built once
//! at compile time and never mutated; the per-call pipelines in [`crate::sync`]
//! and [`crate::aio`] look their descriptor up here at wrap time.

/// Tag selecting the typed extraction contract for an intercepted method.
///
/// Each variant corresponds to one entry in [`WRAPPED_METHODS`] and picks the
/// request/response attribute extractors applied around the call. Operations
/// without a kind of their own (plain GET/SET traffic and raw commands) go
/// through the generic pipeline instead and only carry the baseline
/// attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `PING` health checks.
    Ping,
    /// `FT.SEARCH` full-text queries.
    Search,
    /// `FT.CREATE` index creation.
    CreateIndex,
}

/// Describes one intercepted method: what it is, and what to call its span.
///
/// Descriptors are immutable and only ever constructed in [`WRAPPED_METHODS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// The extraction contract applied to this method.
    pub kind: CommandKind,
    /// Method name recorded as the operation attribute.
    pub method_name: &'static str,
    /// Human-readable span name (`otel.name`).
    pub span_name: &'static str,
}

/// The interception table.
///
/// Ordered, constructed once, read-only. Kinds absent from this table are
/// treated exactly like any uninstrumented method: the call goes through
/// without a method-specific span.
pub static WRAPPED_METHODS: &[MethodDescriptor] = &[
    MethodDescriptor {
        kind: CommandKind::Ping,
        method_name: "ping",
        span_name: "ping",
    },
    MethodDescriptor {
        kind: CommandKind::Search,
        method_name: "search",
        span_name: "search",
    },
    MethodDescriptor {
        kind: CommandKind::CreateIndex,
        method_name: "create_index",
        span_name: "create_index",
    },
];

/// Looks up the descriptor for a command kind.
///
/// Returns `None` when the kind was never registered; callers fall back to an
/// uninstrumented passthrough in that case rather than failing the call.
pub fn descriptor_for(kind: CommandKind) -> Option<&'static MethodDescriptor> {
    WRAPPED_METHODS
        .iter()
        .find(|descriptor| descriptor.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_kind() {
        for kind in [CommandKind::Ping, CommandKind::Search, CommandKind::CreateIndex] {
            let descriptor = descriptor_for(kind).expect("kind must be registered");
            assert_eq!(descriptor.kind, kind);
        }
    }

    #[test]
    fn descriptor_span_names() {
        assert_eq!(descriptor_for(CommandKind::Ping).unwrap().span_name, "ping");
        assert_eq!(
            descriptor_for(CommandKind::Search).unwrap().span_name,
            "search"
        );
        assert_eq!(
            descriptor_for(CommandKind::CreateIndex).unwrap().span_name,
            "create_index"
        );
    }

    #[test]
    fn method_names_match_registry_order() {
        let names: Vec<_> = WRAPPED_METHODS.iter().map(|d| d.method_name).collect();
        assert_eq!(names, ["ping", "search", "create_index"]);
    }
}
